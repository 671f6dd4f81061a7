use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use tracing::debug;

use crate::coerce::{excel_serial_to_date, parse_date, parse_float, trim_cell};
use crate::AdapterError;

const PLACEHOLDER_TEXT: &[&str] = &["nan", "none", "null", "n/a"];

/// One spreadsheet cell, reduced to the shapes the importer cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => trim_cell(text).is_empty(),
            _ => false,
        }
    }

    /// Trimmed text, with spreadsheet placeholders (`nan`, `None`, ...) treated as missing.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            CellValue::Empty => return None,
            CellValue::Text(text) => trim_cell(text).to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Bool(b) => b.to_string(),
        };
        if text.is_empty()
            || PLACEHOLDER_TEXT
                .iter()
                .any(|p| text.eq_ignore_ascii_case(p))
        {
            None
        } else {
            Some(text)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(text) => parse_float(text),
            _ => None,
        }
    }

    /// `Ok(None)` for an empty cell, `Err(raw)` for a value that is not a date.
    pub fn as_date(&self) -> Result<Option<NaiveDate>, String> {
        match self {
            CellValue::Empty => Ok(None),
            CellValue::Date(d) => Ok(Some(*d)),
            CellValue::Number(n) => excel_serial_to_date(*n).map(Some).ok_or_else(|| n.to_string()),
            CellValue::Text(text) if trim_cell(text).is_empty() => Ok(None),
            CellValue::Text(text) => parse_date(text).map(Some).ok_or_else(|| text.clone()),
            CellValue::Bool(b) => Err(b.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
                .map(CellValue::Date)
                .unwrap_or(CellValue::Empty),
            Data::DateTimeIso(s) => parse_date(s.get(..10).unwrap_or(s.as_str()))
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(_) => CellValue::Empty,
        }
    }
}

/// Header row plus data rows of one worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(headers: &[&str], rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    /// Splits raw grid rows at the first row holding any non-empty cell.
    pub fn from_grid(grid: Vec<Vec<CellValue>>) -> Result<Self, AdapterError> {
        let mut iter = grid.into_iter();
        let header = iter
            .by_ref()
            .find(|row| row.iter().any(|c| !c.is_empty()))
            .ok_or(AdapterError::NoHeader)?;
        let headers = header
            .iter()
            .map(|c| c.as_text().unwrap_or_default())
            .collect();
        let rows = iter
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .collect();
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads the first worksheet of an `.xlsx`/`.xls` workbook.
pub fn load_workbook(path: impl AsRef<Path>) -> Result<Sheet, AdapterError> {
    let path = path.as_ref();
    let workbook_error = |message: String| AdapterError::Workbook {
        path: path.display().to_string(),
        message,
    };
    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(e.to_string()))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AdapterError::NoSheet(path.display().to_string()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| workbook_error(e.to_string()))?;
    let grid = range
        .rows()
        .map(|row| row.iter().map(CellValue::from).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let sheet = Sheet::from_grid(grid)?;
    debug!(path = %path.display(), sheet = %first, rows = sheet.len(), "workbook loaded");
    Ok(sheet)
}
