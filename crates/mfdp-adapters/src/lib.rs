//! Spreadsheet loading, header alias resolution and per-category row parsers.

use mfdp_core::{
    clean_isin, DataCategory, FactSheetInput, FundDraft, HoldingDraft, HoldingInput, NavDraft,
    NewFund, ReturnsDraft, ReturnsInput, ISIN_LEN, MAX_EXPENSE_RATIO, MIN_RETURN_PCT,
};
use thiserror::Error;
use tracing::debug;

mod aliases;
mod coerce;
mod sheet;

pub use aliases::{
    apply_alias_overrides, builtin_aliases, builtin_tables, load_alias_tables, FieldAliases,
    AliasTable, ColumnMap, FACTSHEET_ALIASES, NAV_ALIASES, PORTFOLIO_ALIASES, RETURNS_ALIASES,
};
pub use coerce::{normalize_key, parse_date, parse_float};
pub use sheet::{load_workbook, CellValue, Sheet};

pub const CRATE_NAME: &str = "mfdp-adapters";

/// Fallback for factsheet rows without a type or AMC column.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("opening workbook {path}: {message}")]
    Workbook { path: String, message: String },
    #[error("workbook {0} has no worksheets")]
    NoSheet(String),
    #[error("worksheet has no header row")]
    NoHeader,
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("unknown alias field `{0}`")]
    UnknownField(String),
    #[error("row has no {0}")]
    MissingField(&'static str),
    #[error("invalid ISIN {0:?}")]
    InvalidIsin(String),
    #[error("unparseable date {0:?}")]
    InvalidDate(String),
}

/// One parsed spreadsheet row, tagged by category.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportRecord {
    Fund(FundDraft),
    Returns(ReturnsDraft),
    Holding(HoldingDraft),
    Nav(NavDraft),
}

pub trait CategoryAdapter: Send + Sync {
    fn category(&self) -> DataCategory;

    /// Fields whose column must be present for the file to be usable at all.
    fn required_fields(&self) -> &'static [&'static str];

    fn check_columns(&self, columns: &ColumnMap) -> Result<(), AdapterError> {
        let missing = columns.missing(self.required_fields());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AdapterError::MissingColumns(
                missing.into_iter().map(str::to_string).collect(),
            ))
        }
    }

    fn parse_row(&self, columns: &ColumnMap, row: &[CellValue]) -> Result<ImportRecord, AdapterError>;
}

fn require_one_of(columns: &ColumnMap, fields: &[&str]) -> Result<(), AdapterError> {
    if fields.iter().any(|f| columns.has(f)) {
        Ok(())
    } else {
        Err(AdapterError::MissingColumns(vec![fields.join(" or ")]))
    }
}

fn required_isin(columns: &ColumnMap, row: &[CellValue], field: &str) -> Result<String, AdapterError> {
    let raw = columns.text(row, field).unwrap_or_default();
    clean_isin(&raw).ok_or(AdapterError::InvalidIsin(raw))
}

pub struct FactsheetAdapter;

impl CategoryAdapter for FactsheetAdapter {
    fn category(&self) -> DataCategory {
        DataCategory::Factsheet
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["isin", "scheme_name"]
    }

    fn parse_row(&self, columns: &ColumnMap, row: &[CellValue]) -> Result<ImportRecord, AdapterError> {
        let isin = required_isin(columns, row, "isin")?;
        let scheme_name = columns
            .text(row, "scheme_name")
            .ok_or(AdapterError::MissingField("scheme_name"))?;

        // Out-of-band figures would trip the table checks and sink the batch.
        let aum = columns.number(row, "aum").filter(|v| *v >= 0.0);
        let expense_ratio = columns
            .number(row, "expense_ratio")
            .filter(|v| (0.0..=MAX_EXPENSE_RATIO).contains(v));
        let launch_date = columns.date(row, "launch_date").unwrap_or_else(|err| {
            debug!(%isin, error = %err, "ignoring launch date");
            None
        });

        Ok(ImportRecord::Fund(FundDraft {
            fund: NewFund {
                isin,
                scheme_name,
                fund_type: columns
                    .text(row, "fund_type")
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                fund_subtype: columns.text(row, "fund_subtype"),
                amc_name: columns
                    .text(row, "amc_name")
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            },
            factsheet: FactSheetInput {
                fund_manager: columns.text(row, "fund_manager"),
                aum,
                expense_ratio,
                launch_date,
                exit_load: columns.text(row, "exit_load"),
            },
        }))
    }
}

pub struct ReturnsAdapter;

impl CategoryAdapter for ReturnsAdapter {
    fn category(&self) -> DataCategory {
        DataCategory::Returns
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["isin"]
    }

    fn parse_row(&self, columns: &ColumnMap, row: &[CellValue]) -> Result<ImportRecord, AdapterError> {
        let isin = required_isin(columns, row, "isin")?;
        let mut rejected_values = 0;
        let mut read = |field: &str| match columns.number(row, field) {
            Some(v) if v < MIN_RETURN_PCT => {
                rejected_values += 1;
                None
            }
            other => other,
        };
        let returns = ReturnsInput {
            return_1m: read("return_1m"),
            return_3m: read("return_3m"),
            return_6m: read("return_6m"),
            return_ytd: read("return_ytd"),
            return_1y: read("return_1y"),
            return_3y: read("return_3y"),
            return_5y: read("return_5y"),
        };
        Ok(ImportRecord::Returns(ReturnsDraft {
            isin,
            returns,
            rejected_values,
        }))
    }
}

pub struct PortfolioAdapter;

impl CategoryAdapter for PortfolioAdapter {
    fn category(&self) -> DataCategory {
        DataCategory::Portfolio
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["instrument_name"]
    }

    fn check_columns(&self, columns: &ColumnMap) -> Result<(), AdapterError> {
        let missing = columns.missing(self.required_fields());
        if !missing.is_empty() {
            return Err(AdapterError::MissingColumns(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }
        require_one_of(columns, &["scheme_isin", "scheme_name"])
    }

    fn parse_row(&self, columns: &ColumnMap, row: &[CellValue]) -> Result<ImportRecord, AdapterError> {
        let instrument_name = columns
            .text(row, "instrument_name")
            .ok_or(AdapterError::MissingField("instrument_name"))?;

        // Absent weight means negligible allocation; out-of-range weight is coerced.
        let (percentage_to_nav, percentage_coerced) = match columns.number(row, "percentage_to_nav") {
            None => (0.0, false),
            Some(v) if (0.0..=100.0).contains(&v) => (v, false),
            Some(_) => (0.0, true),
        };

        let scheme_name = columns.text(row, "scheme_name");
        let holding = HoldingInput {
            instrument_name,
            instrument_isin: columns
                .text(row, "instrument_isin")
                .and_then(|raw| clean_isin(&raw))
                .filter(|isin| isin.len() == ISIN_LEN),
            coupon: columns.number(row, "coupon"),
            sector: columns.text(row, "sector"),
            quantity: columns.number(row, "quantity"),
            value: columns.number(row, "value"),
            percentage_to_nav: Some(percentage_to_nav),
            yield_value: columns.number(row, "yield_value"),
            instrument_type: columns.text(row, "instrument_type"),
            amc_name: columns.text(row, "amc_name"),
            scheme_name: scheme_name.clone(),
        };
        Ok(ImportRecord::Holding(HoldingDraft {
            scheme_isin: columns
                .text(row, "scheme_isin")
                .and_then(|raw| clean_isin(&raw)),
            scheme_name,
            holding,
            percentage_coerced,
        }))
    }
}

pub struct NavAdapter;

impl CategoryAdapter for NavAdapter {
    fn category(&self) -> DataCategory {
        DataCategory::Nav
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["date", "nav"]
    }

    fn check_columns(&self, columns: &ColumnMap) -> Result<(), AdapterError> {
        let missing = columns.missing(self.required_fields());
        if !missing.is_empty() {
            return Err(AdapterError::MissingColumns(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }
        require_one_of(columns, &["isin", "scheme_name"])
    }

    fn parse_row(&self, columns: &ColumnMap, row: &[CellValue]) -> Result<ImportRecord, AdapterError> {
        let date = columns
            .date(row, "date")?
            .ok_or_else(|| AdapterError::InvalidDate(String::new()))?;
        Ok(ImportRecord::Nav(NavDraft {
            isin: columns.text(row, "isin").and_then(|raw| clean_isin(&raw)),
            scheme_name: columns.text(row, "scheme_name"),
            date,
            nav: columns.number(row, "nav"),
        }))
    }
}

pub fn adapter_for_category(category: DataCategory) -> Box<dyn CategoryAdapter> {
    match category {
        DataCategory::Factsheet => Box::new(FactsheetAdapter),
        DataCategory::Returns => Box::new(ReturnsAdapter),
        DataCategory::Portfolio => Box::new(PortfolioAdapter),
        DataCategory::Nav => Box::new(NavAdapter),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn columns_for(category: DataCategory, headers: &[&str]) -> ColumnMap {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        AliasTable::builtin(category).resolve(&headers)
    }

    fn row(cells: Vec<CellValue>) -> Vec<CellValue> {
        cells
    }

    #[test]
    fn factsheet_row_defaults_labels_and_drops_bad_figures() {
        let cols = columns_for(
            DataCategory::Factsheet,
            &["ISIN", "Scheme Name", "AUM (₹ Cr)", "Expense Ratio", "Launch Date"],
        );
        let record = FactsheetAdapter
            .parse_row(
                &cols,
                &row(vec![
                    " inf090i01239 ".into(),
                    "Franklin India Bluechip".into(),
                    (-5.0).into(),
                    1.25.into(),
                    "15-03-2001".into(),
                ]),
            )
            .unwrap();
        let ImportRecord::Fund(draft) = record else {
            panic!("expected fund record");
        };
        assert_eq!(draft.fund.isin, "INF090I01239");
        assert_eq!(draft.fund.fund_type, UNKNOWN_LABEL);
        assert_eq!(draft.fund.amc_name, UNKNOWN_LABEL);
        assert_eq!(draft.factsheet.aum, None);
        assert_eq!(draft.factsheet.expense_ratio, Some(1.25));
        assert_eq!(draft.factsheet.launch_date, NaiveDate::from_ymd_opt(2001, 3, 15));
    }

    #[test]
    fn factsheet_row_rejects_placeholder_isin() {
        let cols = columns_for(DataCategory::Factsheet, &["ISIN", "Scheme Name"]);
        let err = FactsheetAdapter
            .parse_row(&cols, &row(vec!["nan".into(), "Some Fund".into()]))
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidIsin(_)));
    }

    #[test]
    fn returns_below_floor_become_null() {
        let cols = columns_for(DataCategory::Returns, &["ISIN", "1Y Return", "3Y Return", "5Y Return"]);
        let record = ReturnsAdapter
            .parse_row(
                &cols,
                &row(vec!["INF090I01239".into(), 12.4.into(), (-140.0).into(), CellValue::Empty]),
            )
            .unwrap();
        let ImportRecord::Returns(draft) = record else {
            panic!("expected returns record");
        };
        assert_eq!(draft.returns.return_1y, Some(12.4));
        assert_eq!(draft.returns.return_3y, None);
        assert_eq!(draft.returns.return_5y, None);
        assert_eq!(draft.rejected_values, 1);
    }

    #[test]
    fn holding_percentage_is_defaulted_or_coerced() {
        let cols = columns_for(
            DataCategory::Portfolio,
            &["Scheme ISIN", "Name Of the Instrument", "% to NAV", "ISIN"],
        );
        let parse = |pct: CellValue| {
            match PortfolioAdapter
                .parse_row(
                    &cols,
                    &row(vec!["INF090I01239".into(), "Infosys Ltd".into(), pct, "INE009A01021".into()]),
                )
                .unwrap()
            {
                ImportRecord::Holding(draft) => draft,
                other => panic!("unexpected {other:?}"),
            }
        };

        let absent = parse(CellValue::Empty);
        assert_eq!(absent.holding.percentage_to_nav, Some(0.0));
        assert!(!absent.percentage_coerced);

        let wild = parse(140.0.into());
        assert_eq!(wild.holding.percentage_to_nav, Some(0.0));
        assert!(wild.percentage_coerced);

        let fine = parse("7.5%".into());
        assert_eq!(fine.holding.percentage_to_nav, Some(7.5));
        assert_eq!(fine.holding.instrument_isin.as_deref(), Some("INE009A01021"));
        assert_eq!(fine.scheme_isin.as_deref(), Some("INF090I01239"));
    }

    #[test]
    fn portfolio_needs_a_fund_reference_column() {
        let cols = columns_for(DataCategory::Portfolio, &["Name of Instrument", "% to NAV"]);
        assert!(matches!(
            PortfolioAdapter.check_columns(&cols),
            Err(AdapterError::MissingColumns(_))
        ));
        let cols = columns_for(DataCategory::Portfolio, &["Name of Instrument", "Fund Name"]);
        assert!(PortfolioAdapter.check_columns(&cols).is_ok());
    }

    #[test]
    fn nav_row_keeps_name_when_isin_is_unusable() {
        let cols = columns_for(DataCategory::Nav, &["ISIN", "Scheme Name", "Date", "Net Asset Value"]);
        let record = NavAdapter
            .parse_row(
                &cols,
                &row(vec!["-".into(), "Axis Bluechip Fund".into(), "2024-03-15".into(), 45.1.into()]),
            )
            .unwrap();
        let ImportRecord::Nav(draft) = record else {
            panic!("expected nav record");
        };
        assert_eq!(draft.isin, None);
        assert_eq!(draft.scheme_name.as_deref(), Some("Axis Bluechip Fund"));
        assert_eq!(draft.nav, Some(45.1));
    }

    #[test]
    fn nav_row_with_bad_date_is_rejected() {
        let cols = columns_for(DataCategory::Nav, &["ISIN", "Date", "NAV"]);
        for date in [CellValue::from("someday"), CellValue::Empty] {
            let err = NavAdapter
                .parse_row(&cols, &row(vec!["INF090I01239".into(), date, 10.0.into()]))
                .unwrap_err();
            assert!(matches!(err, AdapterError::InvalidDate(_)));
        }
    }

    #[test]
    fn registry_covers_every_category() {
        for category in DataCategory::ALL {
            assert_eq!(adapter_for_category(category).category(), category);
        }
    }
}
