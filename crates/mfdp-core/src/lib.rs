//! Core domain model, identifier cleanup and payload validation for MFDP.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "mfdp-core";

pub const ISIN_LEN: usize = 12;
pub const MIN_IMPORT_ISIN_LEN: usize = 8;
pub const MAX_IMPORT_ISIN_LEN: usize = 12;
pub const MIN_RETURN_PCT: f64 = -100.0;
pub const MAX_EXPENSE_RATIO: f64 = 10.0;
pub const DEFAULT_INSTRUMENT_TYPE: &str = "Other";

const PLACEHOLDER_TOKENS: &[&str] = &["nan", "none", "null", "-"];

/// Spreadsheet families the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Factsheet,
    Returns,
    Portfolio,
    Nav,
}

impl DataCategory {
    pub const ALL: [DataCategory; 4] = [
        DataCategory::Factsheet,
        DataCategory::Returns,
        DataCategory::Portfolio,
        DataCategory::Nav,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Factsheet => "factsheet",
            DataCategory::Returns => "returns",
            DataCategory::Portfolio => "portfolio",
            DataCategory::Nav => "nav",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown data category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for DataCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "factsheet" | "fund" | "funds" => Ok(DataCategory::Factsheet),
            "returns" => Ok(DataCategory::Returns),
            "portfolio" | "holdings" => Ok(DataCategory::Portfolio),
            "nav" => Ok(DataCategory::Nav),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Normalizes a spreadsheet identifier cell into an ISIN-like key.
///
/// Placeholder values, lengths outside `8..=12` and non-alphanumeric input are rejected
/// so they never reach the store.
pub fn clean_isin(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty()
        || PLACEHOLDER_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        return None;
    }
    if !(MIN_IMPORT_ISIN_LEN..=MAX_IMPORT_ISIN_LEN).contains(&trimmed.len()) {
        return None;
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

/// Strict check used for API payloads: exactly twelve alphanumeric characters.
pub fn is_valid_isin(isin: &str) -> bool {
    isin.len() == ISIN_LEN && isin.chars().all(|c| c.is_ascii_alphanumeric())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fund {
    pub isin: String,
    pub scheme_name: String,
    pub fund_type: String,
    pub fund_subtype: Option<String>,
    pub amc_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSheet {
    pub isin: String,
    pub fund_manager: Option<String>,
    pub aum: Option<f64>,
    pub expense_ratio: Option<f64>,
    pub launch_date: Option<NaiveDate>,
    pub exit_load: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundReturns {
    pub isin: String,
    pub return_1m: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_6m: Option<f64>,
    pub return_ytd: Option<f64>,
    pub return_1y: Option<f64>,
    pub return_3y: Option<f64>,
    pub return_5y: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl FundReturns {
    /// Short-horizon returns in chronological order, skipping gaps.
    pub fn short_horizon(&self) -> Vec<f64> {
        [self.return_1m, self.return_3m, self.return_6m, self.return_1y]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    pub isin: String,
    pub instrument_isin: Option<String>,
    pub coupon: Option<f64>,
    pub instrument_name: String,
    pub sector: Option<String>,
    pub quantity: Option<f64>,
    pub value: Option<f64>,
    pub percentage_to_nav: f64,
    pub yield_value: Option<f64>,
    pub instrument_type: String,
    pub amc_name: Option<String>,
    pub scheme_name: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub id: i64,
    pub isin: String,
    pub date: NaiveDate,
    pub nav: f64,
    pub created_at: DateTime<Utc>,
}

/// Externally populated rating row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundRating {
    pub isin: String,
    pub rating_agency: String,
    /// Agency notation as published, e.g. `5 Star` or `AAA`.
    pub rating_value: Option<String>,
    /// Rating on a 0..=5 scale, used for averaging.
    pub rating_numeric: Option<f64>,
    pub rating_outlook: Option<String>,
    pub rating_date: Option<NaiveDate>,
    pub is_current: bool,
}

/// Externally populated risk metrics row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub isin: String,
    pub calculation_date: Option<NaiveDate>,
    pub beta: Option<f64>,
    pub alpha: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub standard_deviation: Option<f64>,
    pub maximum_drawdown: Option<f64>,
    pub information_ratio: Option<f64>,
    pub r_squared: Option<f64>,
}

/// Externally populated allocation and flow statistics row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowStatistics {
    pub isin: String,
    pub statistics_date: Option<NaiveDate>,
    pub equity_percentage: Option<f64>,
    pub debt_percentage: Option<f64>,
    pub cash_percentage: Option<f64>,
    pub other_percentage: Option<f64>,
    pub net_flow: Option<f64>,
    pub quarterly_flow: Option<f64>,
    pub yearly_flow: Option<f64>,
}

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Error)]
#[error("validation failed: {}", summary(.messages))]
pub struct ValidationErrors {
    pub messages: BTreeMap<String, Vec<String>>,
}

fn summary(messages: &BTreeMap<String, Vec<String>>) -> String {
    messages
        .iter()
        .map(|(field, errs)| format!("{field}: {}", errs.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.messages
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn require_text(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "must not be empty");
        }
    }

    fn non_negative(&mut self, field: &str, value: Option<f64>) {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                self.add(field, "must be greater than or equal to 0");
            }
        }
    }

    fn within(&mut self, field: &str, value: Option<f64>, min: f64, max: f64) {
        if let Some(v) = value {
            if !v.is_finite() || v < min || v > max {
                self.add(field, format!("must be between {min} and {max}"));
            }
        }
    }

    fn at_least(&mut self, field: &str, value: Option<f64>, min: f64) {
        if let Some(v) = value {
            if !v.is_finite() || v < min {
                self.add(field, format!("must be greater than or equal to {min}"));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFund {
    pub isin: String,
    pub scheme_name: String,
    pub fund_type: String,
    #[serde(default)]
    pub fund_subtype: Option<String>,
    pub amc_name: String,
}

impl NewFund {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !is_valid_isin(&self.isin) {
            errors.add("isin", "must be exactly 12 alphanumeric characters");
        }
        errors.require_text("scheme_name", &self.scheme_name);
        errors.require_text("fund_type", &self.fund_type);
        errors.require_text("amc_name", &self.amc_name);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundUpdate {
    #[serde(default)]
    pub scheme_name: Option<String>,
    #[serde(default)]
    pub fund_type: Option<String>,
    #[serde(default)]
    pub fund_subtype: Option<String>,
    #[serde(default)]
    pub amc_name: Option<String>,
}

impl FundUpdate {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (field, value) in [
            ("scheme_name", &self.scheme_name),
            ("fund_type", &self.fund_type),
            ("amc_name", &self.amc_name),
        ] {
            if let Some(v) = value {
                errors.require_text(field, v);
            }
        }
        errors.into_result()
    }

    pub fn apply_to(&self, fund: &mut Fund) {
        if let Some(v) = &self.scheme_name {
            fund.scheme_name = v.clone();
        }
        if let Some(v) = &self.fund_type {
            fund.fund_type = v.clone();
        }
        if self.fund_subtype.is_some() {
            fund.fund_subtype = self.fund_subtype.clone();
        }
        if let Some(v) = &self.amc_name {
            fund.amc_name = v.clone();
        }
    }
}

/// Factsheet payload; absent fields stay untouched on patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSheetInput {
    #[serde(default)]
    pub fund_manager: Option<String>,
    #[serde(default)]
    pub aum: Option<f64>,
    #[serde(default)]
    pub expense_ratio: Option<f64>,
    #[serde(default)]
    pub launch_date: Option<NaiveDate>,
    #[serde(default)]
    pub exit_load: Option<String>,
}

impl FactSheetInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.non_negative("aum", self.aum);
        errors.within("expense_ratio", self.expense_ratio, 0.0, MAX_EXPENSE_RATIO);
        errors.into_result()
    }

    pub fn into_factsheet(self, isin: &str, now: DateTime<Utc>) -> FactSheet {
        FactSheet {
            isin: isin.to_string(),
            fund_manager: self.fund_manager,
            aum: self.aum,
            expense_ratio: self.expense_ratio,
            launch_date: self.launch_date,
            exit_load: self.exit_load,
            last_updated: now,
        }
    }

    pub fn patch(&self, sheet: &mut FactSheet, now: DateTime<Utc>) {
        if self.fund_manager.is_some() {
            sheet.fund_manager = self.fund_manager.clone();
        }
        if self.aum.is_some() {
            sheet.aum = self.aum;
        }
        if self.expense_ratio.is_some() {
            sheet.expense_ratio = self.expense_ratio;
        }
        if self.launch_date.is_some() {
            sheet.launch_date = self.launch_date;
        }
        if self.exit_load.is_some() {
            sheet.exit_load = self.exit_load.clone();
        }
        sheet.last_updated = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnsInput {
    #[serde(default)]
    pub return_1m: Option<f64>,
    #[serde(default)]
    pub return_3m: Option<f64>,
    #[serde(default)]
    pub return_6m: Option<f64>,
    #[serde(default)]
    pub return_ytd: Option<f64>,
    #[serde(default)]
    pub return_1y: Option<f64>,
    #[serde(default)]
    pub return_3y: Option<f64>,
    #[serde(default)]
    pub return_5y: Option<f64>,
}

impl ReturnsInput {
    pub fn fields(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("return_1m", self.return_1m),
            ("return_3m", self.return_3m),
            ("return_6m", self.return_6m),
            ("return_ytd", self.return_ytd),
            ("return_1y", self.return_1y),
            ("return_3y", self.return_3y),
            ("return_5y", self.return_5y),
        ]
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (field, value) in self.fields() {
            errors.at_least(field, value, MIN_RETURN_PCT);
        }
        errors.into_result()
    }

    pub fn into_returns(self, isin: &str, now: DateTime<Utc>) -> FundReturns {
        FundReturns {
            isin: isin.to_string(),
            return_1m: self.return_1m,
            return_3m: self.return_3m,
            return_6m: self.return_6m,
            return_ytd: self.return_ytd,
            return_1y: self.return_1y,
            return_3y: self.return_3y,
            return_5y: self.return_5y,
            last_updated: now,
        }
    }

    /// Overlays present values; gaps keep what is already stored.
    pub fn patch(&self, returns: &mut FundReturns, now: DateTime<Utc>) {
        let slots = [
            (&mut returns.return_1m, self.return_1m),
            (&mut returns.return_3m, self.return_3m),
            (&mut returns.return_6m, self.return_6m),
            (&mut returns.return_ytd, self.return_ytd),
            (&mut returns.return_1y, self.return_1y),
            (&mut returns.return_3y, self.return_3y),
            (&mut returns.return_5y, self.return_5y),
        ];
        for (slot, value) in slots {
            if value.is_some() {
                *slot = value;
            }
        }
        returns.last_updated = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldingInput {
    pub instrument_name: String,
    #[serde(default)]
    pub instrument_isin: Option<String>,
    #[serde(default)]
    pub coupon: Option<f64>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub percentage_to_nav: Option<f64>,
    #[serde(default)]
    pub yield_value: Option<f64>,
    #[serde(default)]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub amc_name: Option<String>,
    #[serde(default)]
    pub scheme_name: Option<String>,
}

impl HoldingInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_text("instrument_name", &self.instrument_name);
        match self.percentage_to_nav {
            None => errors.add("percentage_to_nav", "is required"),
            Some(_) => errors.within("percentage_to_nav", self.percentage_to_nav, 0.0, 100.0),
        }
        errors.non_negative("coupon", self.coupon);
        errors.non_negative("quantity", self.quantity);
        errors.non_negative("value", self.value);
        errors.non_negative("yield_value", self.yield_value);
        if let Some(isin) = &self.instrument_isin {
            if isin.len() != ISIN_LEN {
                errors.add("instrument_isin", "must be exactly 12 characters");
            }
        }
        errors.into_result()
    }

    /// Builds a not-yet-persisted holding; the store assigns the id.
    pub fn into_holding(self, isin: &str, now: DateTime<Utc>) -> Holding {
        Holding {
            id: 0,
            isin: isin.to_string(),
            instrument_isin: self.instrument_isin,
            coupon: self.coupon,
            instrument_name: self.instrument_name,
            sector: self.sector,
            quantity: self.quantity,
            value: self.value,
            percentage_to_nav: self.percentage_to_nav.unwrap_or(0.0),
            yield_value: self.yield_value,
            instrument_type: self
                .instrument_type
                .unwrap_or_else(|| DEFAULT_INSTRUMENT_TYPE.to_string()),
            amc_name: self.amc_name,
            scheme_name: self.scheme_name,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavInput {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub nav: Option<f64>,
}

impl NavInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.date.is_none() {
            errors.add("date", "is required");
        }
        match self.nav {
            None => errors.add("nav", "is required"),
            Some(_) => errors.non_negative("nav", self.nav),
        }
        errors.into_result()
    }
}

/// Requested page window as it arrives from query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total_items: u64,
    pub total_pages: usize,
    pub current_page: usize,
    pub per_page: usize,
}

impl Pagination {
    pub fn offset(&self) -> usize {
        (self.current_page - 1) * self.per_page
    }
}

impl PageRequest {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// Clamps the request against the number of available items.
    pub fn resolve(&self, total_items: u64) -> Pagination {
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let total = usize::try_from(total_items).unwrap_or(usize::MAX);
        let total_pages = total.max(1).div_ceil(per_page);
        let current_page = self.page.unwrap_or(1).clamp(1, total_pages);
        Pagination {
            total_items,
            total_pages,
            current_page,
            per_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paged<T> {
    /// Slices an in-memory, already ordered result set.
    pub fn from_vec(all: Vec<T>, request: PageRequest) -> Self {
        let pagination = request.resolve(all.len() as u64);
        let items = all
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.per_page)
            .collect();
        Self { items, pagination }
    }
}

/// Fund plus factsheet parsed from one factsheet spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundDraft {
    pub fund: NewFund,
    pub factsheet: FactSheetInput,
}

/// Returns row before the fund reference has been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsDraft {
    pub isin: String,
    pub returns: ReturnsInput,
    /// Source values below the floor that were dropped to null.
    pub rejected_values: usize,
}

/// Holding row keyed by whatever fund reference the sheet offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingDraft {
    pub scheme_isin: Option<String>,
    pub scheme_name: Option<String>,
    pub holding: HoldingInput,
    pub percentage_coerced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavDraft {
    pub isin: Option<String>,
    pub scheme_name: Option<String>,
    pub date: NaiveDate,
    pub nav: Option<f64>,
}

/// NAV row ready for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavRecord {
    pub isin: String,
    pub date: NaiveDate,
    pub nav: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_isin_rejects_placeholders_and_bad_lengths() {
        for raw in ["", "   ", "nan", "NaN", "None", "-", "null", "INF1234", "INF1234567890", "INF12-45678"] {
            assert_eq!(clean_isin(raw), None, "{raw:?} should be rejected");
        }
    }

    #[test]
    fn clean_isin_trims_and_uppercases() {
        assert_eq!(clean_isin("  inf090i01239 "), Some("INF090I01239".to_string()));
        assert_eq!(clean_isin("12345678"), Some("12345678".to_string()));
    }

    #[test]
    fn strict_isin_needs_twelve_chars() {
        assert!(is_valid_isin("INF090I01239"));
        assert!(!is_valid_isin("INF090I0123"));
        assert!(!is_valid_isin("INF090I0123!"));
    }

    #[test]
    fn category_parses_aliases() {
        assert_eq!("holdings".parse::<DataCategory>(), Ok(DataCategory::Portfolio));
        assert_eq!(" NAV ".parse::<DataCategory>(), Ok(DataCategory::Nav));
        assert!("ratings".parse::<DataCategory>().is_err());
        assert_eq!(
            serde_json::to_string(&DataCategory::Factsheet).unwrap(),
            "\"factsheet\""
        );
    }

    #[test]
    fn holding_validation_collects_every_field() {
        let input = HoldingInput {
            instrument_name: " ".into(),
            instrument_isin: Some("SHORT".into()),
            quantity: Some(-1.0),
            percentage_to_nav: Some(120.0),
            ..Default::default()
        };
        let err = input.validate().unwrap_err();
        let fields = err.messages.keys().cloned().collect::<Vec<_>>();
        assert_eq!(
            fields,
            vec!["instrument_isin", "instrument_name", "percentage_to_nav", "quantity"]
        );
    }

    #[test]
    fn holding_requires_percentage() {
        let input = HoldingInput {
            instrument_name: "Infosys Ltd".into(),
            ..Default::default()
        };
        let err = input.validate().unwrap_err();
        assert_eq!(err.messages["percentage_to_nav"], vec!["is required".to_string()]);
    }

    #[test]
    fn returns_floor_is_minus_one_hundred() {
        let ok = ReturnsInput {
            return_1y: Some(-100.0),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
        let bad = ReturnsInput {
            return_5y: Some(-100.5),
            ..Default::default()
        };
        assert!(bad.validate().unwrap_err().messages.contains_key("return_5y"));
    }

    #[test]
    fn factsheet_patch_only_touches_present_fields() {
        let now = Utc::now();
        let mut sheet = FactSheetInput {
            fund_manager: Some("A. Manager".into()),
            aum: Some(1200.0),
            expense_ratio: Some(1.1),
            ..Default::default()
        }
        .into_factsheet("INF090I01239", now);
        FactSheetInput {
            expense_ratio: Some(0.9),
            ..Default::default()
        }
        .patch(&mut sheet, now);
        assert_eq!(sheet.fund_manager.as_deref(), Some("A. Manager"));
        assert_eq!(sheet.aum, Some(1200.0));
        assert_eq!(sheet.expense_ratio, Some(0.9));
    }

    #[test]
    fn expense_ratio_out_of_band_is_rejected() {
        let input = FactSheetInput {
            expense_ratio: Some(12.0),
            aum: Some(-5.0),
            ..Default::default()
        };
        let err = input.validate().unwrap_err();
        assert!(err.messages.contains_key("expense_ratio"));
        assert!(err.messages.contains_key("aum"));
    }

    #[test]
    fn pagination_clamps_page_and_per_page() {
        let p = PageRequest::new(9, 0).resolve(45);
        assert_eq!(p.per_page, 1);
        assert_eq!(p.total_pages, 45);
        assert_eq!(p.current_page, 9);

        let p = PageRequest::default().resolve(0);
        assert_eq!(p.total_pages, 1);
        assert_eq!(p.current_page, 1);
        assert_eq!(p.per_page, DEFAULT_PER_PAGE);

        let p = PageRequest::new(7, 20).resolve(45);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.current_page, 3);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn paged_slices_in_memory_rows() {
        let paged = Paged::from_vec((1..=5).collect::<Vec<_>>(), PageRequest::new(2, 2));
        assert_eq!(paged.items, vec![3, 4]);
        assert_eq!(paged.pagination.total_items, 5);
    }
}
