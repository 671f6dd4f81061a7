//! Fund store contracts, Postgres + in-memory repositories, upload staging and import status.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use mfdp_core::{
    DataCategory, FactSheet, FlowStatistics, Fund, FundDraft, FundRating, FundReturns,
    FundUpdate, Holding, NavPoint, NavRecord, NewFund, PageRequest, Paged, ReturnsInput,
    RiskMetrics,
};
use serde::Serialize;
use thiserror::Error;

mod memory;
mod pg;
mod status;
mod upload;

pub use memory::MemoryFundStore;
pub use pg::{PgFundStore, MIGRATOR};
pub use status::{FlowState, FlowStatus, StatusBoard};
pub use upload::{StagedUpload, UploadStore, ALLOWED_UPLOAD_EXTENSIONS};

pub const CRATE_NAME: &str = "mfdp-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some("23505") => return StoreError::Conflict(db.message().to_string()),
                Some("23503") => {
                    return StoreError::NotFound {
                        entity: "fund",
                        key: db.message().to_string(),
                    }
                }
                Some("23514") | Some("23502") => {
                    return StoreError::Invalid(db.message().to_string())
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundFilter {
    /// Case-insensitive substring match.
    pub amc_name: Option<String>,
    pub fund_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl NavRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

/// Insert-vs-update split reported by a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertCounts {
    pub created: u64,
    pub updated: u64,
}

impl UpsertCounts {
    pub fn record(&mut self, inserted: bool) {
        if inserted {
            self.created += 1;
        } else {
            self.updated += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FundBatchCounts {
    pub funds: UpsertCounts,
    pub factsheets: UpsertCounts,
}

/// Storage seam shared by the importer, the API and the report layer.
///
/// Every bulk method is atomic: it either applies the whole batch or nothing.
#[async_trait]
pub trait FundRepository: Send + Sync {
    async fn list_funds(&self, filter: &FundFilter, page: PageRequest) -> StoreResult<Paged<Fund>>;
    async fn get_fund(&self, isin: &str) -> StoreResult<Fund>;
    async fn create_fund(&self, fund: &NewFund) -> StoreResult<Fund>;
    async fn update_fund(&self, isin: &str, update: &FundUpdate) -> StoreResult<Fund>;
    async fn delete_fund(&self, isin: &str) -> StoreResult<()>;
    /// Same-type funds ordered by ISIN, excluding `exclude_isin`.
    async fn peer_funds(&self, fund_type: &str, exclude_isin: &str, limit: usize) -> StoreResult<Vec<Fund>>;

    async fn get_factsheet(&self, isin: &str) -> StoreResult<FactSheet>;
    async fn create_factsheet(&self, sheet: &FactSheet) -> StoreResult<FactSheet>;
    async fn update_factsheet(&self, sheet: &FactSheet) -> StoreResult<FactSheet>;
    async fn delete_factsheet(&self, isin: &str) -> StoreResult<()>;

    async fn get_returns(&self, isin: &str) -> StoreResult<FundReturns>;
    async fn create_returns(&self, returns: &FundReturns) -> StoreResult<FundReturns>;
    async fn update_returns(&self, returns: &FundReturns) -> StoreResult<FundReturns>;
    async fn delete_returns(&self, isin: &str) -> StoreResult<()>;

    /// Holdings ordered by weight, heaviest first.
    async fn list_holdings(&self, isin: &str, page: PageRequest) -> StoreResult<Paged<Holding>>;
    async fn fund_holdings(&self, isin: &str) -> StoreResult<Vec<Holding>>;
    async fn get_holding(&self, id: i64) -> StoreResult<Holding>;
    async fn create_holding(&self, holding: &Holding) -> StoreResult<Holding>;
    async fn update_holding(&self, holding: &Holding) -> StoreResult<Holding>;
    async fn delete_holding(&self, id: i64) -> StoreResult<()>;
    async fn delete_fund_holdings(&self, isin: &str) -> StoreResult<u64>;

    /// NAV points newest first.
    async fn list_nav(&self, isin: &str, range: NavRange, page: PageRequest) -> StoreResult<Paged<NavPoint>>;
    /// NAV points oldest first, unpaginated.
    async fn nav_series(&self, isin: &str, range: NavRange) -> StoreResult<Vec<NavPoint>>;
    async fn get_nav(&self, id: i64) -> StoreResult<NavPoint>;
    async fn create_nav(&self, record: &NavRecord) -> StoreResult<NavPoint>;
    async fn update_nav(&self, point: &NavPoint) -> StoreResult<NavPoint>;
    async fn delete_nav(&self, id: i64) -> StoreResult<()>;
    async fn delete_fund_nav(&self, isin: &str) -> StoreResult<u64>;

    async fn current_ratings(&self, isin: &str) -> StoreResult<Vec<FundRating>>;
    async fn latest_risk_metrics(&self, isin: &str) -> StoreResult<Option<RiskMetrics>>;
    async fn latest_flow_statistics(&self, isin: &str) -> StoreResult<Option<FlowStatistics>>;

    /// ISIN -> scheme name for every stored fund, in one query.
    async fn fund_index(&self) -> StoreResult<BTreeMap<String, String>>;
    async fn upsert_fund_batch(&self, drafts: &[FundDraft]) -> StoreResult<FundBatchCounts>;
    /// Null cells keep the stored value.
    async fn upsert_returns_batch(&self, rows: &[(String, ReturnsInput)]) -> StoreResult<UpsertCounts>;
    async fn insert_holdings_batch(&self, rows: &[Holding]) -> StoreResult<u64>;
    /// Snapshot replace: delete the fund's holdings and insert `rows` in one transaction.
    async fn replace_holdings(&self, isin: &str, rows: &[Holding]) -> StoreResult<u64>;
    async fn upsert_nav_batch(&self, rows: &[NavRecord]) -> StoreResult<UpsertCounts>;
    /// Deletes the category's rows for the given funds. Fund rows are never touched.
    async fn clear_category(&self, category: DataCategory, isins: &[String]) -> StoreResult<u64>;
}
