//! Read-only fund reports: single-fund analytics, multi-fund comparison and holdings overlap.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use mfdp_core::{Fund, FundReturns};
use mfdp_storage::{FundRepository, NavRange, StoreError, StoreResult};
use thiserror::Error;
use tracing::debug;

pub mod analytics;
pub mod comparison;
pub mod overlap;

pub use analytics::{build_analytics, AnalyticsInput, FundAnalytics, PeerFund};
pub use comparison::{compare_funds, ComparisonFund, FundComparison};
pub use overlap::{analyze_overlap, FundHoldings, OverlapReport};

pub const CRATE_NAME: &str = "mfdp-reports";

/// Same-type funds considered for peer ranking.
pub const PEER_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Bad request shape, e.g. too few funds.
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ReportResult<T> = Result<T, ReportError>;

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub(crate) fn population_variance(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    Some(values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64)
}

pub(crate) fn population_std(values: &[f64]) -> Option<f64> {
    population_variance(values).map(f64::sqrt)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Buckets shared by the analytics recommendation and the comparison composite.
pub fn recommendation_grade(score: f64) -> &'static str {
    if score >= 80.0 {
        "Strong Buy"
    } else if score >= 65.0 {
        "Buy"
    } else if score >= 50.0 {
        "Hold"
    } else if score >= 35.0 {
        "Weak Hold"
    } else {
        "Avoid"
    }
}

/// Absent rows read as `None` instead of failing the report.
fn optional<T>(result: StoreResult<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Request order with repeats removed.
fn distinct(isins: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(isins.len());
    for isin in isins {
        let isin = isin.trim();
        if !isin.is_empty() && !out.iter().any(|seen| seen == isin) {
            out.push(isin.to_string());
        }
    }
    out
}

/// Gathers report inputs through the repository and hands them to the pure builders.
#[derive(Clone)]
pub struct ReportService {
    repo: Arc<dyn FundRepository>,
}

impl ReportService {
    pub fn new(repo: Arc<dyn FundRepository>) -> Self {
        Self { repo }
    }

    async fn known_funds(&self, isins: &[String]) -> ReportResult<Vec<Fund>> {
        let mut funds = Vec::new();
        for isin in distinct(isins) {
            match optional(self.repo.get_fund(&isin).await)? {
                Some(fund) => funds.push(fund),
                None => debug!(%isin, "skipping unknown fund"),
            }
        }
        Ok(funds)
    }

    pub async fn fund_analytics(&self, isin: &str, as_of: NaiveDate) -> ReportResult<FundAnalytics> {
        let fund = optional(self.repo.get_fund(isin).await)?
            .ok_or_else(|| ReportError::NotFound(format!("Fund with ISIN {isin} not found")))?;

        let mut peers = Vec::new();
        for peer in self.repo.peer_funds(&fund.fund_type, isin, PEER_LIMIT).await? {
            let returns: Option<FundReturns> = optional(self.repo.get_returns(&peer.isin).await)?;
            peers.push(PeerFund { fund: peer, returns });
        }

        let input = AnalyticsInput {
            factsheet: optional(self.repo.get_factsheet(isin).await)?,
            returns: optional(self.repo.get_returns(isin).await)?,
            holdings: self.repo.fund_holdings(isin).await?,
            nav: self.repo.nav_series(isin, NavRange::default()).await?,
            ratings: self.repo.current_ratings(isin).await?,
            risk: self.repo.latest_risk_metrics(isin).await?,
            flows: self.repo.latest_flow_statistics(isin).await?,
            peers,
            fund,
        };
        Ok(build_analytics(&input, as_of, Utc::now()))
    }

    pub async fn compare(&self, isins: &[String]) -> ReportResult<FundComparison> {
        if distinct(isins).len() < 2 {
            return Err(ReportError::Invalid(comparison::TOO_FEW_FUNDS.to_string()));
        }
        let funds = self.known_funds(isins).await?;
        let mut inputs = Vec::with_capacity(funds.len());
        let mut holdings = Vec::with_capacity(funds.len());
        for fund in funds {
            let isin = fund.isin.clone();
            holdings.push(FundHoldings {
                fund: fund.clone(),
                holdings: self.repo.fund_holdings(&isin).await?,
            });
            inputs.push(ComparisonFund {
                factsheet: optional(self.repo.get_factsheet(&isin).await)?,
                returns: optional(self.repo.get_returns(&isin).await)?,
                risk: self.repo.latest_risk_metrics(&isin).await?,
                ratings: self.repo.current_ratings(&isin).await?,
                fund,
            });
        }
        compare_funds(&inputs, &holdings, Utc::now())
    }

    pub async fn overlap(&self, isins: &[String]) -> ReportResult<OverlapReport> {
        if distinct(isins).len() < 2 {
            return Err(ReportError::Invalid(overlap::TOO_FEW_FUNDS.to_string()));
        }
        let funds = self.known_funds(isins).await?;
        if funds.is_empty() {
            return Err(ReportError::NotFound("No valid funds found".to_string()));
        }
        let mut portfolios = Vec::with_capacity(funds.len());
        for fund in funds {
            let holdings = self.repo.fund_holdings(&fund.isin).await?;
            portfolios.push(FundHoldings { fund, holdings });
        }
        analyze_overlap(&portfolios, Utc::now())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};
    use mfdp_core::{Fund, FundReturns, Holding};

    pub fn fund(isin: &str, fund_type: &str, amc: &str) -> Fund {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Fund {
            isin: isin.to_string(),
            scheme_name: format!("{amc} {fund_type} Fund"),
            fund_type: fund_type.to_string(),
            fund_subtype: None,
            amc_name: amc.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn holding(isin: &str, name: &str, pct: f64, sector: Option<&str>) -> Holding {
        Holding {
            id: 0,
            isin: isin.to_string(),
            instrument_isin: None,
            coupon: None,
            instrument_name: name.to_string(),
            sector: sector.map(str::to_string),
            quantity: None,
            value: None,
            percentage_to_nav: pct,
            yield_value: None,
            instrument_type: "Equity".to_string(),
            amc_name: None,
            scheme_name: None,
            last_updated: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    pub fn returns(isin: &str, r1m: f64, r3m: f64, r6m: f64, r1y: f64, r3y: f64, r5y: f64) -> FundReturns {
        FundReturns {
            isin: isin.to_string(),
            return_1m: Some(r1m),
            return_3m: Some(r3m),
            return_6m: Some(r6m),
            return_ytd: None,
            return_1y: Some(r1y),
            return_3y: Some(r3y),
            return_5y: Some(r5y),
            last_updated: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mfdp_core::{HoldingInput, NewFund, ReturnsInput};
    use mfdp_storage::MemoryFundStore;

    use super::*;

    async fn seed(store: &MemoryFundStore, isin: &str, fund_type: &str, amc: &str) {
        store
            .create_fund(&NewFund {
                isin: isin.to_string(),
                scheme_name: format!("{amc} Fund"),
                fund_type: fund_type.to_string(),
                fund_subtype: None,
                amc_name: amc.to_string(),
            })
            .await
            .unwrap();
    }

    async fn hold(store: &MemoryFundStore, isin: &str, name: &str, pct: f64) {
        let holding = HoldingInput {
            instrument_name: name.to_string(),
            percentage_to_nav: Some(pct),
            ..HoldingInput::default()
        }
        .into_holding(isin, Utc::now());
        store.create_holding(&holding).await.unwrap();
    }

    #[test]
    fn grades_follow_score_buckets() {
        assert_eq!(recommendation_grade(80.0), "Strong Buy");
        assert_eq!(recommendation_grade(79.9), "Buy");
        assert_eq!(recommendation_grade(50.0), "Hold");
        assert_eq!(recommendation_grade(35.0), "Weak Hold");
        assert_eq!(recommendation_grade(0.0), "Avoid");
    }

    #[test]
    fn population_std_divides_by_count() {
        assert_eq!(population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some(2.0));
        assert_eq!(population_std(&[]), None);
    }

    #[tokio::test]
    async fn analytics_for_unknown_fund_is_not_found() {
        let service = ReportService::new(Arc::new(MemoryFundStore::new()));
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let err = service.fund_analytics("INF000000001", today).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn analytics_ranks_the_fund_among_peers() {
        let store = Arc::new(MemoryFundStore::new());
        let isins = ["INF000000001", "INF000000002", "INF000000003", "INF000000004", "INF000000005"];
        for (isin, r1y) in isins.iter().zip([15.0, 20.0, 15.0, 10.0, 30.0]) {
            seed(&store, isin, "Equity", "Alpha").await;
            store
                .upsert_returns_batch(&[(
                    isin.to_string(),
                    ReturnsInput {
                        return_1y: Some(r1y),
                        ..ReturnsInput::default()
                    },
                )])
                .await
                .unwrap();
        }
        seed(&store, "INF000000009", "Debt", "Alpha").await;

        let service = ReportService::new(store);
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let report = service.fund_analytics("INF000000001", today).await.unwrap();
        assert_eq!(report.peer_comparison.total_peers_analyzed, 4);
        assert_eq!(report.peer_comparison.fund_rank_1y, Some(3));
        assert!(report.nav_trends.is_none());
        assert_eq!(report.risk_analysis.risk_grade, "Unknown");
    }

    #[tokio::test]
    async fn compare_needs_two_known_funds() {
        let store = Arc::new(MemoryFundStore::new());
        seed(&store, "INF000000001", "Equity", "Alpha").await;
        let service = ReportService::new(store);

        let one = vec!["INF000000001".to_string()];
        assert!(matches!(service.compare(&one).await, Err(ReportError::Invalid(_))));

        let with_unknown = vec!["INF000000001".to_string(), "INF999999999".to_string()];
        assert!(matches!(service.compare(&with_unknown).await, Err(ReportError::Invalid(_))));

        let repeated = vec!["INF000000001".to_string(), "INF000000001".to_string()];
        assert!(matches!(service.compare(&repeated).await, Err(ReportError::Invalid(_))));
    }

    #[tokio::test]
    async fn overlap_reads_holdings_from_the_store() {
        let store = Arc::new(MemoryFundStore::new());
        seed(&store, "INF000000001", "Equity", "Alpha").await;
        seed(&store, "INF000000002", "Equity", "Beta").await;
        hold(&store, "INF000000001", "X", 10.0).await;
        hold(&store, "INF000000001", "Y", 5.0).await;
        hold(&store, "INF000000002", "X", 6.0).await;
        hold(&store, "INF000000002", "Z", 9.0).await;

        let service = ReportService::new(store);
        let report = service
            .overlap(&["INF000000001".to_string(), "INF000000002".to_string()])
            .await
            .unwrap();
        assert_eq!(report.funds_analyzed, 2);
        assert_eq!(report.pairwise_overlap[0].overlap_by_weight_percentage, 6.0);
        assert_eq!(report.overlap_matrix.matrix["INF000000001"]["INF000000002"], 6.0);
    }

    #[tokio::test]
    async fn overlap_without_known_funds_is_not_found() {
        let service = ReportService::new(Arc::new(MemoryFundStore::new()));
        let err = service
            .overlap(&["INF000000001".to_string(), "INF000000002".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }
}
