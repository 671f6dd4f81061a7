use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use mfdp_core::{
    DataCategory, FactSheet, FlowStatistics, Fund, FundDraft, FundRating, FundReturns,
    FundUpdate, Holding, NavPoint, NavRecord, NewFund, PageRequest, Paged, ReturnsInput,
    RiskMetrics, MAX_EXPENSE_RATIO, MIN_RETURN_PCT,
};
use tokio::sync::RwLock;

use crate::{
    FundBatchCounts, FundFilter, FundRepository, NavRange, StoreError, StoreResult, UpsertCounts,
};

#[derive(Debug, Default)]
struct Tables {
    funds: BTreeMap<String, Fund>,
    factsheets: BTreeMap<String, FactSheet>,
    returns: BTreeMap<String, FundReturns>,
    holdings: BTreeMap<i64, Holding>,
    nav: BTreeMap<i64, NavPoint>,
    ratings: Vec<FundRating>,
    risk: Vec<RiskMetrics>,
    flows: Vec<FlowStatistics>,
    next_holding_id: i64,
    next_nav_id: i64,
}

impl Tables {
    fn require_fund(&self, isin: &str) -> StoreResult<()> {
        if self.funds.contains_key(isin) {
            Ok(())
        } else {
            Err(StoreError::not_found("fund", isin))
        }
    }

    fn nav_id_for(&self, isin: &str, date: chrono::NaiveDate) -> Option<i64> {
        self.nav
            .values()
            .find(|p| p.isin == isin && p.date == date)
            .map(|p| p.id)
    }

    fn insert_holding(&mut self, mut holding: Holding) -> Holding {
        self.next_holding_id += 1;
        holding.id = self.next_holding_id;
        self.holdings.insert(holding.id, holding.clone());
        holding
    }

    fn cascade(&mut self, isin: &str) {
        self.factsheets.remove(isin);
        self.returns.remove(isin);
        self.holdings.retain(|_, h| h.isin != isin);
        self.nav.retain(|_, p| p.isin != isin);
        self.ratings.retain(|r| r.isin != isin);
        self.risk.retain(|r| r.isin != isin);
        self.flows.retain(|f| f.isin != isin);
    }
}

fn check_factsheet(sheet: &FactSheet) -> StoreResult<()> {
    if sheet.aum.is_some_and(|v| v < 0.0) {
        return Err(StoreError::Invalid("aum must be non-negative".into()));
    }
    if sheet
        .expense_ratio
        .is_some_and(|v| !(0.0..=MAX_EXPENSE_RATIO).contains(&v))
    {
        return Err(StoreError::Invalid("expense_ratio out of range".into()));
    }
    Ok(())
}

fn check_returns(values: &[(&'static str, Option<f64>)]) -> StoreResult<()> {
    for (field, value) in values {
        if value.is_some_and(|v| v < MIN_RETURN_PCT) {
            return Err(StoreError::Invalid(format!("{field} below {MIN_RETURN_PCT}")));
        }
    }
    Ok(())
}

fn returns_fields(r: &FundReturns) -> [(&'static str, Option<f64>); 7] {
    [
        ("return_1m", r.return_1m),
        ("return_3m", r.return_3m),
        ("return_6m", r.return_6m),
        ("return_ytd", r.return_ytd),
        ("return_1y", r.return_1y),
        ("return_3y", r.return_3y),
        ("return_5y", r.return_5y),
    ]
}

fn check_holding(holding: &Holding) -> StoreResult<()> {
    if !(0.0..=100.0).contains(&holding.percentage_to_nav) {
        return Err(StoreError::Invalid(
            "percentage_to_nav must be between 0 and 100".into(),
        ));
    }
    Ok(())
}

fn check_nav(nav: f64) -> StoreResult<()> {
    if nav < 0.0 {
        return Err(StoreError::Invalid("nav must be non-negative".into()));
    }
    Ok(())
}

fn by_weight(a: &Holding, b: &Holding) -> std::cmp::Ordering {
    b.percentage_to_nav
        .total_cmp(&a.percentage_to_nav)
        .then(a.id.cmp(&b.id))
}

/// Process-local repository with the same constraints as the Postgres schema.
///
/// Backs `serve --memory` and the test suites.
#[derive(Debug, Default)]
pub struct MemoryFundStore {
    tables: RwLock<Tables>,
}

impl MemoryFundStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_rating(&self, rating: FundRating) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.require_fund(&rating.isin)?;
        t.ratings.push(rating);
        Ok(())
    }

    pub async fn seed_risk_metrics(&self, metrics: RiskMetrics) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.require_fund(&metrics.isin)?;
        t.risk.push(metrics);
        Ok(())
    }

    pub async fn seed_flow_statistics(&self, stats: FlowStatistics) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.require_fund(&stats.isin)?;
        t.flows.push(stats);
        Ok(())
    }
}

#[async_trait]
impl FundRepository for MemoryFundStore {
    async fn list_funds(&self, filter: &FundFilter, page: PageRequest) -> StoreResult<Paged<Fund>> {
        let t = self.tables.read().await;
        let needle = filter.amc_name.as_ref().map(|s| s.to_lowercase());
        let rows = t
            .funds
            .values()
            .filter(|f| {
                needle
                    .as_ref()
                    .map_or(true, |n| f.amc_name.to_lowercase().contains(n.as_str()))
            })
            .filter(|f| filter.fund_type.as_ref().map_or(true, |ty| &f.fund_type == ty))
            .cloned()
            .collect();
        Ok(Paged::from_vec(rows, page))
    }

    async fn get_fund(&self, isin: &str) -> StoreResult<Fund> {
        let t = self.tables.read().await;
        t.funds
            .get(isin)
            .cloned()
            .ok_or_else(|| StoreError::not_found("fund", isin))
    }

    async fn create_fund(&self, fund: &NewFund) -> StoreResult<Fund> {
        let mut t = self.tables.write().await;
        if t.funds.contains_key(&fund.isin) {
            return Err(StoreError::Conflict(format!(
                "fund with ISIN {} already exists",
                fund.isin
            )));
        }
        let now = Utc::now();
        let row = Fund {
            isin: fund.isin.clone(),
            scheme_name: fund.scheme_name.clone(),
            fund_type: fund.fund_type.clone(),
            fund_subtype: fund.fund_subtype.clone(),
            amc_name: fund.amc_name.clone(),
            created_at: now,
            updated_at: now,
        };
        t.funds.insert(row.isin.clone(), row.clone());
        Ok(row)
    }

    async fn update_fund(&self, isin: &str, update: &FundUpdate) -> StoreResult<Fund> {
        let mut t = self.tables.write().await;
        let fund = t
            .funds
            .get_mut(isin)
            .ok_or_else(|| StoreError::not_found("fund", isin))?;
        update.apply_to(fund);
        fund.updated_at = Utc::now();
        Ok(fund.clone())
    }

    async fn delete_fund(&self, isin: &str) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if t.funds.remove(isin).is_none() {
            return Err(StoreError::not_found("fund", isin));
        }
        t.cascade(isin);
        Ok(())
    }

    async fn peer_funds(&self, fund_type: &str, exclude_isin: &str, limit: usize) -> StoreResult<Vec<Fund>> {
        let t = self.tables.read().await;
        Ok(t.funds
            .values()
            .filter(|f| f.fund_type == fund_type && f.isin != exclude_isin)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_factsheet(&self, isin: &str) -> StoreResult<FactSheet> {
        let t = self.tables.read().await;
        t.factsheets
            .get(isin)
            .cloned()
            .ok_or_else(|| StoreError::not_found("factsheet", isin))
    }

    async fn create_factsheet(&self, sheet: &FactSheet) -> StoreResult<FactSheet> {
        let mut t = self.tables.write().await;
        t.require_fund(&sheet.isin)?;
        check_factsheet(sheet)?;
        if t.factsheets.contains_key(&sheet.isin) {
            return Err(StoreError::Conflict(format!(
                "factsheet for {} already exists",
                sheet.isin
            )));
        }
        t.factsheets.insert(sheet.isin.clone(), sheet.clone());
        Ok(sheet.clone())
    }

    async fn update_factsheet(&self, sheet: &FactSheet) -> StoreResult<FactSheet> {
        let mut t = self.tables.write().await;
        check_factsheet(sheet)?;
        let slot = t
            .factsheets
            .get_mut(&sheet.isin)
            .ok_or_else(|| StoreError::not_found("factsheet", &sheet.isin))?;
        *slot = sheet.clone();
        Ok(sheet.clone())
    }

    async fn delete_factsheet(&self, isin: &str) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.factsheets
            .remove(isin)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("factsheet", isin))
    }

    async fn get_returns(&self, isin: &str) -> StoreResult<FundReturns> {
        let t = self.tables.read().await;
        t.returns
            .get(isin)
            .cloned()
            .ok_or_else(|| StoreError::not_found("returns", isin))
    }

    async fn create_returns(&self, returns: &FundReturns) -> StoreResult<FundReturns> {
        let mut t = self.tables.write().await;
        t.require_fund(&returns.isin)?;
        check_returns(&returns_fields(returns))?;
        if t.returns.contains_key(&returns.isin) {
            return Err(StoreError::Conflict(format!(
                "returns for {} already exist",
                returns.isin
            )));
        }
        t.returns.insert(returns.isin.clone(), returns.clone());
        Ok(returns.clone())
    }

    async fn update_returns(&self, returns: &FundReturns) -> StoreResult<FundReturns> {
        let mut t = self.tables.write().await;
        check_returns(&returns_fields(returns))?;
        let slot = t
            .returns
            .get_mut(&returns.isin)
            .ok_or_else(|| StoreError::not_found("returns", &returns.isin))?;
        *slot = returns.clone();
        Ok(returns.clone())
    }

    async fn delete_returns(&self, isin: &str) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.returns
            .remove(isin)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("returns", isin))
    }

    async fn list_holdings(&self, isin: &str, page: PageRequest) -> StoreResult<Paged<Holding>> {
        let rows = self.fund_holdings(isin).await?;
        Ok(Paged::from_vec(rows, page))
    }

    async fn fund_holdings(&self, isin: &str) -> StoreResult<Vec<Holding>> {
        let t = self.tables.read().await;
        let mut rows: Vec<Holding> = t
            .holdings
            .values()
            .filter(|h| h.isin == isin)
            .cloned()
            .collect();
        rows.sort_by(by_weight);
        Ok(rows)
    }

    async fn get_holding(&self, id: i64) -> StoreResult<Holding> {
        let t = self.tables.read().await;
        t.holdings
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("holding", id))
    }

    async fn create_holding(&self, holding: &Holding) -> StoreResult<Holding> {
        let mut t = self.tables.write().await;
        t.require_fund(&holding.isin)?;
        check_holding(holding)?;
        let mut row = holding.clone();
        row.last_updated = Utc::now();
        Ok(t.insert_holding(row))
    }

    async fn update_holding(&self, holding: &Holding) -> StoreResult<Holding> {
        let mut t = self.tables.write().await;
        check_holding(holding)?;
        let slot = t
            .holdings
            .get_mut(&holding.id)
            .ok_or_else(|| StoreError::not_found("holding", holding.id))?;
        let isin = slot.isin.clone();
        *slot = Holding {
            isin,
            last_updated: Utc::now(),
            ..holding.clone()
        };
        Ok(slot.clone())
    }

    async fn delete_holding(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.holdings
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("holding", id))
    }

    async fn delete_fund_holdings(&self, isin: &str) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.holdings.len();
        t.holdings.retain(|_, h| h.isin != isin);
        Ok((before - t.holdings.len()) as u64)
    }

    async fn list_nav(&self, isin: &str, range: NavRange, page: PageRequest) -> StoreResult<Paged<NavPoint>> {
        let mut rows = self.nav_series(isin, range).await?;
        rows.reverse();
        Ok(Paged::from_vec(rows, page))
    }

    async fn nav_series(&self, isin: &str, range: NavRange) -> StoreResult<Vec<NavPoint>> {
        let t = self.tables.read().await;
        let mut rows: Vec<NavPoint> = t
            .nav
            .values()
            .filter(|p| p.isin == isin && range.contains(p.date))
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.date);
        Ok(rows)
    }

    async fn get_nav(&self, id: i64) -> StoreResult<NavPoint> {
        let t = self.tables.read().await;
        t.nav
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("nav", id))
    }

    async fn create_nav(&self, record: &NavRecord) -> StoreResult<NavPoint> {
        let mut t = self.tables.write().await;
        t.require_fund(&record.isin)?;
        check_nav(record.nav)?;
        if t.nav_id_for(&record.isin, record.date).is_some() {
            return Err(StoreError::Conflict(format!(
                "NAV for {} on {} already exists",
                record.isin, record.date
            )));
        }
        t.next_nav_id += 1;
        let point = NavPoint {
            id: t.next_nav_id,
            isin: record.isin.clone(),
            date: record.date,
            nav: record.nav,
            created_at: Utc::now(),
        };
        t.nav.insert(point.id, point.clone());
        Ok(point)
    }

    async fn update_nav(&self, point: &NavPoint) -> StoreResult<NavPoint> {
        let mut t = self.tables.write().await;
        check_nav(point.nav)?;
        let isin = t
            .nav
            .get(&point.id)
            .map(|p| p.isin.clone())
            .ok_or_else(|| StoreError::not_found("nav", point.id))?;
        if t
            .nav_id_for(&isin, point.date)
            .is_some_and(|other| other != point.id)
        {
            return Err(StoreError::Conflict(format!(
                "NAV for {isin} on {} already exists",
                point.date
            )));
        }
        let slot = t
            .nav
            .get_mut(&point.id)
            .ok_or_else(|| StoreError::not_found("nav", point.id))?;
        slot.date = point.date;
        slot.nav = point.nav;
        Ok(slot.clone())
    }

    async fn delete_nav(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.nav
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("nav", id))
    }

    async fn delete_fund_nav(&self, isin: &str) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.nav.len();
        t.nav.retain(|_, p| p.isin != isin);
        Ok((before - t.nav.len()) as u64)
    }

    async fn current_ratings(&self, isin: &str) -> StoreResult<Vec<FundRating>> {
        let t = self.tables.read().await;
        let mut rows: Vec<FundRating> = t
            .ratings
            .iter()
            .filter(|r| r.isin == isin && r.is_current)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.rating_agency.cmp(&b.rating_agency));
        Ok(rows)
    }

    async fn latest_risk_metrics(&self, isin: &str) -> StoreResult<Option<RiskMetrics>> {
        let t = self.tables.read().await;
        // Later seeds win ties, matching `id DESC` in SQL.
        Ok(t.risk
            .iter()
            .enumerate()
            .filter(|(_, r)| r.isin == isin)
            .max_by_key(|(i, r)| (r.calculation_date.is_some(), r.calculation_date, *i))
            .map(|(_, r)| r.clone()))
    }

    async fn latest_flow_statistics(&self, isin: &str) -> StoreResult<Option<FlowStatistics>> {
        let t = self.tables.read().await;
        Ok(t.flows
            .iter()
            .enumerate()
            .filter(|(_, f)| f.isin == isin)
            .max_by_key(|(i, f)| (f.statistics_date.is_some(), f.statistics_date, *i))
            .map(|(_, f)| f.clone()))
    }

    async fn fund_index(&self) -> StoreResult<BTreeMap<String, String>> {
        let t = self.tables.read().await;
        Ok(t.funds
            .values()
            .map(|f| (f.isin.clone(), f.scheme_name.clone()))
            .collect())
    }

    async fn upsert_fund_batch(&self, drafts: &[FundDraft]) -> StoreResult<FundBatchCounts> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        for draft in drafts {
            check_factsheet(&draft.factsheet.clone().into_factsheet(&draft.fund.isin, now))?;
        }
        let mut counts = FundBatchCounts::default();
        for draft in drafts {
            let fund = &draft.fund;
            match t.funds.get_mut(&fund.isin) {
                Some(existing) => {
                    existing.scheme_name = fund.scheme_name.clone();
                    existing.fund_type = fund.fund_type.clone();
                    if fund.fund_subtype.is_some() {
                        existing.fund_subtype = fund.fund_subtype.clone();
                    }
                    existing.amc_name = fund.amc_name.clone();
                    existing.updated_at = now;
                    counts.funds.record(false);
                }
                None => {
                    t.funds.insert(
                        fund.isin.clone(),
                        Fund {
                            isin: fund.isin.clone(),
                            scheme_name: fund.scheme_name.clone(),
                            fund_type: fund.fund_type.clone(),
                            fund_subtype: fund.fund_subtype.clone(),
                            amc_name: fund.amc_name.clone(),
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    counts.funds.record(true);
                }
            }
            match t.factsheets.get_mut(&fund.isin) {
                Some(existing) => {
                    draft.factsheet.patch(existing, now);
                    counts.factsheets.record(false);
                }
                None => {
                    let sheet = draft.factsheet.clone().into_factsheet(&fund.isin, now);
                    t.factsheets.insert(fund.isin.clone(), sheet);
                    counts.factsheets.record(true);
                }
            }
        }
        Ok(counts)
    }

    async fn upsert_returns_batch(&self, rows: &[(String, ReturnsInput)]) -> StoreResult<UpsertCounts> {
        let mut t = self.tables.write().await;
        for (isin, input) in rows {
            t.require_fund(isin)?;
            check_returns(&input.fields())?;
        }
        let now = Utc::now();
        let mut counts = UpsertCounts::default();
        for (isin, input) in rows {
            match t.returns.get_mut(isin) {
                Some(existing) => {
                    input.patch(existing, now);
                    counts.record(false);
                }
                None => {
                    t.returns
                        .insert(isin.clone(), input.clone().into_returns(isin, now));
                    counts.record(true);
                }
            }
        }
        Ok(counts)
    }

    async fn insert_holdings_batch(&self, rows: &[Holding]) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        for row in rows {
            t.require_fund(&row.isin)?;
            check_holding(row)?;
        }
        for row in rows {
            t.insert_holding(row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn replace_holdings(&self, isin: &str, rows: &[Holding]) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        t.require_fund(isin)?;
        for row in rows {
            if row.isin != isin {
                return Err(StoreError::Invalid(format!(
                    "holding for {} in snapshot of {isin}",
                    row.isin
                )));
            }
            check_holding(row)?;
        }
        t.holdings.retain(|_, h| h.isin != isin);
        for row in rows {
            t.insert_holding(row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_nav_batch(&self, rows: &[NavRecord]) -> StoreResult<UpsertCounts> {
        let mut t = self.tables.write().await;
        for row in rows {
            t.require_fund(&row.isin)?;
            check_nav(row.nav)?;
        }
        let now = Utc::now();
        let mut counts = UpsertCounts::default();
        for row in rows {
            match t.nav_id_for(&row.isin, row.date) {
                Some(id) => {
                    if let Some(point) = t.nav.get_mut(&id) {
                        point.nav = row.nav;
                    }
                    counts.record(false);
                }
                None => {
                    t.next_nav_id += 1;
                    let id = t.next_nav_id;
                    t.nav.insert(
                        id,
                        NavPoint {
                            id,
                            isin: row.isin.clone(),
                            date: row.date,
                            nav: row.nav,
                            created_at: now,
                        },
                    );
                    counts.record(true);
                }
            }
        }
        Ok(counts)
    }

    async fn clear_category(&self, category: DataCategory, isins: &[String]) -> StoreResult<u64> {
        let mut t = self.tables.write().await;
        let hit = |isin: &String| isins.contains(isin);
        let removed = match category {
            DataCategory::Factsheet => {
                let before = t.factsheets.len();
                t.factsheets.retain(|isin, _| !hit(isin));
                before - t.factsheets.len()
            }
            DataCategory::Returns => {
                let before = t.returns.len();
                t.returns.retain(|isin, _| !hit(isin));
                before - t.returns.len()
            }
            DataCategory::Portfolio => {
                let before = t.holdings.len();
                t.holdings.retain(|_, h| !hit(&h.isin));
                before - t.holdings.len()
            }
            DataCategory::Nav => {
                let before = t.nav.len();
                t.nav.retain(|_, p| !hit(&p.isin));
                before - t.nav.len()
            }
        };
        Ok(removed as u64)
    }
}
