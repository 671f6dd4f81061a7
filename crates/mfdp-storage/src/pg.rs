use std::collections::BTreeMap;

use async_trait::async_trait;
use mfdp_core::{
    DataCategory, FactSheet, FlowStatistics, Fund, FundDraft, FundRating, FundReturns,
    FundUpdate, Holding, NavPoint, NavRecord, NewFund, PageRequest, Paged, ReturnsInput,
    RiskMetrics,
};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use crate::{
    FundBatchCounts, FundFilter, FundRepository, NavRange, StoreError, StoreResult, UpsertCounts,
};

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const FUND_COLUMNS: &str = "isin, scheme_name, fund_type, fund_subtype, amc_name, created_at, updated_at";
const FACTSHEET_COLUMNS: &str =
    "isin, fund_manager, aum, expense_ratio, launch_date, exit_load, last_updated";
const RETURNS_COLUMNS: &str = "isin, return_1m, return_3m, return_6m, return_ytd, return_1y, return_3y, return_5y, last_updated";
const HOLDING_COLUMNS: &str = "id, isin, instrument_isin, coupon, instrument_name, sector, quantity, value, percentage_to_nav, yield_value, instrument_type, amc_name, scheme_name, last_updated";
const NAV_COLUMNS: &str = "id, isin, date, nav, created_at";

// Postgres caps one statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;
const FUND_BINDS: usize = 5;
const FACTSHEET_BINDS: usize = 6;
const RETURNS_BINDS: usize = 8;
const HOLDING_BINDS: usize = 12;
const NAV_BINDS: usize = 3;

/// Rows that fit in one multi-row `VALUES` statement.
fn rows_per_statement(binds_per_row: usize) -> usize {
    (MAX_BIND_PARAMS / binds_per_row.max(1)).max(1)
}

#[derive(Debug, Clone)]
pub struct PgFundStore {
    pool: PgPool,
}

impl PgFundStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

fn fund_from_row(row: &PgRow) -> Result<Fund, sqlx::Error> {
    Ok(Fund {
        isin: row.try_get("isin")?,
        scheme_name: row.try_get("scheme_name")?,
        fund_type: row.try_get("fund_type")?,
        fund_subtype: row.try_get("fund_subtype")?,
        amc_name: row.try_get("amc_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn factsheet_from_row(row: &PgRow) -> Result<FactSheet, sqlx::Error> {
    Ok(FactSheet {
        isin: row.try_get("isin")?,
        fund_manager: row.try_get("fund_manager")?,
        aum: row.try_get("aum")?,
        expense_ratio: row.try_get("expense_ratio")?,
        launch_date: row.try_get("launch_date")?,
        exit_load: row.try_get("exit_load")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn returns_from_row(row: &PgRow) -> Result<FundReturns, sqlx::Error> {
    Ok(FundReturns {
        isin: row.try_get("isin")?,
        return_1m: row.try_get("return_1m")?,
        return_3m: row.try_get("return_3m")?,
        return_6m: row.try_get("return_6m")?,
        return_ytd: row.try_get("return_ytd")?,
        return_1y: row.try_get("return_1y")?,
        return_3y: row.try_get("return_3y")?,
        return_5y: row.try_get("return_5y")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn holding_from_row(row: &PgRow) -> Result<Holding, sqlx::Error> {
    Ok(Holding {
        id: row.try_get("id")?,
        isin: row.try_get("isin")?,
        instrument_isin: row.try_get("instrument_isin")?,
        coupon: row.try_get("coupon")?,
        instrument_name: row.try_get("instrument_name")?,
        sector: row.try_get("sector")?,
        quantity: row.try_get("quantity")?,
        value: row.try_get("value")?,
        percentage_to_nav: row.try_get("percentage_to_nav")?,
        yield_value: row.try_get("yield_value")?,
        instrument_type: row.try_get("instrument_type")?,
        amc_name: row.try_get("amc_name")?,
        scheme_name: row.try_get("scheme_name")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn nav_from_row(row: &PgRow) -> Result<NavPoint, sqlx::Error> {
    Ok(NavPoint {
        id: row.try_get("id")?,
        isin: row.try_get("isin")?,
        date: row.try_get("date")?,
        nav: row.try_get("nav")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T>(rows: &[PgRow], map: fn(&PgRow) -> Result<T, sqlx::Error>) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(map)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)
}

fn tally_inserted(rows: &[PgRow]) -> StoreResult<UpsertCounts> {
    let mut counts = UpsertCounts::default();
    for row in rows {
        counts.record(row.try_get::<bool, _>("inserted")?);
    }
    Ok(counts)
}

fn rename_conflict(err: StoreError, message: impl FnOnce() -> String) -> StoreError {
    match err {
        StoreError::Conflict(_) => StoreError::Conflict(message()),
        other => other,
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_fund_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &FundFilter) {
    qb.push(" WHERE TRUE");
    if let Some(amc) = &filter.amc_name {
        qb.push(" AND amc_name ILIKE ").push_bind(format!("%{amc}%"));
    }
    if let Some(fund_type) = &filter.fund_type {
        qb.push(" AND fund_type = ").push_bind(fund_type.clone());
    }
}

fn push_nav_filter(qb: &mut QueryBuilder<'_, Postgres>, isin: &str, range: NavRange) {
    qb.push(" WHERE isin = ").push_bind(isin.to_string());
    if let Some(start) = range.start {
        qb.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = range.end {
        qb.push(" AND date <= ").push_bind(end);
    }
}

fn push_holding_values(qb: &mut QueryBuilder<'_, Postgres>, rows: &[Holding]) {
    qb.push_values(rows.iter().cloned(), |mut b, h| {
        b.push_bind(h.isin)
            .push_bind(h.instrument_isin)
            .push_bind(h.coupon)
            .push_bind(h.instrument_name)
            .push_bind(h.sector)
            .push_bind(h.quantity)
            .push_bind(h.value)
            .push_bind(h.percentage_to_nav)
            .push_bind(h.yield_value)
            .push_bind(h.instrument_type)
            .push_bind(h.amc_name)
            .push_bind(h.scheme_name);
    });
}

const HOLDING_INSERT_PREFIX: &str = "INSERT INTO mf_portfolio_holdings (isin, instrument_isin, coupon, instrument_name, sector, quantity, value, percentage_to_nav, yield_value, instrument_type, amc_name, scheme_name) ";

async fn insert_holdings_in(
    conn: &mut sqlx::PgConnection,
    rows: &[Holding],
) -> StoreResult<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(rows_per_statement(HOLDING_BINDS)) {
        let mut qb = QueryBuilder::<Postgres>::new(HOLDING_INSERT_PREFIX);
        push_holding_values(&mut qb, chunk);
        inserted += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

async fn upsert_funds_in(conn: &mut sqlx::PgConnection, drafts: &[FundDraft]) -> StoreResult<Vec<PgRow>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO mf_fund (isin, scheme_name, fund_type, fund_subtype, amc_name) ",
    );
    qb.push_values(drafts.iter().map(|d| d.fund.clone()), |mut b, f| {
        b.push_bind(f.isin)
            .push_bind(f.scheme_name)
            .push_bind(f.fund_type)
            .push_bind(f.fund_subtype)
            .push_bind(f.amc_name);
    });
    qb.push(
        r#"
        ON CONFLICT (isin) DO UPDATE
           SET scheme_name = EXCLUDED.scheme_name,
               fund_type = EXCLUDED.fund_type,
               fund_subtype = COALESCE(EXCLUDED.fund_subtype, mf_fund.fund_subtype),
               amc_name = EXCLUDED.amc_name,
               updated_at = NOW()
        RETURNING (xmax = 0) AS inserted
        "#,
    );
    Ok(qb.build().fetch_all(&mut *conn).await?)
}

async fn upsert_factsheets_in(conn: &mut sqlx::PgConnection, drafts: &[FundDraft]) -> StoreResult<Vec<PgRow>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO mf_factsheet (isin, fund_manager, aum, expense_ratio, launch_date, exit_load) ",
    );
    qb.push_values(drafts.iter().cloned(), |mut b, d| {
        b.push_bind(d.fund.isin)
            .push_bind(d.factsheet.fund_manager)
            .push_bind(d.factsheet.aum)
            .push_bind(d.factsheet.expense_ratio)
            .push_bind(d.factsheet.launch_date)
            .push_bind(d.factsheet.exit_load);
    });
    qb.push(
        r#"
        ON CONFLICT (isin) DO UPDATE
           SET fund_manager = COALESCE(EXCLUDED.fund_manager, mf_factsheet.fund_manager),
               aum = COALESCE(EXCLUDED.aum, mf_factsheet.aum),
               expense_ratio = COALESCE(EXCLUDED.expense_ratio, mf_factsheet.expense_ratio),
               launch_date = COALESCE(EXCLUDED.launch_date, mf_factsheet.launch_date),
               exit_load = COALESCE(EXCLUDED.exit_load, mf_factsheet.exit_load),
               last_updated = NOW()
        RETURNING (xmax = 0) AS inserted
        "#,
    );
    Ok(qb.build().fetch_all(&mut *conn).await?)
}

async fn upsert_returns_in(
    conn: &mut sqlx::PgConnection,
    rows: &[(String, ReturnsInput)],
) -> StoreResult<Vec<PgRow>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO mf_returns (isin, return_1m, return_3m, return_6m, return_ytd, return_1y, return_3y, return_5y) ",
    );
    qb.push_values(rows.iter().cloned(), |mut b, (isin, r)| {
        b.push_bind(isin)
            .push_bind(r.return_1m)
            .push_bind(r.return_3m)
            .push_bind(r.return_6m)
            .push_bind(r.return_ytd)
            .push_bind(r.return_1y)
            .push_bind(r.return_3y)
            .push_bind(r.return_5y);
    });
    qb.push(
        r#"
        ON CONFLICT (isin) DO UPDATE
           SET return_1m = COALESCE(EXCLUDED.return_1m, mf_returns.return_1m),
               return_3m = COALESCE(EXCLUDED.return_3m, mf_returns.return_3m),
               return_6m = COALESCE(EXCLUDED.return_6m, mf_returns.return_6m),
               return_ytd = COALESCE(EXCLUDED.return_ytd, mf_returns.return_ytd),
               return_1y = COALESCE(EXCLUDED.return_1y, mf_returns.return_1y),
               return_3y = COALESCE(EXCLUDED.return_3y, mf_returns.return_3y),
               return_5y = COALESCE(EXCLUDED.return_5y, mf_returns.return_5y),
               last_updated = NOW()
        RETURNING (xmax = 0) AS inserted
        "#,
    );
    Ok(qb.build().fetch_all(&mut *conn).await?)
}

async fn upsert_nav_in(conn: &mut sqlx::PgConnection, rows: &[NavRecord]) -> StoreResult<Vec<PgRow>> {
    let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO mf_nav_history (isin, date, nav) ");
    qb.push_values(rows.iter().cloned(), |mut b, r| {
        b.push_bind(r.isin).push_bind(r.date).push_bind(r.nav);
    });
    qb.push(
        r#"
        ON CONFLICT (isin, date) DO UPDATE
           SET nav = EXCLUDED.nav
        RETURNING (xmax = 0) AS inserted
        "#,
    );
    Ok(qb.build().fetch_all(&mut *conn).await?)
}

#[async_trait]
impl FundRepository for PgFundStore {
    async fn list_funds(&self, filter: &FundFilter, page: PageRequest) -> StoreResult<Paged<Fund>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM mf_fund");
        push_fund_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;
        let pagination = page.resolve(u64::try_from(total).unwrap_or(0));

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {FUND_COLUMNS} FROM mf_fund"));
        push_fund_filter(&mut qb, filter);
        qb.push(" ORDER BY isin LIMIT ")
            .push_bind(to_i64(pagination.per_page))
            .push(" OFFSET ")
            .push_bind(to_i64(pagination.offset()));
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(Paged {
            items: collect(&rows, fund_from_row)?,
            pagination,
        })
    }

    async fn get_fund(&self, isin: &str) -> StoreResult<Fund> {
        let row = sqlx::query(&format!("SELECT {FUND_COLUMNS} FROM mf_fund WHERE isin = $1"))
            .bind(isin)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("fund", isin))?;
        Ok(fund_from_row(&row)?)
    }

    async fn create_fund(&self, fund: &NewFund) -> StoreResult<Fund> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO mf_fund (isin, scheme_name, fund_type, fund_subtype, amc_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {FUND_COLUMNS}
            "#
        ))
        .bind(&fund.isin)
        .bind(&fund.scheme_name)
        .bind(&fund.fund_type)
        .bind(&fund.fund_subtype)
        .bind(&fund.amc_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            rename_conflict(err.into(), || format!("fund with ISIN {} already exists", fund.isin))
        })?;
        Ok(fund_from_row(&row)?)
    }

    async fn update_fund(&self, isin: &str, update: &FundUpdate) -> StoreResult<Fund> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE mf_fund
               SET scheme_name = COALESCE($2, scheme_name),
                   fund_type = COALESCE($3, fund_type),
                   fund_subtype = COALESCE($4, fund_subtype),
                   amc_name = COALESCE($5, amc_name),
                   updated_at = NOW()
             WHERE isin = $1
            RETURNING {FUND_COLUMNS}
            "#
        ))
        .bind(isin)
        .bind(&update.scheme_name)
        .bind(&update.fund_type)
        .bind(&update.fund_subtype)
        .bind(&update.amc_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("fund", isin))?;
        Ok(fund_from_row(&row)?)
    }

    async fn delete_fund(&self, isin: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM mf_fund WHERE isin = $1")
            .bind(isin)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("fund", isin));
        }
        Ok(())
    }

    async fn peer_funds(&self, fund_type: &str, exclude_isin: &str, limit: usize) -> StoreResult<Vec<Fund>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {FUND_COLUMNS}
              FROM mf_fund
             WHERE fund_type = $1
               AND isin <> $2
             ORDER BY isin
             LIMIT $3
            "#
        ))
        .bind(fund_type)
        .bind(exclude_isin)
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, fund_from_row)
    }

    async fn get_factsheet(&self, isin: &str) -> StoreResult<FactSheet> {
        let row = sqlx::query(&format!(
            "SELECT {FACTSHEET_COLUMNS} FROM mf_factsheet WHERE isin = $1"
        ))
        .bind(isin)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("factsheet", isin))?;
        Ok(factsheet_from_row(&row)?)
    }

    async fn create_factsheet(&self, sheet: &FactSheet) -> StoreResult<FactSheet> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO mf_factsheet (isin, fund_manager, aum, expense_ratio, launch_date, exit_load, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {FACTSHEET_COLUMNS}
            "#
        ))
        .bind(&sheet.isin)
        .bind(&sheet.fund_manager)
        .bind(sheet.aum)
        .bind(sheet.expense_ratio)
        .bind(sheet.launch_date)
        .bind(&sheet.exit_load)
        .bind(sheet.last_updated)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            rename_conflict(err.into(), || format!("factsheet for {} already exists", sheet.isin))
        })?;
        Ok(factsheet_from_row(&row)?)
    }

    async fn update_factsheet(&self, sheet: &FactSheet) -> StoreResult<FactSheet> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE mf_factsheet
               SET fund_manager = $2,
                   aum = $3,
                   expense_ratio = $4,
                   launch_date = $5,
                   exit_load = $6,
                   last_updated = $7
             WHERE isin = $1
            RETURNING {FACTSHEET_COLUMNS}
            "#
        ))
        .bind(&sheet.isin)
        .bind(&sheet.fund_manager)
        .bind(sheet.aum)
        .bind(sheet.expense_ratio)
        .bind(sheet.launch_date)
        .bind(&sheet.exit_load)
        .bind(sheet.last_updated)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("factsheet", &sheet.isin))?;
        Ok(factsheet_from_row(&row)?)
    }

    async fn delete_factsheet(&self, isin: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM mf_factsheet WHERE isin = $1")
            .bind(isin)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("factsheet", isin));
        }
        Ok(())
    }

    async fn get_returns(&self, isin: &str) -> StoreResult<FundReturns> {
        let row = sqlx::query(&format!("SELECT {RETURNS_COLUMNS} FROM mf_returns WHERE isin = $1"))
            .bind(isin)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("returns", isin))?;
        Ok(returns_from_row(&row)?)
    }

    async fn create_returns(&self, returns: &FundReturns) -> StoreResult<FundReturns> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO mf_returns (isin, return_1m, return_3m, return_6m, return_ytd, return_1y, return_3y, return_5y, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {RETURNS_COLUMNS}
            "#
        ))
        .bind(&returns.isin)
        .bind(returns.return_1m)
        .bind(returns.return_3m)
        .bind(returns.return_6m)
        .bind(returns.return_ytd)
        .bind(returns.return_1y)
        .bind(returns.return_3y)
        .bind(returns.return_5y)
        .bind(returns.last_updated)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            rename_conflict(err.into(), || format!("returns for {} already exist", returns.isin))
        })?;
        Ok(returns_from_row(&row)?)
    }

    async fn update_returns(&self, returns: &FundReturns) -> StoreResult<FundReturns> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE mf_returns
               SET return_1m = $2,
                   return_3m = $3,
                   return_6m = $4,
                   return_ytd = $5,
                   return_1y = $6,
                   return_3y = $7,
                   return_5y = $8,
                   last_updated = $9
             WHERE isin = $1
            RETURNING {RETURNS_COLUMNS}
            "#
        ))
        .bind(&returns.isin)
        .bind(returns.return_1m)
        .bind(returns.return_3m)
        .bind(returns.return_6m)
        .bind(returns.return_ytd)
        .bind(returns.return_1y)
        .bind(returns.return_3y)
        .bind(returns.return_5y)
        .bind(returns.last_updated)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("returns", &returns.isin))?;
        Ok(returns_from_row(&row)?)
    }

    async fn delete_returns(&self, isin: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM mf_returns WHERE isin = $1")
            .bind(isin)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("returns", isin));
        }
        Ok(())
    }

    async fn list_holdings(&self, isin: &str, page: PageRequest) -> StoreResult<Paged<Holding>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM mf_portfolio_holdings WHERE isin = $1")
            .bind(isin)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;
        let pagination = page.resolve(u64::try_from(total).unwrap_or(0));
        let rows = sqlx::query(&format!(
            r#"
            SELECT {HOLDING_COLUMNS}
              FROM mf_portfolio_holdings
             WHERE isin = $1
             ORDER BY percentage_to_nav DESC, id
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(isin)
        .bind(to_i64(pagination.per_page))
        .bind(to_i64(pagination.offset()))
        .fetch_all(&self.pool)
        .await?;
        Ok(Paged {
            items: collect(&rows, holding_from_row)?,
            pagination,
        })
    }

    async fn fund_holdings(&self, isin: &str) -> StoreResult<Vec<Holding>> {
        let rows = sqlx::query(&format!(
            "SELECT {HOLDING_COLUMNS} FROM mf_portfolio_holdings WHERE isin = $1 ORDER BY percentage_to_nav DESC, id"
        ))
        .bind(isin)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, holding_from_row)
    }

    async fn get_holding(&self, id: i64) -> StoreResult<Holding> {
        let row = sqlx::query(&format!(
            "SELECT {HOLDING_COLUMNS} FROM mf_portfolio_holdings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("holding", id))?;
        Ok(holding_from_row(&row)?)
    }

    async fn create_holding(&self, holding: &Holding) -> StoreResult<Holding> {
        let mut qb = QueryBuilder::<Postgres>::new(HOLDING_INSERT_PREFIX);
        push_holding_values(&mut qb, std::slice::from_ref(holding));
        qb.push(format!(" RETURNING {HOLDING_COLUMNS}"));
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(holding_from_row(&row)?)
    }

    async fn update_holding(&self, holding: &Holding) -> StoreResult<Holding> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE mf_portfolio_holdings
               SET instrument_isin = $2,
                   coupon = $3,
                   instrument_name = $4,
                   sector = $5,
                   quantity = $6,
                   value = $7,
                   percentage_to_nav = $8,
                   yield_value = $9,
                   instrument_type = $10,
                   amc_name = $11,
                   scheme_name = $12,
                   last_updated = NOW()
             WHERE id = $1
            RETURNING {HOLDING_COLUMNS}
            "#
        ))
        .bind(holding.id)
        .bind(&holding.instrument_isin)
        .bind(holding.coupon)
        .bind(&holding.instrument_name)
        .bind(&holding.sector)
        .bind(holding.quantity)
        .bind(holding.value)
        .bind(holding.percentage_to_nav)
        .bind(holding.yield_value)
        .bind(&holding.instrument_type)
        .bind(&holding.amc_name)
        .bind(&holding.scheme_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("holding", holding.id))?;
        Ok(holding_from_row(&row)?)
    }

    async fn delete_holding(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM mf_portfolio_holdings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("holding", id));
        }
        Ok(())
    }

    async fn delete_fund_holdings(&self, isin: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM mf_portfolio_holdings WHERE isin = $1")
            .bind(isin)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_nav(&self, isin: &str, range: NavRange, page: PageRequest) -> StoreResult<Paged<NavPoint>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM mf_nav_history");
        push_nav_filter(&mut count, isin, range);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;
        let pagination = page.resolve(u64::try_from(total).unwrap_or(0));

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {NAV_COLUMNS} FROM mf_nav_history"));
        push_nav_filter(&mut qb, isin, range);
        qb.push(" ORDER BY date DESC LIMIT ")
            .push_bind(to_i64(pagination.per_page))
            .push(" OFFSET ")
            .push_bind(to_i64(pagination.offset()));
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(Paged {
            items: collect(&rows, nav_from_row)?,
            pagination,
        })
    }

    async fn nav_series(&self, isin: &str, range: NavRange) -> StoreResult<Vec<NavPoint>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {NAV_COLUMNS} FROM mf_nav_history"));
        push_nav_filter(&mut qb, isin, range);
        qb.push(" ORDER BY date");
        let rows = qb.build().fetch_all(&self.pool).await?;
        collect(&rows, nav_from_row)
    }

    async fn get_nav(&self, id: i64) -> StoreResult<NavPoint> {
        let row = sqlx::query(&format!("SELECT {NAV_COLUMNS} FROM mf_nav_history WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("nav", id))?;
        Ok(nav_from_row(&row)?)
    }

    async fn create_nav(&self, record: &NavRecord) -> StoreResult<NavPoint> {
        let row = sqlx::query(&format!(
            "INSERT INTO mf_nav_history (isin, date, nav) VALUES ($1, $2, $3) RETURNING {NAV_COLUMNS}"
        ))
        .bind(&record.isin)
        .bind(record.date)
        .bind(record.nav)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            rename_conflict(err.into(), || {
                format!("NAV for {} on {} already exists", record.isin, record.date)
            })
        })?;
        Ok(nav_from_row(&row)?)
    }

    async fn update_nav(&self, point: &NavPoint) -> StoreResult<NavPoint> {
        let row = sqlx::query(&format!(
            "UPDATE mf_nav_history SET date = $2, nav = $3 WHERE id = $1 RETURNING {NAV_COLUMNS}"
        ))
        .bind(point.id)
        .bind(point.date)
        .bind(point.nav)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            rename_conflict(err.into(), || {
                format!("NAV for {} on {} already exists", point.isin, point.date)
            })
        })?
        .ok_or_else(|| StoreError::not_found("nav", point.id))?;
        Ok(nav_from_row(&row)?)
    }

    async fn delete_nav(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM mf_nav_history WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("nav", id));
        }
        Ok(())
    }

    async fn delete_fund_nav(&self, isin: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM mf_nav_history WHERE isin = $1")
            .bind(isin)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn current_ratings(&self, isin: &str) -> StoreResult<Vec<FundRating>> {
        let rows = sqlx::query(
            r#"
            SELECT isin, rating_agency, rating_value, rating_numeric, rating_outlook, rating_date, is_current
              FROM mf_rating
             WHERE isin = $1
               AND is_current
             ORDER BY rating_agency
            "#,
        )
        .bind(isin)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(FundRating {
                isin: row.try_get("isin")?,
                rating_agency: row.try_get("rating_agency")?,
                rating_value: row.try_get("rating_value")?,
                rating_numeric: row.try_get("rating_numeric")?,
                rating_outlook: row.try_get("rating_outlook")?,
                rating_date: row.try_get("rating_date")?,
                is_current: row.try_get("is_current")?,
            });
        }
        Ok(out)
    }

    async fn latest_risk_metrics(&self, isin: &str) -> StoreResult<Option<RiskMetrics>> {
        let row = sqlx::query(
            r#"
            SELECT isin, calculation_date, beta, alpha, sharpe_ratio, sortino_ratio,
                   standard_deviation, maximum_drawdown, information_ratio, r_squared
              FROM mf_analytics
             WHERE isin = $1
             ORDER BY calculation_date DESC NULLS LAST, id DESC
             LIMIT 1
            "#,
        )
        .bind(isin)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(RiskMetrics {
            isin: row.try_get("isin")?,
            calculation_date: row.try_get("calculation_date")?,
            beta: row.try_get("beta")?,
            alpha: row.try_get("alpha")?,
            sharpe_ratio: row.try_get("sharpe_ratio")?,
            sortino_ratio: row.try_get("sortino_ratio")?,
            standard_deviation: row.try_get("standard_deviation")?,
            maximum_drawdown: row.try_get("maximum_drawdown")?,
            information_ratio: row.try_get("information_ratio")?,
            r_squared: row.try_get("r_squared")?,
        }))
    }

    async fn latest_flow_statistics(&self, isin: &str) -> StoreResult<Option<FlowStatistics>> {
        let row = sqlx::query(
            r#"
            SELECT isin, statistics_date, equity_percentage, debt_percentage, cash_percentage,
                   other_percentage, net_flow, quarterly_flow, yearly_flow
              FROM mf_statistics
             WHERE isin = $1
             ORDER BY statistics_date DESC NULLS LAST, id DESC
             LIMIT 1
            "#,
        )
        .bind(isin)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(FlowStatistics {
            isin: row.try_get("isin")?,
            statistics_date: row.try_get("statistics_date")?,
            equity_percentage: row.try_get("equity_percentage")?,
            debt_percentage: row.try_get("debt_percentage")?,
            cash_percentage: row.try_get("cash_percentage")?,
            other_percentage: row.try_get("other_percentage")?,
            net_flow: row.try_get("net_flow")?,
            quarterly_flow: row.try_get("quarterly_flow")?,
            yearly_flow: row.try_get("yearly_flow")?,
        }))
    }

    async fn fund_index(&self) -> StoreResult<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT isin, scheme_name FROM mf_fund")
            .fetch_all(&self.pool)
            .await?;
        let mut index = BTreeMap::new();
        for row in rows {
            index.insert(row.try_get("isin")?, row.try_get("scheme_name")?);
        }
        Ok(index)
    }

    async fn upsert_fund_batch(&self, drafts: &[FundDraft]) -> StoreResult<FundBatchCounts> {
        if drafts.is_empty() {
            return Ok(FundBatchCounts::default());
        }
        let mut tx = self.pool.begin().await?;

        let mut fund_rows = Vec::with_capacity(drafts.len());
        for chunk in drafts.chunks(rows_per_statement(FUND_BINDS)) {
            fund_rows.extend(upsert_funds_in(&mut tx, chunk).await?);
        }
        let mut sheet_rows = Vec::with_capacity(drafts.len());
        for chunk in drafts.chunks(rows_per_statement(FACTSHEET_BINDS)) {
            sheet_rows.extend(upsert_factsheets_in(&mut tx, chunk).await?);
        }
        tx.commit().await?;

        let counts = FundBatchCounts {
            funds: tally_inserted(&fund_rows)?,
            factsheets: tally_inserted(&sheet_rows)?,
        };
        debug!(rows = drafts.len(), ?counts, "fund batch committed");
        Ok(counts)
    }

    async fn upsert_returns_batch(&self, rows: &[(String, ReturnsInput)]) -> StoreResult<UpsertCounts> {
        if rows.is_empty() {
            return Ok(UpsertCounts::default());
        }
        let mut tx = self.pool.begin().await?;
        let mut result = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(rows_per_statement(RETURNS_BINDS)) {
            result.extend(upsert_returns_in(&mut tx, chunk).await?);
        }
        tx.commit().await?;
        tally_inserted(&result)
    }

    async fn insert_holdings_batch(&self, rows: &[Holding]) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let inserted = insert_holdings_in(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn replace_holdings(&self, isin: &str, rows: &[Holding]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM mf_portfolio_holdings WHERE isin = $1")
            .bind(isin)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let inserted = insert_holdings_in(&mut tx, rows).await?;
        tx.commit().await?;
        debug!(isin, removed, inserted, "holdings snapshot replaced");
        Ok(inserted)
    }

    async fn upsert_nav_batch(&self, rows: &[NavRecord]) -> StoreResult<UpsertCounts> {
        if rows.is_empty() {
            return Ok(UpsertCounts::default());
        }
        let mut tx = self.pool.begin().await?;
        let mut result = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(rows_per_statement(NAV_BINDS)) {
            result.extend(upsert_nav_in(&mut tx, chunk).await?);
        }
        tx.commit().await?;
        tally_inserted(&result)
    }

    async fn clear_category(&self, category: DataCategory, isins: &[String]) -> StoreResult<u64> {
        if isins.is_empty() {
            return Ok(0);
        }
        let table = match category {
            DataCategory::Factsheet => "mf_factsheet",
            DataCategory::Returns => "mf_returns",
            DataCategory::Portfolio => "mf_portfolio_holdings",
            DataCategory::Nav => "mf_nav_history",
        };
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE isin = ANY($1)"))
            .bind(isins)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_stay_under_the_bind_cap() {
        for binds in [FUND_BINDS, FACTSHEET_BINDS, RETURNS_BINDS, HOLDING_BINDS, NAV_BINDS] {
            let rows = rows_per_statement(binds);
            assert!(rows * binds <= MAX_BIND_PARAMS, "{binds} binds per row");
            assert!((rows + 1) * binds > MAX_BIND_PARAMS);
        }
        assert_eq!(rows_per_statement(RETURNS_BINDS), 8191);
    }

    #[test]
    fn large_batches_split_into_several_statements() {
        let rows = vec![0u8; 20_000];
        let statements = rows.chunks(rows_per_statement(RETURNS_BINDS)).count();
        assert_eq!(statements, 3);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
    }
}
