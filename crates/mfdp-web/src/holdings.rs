//! Holdings and NAV resources.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use mfdp_core::{HoldingInput, NavInput, NavRecord, PageRequest, ValidationErrors};
use mfdp_storage::NavRange;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiJson, ApiResult};
use crate::funds::PageQuery;
use crate::AppState;

pub(crate) async fn list_holdings(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Response> {
    state.repo.get_fund(&isin).await?;
    Ok(Json(state.repo.list_holdings(&isin, query.request()).await?).into_response())
}

pub(crate) async fn create_holding(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<HoldingInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    state.repo.get_fund(&isin).await?;
    let holding = state
        .repo
        .create_holding(&payload.into_holding(&isin, Utc::now()))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Holding created successfully", "holding": holding })),
    )
        .into_response())
}

pub(crate) async fn delete_fund_holdings(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    state.repo.get_fund(&isin).await?;
    let deleted = state.repo.delete_fund_holdings(&isin).await?;
    Ok(Json(json!({ "message": format!("Deleted {deleted} holdings"), "deleted": deleted })).into_response())
}

pub(crate) async fn get_holding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    Ok(Json(state.repo.get_holding(id).await?).into_response())
}

pub(crate) async fn update_holding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<HoldingInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    let existing = state.repo.get_holding(id).await?;
    let mut holding = payload.into_holding(&existing.isin, Utc::now());
    holding.id = existing.id;
    let holding = state.repo.update_holding(&holding).await?;
    Ok(Json(json!({ "message": "Holding updated successfully", "holding": holding })).into_response())
}

pub(crate) async fn delete_holding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    state.repo.delete_holding(id).await?;
    Ok(Json(json!({ "message": "Holding deleted successfully" })).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NavQuery {
    start_date: Option<String>,
    end_date: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

fn parse_day(field: &str, raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::Validation(ValidationErrors::single(field, "must be in YYYY-MM-DD format"))),
    }
}

pub(crate) async fn list_nav(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    Query(query): Query<NavQuery>,
) -> ApiResult<Response> {
    let range = NavRange {
        start: parse_day("start_date", query.start_date.as_deref())?,
        end: parse_day("end_date", query.end_date.as_deref())?,
    };
    state.repo.get_fund(&isin).await?;
    let page = PageRequest {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.repo.list_nav(&isin, range, page).await?).into_response())
}

/// Validated NAV payload as a storable record.
fn nav_record(isin: &str, payload: &NavInput) -> ApiResult<NavRecord> {
    payload.validate()?;
    match (payload.date, payload.nav) {
        (Some(date), Some(nav)) => Ok(NavRecord {
            isin: isin.to_string(),
            date,
            nav,
        }),
        _ => Err(ValidationErrors::single("nav", "is required").into()),
    }
}

pub(crate) async fn create_nav(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<NavInput>,
) -> ApiResult<Response> {
    let record = nav_record(&isin, &payload)?;
    state.repo.get_fund(&isin).await?;
    let point = state.repo.create_nav(&record).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "NAV created successfully", "nav": point })),
    )
        .into_response())
}

pub(crate) async fn delete_fund_nav(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    state.repo.get_fund(&isin).await?;
    let deleted = state.repo.delete_fund_nav(&isin).await?;
    Ok(Json(json!({ "message": format!("Deleted {deleted} NAV records"), "deleted": deleted })).into_response())
}

pub(crate) async fn get_nav(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    Ok(Json(state.repo.get_nav(id).await?).into_response())
}

pub(crate) async fn update_nav(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<NavInput>,
) -> ApiResult<Response> {
    let mut point = state.repo.get_nav(id).await?;
    let record = nav_record(&point.isin, &payload)?;
    point.date = record.date;
    point.nav = record.nav;
    let point = state.repo.update_nav(&point).await?;
    Ok(Json(json!({ "message": "NAV updated successfully", "nav": point })).into_response())
}

pub(crate) async fn delete_nav(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    state.repo.delete_nav(id).await?;
    Ok(Json(json!({ "message": "NAV deleted successfully" })).into_response())
}
