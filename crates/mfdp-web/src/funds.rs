//! Fund, factsheet and returns resources.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use mfdp_core::{FactSheetInput, FundUpdate, NewFund, PageRequest, ReturnsInput};
use mfdp_storage::FundFilter;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiJson, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    page: Option<usize>,
    per_page: Option<usize>,
}

impl PageQuery {
    pub(crate) fn request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FundListQuery {
    page: Option<usize>,
    per_page: Option<usize>,
    amc_name: Option<String>,
    fund_type: Option<String>,
}

pub(crate) async fn list_funds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FundListQuery>,
) -> ApiResult<Response> {
    let filter = FundFilter {
        amc_name: query.amc_name.filter(|s| !s.trim().is_empty()),
        fund_type: query.fund_type.filter(|s| !s.trim().is_empty()),
    };
    let page = PageRequest {
        page: query.page,
        per_page: query.per_page,
    };
    let funds = state.repo.list_funds(&filter, page).await?;
    Ok(Json(funds).into_response())
}

pub(crate) async fn funds_by_amc(
    State(state): State<Arc<AppState>>,
    Path(amc_name): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Response> {
    let filter = FundFilter {
        amc_name: Some(amc_name),
        fund_type: None,
    };
    Ok(Json(state.repo.list_funds(&filter, query.request()).await?).into_response())
}

pub(crate) async fn funds_by_type(
    State(state): State<Arc<AppState>>,
    Path(fund_type): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Response> {
    let filter = FundFilter {
        amc_name: None,
        fund_type: Some(fund_type),
    };
    Ok(Json(state.repo.list_funds(&filter, query.request()).await?).into_response())
}

pub(crate) async fn create_fund(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<NewFund>,
) -> ApiResult<Response> {
    payload.validate()?;
    let fund = state.repo.create_fund(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Fund created successfully", "fund": fund })),
    )
        .into_response())
}

pub(crate) async fn get_fund(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    Ok(Json(state.repo.get_fund(&isin).await?).into_response())
}

pub(crate) async fn update_fund(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<FundUpdate>,
) -> ApiResult<Response> {
    payload.validate()?;
    let fund = state.repo.update_fund(&isin, &payload).await?;
    Ok(Json(json!({ "message": "Fund updated successfully", "fund": fund })).into_response())
}

pub(crate) async fn delete_fund(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    state.repo.delete_fund(&isin).await?;
    Ok(Json(json!({ "message": "Fund deleted successfully" })).into_response())
}

pub(crate) async fn get_factsheet(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    state.repo.get_fund(&isin).await?;
    Ok(Json(state.repo.get_factsheet(&isin).await?).into_response())
}

pub(crate) async fn create_factsheet(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<FactSheetInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    state.repo.get_fund(&isin).await?;
    let sheet = state
        .repo
        .create_factsheet(&payload.into_factsheet(&isin, Utc::now()))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Factsheet created successfully", "factsheet": sheet })),
    )
        .into_response())
}

pub(crate) async fn replace_factsheet(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<FactSheetInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    state.repo.get_factsheet(&isin).await?;
    let sheet = state
        .repo
        .update_factsheet(&payload.into_factsheet(&isin, Utc::now()))
        .await?;
    Ok(Json(json!({ "message": "Factsheet updated successfully", "factsheet": sheet })).into_response())
}

pub(crate) async fn patch_factsheet(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<FactSheetInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    let mut sheet = state.repo.get_factsheet(&isin).await?;
    payload.patch(&mut sheet, Utc::now());
    let sheet = state.repo.update_factsheet(&sheet).await?;
    Ok(Json(json!({ "message": "Factsheet updated successfully", "factsheet": sheet })).into_response())
}

pub(crate) async fn delete_factsheet(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    state.repo.delete_factsheet(&isin).await?;
    Ok(Json(json!({ "message": "Factsheet deleted successfully" })).into_response())
}

pub(crate) async fn get_returns(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    state.repo.get_fund(&isin).await?;
    Ok(Json(state.repo.get_returns(&isin).await?).into_response())
}

pub(crate) async fn create_returns(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<ReturnsInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    state.repo.get_fund(&isin).await?;
    let returns = state
        .repo
        .create_returns(&payload.into_returns(&isin, Utc::now()))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Returns created successfully", "returns": returns })),
    )
        .into_response())
}

pub(crate) async fn replace_returns(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<ReturnsInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    state.repo.get_returns(&isin).await?;
    let returns = state
        .repo
        .update_returns(&payload.into_returns(&isin, Utc::now()))
        .await?;
    Ok(Json(json!({ "message": "Returns updated successfully", "returns": returns })).into_response())
}

pub(crate) async fn patch_returns(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
    ApiJson(payload): ApiJson<ReturnsInput>,
) -> ApiResult<Response> {
    payload.validate()?;
    let mut returns = state.repo.get_returns(&isin).await?;
    payload.patch(&mut returns, Utc::now());
    let returns = state.repo.update_returns(&returns).await?;
    Ok(Json(json!({ "message": "Returns updated successfully", "returns": returns })).into_response())
}

pub(crate) async fn delete_returns(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    state.repo.delete_returns(&isin).await?;
    Ok(Json(json!({ "message": "Returns deleted successfully" })).into_response())
}
