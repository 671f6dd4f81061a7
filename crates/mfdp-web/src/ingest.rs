//! Report endpoints, workbook upload and import status.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use mfdp_core::DataCategory;
use mfdp_import::ImportPipeline;
use mfdp_storage::{StoreError, UploadStore};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ApiError, ApiJson, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct IsinList {
    #[serde(default)]
    isins: Vec<String>,
}

pub(crate) async fn fund_analytics(
    State(state): State<Arc<AppState>>,
    Path(isin): Path<String>,
) -> ApiResult<Response> {
    let report = state.reports.fund_analytics(&isin, Utc::now().date_naive()).await?;
    Ok(Json(report).into_response())
}

pub(crate) async fn compare(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<IsinList>,
) -> ApiResult<Response> {
    Ok(Json(state.reports.compare(&payload.isins).await?).into_response())
}

pub(crate) async fn overlap(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<IsinList>,
) -> ApiResult<Response> {
    Ok(Json(state.reports.overlap(&payload.isins).await?).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadQuery {
    #[serde(default)]
    clear: bool,
}

/// True when a storage failure (not the workbook) sank the import.
fn is_database_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<StoreError>(),
            Some(StoreError::Database(_) | StoreError::Migrate(_))
        )
    })
}

pub(crate) async fn upload(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let category: DataCategory = category
        .parse()
        .map_err(|err: mfdp_core::UnknownCategory| ApiError::BadRequest(err.to_string()))?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        file = Some((file_name, bytes));
        break;
    }
    let Some((file_name, bytes)) = file else {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    };
    if file_name.trim().is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    if UploadStore::accepted_extension(&file_name).is_none() {
        return Err(ApiError::BadRequest(
            "Invalid file type. Only Excel files (.xlsx, .xls) are allowed".to_string(),
        ));
    }

    let staged = state.uploads.stage(category, &file_name, &bytes).await?;
    info!(
        %category,
        file = %file_name,
        bytes = staged.byte_size,
        deduplicated = staged.deduplicated,
        "staged upload"
    );

    let pipeline = ImportPipeline::new(state.import_config.clone(), state.repo.clone())?
        .with_status_board(state.status.clone());
    let stats = match pipeline.run_category(category, &staged.path, query.clear).await {
        Ok(stats) => stats,
        Err(err) if is_database_failure(&err) => return Err(ApiError::Internal(err)),
        Err(err) => {
            let detail = format!("{err:#}");
            warn!(%category, error = %detail, "uploaded import failed");
            return Err(ApiError::BadRequest(format!("Import failed: {detail}")));
        }
    };

    Ok(Json(json!({
        "message": format!("{category} import completed successfully"),
        "flow": category,
        "file": {
            "name": file_name,
            "content_hash": staged.content_hash,
            "byte_size": staged.byte_size,
            "deduplicated": staged.deduplicated,
        },
        "stats": stats,
    }))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusQuery {
    flow: Option<String>,
}

pub(crate) async fn import_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Response> {
    match query.flow {
        Some(flow) => match state.status.get(&flow).await {
            Some(status) => Ok(Json(status).into_response()),
            None => Err(ApiError::NotFound(format!("No status recorded for {flow}"))),
        },
        None => Ok(Json(state.status.all().await).into_response()),
    }
}

pub(crate) async fn clear_import_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Response> {
    state.status.clear(query.flow.as_deref()).await?;
    let message = match &query.flow {
        Some(flow) => format!("Import status cleared for {flow}"),
        None => "Import status cleared".to_string(),
    };
    Ok(Json(json!({ "message": message })).into_response())
}
