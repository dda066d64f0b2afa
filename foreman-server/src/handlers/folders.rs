use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use foreman_core::folders::FolderReport;
use foreman_model::{FolderItemId, FolderItemStatus, FolderWorkItem, TaskId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::handlers::{bounded, parse_body, parse_node_id};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFoldersRequest {
    #[serde(alias = "folderPaths")]
    pub folder_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimFolderRequest {
    #[serde(rename = "nodeId", alias = "node_id")]
    pub node_id: String,
    #[serde(default, rename = "nodeName", alias = "node_name")]
    pub node_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimFolderResponse {
    pub claimed: Option<FolderWorkItem>,
}

#[derive(Debug, Deserialize)]
pub struct ReportFolderRequest {
    pub status: String,
    pub progress: f64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

fn parse_folder_status(raw: &str) -> Result<FolderItemStatus, AppError> {
    FolderItemStatus::from_str(raw).map_err(|e| AppError::bad_request(e.to_string()))
}

pub async fn list_folders(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<FolderWorkItem>>> {
    let items = bounded(&state, state.folders.list(TaskId(id))).await?;
    Ok(Json(items))
}

pub async fn create_folders(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<CreateFoldersRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Vec<FolderWorkItem>>)> {
    let request = parse_body(body)?;
    let items = bounded(
        &state,
        state
            .folders
            .create_or_replace(TaskId(id), request.folder_paths),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(items)))
}

pub async fn claim_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<ClaimFolderRequest>, JsonRejection>,
) -> AppResult<Json<ClaimFolderResponse>> {
    let request = parse_body(body)?;
    let node_id = parse_node_id(&request.node_id)?;
    let node_name = request.node_name.unwrap_or_else(|| node_id.to_string());

    let claimed = bounded(
        &state,
        state.folders.claim_next(TaskId(id), &node_id, &node_name),
    )
    .await?;
    Ok(Json(ClaimFolderResponse { claimed }))
}

pub async fn report_folder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<ReportFolderRequest>, JsonRejection>,
) -> AppResult<Json<FolderWorkItem>> {
    let request = parse_body(body)?;
    let report = FolderReport {
        status: parse_folder_status(&request.status)?,
        progress: request.progress,
        error_message: request.error_message,
        output_path: request.output_path,
    };

    let item = bounded(&state, state.folders.report(FolderItemId(id), report)).await?;
    Ok(Json(item))
}
