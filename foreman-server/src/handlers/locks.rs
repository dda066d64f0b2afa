use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use foreman_model::FileLock;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::errors::AppResult;
use crate::handlers::{bounded, parse_body, parse_node_id};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct LockRequest {
    pub path: String,
    #[serde(rename = "nodeId", alias = "node_id")]
    pub node_id: String,
}

pub async fn acquire_lock(
    State(state): State<AppState>,
    body: Result<Json<LockRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = parse_body(body)?;
    let node_id = parse_node_id(&request.node_id)?;
    // Contention is a normal outcome, never an error response.
    let acquired = bounded(
        &state,
        state.lock_manager.try_acquire(&request.path, &node_id),
    )
    .await?;
    Ok(Json(json!({ "acquired": acquired })))
}

pub async fn refresh_lock(
    State(state): State<AppState>,
    body: Result<Json<LockRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = parse_body(body)?;
    let node_id = parse_node_id(&request.node_id)?;
    let refreshed = bounded(&state, state.lock_manager.refresh(&request.path, &node_id)).await?;
    Ok(Json(json!({ "refreshed": refreshed })))
}

pub async fn release_lock(
    State(state): State<AppState>,
    body: Result<Json<LockRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let request = parse_body(body)?;
    let node_id = parse_node_id(&request.node_id)?;
    let released = bounded(&state, state.lock_manager.release(&request.path, &node_id)).await?;
    Ok(Json(json!({ "released": released })))
}

pub async fn list_locks(State(state): State<AppState>) -> AppResult<Json<Vec<FileLock>>> {
    let locks = bounded(&state, state.lock_manager.list()).await?;
    Ok(Json(locks))
}

pub async fn reset_locks(State(state): State<AppState>) -> AppResult<StatusCode> {
    bounded(&state, state.lock_manager.reset_all()).await?;
    Ok(StatusCode::NO_CONTENT)
}
