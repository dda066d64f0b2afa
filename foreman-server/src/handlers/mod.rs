//! Transport adapters: parse DTOs, enforce the request deadline, delegate to
//! core services, map typed errors to the envelope.

pub mod debug;
pub mod folders;
pub mod health;
pub mod locks;
pub mod nodes;
pub mod tasks;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use foreman_model::NodeId;
use std::future::Future;

use crate::errors::AppError;
use crate::infra::app_state::AppState;

/// Run a service call under the request deadline; timeouts surface as the
/// retryable *Transient* failure.
pub(crate) async fn bounded<T, F>(state: &AppState, fut: F) -> Result<T, AppError>
where
    F: Future<Output = foreman_core::Result<T>>,
{
    foreman_core::retry::with_deadline(state.config.request_deadline, fut)
        .await
        .map_err(AppError::from)
}

/// Malformed request bodies are validation failures, not framework noise.
pub(crate) fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request(format!("invalid request body: {rejection}")))
}

pub(crate) fn parse_node_id(raw: &str) -> Result<NodeId, AppError> {
    NodeId::parse(raw).map_err(|e| AppError::bad_request(e.to_string()))
}
