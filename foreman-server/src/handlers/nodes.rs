use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use foreman_core::registry::NodeRegistration;
use foreman_model::Node;
use serde::Deserialize;

use crate::errors::AppResult;
use crate::handlers::{bounded, parse_body, parse_node_id};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterNodeRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub hardware_fingerprint: Option<String>,
}

pub async fn register_node(
    State(state): State<AppState>,
    body: Result<Json<RegisterNodeRequest>, JsonRejection>,
) -> AppResult<Json<Node>> {
    let request = parse_body(body)?;
    let id = parse_node_id(&request.id)?;

    let ip_address = request
        .ip_address
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let node = bounded(
        &state,
        state.registry.register(NodeRegistration {
            id,
            name: request.name,
            ip_address,
            hardware_fingerprint: request.hardware_fingerprint.unwrap_or_default(),
        }),
    )
    .await?;
    Ok(Json(node))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_node_id(&id)?;
    bounded(&state, state.registry.heartbeat(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_available_nodes(State(state): State<AppState>) -> AppResult<Json<Vec<Node>>> {
    let nodes = bounded(&state, state.registry.list_available()).await?;
    Ok(Json(nodes))
}

pub async fn list_all_nodes(State(state): State<AppState>) -> AppResult<Json<Vec<Node>>> {
    let nodes = bounded(&state, state.registry.list_all()).await?;
    Ok(Json(nodes))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Node>> {
    let id = parse_node_id(&id)?;
    let node = bounded(&state, state.registry.get(&id)).await?;
    Ok(Json(node))
}

pub async fn disconnect_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_node_id(&id)?;
    bounded(&state, state.registry.disconnect(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
