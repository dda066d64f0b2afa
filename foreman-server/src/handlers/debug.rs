use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use foreman_model::ServerEvent;
use serde::Deserialize;

use crate::errors::AppResult;
use crate::handlers::{parse_body, parse_node_id};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct DebugMessageRequest {
    pub source: String,
    pub text: String,
    #[serde(default, alias = "nodeId")]
    pub node_id: Option<String>,
}

/// Workers push diagnostic lines onto the `debug` event group.
pub async fn post_debug_message(
    State(state): State<AppState>,
    body: Result<Json<DebugMessageRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let request = parse_body(body)?;
    let node_id = request
        .node_id
        .as_deref()
        .map(parse_node_id)
        .transpose()?;

    state.events.publish(ServerEvent::DebugMessage {
        source: request.source,
        text: request.text,
        node_id,
    });
    Ok(StatusCode::ACCEPTED)
}
