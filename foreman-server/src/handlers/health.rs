use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::warn;

use crate::infra::app_state::AppState;

pub async fn ping_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Foreman dispatch server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut health = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {},
    });

    let mut is_unhealthy = false;

    // A store round trip doubles as the database connectivity check.
    match state.registry.list_all().await {
        Ok(nodes) => {
            let available = nodes.iter().filter(|n| n.is_available).count();
            health["checks"]["store"] = json!({
                "status": "healthy",
                "known_nodes": nodes.len(),
                "available_nodes": available,
            });
        }
        Err(e) => {
            warn!("health check store probe failed: {e}");
            health["checks"]["store"] = json!({
                "status": "unhealthy",
                "error": e.to_string(),
            });
            is_unhealthy = true;
        }
    }

    health["checks"]["push_channel"] = json!({
        "status": "healthy",
        "connected_subscribers": state.connections.count(),
    });

    if is_unhealthy {
        health["status"] = json!("unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health)))
    } else {
        Ok(Json(health))
    }
}
