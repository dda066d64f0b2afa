//! # Foreman Server
//!
//! Dispatch and coordination server for a small fleet of worker machines
//! running long file-processing batches.
//!
//! ## Overview
//!
//! - **Node registry**: workers register over HTTP, heartbeat their
//!   liveness, and are swept offline when they go silent
//! - **Task dispatch**: lifecycle state machine with optimistic versioning;
//!   fan-out tasks are shared by several nodes through folder work items
//! - **Advisory file locks**: single holder per normalized storage path,
//!   with TTL-based expiry
//! - **Push channel**: task/node/debug events over WebSocket, grouped by
//!   interest key; polling stays equivalent
//!
//! ## Architecture
//!
//! The server is built on Axum and uses PostgreSQL for persistent storage
//! (an in-memory store backs dev mode and tests). Domain logic lives in
//! `foreman-core`; this crate is the transport adapter plus process wiring.

/// Versioned route organization
pub mod routes;

/// Request handlers (transport adapters)
pub mod handlers;

/// WebSocket push channel
pub mod websocket;

/// Middleware implementations
pub mod middleware;

/// Config, state, and process wiring
pub mod infra;

/// Error types and envelope mapping
pub mod errors;

use axum::{Router, http::HeaderValue, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::infra::app_state::AppState;
use crate::infra::config::Config;

pub fn create_app(state: AppState) -> Router {
    let versioned_api = routes::create_api_router(state.clone());

    Router::new()
        .route("/ping", get(handlers::health::ping_handler))
        .route("/health", get(handlers::health::health_handler))
        .merge(versioned_api)
        // Layer order (outer to inner): correlation id, tracing, CORS.
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            middleware::correlation::correlation_middleware,
        ))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
