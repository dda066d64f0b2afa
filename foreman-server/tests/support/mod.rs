//! Shared test wiring: a full server over the in-memory store.

// Each test binary uses a different slice of these helpers.
#![allow(dead_code)]

use axum_test::TestServer;
use foreman_core::store::Store;
use foreman_server::create_app;
use foreman_server::infra::app_state::AppState;
use foreman_server::infra::config::{AuthMode, Config};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub fn test_config() -> Config {
    Config {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        tls_cert: None,
        tls_key: None,
        db_connection: None,
        heartbeat_timeout: Duration::from_secs(2 * 60),
        lock_ttl: Duration::from_secs(10 * 60),
        node_sweep_interval: Duration::from_secs(30),
        lock_sweep_interval: Duration::from_secs(60),
        request_deadline: Duration::from_secs(5),
        allowed_origins: vec!["*".to_string()],
        auth_mode: AuthMode::None,
        token_secret: None,
        log_level: "info".to_string(),
        log_directory: None,
        dev_mode: true,
    }
}

pub fn test_server() -> (TestServer, AppState) {
    test_server_with(test_config())
}

pub fn test_server_with(config: Config) -> (TestServer, AppState) {
    let state = AppState::new(Arc::new(config), Store::memory());
    let server = TestServer::new(create_app(state.clone())).expect("test server boots");
    (server, state)
}

pub async fn register_node(server: &TestServer, id: &str) {
    let response = server
        .post("/api/v1/nodes/register")
        .json(&json!({
            "id": id,
            "name": format!("worker {id}"),
            "ip_address": "10.0.0.7",
            "hardware_fingerprint": format!("fp-{id}"),
        }))
        .await;
    response.assert_status_ok();
}

pub async fn create_task(
    server: &TestServer,
    name: &str,
    task_type: &str,
    assignees: &[&str],
) -> serde_json::Value {
    let response = server
        .post("/api/v1/tasks")
        .json(&json!({
            "name": name,
            "type": task_type,
            "parameters": {"source": "/mnt/share"},
            "assigned_node_ids": assignees,
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    response.json::<serde_json::Value>()
}
