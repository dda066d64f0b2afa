//! Cross-cutting surface behaviour: health, ping, auth modes, debug events.

mod support;

use axum::http::StatusCode;
use foreman_server::infra::config::AuthMode;
use serde_json::{Value, json};
use support::{register_node, test_config, test_server, test_server_with};

#[tokio::test]
async fn ping_and_health_respond() {
    let (server, _) = test_server();

    let ping = server.get("/ping").await;
    ping.assert_status_ok();
    assert_eq!(ping.json::<Value>()["status"], "ok");

    register_node(&server, "n1").await;
    let health = server.get("/health").await;
    health.assert_status_ok();
    let body = health.json::<Value>();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"]["known_nodes"], 1);
}

#[tokio::test]
async fn token_mode_guards_the_api_but_not_probes() {
    let mut config = test_config();
    config.auth_mode = AuthMode::Token;
    config.token_secret = Some("fleet-secret".to_string());
    let (server, _) = test_server_with(config);

    // Probes stay public.
    server.get("/ping").await.assert_status_ok();
    server.get("/health").await.assert_status_ok();

    // API calls need the bearer secret.
    let denied = server.get("/api/v1/tasks").await;
    denied.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(denied.json::<Value>()["code"], "unauthorized");

    let wrong = server
        .get("/api/v1/tasks")
        .add_header("authorization", "Bearer wrong")
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    let allowed = server
        .get("/api/v1/tasks")
        .add_header("authorization", "Bearer fleet-secret")
        .await;
    allowed.assert_status_ok();
}

#[tokio::test]
async fn debug_messages_reach_the_debug_group() {
    let (server, state) = test_server();
    let mut events = state.events.subscribe();

    let response = server
        .post("/api/v1/debug/messages")
        .json(&json!({
            "source": "compressor",
            "text": "warming up codec tables",
            "node_id": "n1",
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);

    let envelope = events.recv().await.unwrap();
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["type"], "debug_message");
    assert_eq!(value["source"], "compressor");
    assert_eq!(envelope.event.groups(), vec!["debug"]);
    assert!(envelope.correlation_id.is_some());
}

#[tokio::test]
async fn unknown_routes_are_404() {
    let (server, _) = test_server();
    server.get("/api/v1/unknown").await.assert_status(StatusCode::NOT_FOUND);
}
