//! Scenario S2: a volume compression batch shared by two nodes.

mod support;

use axum::http::StatusCode;
use serde_json::{Value, json};
use support::{create_task, register_node, test_server};

#[tokio::test]
async fn two_nodes_share_one_volume_compression_task() {
    let (server, state) = test_server();
    let mut events = state.events.subscribe();
    register_node(&server, "n1").await;
    register_node(&server, "n2").await;

    let task = create_task(&server, "compress share", "volume_compression", &["n1", "n2"]).await;
    let id = task["id"].as_i64().unwrap();

    // n1 polls and receives the task.
    let polled = server.get("/api/v1/tasks/poll?nodeId=n1").await.json::<Vec<Value>>();
    assert_eq!(polled.len(), 1);

    // n1 starts it (version 1 -> 2).
    let started = server
        .put(&format!("/api/v1/tasks/{id}/status"))
        .json(&json!({"status": "running", "version": 1, "node_id": "n1"}))
        .await;
    started.assert_status_ok();
    assert_eq!(started.json::<Value>()["version"], 2);

    // The fan-out rule keeps the running task pollable for n2.
    let polled = server.get("/api/v1/tasks/poll?nodeId=n2").await.json::<Vec<Value>>();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0]["status"], "running");

    // Folder enumeration is recorded up front.
    let created = server
        .post(&format!("/api/v1/tasks/{id}/folders"))
        .json(&json!({"folder_paths": ["/vol/a", "/vol/b", "/vol/c", "/vol/d"]}))
        .await;
    created.assert_status(StatusCode::CREATED);
    assert_eq!(created.json::<Vec<Value>>().len(), 4);

    // Claims alternate between the nodes; every folder is handed out once.
    let mut claimed = Vec::new();
    for node in ["n1", "n2", "n1", "n2"] {
        let response = server
            .post(&format!("/api/v1/tasks/{id}/folders/claim"))
            .json(&json!({"nodeId": node, "nodeName": format!("worker {node}")}))
            .await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        let item = body["claimed"].clone();
        assert_eq!(item["status"], "in_progress");
        assert_eq!(item["assigned_node_id"], node);
        claimed.push(item);
    }

    // No fifth folder exists.
    let empty = server
        .post(&format!("/api/v1/tasks/{id}/folders/claim"))
        .json(&json!({"nodeId": "n1"}))
        .await
        .json::<Value>();
    assert!(empty["claimed"].is_null());

    // Mid-flight progress projections are cheap reads.
    let progress = server
        .get(&format!("/api/v1/tasks/{id}/progress"))
        .await
        .json::<Value>();
    assert_eq!(progress["total"], 4);
    assert_eq!(progress["in_progress"], 4);

    // Every node reports its folders complete.
    for item in &claimed {
        let response = server
            .put(&format!("/api/v1/folders/{}/status", item["id"].as_str().unwrap()))
            .json(&json!({
                "status": "completed",
                "progress": 100.0,
                "output_path": "/out",
            }))
            .await;
        response.assert_status_ok();
    }

    // The final report completed the task.
    let done = server.get(&format!("/api/v1/tasks/{id}")).await.json::<Value>();
    assert_eq!(done["status"], "completed");
    assert!(!done["completed_at"].is_null());

    let progress = server
        .get(&format!("/api/v1/tasks/{id}/progress"))
        .await
        .json::<Value>();
    assert_eq!(progress["completed"], 4);
    assert_eq!(progress["terminal_ratio"], 1.0);

    // Exactly one running -> completed event was emitted.
    let mut completions = 0;
    while let Ok(envelope) = events.try_recv() {
        let value = serde_json::to_value(&envelope).unwrap();
        if value["type"] == "task_status_changed"
            && value["old"] == "running"
            && value["new"] == "completed"
        {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn failed_folder_fails_the_task_with_an_aggregate_message() {
    let (server, _) = test_server();
    register_node(&server, "n1").await;
    let task = create_task(&server, "half bad", "volume_compression", &["n1"]).await;
    let id = task["id"].as_i64().unwrap();

    server
        .put(&format!("/api/v1/tasks/{id}/status"))
        .json(&json!({"status": "running", "version": 1}))
        .await
        .assert_status_ok();
    server
        .post(&format!("/api/v1/tasks/{id}/folders"))
        .json(&json!({"folder_paths": ["/vol/good", "/vol/bad"]}))
        .await
        .assert_status(StatusCode::CREATED);

    let good = server
        .post(&format!("/api/v1/tasks/{id}/folders/claim"))
        .json(&json!({"nodeId": "n1"}))
        .await
        .json::<Value>()["claimed"]
        .clone();
    let bad = server
        .post(&format!("/api/v1/tasks/{id}/folders/claim"))
        .json(&json!({"nodeId": "n1"}))
        .await
        .json::<Value>()["claimed"]
        .clone();

    server
        .put(&format!("/api/v1/folders/{}/status", good["id"].as_str().unwrap()))
        .json(&json!({"status": "completed", "progress": 100.0}))
        .await
        .assert_status_ok();
    server
        .put(&format!("/api/v1/folders/{}/status", bad["id"].as_str().unwrap()))
        .json(&json!({
            "status": "failed",
            "progress": 30.0,
            "error_message": "compressor exited with code 3",
        }))
        .await
        .assert_status_ok();

    let done = server.get(&format!("/api/v1/tasks/{id}")).await.json::<Value>();
    assert_eq!(done["status"], "failed");
    let message = done["result_message"].as_str().unwrap();
    assert!(message.contains("bad"), "unexpected message: {message}");
}

#[tokio::test]
async fn folder_report_validations() {
    let (server, _) = test_server();
    register_node(&server, "n1").await;
    let task = create_task(&server, "guard", "volume_compression", &["n1"]).await;
    let id = task["id"].as_i64().unwrap();
    server
        .post(&format!("/api/v1/tasks/{id}/folders"))
        .json(&json!({"folder_paths": ["/vol/a"]}))
        .await
        .assert_status(StatusCode::CREATED);
    let item = server
        .post(&format!("/api/v1/tasks/{id}/folders/claim"))
        .json(&json!({"nodeId": "n1"}))
        .await
        .json::<Value>()["claimed"]
        .clone();
    let folder_url = format!("/api/v1/folders/{}/status", item["id"].as_str().unwrap());

    // Progress outside [0, 100].
    server
        .put(&folder_url)
        .json(&json!({"status": "in_progress", "progress": 180.0}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Reporting back to pending is meaningless.
    server
        .put(&folder_url)
        .json(&json!({"status": "pending", "progress": 0.0}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Unknown folder items 404.
    server
        .put("/api/v1/folders/0195d2f7-4e7e-7a10-b000-000000000000/status")
        .json(&json!({"status": "completed", "progress": 100.0}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
