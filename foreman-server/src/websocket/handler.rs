use axum::{
    extract::{
        Query, State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::infra::app_state::AppState;
use crate::websocket::connection::Connection;

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// Comma-separated initial groups, e.g. `debug,tasks:all,task:42`.
    #[serde(default)]
    pub groups: Option<String>,
}

/// Frames a client may send after connecting.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe { group: String },
    Unsubscribe { group: String },
}

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> Response {
    let groups: HashSet<String> = query
        .groups
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect()
        })
        .filter(|set: &HashSet<String>| !set.is_empty())
        .unwrap_or_else(|| HashSet::from(["tasks:all".to_string()]));

    ws.on_upgrade(move |socket| handle_socket(socket, state, groups))
}

/// Handle an individual push-channel connection: forward bus events matching
/// the client's groups, and apply subscribe/unsubscribe frames.
async fn handle_socket(socket: WebSocket, state: AppState, groups: HashSet<String>) {
    let (mut sender, mut receiver) = socket.split();
    let mut bus = state.events.subscribe();

    let connection = Arc::new(Connection::new(groups));
    let conn_id = connection.id;
    state.connections.add_connection(connection.clone());
    tracing::debug!(connection = %conn_id, "push channel subscriber connected");

    loop {
        tokio::select! {
            event = bus.recv() => match event {
                Ok(envelope) => {
                    if !connection.interested(&envelope.event.groups()).await {
                        continue;
                    }
                    match serde_json::to_string(&envelope) {
                        Ok(text) => {
                            if sender.send(Message::Text(Utf8Bytes::from(text))).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::error!("failed to encode event: {e}"),
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // Slow consumer: the contract is at-least-once to
                    // connected subscribers, not a backlog.
                    tracing::warn!(connection = %conn_id, missed, "subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientFrame>(text.as_str()) {
                        Ok(ClientFrame::Subscribe { group }) => {
                            connection.join(group).await;
                            send_group_ack(&mut sender, &connection).await;
                        }
                        Ok(ClientFrame::Unsubscribe { group }) => {
                            connection.leave(&group).await;
                            send_group_ack(&mut sender, &connection).await;
                        }
                        Err(e) => {
                            tracing::debug!(connection = %conn_id, "ignoring malformed frame: {e}");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection = %conn_id, "websocket error: {e}");
                    break;
                }
            },
        }
    }

    state.connections.remove_connection(conn_id);
    tracing::debug!(connection = %conn_id, "push channel subscriber disconnected");
}

async fn send_group_ack(
    sender: &mut (impl SinkExt<Message> + Unpin),
    connection: &Connection,
) {
    let ack = serde_json::json!({
        "type": "subscription_changed",
        "groups": connection.current_groups().await,
    });
    if let Ok(text) = serde_json::to_string(&ack) {
        let _ = sender.send(Message::Text(Utf8Bytes::from(text))).await;
    }
}
