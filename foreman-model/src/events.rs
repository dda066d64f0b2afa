use crate::ids::{NodeId, TaskId};
use crate::task::TaskStatus;

/// Why a node was taken out of rotation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    Admin,
    HeartbeatTimeout,
}

/// Push-channel event payloads.
///
/// Delivered at-least-once to currently connected subscribers; there is no
/// backlog replay, so pollers and push consumers see the same state through
/// different surfaces.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    TaskCreated {
        task_id: TaskId,
        name: String,
    },
    TaskAssigned {
        task_id: TaskId,
        node_id: NodeId,
    },
    TaskStatusChanged {
        task_id: TaskId,
        old: TaskStatus,
        new: TaskStatus,
        result_message: Option<String>,
    },
    TaskProgressChanged {
        task_id: TaskId,
        node_id: Option<NodeId>,
        progress: f64,
    },
    NodeRegistered {
        node_id: NodeId,
        name: String,
    },
    NodeDisconnected {
        node_id: NodeId,
        reason: DisconnectReason,
    },
    DebugMessage {
        source: String,
        text: String,
        node_id: Option<NodeId>,
    },
}

impl ServerEvent {
    /// Interest groups this event is delivered to. Subscribers join groups
    /// freely; `tasks:all` sees every task event, `task:<id>` only its own.
    pub fn groups(&self) -> Vec<String> {
        match self {
            ServerEvent::TaskCreated { task_id, .. }
            | ServerEvent::TaskAssigned { task_id, .. }
            | ServerEvent::TaskStatusChanged { task_id, .. }
            | ServerEvent::TaskProgressChanged { task_id, .. } => {
                vec!["tasks:all".to_string(), format!("task:{task_id}")]
            }
            ServerEvent::NodeRegistered { .. } | ServerEvent::NodeDisconnected { .. } => {
                vec!["nodes".to_string(), "tasks:all".to_string()]
            }
            ServerEvent::DebugMessage { .. } => vec!["debug".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_events_route_to_task_groups() {
        let event = ServerEvent::TaskStatusChanged {
            task_id: TaskId(42),
            old: TaskStatus::Running,
            new: TaskStatus::Completed,
            result_message: None,
        };
        assert_eq!(event.groups(), vec!["tasks:all", "task:42"]);
    }

    #[test]
    fn debug_messages_stay_in_debug_group() {
        let event = ServerEvent::DebugMessage {
            source: "worker".into(),
            text: "compressor warm-up".into(),
            node_id: None,
        };
        assert_eq!(event.groups(), vec!["debug"]);
    }

    #[test]
    fn wire_shape_is_tagged() {
        let event = ServerEvent::TaskCreated {
            task_id: TaskId(7),
            name: "nightly".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_created");
        assert_eq!(json["task_id"], 7);
    }
}
