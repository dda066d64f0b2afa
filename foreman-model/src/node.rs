use crate::ids::NodeId;
use chrono::{DateTime, Duration, Utc};

/// A worker machine registered with the dispatch server.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub ip_address: String,
    pub hardware_fingerprint: String,
    pub is_available: bool,
    pub last_heartbeat: DateTime<Utc>,
}

impl Node {
    /// Whether the node has gone silent relative to `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, heartbeat_timeout: Duration) -> bool {
        now - self.last_heartbeat > heartbeat_timeout
    }
}
