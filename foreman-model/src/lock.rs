use crate::ids::{LockId, NodeId};
use crate::path_key::NormalizedPathKey;
use chrono::{DateTime, Duration, Utc};

/// Advisory mutual-exclusion record keyed by normalized path.
///
/// `created_at` marks the first acquisition by the current holder;
/// `last_updated_at` moves on every refresh. Expiry is judged on the refresh
/// timestamp only.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileLock {
    pub id: LockId,
    pub normalized_path: NormalizedPathKey,
    pub holder_node_id: NodeId,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl FileLock {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_updated_at > ttl
    }
}
