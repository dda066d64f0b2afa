//! Advisory file-lock service.
//!
//! The contract is mutual exclusion of *holders* per normalized path; the
//! server never polices filesystem I/O. Any valid node id string may hold a
//! lock: registration is not a precondition, since legacy workers acquire
//! locks before their first register call.

use chrono::{Duration, Utc};
use foreman_model::{FileLock, NodeId, NormalizedPathKey};

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::store::Store;

/// Lock service tuning.
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    /// How long a lock stays live after its last refresh.
    pub ttl: std::time::Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: std::time::Duration::from_secs(10 * 60),
        }
    }
}

/// Acquire, refresh, release, and sweep advisory file locks.
pub struct LockManager {
    store: Store,
    retry: RetryPolicy,
    ttl: Duration,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager").field("ttl", &self.ttl).finish()
    }
}

impl LockManager {
    pub fn new(store: Store, config: LockConfig) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            ttl: Duration::from_std(config.ttl).unwrap_or_else(|_| Duration::minutes(10)),
        }
    }

    /// Race-free acquisition. `false` is lock contention, a normal outcome,
    /// not an error.
    pub async fn try_acquire(&self, raw_path: &str, node_id: &NodeId) -> Result<bool> {
        let key = NormalizedPathKey::normalize(raw_path)?;
        let acquired = self
            .retry
            .run(|| self.store.locks.try_acquire(&key, node_id, Utc::now(), self.ttl))
            .await?;
        if acquired {
            tracing::debug!(path = %key, node = %node_id, "lock acquired");
        }
        Ok(acquired)
    }

    /// Extend the holder's lease; returns whether anything was refreshed.
    pub async fn refresh(&self, raw_path: &str, node_id: &NodeId) -> Result<bool> {
        let key = NormalizedPathKey::normalize(raw_path)?;
        self.retry
            .run(|| self.store.locks.refresh(&key, node_id, Utc::now()))
            .await
    }

    /// Drop the lock if held by `node_id`; returns whether a row was deleted.
    pub async fn release(&self, raw_path: &str, node_id: &NodeId) -> Result<bool> {
        let key = NormalizedPathKey::normalize(raw_path)?;
        let released = self
            .retry
            .run(|| self.store.locks.release(&key, node_id))
            .await?;
        if released {
            tracing::debug!(path = %key, node = %node_id, "lock released");
        }
        Ok(released)
    }

    /// Locks still inside their TTL.
    pub async fn list(&self) -> Result<Vec<FileLock>> {
        self.retry
            .run(|| self.store.locks.list_active(Utc::now(), self.ttl))
            .await
    }

    /// Delete every lock whose lease ran out as of `now`.
    pub async fn sweep(&self, now: chrono::DateTime<Utc>) -> Result<u64> {
        let cutoff = now - self.ttl;
        let swept = self
            .retry
            .run(|| self.store.locks.sweep_expired(cutoff))
            .await?;
        if swept > 0 {
            tracing::info!(swept, "expired file locks removed");
        }
        Ok(swept)
    }

    /// Node reclamation: drop everything the node still holds.
    pub async fn release_all_for(&self, node_id: &NodeId) -> Result<u64> {
        self.retry
            .run(|| self.store.locks.release_all_for(node_id))
            .await
    }

    /// Admin wipe of the whole lock table.
    pub async fn reset_all(&self) -> Result<u64> {
        let cleared = self.retry.run(|| self.store.locks.reset_all()).await?;
        tracing::warn!(cleared, "lock table reset by admin");
        Ok(cleared)
    }
}
