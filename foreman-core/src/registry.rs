//! Node catalog, liveness, and orphan reclamation.

use chrono::{DateTime, Duration, Utc};
use foreman_model::{DisconnectReason, Node, NodeId, ServerEvent};
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::events::EventBus;
use crate::locks::LockManager;
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::tasks::TaskCoordinator;

pub use crate::store::NodeRegistration;

/// Liveness policy.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Silence window after which an available node is considered offline.
    pub heartbeat_timeout: std::time::Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: std::time::Duration::from_secs(2 * 60),
        }
    }
}

/// Register/heartbeat surface plus the staleness policy that reclaims a
/// silent node's work.
pub struct NodeRegistry {
    store: Store,
    events: EventBus,
    locks: Arc<LockManager>,
    tasks: Arc<TaskCoordinator>,
    retry: RetryPolicy,
    heartbeat_timeout: Duration,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .finish_non_exhaustive()
    }
}

impl NodeRegistry {
    pub fn new(
        store: Store,
        events: EventBus,
        locks: Arc<LockManager>,
        tasks: Arc<TaskCoordinator>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            events,
            locks,
            tasks,
            retry: RetryPolicy::default(),
            heartbeat_timeout: Duration::from_std(config.heartbeat_timeout)
                .unwrap_or_else(|_| Duration::minutes(2)),
        }
    }

    /// Upsert by node id. Insert and update both mark the node available and
    /// stamp a fresh heartbeat.
    pub async fn register(&self, registration: NodeRegistration) -> Result<Node> {
        if registration.name.trim().is_empty() {
            return Err(CoreError::Validation("node name cannot be empty".into()));
        }

        let node = self
            .retry
            .run(|| self.store.nodes.register(&registration, Utc::now()))
            .await?;
        tracing::info!(node = %node.id, ip = %node.ip_address, "node registered");
        self.events.publish(ServerEvent::NodeRegistered {
            node_id: node.id.clone(),
            name: node.name.clone(),
        });
        Ok(node)
    }

    /// Refresh liveness; unknown nodes must re-register first.
    pub async fn heartbeat(&self, node_id: &NodeId) -> Result<()> {
        let known = self
            .retry
            .run(|| self.store.nodes.heartbeat(node_id, Utc::now()))
            .await?;
        if !known {
            return Err(CoreError::not_found(format!("node {node_id}")));
        }
        Ok(())
    }

    pub async fn get(&self, node_id: &NodeId) -> Result<Node> {
        self.retry
            .run(|| self.store.nodes.get(node_id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("node {node_id}")))
    }

    pub async fn list_available(&self) -> Result<Vec<Node>> {
        self.retry.run(|| self.store.nodes.list(true)).await
    }

    pub async fn list_all(&self) -> Result<Vec<Node>> {
        self.retry.run(|| self.store.nodes.list(false)).await
    }

    /// Admin removal from rotation. Visible side effects (released locks,
    /// reverted tasks) make this the one non-idempotent-looking operation,
    /// but repeating it is safe: the reclamation queries simply find nothing
    /// left to do.
    pub async fn disconnect(&self, node_id: &NodeId) -> Result<()> {
        self.get(node_id).await?;
        self.store.nodes.set_available(node_id, false).await?;
        self.reclaim(node_id, DisconnectReason::Admin).await?;
        tracing::info!(node = %node_id, "node disconnected by admin");
        self.events.publish(ServerEvent::NodeDisconnected {
            node_id: node_id.clone(),
            reason: DisconnectReason::Admin,
        });
        Ok(())
    }

    /// Staleness sweep: every available node silent for longer than the
    /// heartbeat timeout goes offline and has its work reclaimed. Returns
    /// how many nodes were transitioned.
    pub async fn sweep_offline(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - self.heartbeat_timeout;
        let stale = self
            .retry
            .run(|| self.store.nodes.list_stale(cutoff))
            .await?;

        for node in &stale {
            tracing::warn!(
                node = %node.id,
                last_heartbeat = %node.last_heartbeat,
                "node went silent, marking offline"
            );
            self.store.nodes.set_available(&node.id, false).await?;
            self.reclaim(&node.id, DisconnectReason::HeartbeatTimeout)
                .await?;
            self.events.publish(ServerEvent::NodeDisconnected {
                node_id: node.id.clone(),
                reason: DisconnectReason::HeartbeatTimeout,
            });
        }
        Ok(stale.len())
    }

    /// Release locks, revert Running single-assignee tasks, and free
    /// InProgress folder items held by the node.
    async fn reclaim(&self, node_id: &NodeId, reason: DisconnectReason) -> Result<()> {
        let released_locks = self.locks.release_all_for(node_id).await?;
        let reverted = self.tasks.reclaim_from_node(node_id, reason).await?;
        let released_folders = self.store.folders.release_for_node(node_id).await?;

        if released_locks > 0 || !reverted.is_empty() || released_folders > 0 {
            tracing::info!(
                node = %node_id,
                released_locks,
                reverted_tasks = reverted.len(),
                released_folders,
                "node work reclaimed"
            );
        }
        Ok(())
    }
}
