//! Persistence ports and backends.
//!
//! Each entity gets a narrow async repository port. Compound operations that
//! must be atomic under concurrency (lock acquire, folder claim, guarded task
//! updates) are single port methods so every backend can make them
//! linearizable: Postgres with guarded single statements, the memory backend
//! with one mutex-held critical section per call.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use foreman_model::{
    FileLock, FolderItemId, FolderItemStatus, FolderWorkItem, NewTask, Node, NodeId,
    NormalizedPathKey, Task, TaskId, TaskStatus, TaskVersion,
};
use std::sync::Arc;

use crate::error::Result;

/// Node registration payload, applied as an upsert keyed by node id.
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    pub id: NodeId,
    pub name: String,
    pub ip_address: String,
    pub hardware_fingerprint: String,
}

/// Status change applied through the optimistic-concurrency guard.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub new_status: TaskStatus,
    pub result_message: Option<String>,
}

/// Listing filter for tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

/// Folder work item progress report.
#[derive(Debug, Clone)]
pub struct FolderReport {
    pub status: FolderItemStatus,
    pub progress: f64,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
}

#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Upsert by id: insert with `is_available=true`, or refresh
    /// name/ip/fingerprint. Both paths stamp `last_heartbeat = now`.
    async fn register(&self, registration: &NodeRegistration, now: DateTime<Utc>) -> Result<Node>;

    async fn get(&self, id: &NodeId) -> Result<Option<Node>>;

    async fn list(&self, only_available: bool) -> Result<Vec<Node>>;

    /// Refresh liveness; returns false when the node is unknown.
    async fn heartbeat(&self, id: &NodeId, now: DateTime<Utc>) -> Result<bool>;

    /// Returns false when the node is unknown.
    async fn set_available(&self, id: &NodeId, available: bool) -> Result<bool>;

    /// Available nodes whose last heartbeat is older than `cutoff`.
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Node>>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Persist a new Pending task; the server assigns the id and initial
    /// version. The first entry of `assigned_node_ids` becomes the primary
    /// assignee.
    async fn insert(&self, new: &NewTask, now: DateTime<Utc>) -> Result<Task>;

    async fn get(&self, id: TaskId) -> Result<Option<Task>>;

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Delete a task (folder items cascade). Returns false when absent.
    async fn delete(&self, id: TaskId) -> Result<bool>;

    /// Append `node_id` to the assignee list if absent and backfill the
    /// primary assignee if unset. Idempotent per node; a no-op call returns
    /// the task unchanged without bumping the version.
    /// Fails with `NotFound` for unknown tasks.
    async fn add_assignee(&self, id: TaskId, node_id: &NodeId) -> Result<Task>;

    /// Apply a status change only if `expected` matches the persisted
    /// version. Stamps `started_at` on the first move to Running and
    /// `completed_at` on terminal moves, and bumps the version.
    /// Fails with `NotFound` or `VersionConflict { current }`.
    async fn update_status_guarded(
        &self,
        id: TaskId,
        expected: TaskVersion,
        change: &StatusChange,
        now: DateTime<Utc>,
    ) -> Result<Task>;

    /// Move a Running task to the given terminal status. Returns `None` when
    /// the task was not Running, which makes concurrent fan-out completion
    /// checks collapse to exactly one winner.
    async fn complete_if_running(
        &self,
        id: TaskId,
        final_status: TaskStatus,
        result_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>>;

    /// Tasks the node should process now: assigned to it, and either Pending
    /// or Running with a fan-out type.
    async fn pollable_for(&self, node_id: &NodeId) -> Result<Vec<Task>>;

    /// Revert the node's Running single-assignee (non-fan-out) tasks to
    /// Pending with no primary assignee. Returns the reverted tasks.
    async fn revert_running_for(&self, node_id: &NodeId, now: DateTime<Utc>) -> Result<Vec<Task>>;
}

#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// Upsert items keyed by `(task_id, folder_path)`; rows that already
    /// exist keep their status and progress. Returns the task's full item
    /// list afterwards.
    async fn upsert_many(
        &self,
        task_id: TaskId,
        folders: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<Vec<FolderWorkItem>>;

    async fn get(&self, id: FolderItemId) -> Result<Option<FolderWorkItem>>;

    async fn list_for_task(&self, task_id: TaskId) -> Result<Vec<FolderWorkItem>>;

    /// Atomically claim the first Pending item of the task for the node, or
    /// return `None` when no work is available. Concurrent callers receive
    /// disjoint items.
    async fn claim_next(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        node_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FolderWorkItem>>;

    /// Apply a progress report; terminal statuses stamp `completed_at`.
    /// Fails with `NotFound` for unknown items.
    async fn report(
        &self,
        id: FolderItemId,
        report: &FolderReport,
        now: DateTime<Utc>,
    ) -> Result<FolderWorkItem>;

    async fn delete_for_task(&self, task_id: TaskId) -> Result<u64>;

    /// Revert the node's InProgress items to Pending (assignee cleared,
    /// progress kept). Returns how many items were released.
    async fn release_for_node(&self, node_id: &NodeId) -> Result<u64>;
}

#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Race-free acquire: no row or an expired row is taken over, a live row
    /// held by the same node is refreshed, a live row held by another node
    /// loses. Exactly one concurrent caller per path observes `true`.
    async fn try_acquire(
        &self,
        path: &NormalizedPathKey,
        node_id: &NodeId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool>;

    /// Touch `last_updated_at` iff held by `node_id`.
    async fn refresh(
        &self,
        path: &NormalizedPathKey,
        node_id: &NodeId,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete iff held by `node_id`.
    async fn release(&self, path: &NormalizedPathKey, node_id: &NodeId) -> Result<bool>;

    /// Locks still inside their TTL as of `now`.
    async fn list_active(&self, now: DateTime<Utc>, ttl: Duration) -> Result<Vec<FileLock>>;

    /// Delete rows whose last refresh is older than `cutoff`.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn release_all_for(&self, node_id: &NodeId) -> Result<u64>;

    async fn reset_all(&self) -> Result<u64>;
}

/// Bundle of repository handles shared by every service.
#[derive(Clone)]
pub struct Store {
    pub nodes: Arc<dyn NodeRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub folders: Arc<dyn FolderRepository>,
    pub locks: Arc<dyn LockRepository>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// In-memory backend: tests and `--dev` runs without a database.
    pub fn memory() -> Self {
        let backend = Arc::new(memory::MemoryStore::new());
        Store {
            nodes: backend.clone(),
            tasks: backend.clone(),
            folders: backend.clone(),
            locks: backend,
        }
    }

    /// PostgreSQL backend over an existing pool.
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Store {
            nodes: Arc::new(postgres::PostgresNodeRepository::new(pool.clone())),
            tasks: Arc::new(postgres::PostgresTaskRepository::new(pool.clone())),
            folders: Arc::new(postgres::PostgresFolderRepository::new(pool.clone())),
            locks: Arc::new(postgres::PostgresLockRepository::new(pool)),
        }
    }
}
