//! Folder-level sub-progress for fan-out tasks.
//!
//! Work is enumerated up front as folder items; nodes then claim and report
//! items independently, which is what lets several nodes share one task
//! without double-work.

use chrono::Utc;
use foreman_model::{FanOutProgress, FolderItemId, FolderItemStatus, FolderWorkItem, NodeId, TaskId};
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::tasks::TaskCoordinator;

pub use crate::store::FolderReport;

/// Claim/report surface over a task's folder items.
pub struct FolderProgressTracker {
    store: Store,
    tasks: Arc<TaskCoordinator>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for FolderProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderProgressTracker").finish_non_exhaustive()
    }
}

impl FolderProgressTracker {
    pub fn new(store: Store, tasks: Arc<TaskCoordinator>) -> Self {
        Self {
            store,
            tasks,
            retry: RetryPolicy::default(),
        }
    }

    /// Record the initial folder enumeration for a task. Existing rows keep
    /// their status and progress; new paths come in as Pending.
    pub async fn create_or_replace(
        &self,
        task_id: TaskId,
        folder_paths: Vec<String>,
    ) -> Result<Vec<FolderWorkItem>> {
        if folder_paths.iter().any(|p| p.trim().is_empty()) {
            return Err(CoreError::Validation("folder paths cannot be empty".into()));
        }
        // Surfaces NotFound for unknown tasks.
        self.tasks.get(task_id).await?;

        let folders: Vec<(String, String)> = folder_paths
            .into_iter()
            .map(|path| {
                let name = folder_name_of(&path);
                (path, name)
            })
            .collect();

        let items = self
            .store
            .folders
            .upsert_many(task_id, &folders, Utc::now())
            .await?;
        tracing::info!(task = %task_id, count = items.len(), "folder work items recorded");
        Ok(items)
    }

    /// Atomically hand the next Pending folder of the task to a node, or
    /// report no work. Concurrent claimers receive disjoint items.
    pub async fn claim_next(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        node_name: &str,
    ) -> Result<Option<FolderWorkItem>> {
        self.tasks.get(task_id).await?;
        let claimed = self
            .store
            .folders
            .claim_next(task_id, node_id, node_name, Utc::now())
            .await?;
        if let Some(item) = &claimed {
            tracing::info!(task = %task_id, folder = %item.folder_path, node = %node_id, "folder claimed");
        }
        Ok(claimed)
    }

    /// Apply a node's progress report. When the report makes every item of
    /// the task terminal, the task-level fan-out completion check runs.
    pub async fn report(&self, id: FolderItemId, report: FolderReport) -> Result<FolderWorkItem> {
        if !(0.0..=100.0).contains(&report.progress) {
            return Err(CoreError::Validation(
                "progress must be within [0, 100]".into(),
            ));
        }
        if report.status == FolderItemStatus::Pending {
            return Err(CoreError::Validation(
                "a folder item cannot be reported back to pending".into(),
            ));
        }

        let item = self.store.folders.report(id, &report, Utc::now()).await?;

        if item.status.is_terminal() {
            self.tasks.check_and_complete_fan_out(item.task_id).await?;
        }
        Ok(item)
    }

    pub async fn list(&self, task_id: TaskId) -> Result<Vec<FolderWorkItem>> {
        self.tasks.get(task_id).await?;
        self.retry
            .run(|| self.store.folders.list_for_task(task_id))
            .await
    }

    /// Both client-facing projections (mean progress, terminal ratio) from
    /// one row scan.
    pub async fn progress(&self, task_id: TaskId) -> Result<FanOutProgress> {
        let items = self.list(task_id).await?;
        Ok(FanOutProgress::from_items(&items))
    }

    pub async fn delete(&self, task_id: TaskId) -> Result<u64> {
        self.store.folders.delete_for_task(task_id).await
    }
}

fn folder_name_of(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}
