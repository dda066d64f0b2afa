//! Task lifecycle, assignment, and the fan-out completion rule.

use chrono::Utc;
use foreman_model::{
    DisconnectReason, FanOutProgress, NewTask, NodeId, ServerEvent, Task, TaskId, TaskStatus,
    TaskVersion, task::RESULT_MESSAGE_MAX_LEN,
};

use crate::error::{CoreError, Result};
use crate::events::EventBus;
use crate::retry::RetryPolicy;
use crate::store::{StatusChange, Store};

pub use crate::store::TaskFilter;

/// A requested status transition, carrying the reader's version token.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub new_status: TaskStatus,
    pub result_message: Option<String>,
    pub expected_version: TaskVersion,
    /// Set when a worker node reports; admin/operator updates pass `None`
    /// and skip the assignment check.
    pub reporter: Option<NodeId>,
}

/// Task CRUD, assignment, concurrency-safe status transitions, and fan-out
/// completion aggregation.
pub struct TaskCoordinator {
    store: Store,
    events: EventBus,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TaskCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCoordinator").finish_non_exhaustive()
    }
}

impl TaskCoordinator {
    pub fn new(store: Store, events: EventBus) -> Self {
        Self {
            store,
            events,
            retry: RetryPolicy::default(),
        }
    }

    /// Persist a new Pending task and announce it.
    pub async fn create(&self, new: NewTask) -> Result<Task> {
        if new.name.trim().is_empty() {
            return Err(CoreError::Validation("task name cannot be empty".into()));
        }

        let task = self.store.tasks.insert(&new, Utc::now()).await?;
        tracing::info!(task = %task.id, task_type = %task.task_type, "task created");
        self.events.publish(ServerEvent::TaskCreated {
            task_id: task.id,
            name: task.name.clone(),
        });
        Ok(task)
    }

    pub async fn get(&self, id: TaskId) -> Result<Task> {
        self.retry
            .run(|| self.store.tasks.get(id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("task {id}")))
    }

    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.retry.run(|| self.store.tasks.list(&filter)).await
    }

    /// Delete a task; folder items cascade with it.
    pub async fn delete(&self, id: TaskId) -> Result<()> {
        if !self.store.tasks.delete(id).await? {
            return Err(CoreError::not_found(format!("task {id}")));
        }
        tracing::info!(task = %id, "task deleted");
        Ok(())
    }

    /// Add a node to the task's assignee set. Idempotent per node; never
    /// changes status.
    pub async fn assign(&self, id: TaskId, node_id: &NodeId) -> Result<Task> {
        let task = self.store.tasks.add_assignee(id, node_id).await?;
        self.events.publish(ServerEvent::TaskAssigned {
            task_id: task.id,
            node_id: node_id.clone(),
        });
        Ok(task)
    }

    /// Versioned status transition per the task state machine.
    ///
    /// Failure order follows the contract: unknown task, then forbidden
    /// reporter, then version conflict (carrying the current task), then
    /// transition legality.
    pub async fn update_status(&self, id: TaskId, update: StatusUpdate) -> Result<Task> {
        if let Some(message) = &update.result_message
            && message.len() > RESULT_MESSAGE_MAX_LEN
        {
            return Err(CoreError::Validation(format!(
                "result message cannot exceed {RESULT_MESSAGE_MAX_LEN} characters"
            )));
        }

        let current = self.get(id).await?;

        if let Some(reporter) = &update.reporter
            && !current.is_assigned_to(reporter)
        {
            return Err(CoreError::Forbidden(format!(
                "node {reporter} is not assigned to task {id}"
            )));
        }

        if current.version != update.expected_version {
            return Err(CoreError::VersionConflict {
                current: Box::new(current),
            });
        }

        if !current.status.can_transition_to(update.new_status) {
            return Err(CoreError::InvalidTransition {
                from: current.status,
                to: update.new_status,
            });
        }

        let change = StatusChange {
            new_status: update.new_status,
            result_message: update.result_message,
        };
        // The guarded write re-checks the version, so a concurrent winner
        // turns this into a VersionConflict rather than a lost update.
        let updated = self
            .store
            .tasks
            .update_status_guarded(id, update.expected_version, &change, Utc::now())
            .await?;

        tracing::info!(task = %id, from = %current.status, to = %updated.status, "task status changed");
        self.events.publish(ServerEvent::TaskStatusChanged {
            task_id: id,
            old: current.status,
            new: updated.status,
            result_message: updated.result_message.clone(),
        });
        Ok(updated)
    }

    /// Work the node should pick up now: its Pending tasks, plus Running
    /// fan-out tasks it belongs to (a late-joining second node sees an
    /// already-started volume compression this way).
    pub async fn poll_for_node(&self, node_id: &NodeId) -> Result<Vec<Task>> {
        self.retry
            .run(|| self.store.tasks.pollable_for(node_id))
            .await
    }

    /// Announce worker-side progress. Nothing is persisted at task level;
    /// fan-out projections come from folder rows.
    pub async fn report_progress(
        &self,
        id: TaskId,
        node_id: Option<NodeId>,
        progress: f64,
    ) -> Result<()> {
        if !(0.0..=100.0).contains(&progress) {
            return Err(CoreError::Validation(
                "progress must be within [0, 100]".into(),
            ));
        }
        // Surface NotFound before announcing progress for a ghost task.
        self.get(id).await?;
        self.events.publish(ServerEvent::TaskProgressChanged {
            task_id: id,
            node_id,
            progress,
        });
        Ok(())
    }

    /// Complete a Running fan-out task once every folder item is terminal.
    ///
    /// Policy: any Failed folder fails the whole task with an aggregate
    /// message; otherwise it completes. Concurrent calls collapse to one
    /// winner through the status-guarded write, so the terminal event is
    /// emitted exactly once. Safe to call at any time.
    pub async fn check_and_complete_fan_out(&self, id: TaskId) -> Result<Option<Task>> {
        let task = self.get(id).await?;
        if !task.task_type.is_fan_out() || task.status != TaskStatus::Running {
            return Ok(None);
        }

        let items = self.store.folders.list_for_task(id).await?;
        let progress = FanOutProgress::from_items(&items);
        if !progress.all_terminal() {
            return Ok(None);
        }

        let (final_status, message) = if progress.failed > 0 {
            let failed_names: Vec<&str> = items
                .iter()
                .filter(|i| i.status == foreman_model::FolderItemStatus::Failed)
                .map(|i| i.folder_name.as_str())
                .collect();
            (
                TaskStatus::Failed,
                format!(
                    "{} of {} folder(s) failed: {}",
                    progress.failed,
                    progress.total,
                    failed_names.join(", ")
                ),
            )
        } else {
            (
                TaskStatus::Completed,
                format!("{} folder(s) completed", progress.total),
            )
        };

        let completed = self
            .store
            .tasks
            .complete_if_running(id, final_status, Some(message), Utc::now())
            .await?;

        if let Some(updated) = &completed {
            tracing::info!(task = %id, status = %updated.status, "fan-out task finished");
            self.events.publish(ServerEvent::TaskStatusChanged {
                task_id: id,
                old: TaskStatus::Running,
                new: updated.status,
                result_message: updated.result_message.clone(),
            });
        }
        Ok(completed)
    }

    /// Revert a lost node's Running single-assignee tasks to Pending and
    /// announce each reclamation. Used by admin disconnect and the sweeper.
    pub(crate) async fn reclaim_from_node(
        &self,
        node_id: &NodeId,
        reason: DisconnectReason,
    ) -> Result<Vec<Task>> {
        let reverted = self
            .store
            .tasks
            .revert_running_for(node_id, Utc::now())
            .await?;
        for task in &reverted {
            tracing::info!(task = %task.id, node = %node_id, ?reason, "running task reverted to pending");
            self.events.publish(ServerEvent::TaskStatusChanged {
                task_id: task.id,
                old: TaskStatus::Running,
                new: TaskStatus::Pending,
                result_message: None,
            });
        }
        Ok(reverted)
    }
}
