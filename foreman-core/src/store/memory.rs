//! In-memory store backend.
//!
//! One mutex around the whole state makes every port method a single
//! critical section, which is exactly the serializable-transaction guarantee
//! the compound operations need. Used by the test suite and by dev-mode runs
//! without a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use foreman_model::{
    FileLock, FolderItemId, FolderItemStatus, FolderWorkItem, LockId, NewTask, Node, NodeId,
    NormalizedPathKey, Task, TaskId, TaskStatus, TaskVersion,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{CoreError, Result};

use super::{
    FolderReport, FolderRepository, LockRepository, NodeRegistration, NodeRepository, StatusChange,
    TaskFilter, TaskRepository,
};

#[derive(Default)]
struct MemState {
    nodes: BTreeMap<String, Node>,
    tasks: BTreeMap<i64, Task>,
    next_task_id: i64,
    folders: BTreeMap<Uuid, FolderWorkItem>,
    locks: BTreeMap<String, FileLock>,
}

/// Mutex-guarded state map implementing every repository port.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemState>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for MemoryStore {
    async fn register(&self, registration: &NodeRegistration, now: DateTime<Utc>) -> Result<Node> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .entry(registration.id.as_str().to_string())
            .and_modify(|existing| {
                existing.name = registration.name.clone();
                existing.ip_address = registration.ip_address.clone();
                existing.hardware_fingerprint = registration.hardware_fingerprint.clone();
                existing.is_available = true;
                existing.last_heartbeat = now;
            })
            .or_insert_with(|| Node {
                id: registration.id.clone(),
                name: registration.name.clone(),
                ip_address: registration.ip_address.clone(),
                hardware_fingerprint: registration.hardware_fingerprint.clone(),
                is_available: true,
                last_heartbeat: now,
            });
        Ok(node.clone())
    }

    async fn get(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(self.state.lock().nodes.get(id.as_str()).cloned())
    }

    async fn list(&self, only_available: bool) -> Result<Vec<Node>> {
        let state = self.state.lock();
        Ok(state
            .nodes
            .values()
            .filter(|n| !only_available || n.is_available)
            .cloned()
            .collect())
    }

    async fn heartbeat(&self, id: &NodeId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock();
        match state.nodes.get_mut(id.as_str()) {
            Some(node) => {
                node.last_heartbeat = now;
                node.is_available = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_available(&self, id: &NodeId, available: bool) -> Result<bool> {
        let mut state = self.state.lock();
        match state.nodes.get_mut(id.as_str()) {
            Some(node) => {
                node.is_available = available;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Node>> {
        let state = self.state.lock();
        Ok(state
            .nodes
            .values()
            .filter(|n| n.is_available && n.last_heartbeat < cutoff)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn insert(&self, new: &NewTask, now: DateTime<Utc>) -> Result<Task> {
        let mut state = self.state.lock();
        state.next_task_id += 1;
        let id = TaskId(state.next_task_id);
        let task = Task {
            id,
            name: new.name.clone(),
            task_type: new.task_type,
            status: TaskStatus::Pending,
            assigned_node_id: new.assigned_node_ids.first().cloned(),
            assigned_node_ids: new.assigned_node_ids.clone(),
            parameters: new.parameters.clone(),
            result_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            version: TaskVersion::INITIAL,
        };
        state.tasks.insert(id.as_i64(), task.clone());
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.state.lock().tasks.get(&id.as_i64()).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let state = self.state.lock();
        Ok(state
            .tasks
            .values()
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: TaskId) -> Result<bool> {
        let mut state = self.state.lock();
        let removed = state.tasks.remove(&id.as_i64()).is_some();
        if removed {
            state.folders.retain(|_, item| item.task_id != id);
        }
        Ok(removed)
    }

    async fn add_assignee(&self, id: TaskId, node_id: &NodeId) -> Result<Task> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(&id.as_i64())
            .ok_or_else(|| CoreError::not_found(format!("task {id}")))?;

        let already_listed = task.assigned_node_ids.contains(node_id);
        if already_listed && task.assigned_node_id.is_some() {
            return Ok(task.clone());
        }

        if !already_listed {
            task.assigned_node_ids.push(node_id.clone());
        }
        if task.assigned_node_id.is_none() {
            task.assigned_node_id = Some(node_id.clone());
        }
        task.version = task.version.next();
        Ok(task.clone())
    }

    async fn update_status_guarded(
        &self,
        id: TaskId,
        expected: TaskVersion,
        change: &StatusChange,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(&id.as_i64())
            .ok_or_else(|| CoreError::not_found(format!("task {id}")))?;

        if task.version != expected {
            return Err(CoreError::VersionConflict {
                current: Box::new(task.clone()),
            });
        }

        task.status = change.new_status;
        if let Some(message) = &change.result_message {
            task.result_message = Some(message.clone());
        }
        if change.new_status == TaskStatus::Running && task.started_at.is_none() {
            task.started_at = Some(now);
        }
        if change.new_status.is_terminal() {
            task.completed_at = Some(now);
        }
        task.version = task.version.next();
        Ok(task.clone())
    }

    async fn complete_if_running(
        &self,
        id: TaskId,
        final_status: TaskStatus,
        result_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(&id.as_i64()) else {
            return Ok(None);
        };
        if task.status != TaskStatus::Running {
            return Ok(None);
        }
        task.status = final_status;
        task.result_message = result_message;
        task.completed_at = Some(now);
        task.version = task.version.next();
        Ok(Some(task.clone()))
    }

    async fn pollable_for(&self, node_id: &NodeId) -> Result<Vec<Task>> {
        let state = self.state.lock();
        Ok(state
            .tasks
            .values()
            .filter(|t| {
                t.is_assigned_to(node_id)
                    && (t.status == TaskStatus::Pending
                        || (t.status == TaskStatus::Running && t.task_type.is_fan_out()))
            })
            .cloned()
            .collect())
    }

    async fn revert_running_for(
        &self,
        node_id: &NodeId,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let mut state = self.state.lock();
        let mut reverted = Vec::new();
        for task in state.tasks.values_mut() {
            if task.status == TaskStatus::Running
                && !task.task_type.is_fan_out()
                && task.assigned_node_id.as_ref() == Some(node_id)
            {
                task.status = TaskStatus::Pending;
                task.assigned_node_id = None;
                task.started_at = None;
                task.version = task.version.next();
                reverted.push(task.clone());
            }
        }
        Ok(reverted)
    }
}

#[async_trait]
impl FolderRepository for MemoryStore {
    async fn upsert_many(
        &self,
        task_id: TaskId,
        folders: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<Vec<FolderWorkItem>> {
        let mut state = self.state.lock();
        for (path, name) in folders {
            let exists = state
                .folders
                .values()
                .any(|item| item.task_id == task_id && &item.folder_path == path);
            if exists {
                continue;
            }
            let id = FolderItemId::new();
            state.folders.insert(
                *id.as_uuid(),
                FolderWorkItem {
                    id,
                    task_id,
                    folder_path: path.clone(),
                    folder_name: name.clone(),
                    status: FolderItemStatus::Pending,
                    assigned_node_id: None,
                    assigned_node_name: None,
                    progress: 0.0,
                    created_at: now,
                    started_at: None,
                    completed_at: None,
                    error_message: None,
                    output_path: None,
                },
            );
        }
        Ok(items_for_task(&state, task_id))
    }

    async fn get(&self, id: FolderItemId) -> Result<Option<FolderWorkItem>> {
        Ok(self.state.lock().folders.get(id.as_uuid()).cloned())
    }

    async fn list_for_task(&self, task_id: TaskId) -> Result<Vec<FolderWorkItem>> {
        Ok(items_for_task(&self.state.lock(), task_id))
    }

    async fn claim_next(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        node_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FolderWorkItem>> {
        let mut state = self.state.lock();
        let next = state
            .folders
            .values()
            .filter(|item| item.task_id == task_id && item.status == FolderItemStatus::Pending)
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.folder_path.cmp(&b.folder_path))
            })
            .map(|item| *item.id.as_uuid());

        let Some(key) = next else {
            return Ok(None);
        };
        let Some(item) = state.folders.get_mut(&key) else {
            return Ok(None);
        };
        item.status = FolderItemStatus::InProgress;
        item.assigned_node_id = Some(node_id.clone());
        item.assigned_node_name = Some(node_name.to_string());
        item.started_at = Some(now);
        Ok(Some(item.clone()))
    }

    async fn report(
        &self,
        id: FolderItemId,
        report: &FolderReport,
        now: DateTime<Utc>,
    ) -> Result<FolderWorkItem> {
        let mut state = self.state.lock();
        let item = state
            .folders
            .get_mut(id.as_uuid())
            .ok_or_else(|| CoreError::not_found(format!("folder item {id}")))?;

        item.status = report.status;
        item.progress = report.progress;
        if let Some(error) = &report.error_message {
            item.error_message = Some(error.clone());
        }
        if let Some(output) = &report.output_path {
            item.output_path = Some(output.clone());
        }
        if report.status.is_terminal() {
            item.completed_at = Some(now);
        }
        Ok(item.clone())
    }

    async fn delete_for_task(&self, task_id: TaskId) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.folders.len();
        state.folders.retain(|_, item| item.task_id != task_id);
        Ok((before - state.folders.len()) as u64)
    }

    async fn release_for_node(&self, node_id: &NodeId) -> Result<u64> {
        let mut state = self.state.lock();
        let mut released = 0;
        for item in state.folders.values_mut() {
            if item.status == FolderItemStatus::InProgress
                && item.assigned_node_id.as_ref() == Some(node_id)
            {
                item.status = FolderItemStatus::Pending;
                item.assigned_node_id = None;
                item.assigned_node_name = None;
                item.started_at = None;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[async_trait]
impl LockRepository for MemoryStore {
    async fn try_acquire(
        &self,
        path: &NormalizedPathKey,
        node_id: &NodeId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        match state.locks.get_mut(path.as_str()) {
            None => {
                state.locks.insert(
                    path.as_str().to_string(),
                    FileLock {
                        id: LockId::new(),
                        normalized_path: path.clone(),
                        holder_node_id: node_id.clone(),
                        created_at: now,
                        last_updated_at: now,
                    },
                );
                Ok(true)
            }
            Some(lock) if !lock.is_expired(now, ttl) => {
                if &lock.holder_node_id == node_id {
                    // Re-entrant acquire by the current holder refreshes.
                    lock.last_updated_at = now;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Some(lock) => {
                // Expired row: take it over, resetting the acquire time.
                lock.holder_node_id = node_id.clone();
                lock.created_at = now;
                lock.last_updated_at = now;
                Ok(true)
            }
        }
    }

    async fn refresh(
        &self,
        path: &NormalizedPathKey,
        node_id: &NodeId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        match state.locks.get_mut(path.as_str()) {
            Some(lock) if &lock.holder_node_id == node_id => {
                lock.last_updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, path: &NormalizedPathKey, node_id: &NodeId) -> Result<bool> {
        let mut state = self.state.lock();
        let held = state
            .locks
            .get(path.as_str())
            .is_some_and(|lock| &lock.holder_node_id == node_id);
        if held {
            state.locks.remove(path.as_str());
        }
        Ok(held)
    }

    async fn list_active(&self, now: DateTime<Utc>, ttl: Duration) -> Result<Vec<FileLock>> {
        let state = self.state.lock();
        Ok(state
            .locks
            .values()
            .filter(|lock| !lock.is_expired(now, ttl))
            .cloned()
            .collect())
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.locks.len();
        state.locks.retain(|_, lock| lock.last_updated_at >= cutoff);
        Ok((before - state.locks.len()) as u64)
    }

    async fn release_all_for(&self, node_id: &NodeId) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.locks.len();
        state
            .locks
            .retain(|_, lock| &lock.holder_node_id != node_id);
        Ok((before - state.locks.len()) as u64)
    }

    async fn reset_all(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let count = state.locks.len() as u64;
        state.locks.clear();
        Ok(count)
    }
}

fn items_for_task(state: &MemState, task_id: TaskId) -> Vec<FolderWorkItem> {
    let mut items: Vec<FolderWorkItem> = state
        .folders
        .values()
        .filter(|item| item.task_id == task_id)
        .cloned()
        .collect();
    items.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.folder_path.cmp(&b.folder_path))
    });
    items
}
