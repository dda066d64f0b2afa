//! Shared wiring for the behaviour tests: every service over a fresh
//! in-memory store.

// Each test binary uses a different slice of the harness.
#![allow(dead_code)]

use foreman_core::events::EventBus;
use foreman_core::folders::FolderProgressTracker;
use foreman_core::locks::{LockConfig, LockManager};
use foreman_core::registry::{NodeRegistration, NodeRegistry, RegistryConfig};
use foreman_core::store::Store;
use foreman_core::tasks::TaskCoordinator;
use foreman_model::{NewTask, Node, NodeId, TaskType};
use std::sync::Arc;

pub struct Harness {
    pub store: Store,
    pub events: EventBus,
    pub locks: Arc<LockManager>,
    pub tasks: Arc<TaskCoordinator>,
    pub folders: Arc<FolderProgressTracker>,
    pub registry: Arc<NodeRegistry>,
}

pub fn harness() -> Harness {
    harness_with(LockConfig::default(), RegistryConfig::default())
}

pub fn harness_with(lock_config: LockConfig, registry_config: RegistryConfig) -> Harness {
    let store = Store::memory();
    let events = EventBus::new(256);
    let locks = Arc::new(LockManager::new(store.clone(), lock_config));
    let tasks = Arc::new(TaskCoordinator::new(store.clone(), events.clone()));
    let folders = Arc::new(FolderProgressTracker::new(store.clone(), tasks.clone()));
    let registry = Arc::new(NodeRegistry::new(
        store.clone(),
        events.clone(),
        locks.clone(),
        tasks.clone(),
        registry_config,
    ));

    Harness {
        store,
        events,
        locks,
        tasks,
        folders,
        registry,
    }
}

pub fn node_id(value: &str) -> NodeId {
    NodeId::parse(value).expect("valid node id")
}

pub async fn register_node(harness: &Harness, id: &str) -> Node {
    harness
        .registry
        .register(NodeRegistration {
            id: node_id(id),
            name: format!("worker {id}"),
            ip_address: "10.0.0.7".into(),
            hardware_fingerprint: format!("fp-{id}"),
        })
        .await
        .expect("registration succeeds")
}

pub fn new_task(name: &str, task_type: TaskType, assignees: &[&str]) -> NewTask {
    NewTask {
        name: name.to_string(),
        task_type,
        parameters: serde_json::json!({}),
        assigned_node_ids: assignees.iter().map(|n| node_id(n)).collect(),
    }
}
