use foreman_core::events::EventBus;
use foreman_core::folders::FolderProgressTracker;
use foreman_core::locks::{LockConfig, LockManager};
use foreman_core::registry::{NodeRegistry, RegistryConfig};
use foreman_core::store::Store;
use foreman_core::sweeper::{Sweeper, SweeperConfig};
use foreman_core::tasks::TaskCoordinator;
use std::sync::Arc;

use crate::infra::config::Config;
use crate::websocket::ConnectionManager;

/// Server application state: every domain service wired over one store.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub events: EventBus,
    pub registry: Arc<NodeRegistry>,
    pub lock_manager: Arc<LockManager>,
    pub tasks: Arc<TaskCoordinator>,
    pub folders: Arc<FolderProgressTracker>,
    pub connections: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Store) -> Self {
        let events = EventBus::default();

        let lock_manager = Arc::new(LockManager::new(
            store.clone(),
            LockConfig {
                ttl: config.lock_ttl,
            },
        ));
        let tasks = Arc::new(TaskCoordinator::new(store.clone(), events.clone()));
        let folders = Arc::new(FolderProgressTracker::new(store.clone(), tasks.clone()));
        let registry = Arc::new(NodeRegistry::new(
            store.clone(),
            events.clone(),
            lock_manager.clone(),
            tasks.clone(),
            RegistryConfig {
                heartbeat_timeout: config.heartbeat_timeout,
            },
        ));

        AppState {
            config,
            store,
            events,
            registry,
            lock_manager,
            tasks,
            folders,
            connections: Arc::new(ConnectionManager::new()),
        }
    }

    /// Build and start the background sweeper for this state.
    pub fn start_sweeper(&self) -> Arc<Sweeper> {
        let sweeper = Arc::new(Sweeper::new(
            self.lock_manager.clone(),
            self.registry.clone(),
            SweeperConfig {
                lock_sweep_interval: self.config.lock_sweep_interval,
                node_sweep_interval: self.config.node_sweep_interval,
            },
        ));
        sweeper.start();
        sweeper
    }
}
