//! Background maintenance: expire stale locks, take silent nodes offline.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::locks::LockManager;
use crate::registry::NodeRegistry;

/// Sweep cadence.
#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    pub lock_sweep_interval: Duration,
    pub node_sweep_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            lock_sweep_interval: Duration::from_secs(60),
            node_sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Periodic maintenance worker. Both sweeps are idempotent, so a missed or
/// doubled tick never corrupts state.
pub struct Sweeper {
    locks: Arc<LockManager>,
    registry: Arc<NodeRegistry>,
    config: SweeperConfig,
    shutdown: Arc<RwLock<bool>>,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Sweeper {
    pub fn new(locks: Arc<LockManager>, registry: Arc<NodeRegistry>, config: SweeperConfig) -> Self {
        Self {
            locks,
            registry,
            config,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn the two background loops.
    pub fn start(self: &Arc<Self>) {
        let lock_sweeper = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = lock_sweeper.config.lock_sweep_interval.as_secs(),
                "lock sweeper started"
            );
            let mut ticker = interval(lock_sweeper.config.lock_sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if *lock_sweeper.shutdown.read().await {
                    info!("lock sweeper shutting down");
                    break;
                }
                if let Err(e) = lock_sweeper.locks.sweep(Utc::now()).await {
                    error!("lock sweep failed: {e}");
                }
            }
        });

        let node_sweeper = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                interval_secs = node_sweeper.config.node_sweep_interval.as_secs(),
                "node sweeper started"
            );
            let mut ticker = interval(node_sweeper.config.node_sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if *node_sweeper.shutdown.read().await {
                    info!("node sweeper shutting down");
                    break;
                }
                if let Err(e) = node_sweeper.registry.sweep_offline(Utc::now()).await {
                    error!("node sweep failed: {e}");
                }
            }
        });
    }

    /// Stop both loops at their next tick.
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("sweeper stop signal sent");
    }
}
