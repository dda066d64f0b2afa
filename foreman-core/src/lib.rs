//! # Foreman Core
//!
//! Domain services and persistence for the Foreman dispatch server.
//!
//! ## Overview
//!
//! The core owns the authoritative state of the fleet:
//!
//! - **NodeRegistry**: register/heartbeat, availability, orphan reclamation
//! - **TaskCoordinator**: task lifecycle, assignment, optimistic updates,
//!   fan-out completion aggregation
//! - **FolderProgressTracker**: folder-level sub-progress for fan-out tasks
//! - **LockManager**: advisory file locks keyed by normalized path
//! - **EventBus**: in-process pub/sub feeding the push channel
//! - **Sweeper**: background expiry of stale locks and silent nodes
//!
//! All services operate through the [`store::Store`] ports, which have a
//! PostgreSQL backend for production and an in-memory backend for tests and
//! dev mode.

pub mod api_routes;
pub mod error;
pub mod events;
pub mod folders;
pub mod locks;
pub mod registry;
pub mod retry;
pub mod store;
pub mod sweeper;
pub mod tasks;

pub use error::{CoreError, Result};
pub use events::{EventBus, EventEnvelope};
pub use folders::{FolderProgressTracker, FolderReport};
pub use locks::{LockConfig, LockManager};
pub use registry::{NodeRegistration, NodeRegistry, RegistryConfig};
pub use store::Store;
pub use sweeper::{Sweeper, SweeperConfig};
pub use tasks::{StatusUpdate, TaskCoordinator, TaskFilter};
