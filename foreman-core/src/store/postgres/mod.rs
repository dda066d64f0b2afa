//! PostgreSQL store backend.
//!
//! Compound atomic operations are guarded single statements (`ON CONFLICT DO
//! UPDATE .. WHERE`, `FOR UPDATE SKIP LOCKED`, `WHERE version = $n`) so the
//! linearizability contracts hold without explicit serializable transactions
//! on the hot paths. Queries are runtime-checked so the crate builds without
//! a live `DATABASE_URL`.

mod folders;
mod locks;
mod nodes;
mod tasks;

pub use folders::PostgresFolderRepository;
pub use locks::PostgresLockRepository;
pub use nodes::PostgresNodeRepository;
pub use tasks::PostgresTaskRepository;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::{CoreError, Result};

/// Connect a pool with the tuning knobs the server expects.
pub async fn connect(connection_string: &str) -> Result<PgPool> {
    let max_connections = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(8)
        });

    let min_connections = std::env::var("DB_MIN_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(2);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .idle_timeout(std::time::Duration::from_secs(600))
        .test_before_acquire(true)
        .connect(connection_string)
        .await
        .map_err(|e| CoreError::Transient(format!("database connection failed: {e}")))?;

    info!(
        max_connections,
        min_connections, "database pool initialized"
    );

    Ok(pool)
}

/// Apply pending migrations. Production startup treats a failure here as
/// fatal; dev mode logs and continues against an already-correct schema.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CoreError::Internal(format!("migration failed: {e}")))?;
    Ok(())
}
