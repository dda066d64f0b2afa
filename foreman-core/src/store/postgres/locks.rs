use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use foreman_model::{FileLock, LockId, NodeId, NormalizedPathKey};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::store::LockRepository;

const LOCK_COLUMNS: &str = "id, normalized_path, holder_node_id, created_at, last_updated_at";

#[derive(Clone, Debug)]
pub struct PostgresLockRepository {
    pool: PgPool,
}

impl PostgresLockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockRepository for PostgresLockRepository {
    async fn try_acquire(
        &self,
        path: &NormalizedPathKey,
        node_id: &NodeId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let cutoff = now - ttl;

        // Single guarded upsert: the conflict arm only fires for the current
        // holder (refresh) or an expired row (takeover), so exactly one of N
        // concurrent callers gets a row back. A live same-holder refresh
        // keeps created_at; a takeover resets it.
        let row = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO file_locks (id, normalized_path, holder_node_id, created_at, last_updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (normalized_path) DO UPDATE SET
                holder_node_id = EXCLUDED.holder_node_id,
                created_at = CASE WHEN file_locks.holder_node_id = EXCLUDED.holder_node_id
                                   AND file_locks.last_updated_at >= $5
                                  THEN file_locks.created_at
                                  ELSE EXCLUDED.created_at END,
                last_updated_at = EXCLUDED.last_updated_at
            WHERE file_locks.holder_node_id = EXCLUDED.holder_node_id
               OR file_locks.last_updated_at < $5
            RETURNING id
            "#,
        )
        .bind(LockId::new().as_uuid())
        .bind(path.as_str())
        .bind(node_id.as_str())
        .bind(now)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn refresh(
        &self,
        path: &NormalizedPathKey,
        node_id: &NodeId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE file_locks SET last_updated_at = $3 \
             WHERE normalized_path = $1 AND holder_node_id = $2",
        )
        .bind(path.as_str())
        .bind(node_id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, path: &NormalizedPathKey, node_id: &NodeId) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM file_locks WHERE normalized_path = $1 AND holder_node_id = $2",
        )
        .bind(path.as_str())
        .bind(node_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self, now: DateTime<Utc>, ttl: Duration) -> Result<Vec<FileLock>> {
        let rows = sqlx::query_as::<_, LockRow>(&format!(
            "SELECT {LOCK_COLUMNS} FROM file_locks WHERE last_updated_at >= $1 \
             ORDER BY normalized_path"
        ))
        .bind(now - ttl)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FileLock::try_from).collect()
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_locks WHERE last_updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn release_all_for(&self, node_id: &NodeId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_locks WHERE holder_node_id = $1")
            .bind(node_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn reset_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_locks")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct LockRow {
    id: Uuid,
    normalized_path: String,
    holder_node_id: String,
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
}

impl TryFrom<LockRow> for FileLock {
    type Error = CoreError;

    fn try_from(row: LockRow) -> Result<FileLock> {
        let id = row.id;
        let corrupt =
            move |detail: String| CoreError::Internal(format!("corrupt lock row {id}: {detail}"));

        Ok(FileLock {
            id: LockId(row.id),
            normalized_path: NormalizedPathKey::from_canonical(row.normalized_path)
                .map_err(|e| corrupt(e.to_string()))?,
            holder_node_id: NodeId::parse(row.holder_node_id)
                .map_err(|e| corrupt(e.to_string()))?,
            created_at: row.created_at,
            last_updated_at: row.last_updated_at,
        })
    }
}
