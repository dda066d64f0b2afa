use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foreman_model::{Node, NodeId};
use sqlx::PgPool;

use crate::error::{CoreError, Result};
use crate::store::{NodeRegistration, NodeRepository};

const NODE_COLUMNS: &str =
    "id, name, ip_address, hardware_fingerprint, is_available, last_heartbeat";

#[derive(Clone, Debug)]
pub struct PostgresNodeRepository {
    pool: PgPool,
}

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn register(&self, registration: &NodeRegistration, now: DateTime<Utc>) -> Result<Node> {
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            r#"
            INSERT INTO nodes (id, name, ip_address, hardware_fingerprint, is_available, last_heartbeat)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                ip_address = EXCLUDED.ip_address,
                hardware_fingerprint = EXCLUDED.hardware_fingerprint,
                is_available = TRUE,
                last_heartbeat = EXCLUDED.last_heartbeat
            RETURNING {NODE_COLUMNS}
            "#
        ))
        .bind(registration.id.as_str())
        .bind(&registration.name)
        .bind(&registration.ip_address)
        .bind(&registration.hardware_fingerprint)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: &NodeId) -> Result<Option<Node>> {
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Node::try_from).transpose()
    }

    async fn list(&self, only_available: bool) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE ($1 = FALSE OR is_available) ORDER BY id"
        ))
        .bind(only_available)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Node::try_from).collect()
    }

    async fn heartbeat(&self, id: &NodeId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE nodes SET last_heartbeat = $2, is_available = TRUE WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_available(&self, id: &NodeId, available: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE nodes SET is_available = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(available)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE is_available AND last_heartbeat < $1 ORDER BY id"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Node::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: String,
    name: String,
    ip_address: String,
    hardware_fingerprint: String,
    is_available: bool,
    last_heartbeat: DateTime<Utc>,
}

impl TryFrom<NodeRow> for Node {
    type Error = CoreError;

    fn try_from(row: NodeRow) -> Result<Node> {
        Ok(Node {
            id: NodeId::parse(row.id)
                .map_err(|e| CoreError::Internal(format!("corrupt node row: {e}")))?,
            name: row.name,
            ip_address: row.ip_address,
            hardware_fingerprint: row.hardware_fingerprint,
            is_available: row.is_available,
            last_heartbeat: row.last_heartbeat,
        })
    }
}
