use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foreman_model::{FolderItemId, FolderItemStatus, FolderWorkItem, NodeId, TaskId};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::store::{FolderReport, FolderRepository};

const FOLDER_COLUMNS: &str = "id, task_id, folder_path, folder_name, status, assigned_node_id, \
     assigned_node_name, progress, created_at, started_at, completed_at, error_message, output_path";

#[derive(Clone, Debug)]
pub struct PostgresFolderRepository {
    pool: PgPool,
}

impl PostgresFolderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FolderRepository for PostgresFolderRepository {
    async fn upsert_many(
        &self,
        task_id: TaskId,
        folders: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<Vec<FolderWorkItem>> {
        let mut tx = self.pool.begin().await?;

        for (path, name) in folders {
            sqlx::query(
                r#"
                INSERT INTO folder_work_items
                    (id, task_id, folder_path, folder_name, status, progress, created_at)
                VALUES ($1, $2, $3, $4, 'pending', 0, $5)
                ON CONFLICT (task_id, folder_path) DO NOTHING
                "#,
            )
            .bind(FolderItemId::new().as_uuid())
            .bind(task_id.as_i64())
            .bind(path)
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.list_for_task(task_id).await
    }

    async fn get(&self, id: FolderItemId) -> Result<Option<FolderWorkItem>> {
        let row = sqlx::query_as::<_, FolderRow>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folder_work_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(FolderWorkItem::try_from).transpose()
    }

    async fn list_for_task(&self, task_id: TaskId) -> Result<Vec<FolderWorkItem>> {
        let rows = sqlx::query_as::<_, FolderRow>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folder_work_items WHERE task_id = $1 \
             ORDER BY created_at, folder_path"
        ))
        .bind(task_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FolderWorkItem::try_from).collect()
    }

    async fn claim_next(
        &self,
        task_id: TaskId,
        node_id: &NodeId,
        node_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FolderWorkItem>> {
        // SKIP LOCKED keeps concurrent claimers from blocking on (or
        // double-claiming) the same row.
        let row = sqlx::query_as::<_, FolderRow>(&format!(
            r#"
            UPDATE folder_work_items
            SET status = 'in_progress',
                assigned_node_id = $2,
                assigned_node_name = $3,
                started_at = $4
            WHERE id = (
                SELECT id FROM folder_work_items
                WHERE task_id = $1 AND status = 'pending'
                ORDER BY created_at, folder_path
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {FOLDER_COLUMNS}
            "#
        ))
        .bind(task_id.as_i64())
        .bind(node_id.as_str())
        .bind(node_name)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FolderWorkItem::try_from).transpose()
    }

    async fn report(
        &self,
        id: FolderItemId,
        report: &FolderReport,
        now: DateTime<Utc>,
    ) -> Result<FolderWorkItem> {
        let row = sqlx::query_as::<_, FolderRow>(&format!(
            r#"
            UPDATE folder_work_items
            SET status = $2,
                progress = $3,
                error_message = COALESCE($4, error_message),
                output_path = COALESCE($5, output_path),
                completed_at = CASE WHEN $2 IN ('completed', 'failed')
                                    THEN $6 ELSE completed_at END
            WHERE id = $1
            RETURNING {FOLDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(report.status.as_str())
        .bind(report.progress)
        .bind(report.error_message.as_deref())
        .bind(report.output_path.as_deref())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(CoreError::not_found(format!("folder item {id}"))),
        }
    }

    async fn delete_for_task(&self, task_id: TaskId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM folder_work_items WHERE task_id = $1")
            .bind(task_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn release_for_node(&self, node_id: &NodeId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE folder_work_items
            SET status = 'pending', assigned_node_id = NULL, assigned_node_name = NULL,
                started_at = NULL
            WHERE assigned_node_id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(node_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct FolderRow {
    id: Uuid,
    task_id: i64,
    folder_path: String,
    folder_name: String,
    status: String,
    assigned_node_id: Option<String>,
    assigned_node_name: Option<String>,
    progress: f64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    output_path: Option<String>,
}

impl TryFrom<FolderRow> for FolderWorkItem {
    type Error = CoreError;

    fn try_from(row: FolderRow) -> Result<FolderWorkItem> {
        let id = row.id;
        let corrupt = move |e: foreman_model::ModelError| {
            CoreError::Internal(format!("corrupt folder row {id}: {e}"))
        };

        Ok(FolderWorkItem {
            id: FolderItemId(row.id),
            task_id: TaskId(row.task_id),
            folder_path: row.folder_path,
            folder_name: row.folder_name,
            status: FolderItemStatus::from_str(&row.status).map_err(corrupt)?,
            assigned_node_id: row
                .assigned_node_id
                .map(NodeId::parse)
                .transpose()
                .map_err(corrupt)?,
            assigned_node_name: row.assigned_node_name,
            progress: row.progress,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            output_path: row.output_path,
        })
    }
}
