use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foreman_model::{NewTask, NodeId, Task, TaskId, TaskStatus, TaskType, TaskVersion};
use sqlx::PgPool;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::store::{StatusChange, TaskFilter, TaskRepository};

const TASK_COLUMNS: &str = "id, name, task_type, status, assigned_node_id, assigned_node_ids, \
     parameters, result_message, created_at, started_at, completed_at, version";

#[derive(Clone, Debug)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn insert(&self, new: &NewTask, now: DateTime<Utc>) -> Result<Task> {
        let assignees: Vec<String> = new
            .assigned_node_ids
            .iter()
            .map(|n| n.as_str().to_string())
            .collect();
        let primary = assignees.first().cloned();

        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            INSERT INTO tasks (name, task_type, status, assigned_node_id, assigned_node_ids,
                               parameters, created_at, version)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, 1)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(new.task_type.as_str())
        .bind(primary)
        .bind(&assignees)
        .bind(&new.parameters)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        self.fetch(id).await
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE ($1::text IS NULL OR status = $1) ORDER BY id"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn delete(&self, id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_assignee(&self, id: TaskId, node_id: &NodeId) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
            SET assigned_node_ids = CASE WHEN $2 = ANY(assigned_node_ids)
                                         THEN assigned_node_ids
                                         ELSE array_append(assigned_node_ids, $2) END,
                assigned_node_id = COALESCE(assigned_node_id, $2),
                version = version + 1
            WHERE id = $1
              AND (assigned_node_id IS NULL OR NOT ($2 = ANY(assigned_node_ids)))
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(node_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            // Already assigned (idempotent no-op), or the task is gone.
            None => self
                .fetch(id)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("task {id}"))),
        }
    }

    async fn update_status_guarded(
        &self,
        id: TaskId,
        expected: TaskVersion,
        change: &StatusChange,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
            SET status = $3,
                result_message = COALESCE($4, result_message),
                started_at = CASE WHEN $3 = 'running'
                                  THEN COALESCE(started_at, $5) ELSE started_at END,
                completed_at = CASE WHEN $3 IN ('completed', 'failed', 'cancelled')
                                    THEN $5 ELSE completed_at END,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(expected.as_i64())
        .bind(change.new_status.as_str())
        .bind(change.result_message.as_deref())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => match self.fetch(id).await? {
                Some(current) => Err(CoreError::VersionConflict {
                    current: Box::new(current),
                }),
                None => Err(CoreError::not_found(format!("task {id}"))),
            },
        }
    }

    async fn complete_if_running(
        &self,
        id: TaskId,
        final_status: TaskStatus,
        result_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
            SET status = $2, result_message = $3, completed_at = $4, version = version + 1
            WHERE id = $1 AND status = 'running'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(final_status.as_str())
        .bind(result_message)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn pollable_for(&self, node_id: &NodeId) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE (assigned_node_id = $1 OR $1 = ANY(assigned_node_ids))
              AND (status = 'pending' OR (status = 'running' AND task_type = ANY($2)))
            ORDER BY created_at, id
            "#
        ))
        .bind(node_id.as_str())
        .bind(TaskType::fan_out_slugs())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn revert_running_for(&self, node_id: &NodeId, _now: DateTime<Utc>) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
            SET status = 'pending', assigned_node_id = NULL, started_at = NULL,
                version = version + 1
            WHERE assigned_node_id = $1 AND status = 'running'
              AND NOT (task_type = ANY($2))
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(node_id.as_str())
        .bind(TaskType::fan_out_slugs())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    name: String,
    task_type: String,
    status: String,
    assigned_node_id: Option<String>,
    assigned_node_ids: Vec<String>,
    parameters: serde_json::Value,
    result_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Task> {
        let id = row.id;
        let corrupt =
            move |e: foreman_model::ModelError| CoreError::Internal(format!("corrupt task row {id}: {e}"));

        Ok(Task {
            id: TaskId(row.id),
            name: row.name,
            task_type: TaskType::from_str(&row.task_type).map_err(corrupt)?,
            status: TaskStatus::from_str(&row.status).map_err(corrupt)?,
            assigned_node_id: row
                .assigned_node_id
                .clone()
                .map(NodeId::parse)
                .transpose()
                .map_err(corrupt)?,
            assigned_node_ids: row
                .assigned_node_ids
                .iter()
                .cloned()
                .map(NodeId::parse)
                .collect::<std::result::Result<_, _>>()
                .map_err(corrupt)?,
            parameters: row.parameters,
            result_message: row.result_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            version: TaskVersion(row.version),
        })
    }
}
