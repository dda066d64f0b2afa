use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use foreman_core::tasks::{StatusUpdate, TaskFilter};
use foreman_model::{FanOutProgress, NewTask, Task, TaskId, TaskStatus, TaskType, TaskVersion};
use serde::Deserialize;
use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::handlers::{bounded, parse_body, parse_node_id};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(rename = "type", alias = "task_type")]
    pub task_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub assigned_node_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: String,
    #[serde(default)]
    pub result_message: Option<String>,
    pub version: i64,
    /// Identity of the reporting worker; admin updates omit it.
    #[serde(default, alias = "nodeId")]
    pub node_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(rename = "nodeId", alias = "node_id")]
    pub node_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressReportRequest {
    pub progress: f64,
    #[serde(default, alias = "nodeId")]
    pub node_id: Option<String>,
}

fn parse_task_type(raw: &str) -> Result<TaskType, AppError> {
    TaskType::from_str(raw).map_err(|e| AppError::bad_request(e.to_string()))
}

fn parse_task_status(raw: &str) -> Result<TaskStatus, AppError> {
    TaskStatus::from_str(raw).map_err(|e| AppError::bad_request(e.to_string()))
}

pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let request = parse_body(body)?;
    let task_type = parse_task_type(&request.task_type)?;
    let assigned_node_ids = request
        .assigned_node_ids
        .iter()
        .map(|raw| parse_node_id(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let task = bounded(
        &state,
        state.tasks.create(NewTask {
            name: request.name,
            task_type,
            parameters: request.parameters,
            assigned_node_ids,
        }),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let status = query
        .status
        .as_deref()
        .map(parse_task_status)
        .transpose()?;
    let tasks = bounded(&state, state.tasks.list(TaskFilter { status })).await?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Task>> {
    let task = bounded(&state, state.tasks.get(TaskId(id))).await?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    bounded(&state, state.tasks.delete(TaskId(id))).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_task_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateTaskStatusRequest>, JsonRejection>,
) -> AppResult<Json<Task>> {
    let request = parse_body(body)?;
    let update = StatusUpdate {
        new_status: parse_task_status(&request.status)?,
        result_message: request.result_message,
        expected_version: TaskVersion(request.version),
        reporter: request
            .node_id
            .as_deref()
            .map(parse_node_id)
            .transpose()?,
    };

    let task = bounded(&state, state.tasks.update_status(TaskId(id), update)).await?;
    Ok(Json(task))
}

pub async fn assign_task(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(i64, String)>,
) -> AppResult<StatusCode> {
    let node_id = parse_node_id(&node_id)?;
    bounded(&state, state.tasks.assign(TaskId(id), &node_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn poll_for_node(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let node_id = parse_node_id(&query.node_id)?;
    let tasks = bounded(&state, state.tasks.poll_for_node(&node_id)).await?;
    Ok(Json(tasks))
}

pub async fn task_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FanOutProgress>> {
    let progress = bounded(&state, state.folders.progress(TaskId(id))).await?;
    Ok(Json(progress))
}

pub async fn report_task_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<ProgressReportRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let request = parse_body(body)?;
    let node_id = request
        .node_id
        .as_deref()
        .map(parse_node_id)
        .transpose()?;
    bounded(
        &state,
        state
            .tasks
            .report_progress(TaskId(id), node_id, request.progress),
    )
    .await?;
    Ok(StatusCode::ACCEPTED)
}
