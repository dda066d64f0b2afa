use crate::error::ModelError;
use crate::ids::{NodeId, TaskId, TaskVersion};
use chrono::{DateTime, Utc};

/// Maximum length of a task result message.
pub const RESULT_MESSAGE_MAX_LEN: usize = 2000;

/// Kind of batch work a task represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    TestMessage,
    FileProcessing,
    RenderThumbnails,
    RealityCapture,
    PackageTask,
    VolumeCompression,
}

impl TaskType {
    /// Fan-out tasks are processed by several nodes in parallel via folder
    /// work items. Currently only volume compression.
    pub fn is_fan_out(&self) -> bool {
        matches!(self, TaskType::VolumeCompression)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::TestMessage => "test_message",
            TaskType::FileProcessing => "file_processing",
            TaskType::RenderThumbnails => "render_thumbnails",
            TaskType::RealityCapture => "reality_capture",
            TaskType::PackageTask => "package_task",
            TaskType::VolumeCompression => "volume_compression",
        }
    }

    /// Database slugs of every fan-out type, for poll queries.
    pub fn fan_out_slugs() -> Vec<String> {
        [TaskType::VolumeCompression]
            .iter()
            .map(|t| t.as_str().to_string())
            .collect()
    }
}

impl std::str::FromStr for TaskType {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "test_message" => Ok(TaskType::TestMessage),
            "file_processing" => Ok(TaskType::FileProcessing),
            "render_thumbnails" => Ok(TaskType::RenderThumbnails),
            "reality_capture" => Ok(TaskType::RealityCapture),
            "package_task" => Ok(TaskType::PackageTask),
            "volume_compression" => Ok(TaskType::VolumeCompression),
            other => Err(ModelError::UnknownTaskType(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// The task state machine. Everything not listed here is illegal,
    /// including any move out of a terminal state.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(ModelError::UnknownTaskStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of batch work with a lifecycle; single-assignee or fan-out.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Primary assignee, kept for single-node tasks and back-compat. For
    /// fan-out tasks it holds one member of `assigned_node_ids`.
    pub assigned_node_id: Option<NodeId>,
    /// Authoritative assignee list for fan-out tasks.
    pub assigned_node_ids: Vec<NodeId>,
    pub parameters: serde_json::Value,
    pub result_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: TaskVersion,
}

impl Task {
    /// Whether `node_id` is among this task's assignees (primary or list).
    pub fn is_assigned_to(&self, node_id: &NodeId) -> bool {
        self.assigned_node_id.as_ref() == Some(node_id)
            || self.assigned_node_ids.contains(node_id)
    }
}

/// Input for task creation; the server assigns id, status, timestamps and
/// the initial version.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NewTask {
    pub name: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub assigned_node_ids: Vec<NodeId>,
}
