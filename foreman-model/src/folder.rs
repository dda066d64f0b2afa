use crate::error::ModelError;
use crate::ids::{FolderItemId, NodeId, TaskId};
use chrono::{DateTime, Utc};

/// Lifecycle state of a folder work item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FolderItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl FolderItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FolderItemStatus::Completed | FolderItemStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FolderItemStatus::Pending => "pending",
            FolderItemStatus::InProgress => "in_progress",
            FolderItemStatus::Completed => "completed",
            FolderItemStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for FolderItemStatus {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(FolderItemStatus::Pending),
            "in_progress" => Ok(FolderItemStatus::InProgress),
            "completed" => Ok(FolderItemStatus::Completed),
            "failed" => Ok(FolderItemStatus::Failed),
            other => Err(ModelError::UnknownFolderStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for FolderItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One claimable unit of a fan-out task.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FolderWorkItem {
    pub id: FolderItemId,
    pub task_id: TaskId,
    /// Absolute or server-relative path; unique per task.
    pub folder_path: String,
    pub folder_name: String,
    pub status: FolderItemStatus,
    pub assigned_node_id: Option<NodeId>,
    pub assigned_node_name: Option<String>,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
}

/// Cheap aggregate projections over a task's folder items.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FanOutProgress {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean of per-folder progress, 0 when there are no folders.
    pub mean_progress: f64,
    /// Fraction of folders in a terminal state, 0 when there are no folders.
    pub terminal_ratio: f64,
}

impl FanOutProgress {
    pub fn from_items(items: &[FolderWorkItem]) -> Self {
        let total = items.len();
        let mut pending = 0;
        let mut in_progress = 0;
        let mut completed = 0;
        let mut failed = 0;
        let mut progress_sum = 0.0;

        for item in items {
            progress_sum += item.progress;
            match item.status {
                FolderItemStatus::Pending => pending += 1,
                FolderItemStatus::InProgress => in_progress += 1,
                FolderItemStatus::Completed => completed += 1,
                FolderItemStatus::Failed => failed += 1,
            }
        }

        let (mean_progress, terminal_ratio) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                progress_sum / total as f64,
                (completed + failed) as f64 / total as f64,
            )
        };

        FanOutProgress {
            total,
            pending,
            in_progress,
            completed,
            failed,
            mean_progress,
            terminal_ratio,
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.total > 0 && self.completed + self.failed == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: FolderItemStatus, progress: f64) -> FolderWorkItem {
        FolderWorkItem {
            id: FolderItemId::new(),
            task_id: TaskId(1),
            folder_path: format!("/data/{}", uuid::Uuid::now_v7()),
            folder_name: "f".into(),
            status,
            assigned_node_id: None,
            assigned_node_name: None,
            progress,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            output_path: None,
        }
    }

    #[test]
    fn projections_over_mixed_items() {
        let items = vec![
            item(FolderItemStatus::Completed, 100.0),
            item(FolderItemStatus::Failed, 40.0),
            item(FolderItemStatus::InProgress, 50.0),
            item(FolderItemStatus::Pending, 0.0),
        ];
        let p = FanOutProgress::from_items(&items);
        assert_eq!(p.total, 4);
        assert_eq!(p.completed, 1);
        assert_eq!(p.failed, 1);
        assert!((p.mean_progress - 47.5).abs() < f64::EPSILON);
        assert!((p.terminal_ratio - 0.5).abs() < f64::EPSILON);
        assert!(!p.all_terminal());
    }

    #[test]
    fn empty_item_set_is_not_terminal() {
        let p = FanOutProgress::from_items(&[]);
        assert_eq!(p.mean_progress, 0.0);
        assert_eq!(p.terminal_ratio, 0.0);
        assert!(!p.all_terminal());
    }
}
