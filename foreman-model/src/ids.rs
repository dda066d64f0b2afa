use crate::error::ModelError;
use uuid::Uuid;

/// Maximum length of a client-assigned node id.
pub const NODE_ID_MAX_LEN: usize = 50;

/// Client-assigned worker node identifier.
///
/// Opaque to the server apart from the non-empty / length constraints, so the
/// constructor validates instead of wrapping blindly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn parse(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ModelError::EmptyNodeId);
        }
        if value.len() > NODE_ID_MAX_LEN {
            return Err(ModelError::NodeIdTooLong(value.len()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-assigned, monotonically increasing task identifier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque optimistic-concurrency token for a task.
///
/// The server owns generation; clients only ever echo back the token they
/// last read. The numeric representation is an implementation detail of the
/// wire format.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct TaskVersion(pub i64);

impl TaskVersion {
    pub const INITIAL: TaskVersion = TaskVersion(1);

    pub fn next(self) -> Self {
        TaskVersion(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TaskVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identifier for a folder work item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct FolderItemId(pub Uuid);

impl FolderItemId {
    pub fn new() -> Self {
        FolderItemId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FolderItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FolderItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identifier for a file lock row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct LockId(pub Uuid);

impl LockId {
    pub fn new() -> Self {
        LockId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_rejects_empty_and_oversized() {
        assert_eq!(NodeId::parse(""), Err(ModelError::EmptyNodeId));
        assert_eq!(NodeId::parse("   "), Err(ModelError::EmptyNodeId));
        let oversized = "n".repeat(NODE_ID_MAX_LEN + 1);
        assert_eq!(
            NodeId::parse(oversized),
            Err(ModelError::NodeIdTooLong(NODE_ID_MAX_LEN + 1))
        );
    }

    #[test]
    fn node_id_accepts_max_length() {
        let id = "n".repeat(NODE_ID_MAX_LEN);
        assert!(NodeId::parse(id).is_ok());
    }
}
