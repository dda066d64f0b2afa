use foreman_model::{Task, TaskStatus};
use thiserror::Error;

/// Typed failure taxonomy shared by every core service.
///
/// Services return these directly; the API adapter owns the mapping to HTTP
/// status codes and the error envelope.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Optimistic mismatch. Carries the current persisted task so the caller
    /// can reconcile without a second read.
    #[error("version conflict on task {}", current.id)]
    VersionConflict { current: Box<Task> },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("conflict: {0}")]
    Conflict(String),

    /// Retryable downstream failure (connection drop, timeout, aborted
    /// transaction). Retried internally with bounded backoff.
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        CoreError::NotFound(what.to_string())
    }
}

impl From<foreman_model::ModelError> for CoreError {
    fn from(err: foreman_model::ModelError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CoreError::Conflict(db.message().to_string())
            }
            // Serialization failures and deadlocks are safe to retry.
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
            {
                CoreError::Transient(db.message().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => CoreError::Transient(err.to_string()),
            _ => CoreError::Internal(err.to_string()),
        }
    }
}
