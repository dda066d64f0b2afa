use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use foreman_core::CoreError;
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

/// API-facing error carrying everything the envelope needs.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = foreman_core::events::current_correlation_id()
            .map(|id| id.to_string())
            .unwrap_or_default();

        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        } else {
            tracing::debug!(code = self.code, message = %self.message, "request rejected");
        }

        let mut body = json!({
            "code": self.code,
            "message": self.message,
            "correlation_id": correlation_id,
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }

        let mut response = (self.status, Json(body)).into_response();
        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(message) => Self::bad_request(message),
            CoreError::NotFound(what) => Self::not_found(format!("{what} not found")),
            CoreError::Forbidden(message) => {
                Self::new(StatusCode::FORBIDDEN, "forbidden", message)
            }
            CoreError::VersionConflict { current } => Self::new(
                StatusCode::CONFLICT,
                "version_conflict",
                format!(
                    "task {} was modified concurrently; re-read and retry",
                    current.id
                ),
            )
            .with_details(json!({ "current": *current })),
            CoreError::InvalidTransition { from, to } => Self::new(
                StatusCode::CONFLICT,
                "invalid_transition",
                format!("cannot move a task from {from} to {to}"),
            ),
            CoreError::Conflict(message) => {
                Self::new(StatusCode::CONFLICT, "conflict", message)
            }
            CoreError::Transient(message) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "transient",
                format!("temporary failure, retry shortly: {message}"),
            ),
            CoreError::Internal(message) => {
                // Keep internals out of the response body; the log line above
                // carries the detail.
                tracing::error!(detail = %message, "internal error");
                Self::internal("internal server error")
            }
        }
    }
}
