//! Unified error handling
//!
//! [`AppError`] is the API-layer error type. Repository errors map into it via
//! `From<RepoError>`, and `IntoResponse` renders the machine-readable wire
//! shapes the front-end retries on:
//!
//! ```json
//! { "success": false, "error": "VERSION_CONFLICT",
//!   "current_version": 4, "expected_version": 3, "message": "..." }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::db::repository::RepoError;

/// Application error enum
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency collision; carries both versions so the caller
    /// can re-target its retry without a fresh read
    #[error("Version conflict: expected {expected}, current {current}")]
    VersionConflict { current: i64, expected: i64 },

    /// State-machine violation (e.g. finalize on an EXPIRED draft)
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Not permitted in the current status
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => Self::NotFound(msg),
            RepoError::VersionConflict { current, expected } => {
                Self::VersionConflict { current, expected }
            }
            RepoError::InvalidTransition { from, to } => Self::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            RepoError::Conflict(msg) => Self::Conflict(msg),
            RepoError::Duplicate(msg) => Self::Conflict(msg),
            RepoError::Validation(msg) => Self::Validation(msg),
            RepoError::Database(msg) => Self::Database(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match &self {
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({
                    "success": false,
                    "error": "NOT_FOUND",
                    "message": message,
                }),
            ),

            AppError::VersionConflict { current, expected } => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "success": false,
                    "error": "VERSION_CONFLICT",
                    "current_version": current,
                    "expected_version": expected,
                    "message": message,
                }),
            ),

            AppError::InvalidTransition { .. } | AppError::Conflict(_) => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "success": false,
                    "error": "CONFLICT",
                    "message": message,
                }),
            ),

            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "success": false,
                    "error": "VALIDATION_ERROR",
                    "message": message,
                }),
            ),

            AppError::Database(msg) => {
                error!(target: "database", error = %msg, "Database error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({
                        "success": false,
                        "error": "INTERNAL",
                        "message": "Database error",
                    }),
                )
            }

            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({
                        "success": false,
                        "error": "INTERNAL",
                        "message": "Internal server error",
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type AppResult<T> = Result<T, AppError>;
