//! Repository Module
//!
//! Function-style CRUD over the SQLite pool. Every mutation that must be
//! race-safe is a single conditional UPDATE whose affected-row count decides
//! success; zero rows is classified into a typed error, never retried here.

pub mod business_day;
pub mod draft;
pub mod shift;
pub mod sync_queue;

use shared::models::DraftStatus;
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Optimistic concurrency collision; `current` is authoritative
    #[error("Version conflict: expected {expected}, current version is {current}")]
    VersionConflict { current: i64, expected: i64 },

    /// Status CAS lost: the row was not in the required source state
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: DraftStatus, to: DraftStatus },

    /// Operation not permitted in the current status
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        RepoError::Database(err.to_string())
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;
