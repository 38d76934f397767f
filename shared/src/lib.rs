//! Shared types for the station close-out stack
//!
//! Data models and small utilities used by both station-server and the
//! desktop front-end (via the HTTP API). Models derive `sqlx::FromRow`
//! behind the `db` feature so the front-end build stays database-free.

pub mod models;
pub mod util;

pub use models::{
    BusinessDay, BusinessDayStatus, DeadLetterReason, Draft, DraftCreate, DraftFinalize,
    DraftStatus, DraftStepUpdate, DraftType, DraftUpdate, ErrorCategory, PullAction, Shift,
    ShiftStatus, StepState, SyncDirection, SyncEnqueue, SyncOperation, SyncQueueItem,
};
