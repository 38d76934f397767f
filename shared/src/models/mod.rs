//! Data models
//!
//! Shared between station-server and the front-end (via API).

pub mod business_day;
pub mod draft;
pub mod shift;
pub mod sync_queue;

pub use business_day::{BusinessDay, BusinessDayStatus};
pub use draft::{
    Draft, DraftCreate, DraftFinalize, DraftStatus, DraftStepUpdate, DraftType, DraftUpdate,
    StepState,
};
pub use shift::{Shift, ShiftStatus};
pub use sync_queue::{
    DeadLetterReason, ErrorCategory, PullAction, SyncDirection, SyncEnqueue, SyncOperation,
    SyncQueueItem,
};
