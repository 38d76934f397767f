//! Close Draft Model
//!
//! A draft is the persisted, resumable state of the close wizard (end-of-shift
//! or end-of-day). Progress is guarded by an optimistic version counter: every
//! successful mutation increments `version` by exactly 1, and stale writers
//! are rejected with the authoritative current version.

use serde::{Deserialize, Serialize};

/// Draft kind — which close wizard this draft belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum DraftType {
    #[serde(rename = "DAY_CLOSE")]
    #[cfg_attr(feature = "db", sqlx(rename = "DAY_CLOSE"))]
    DayClose,
    #[serde(rename = "SHIFT_CLOSE")]
    #[cfg_attr(feature = "db", sqlx(rename = "SHIFT_CLOSE"))]
    ShiftClose,
}

impl DraftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DayClose => "DAY_CLOSE",
            Self::ShiftClose => "SHIFT_CLOSE",
        }
    }
}

/// Draft lifecycle status
///
/// IN_PROGRESS → FINALIZING → FINALIZED, or IN_PROGRESS → EXPIRED.
/// FINALIZED and EXPIRED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum DraftStatus {
    #[serde(rename = "IN_PROGRESS")]
    #[cfg_attr(feature = "db", sqlx(rename = "IN_PROGRESS"))]
    InProgress,
    #[serde(rename = "FINALIZING")]
    #[cfg_attr(feature = "db", sqlx(rename = "FINALIZING"))]
    Finalizing,
    #[serde(rename = "FINALIZED")]
    #[cfg_attr(feature = "db", sqlx(rename = "FINALIZED"))]
    Finalized,
    #[serde(rename = "EXPIRED")]
    #[cfg_attr(feature = "db", sqlx(rename = "EXPIRED"))]
    Expired,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Finalizing => "FINALIZING",
            Self::Finalized => "FINALIZED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Terminal drafts accept no further mutation of any kind
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Expired)
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wizard step the operator last completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum StepState {
    #[serde(rename = "LOTTERY")]
    #[cfg_attr(feature = "db", sqlx(rename = "LOTTERY"))]
    Lottery,
    #[serde(rename = "REPORTS")]
    #[cfg_attr(feature = "db", sqlx(rename = "REPORTS"))]
    Reports,
    #[serde(rename = "REVIEW")]
    #[cfg_attr(feature = "db", sqlx(rename = "REVIEW"))]
    Review,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lottery => "LOTTERY",
            Self::Reports => "REPORTS",
            Self::Review => "REVIEW",
        }
    }
}

/// Close wizard draft
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Draft {
    pub id: i64,
    pub store_id: i64,
    pub shift_id: i64,
    /// Business date this close belongs to (YYYY-MM-DD)
    pub business_date: String,
    pub draft_type: DraftType,
    pub status: DraftStatus,
    /// Last completed wizard step, null before the first step
    pub step_state: Option<StepState>,
    /// Opaque wizard progress blob (per-step sections keyed at top level)
    pub payload: serde_json::Value,
    /// Optimistic concurrency counter, starts at 1
    pub version: i64,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set when the draft reaches FINALIZED
    pub closed_at: Option<i64>,
}

/// Create draft payload (idempotent wizard start)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftCreate {
    pub shift_id: i64,
    pub draft_type: DraftType,
    /// Operator starting the wizard; auth gates live outside this core
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Update draft payload (version-checked merge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftUpdate {
    /// Top-level keys are merged over the stored payload
    pub payload: serde_json::Value,
    pub version: i64,
}

/// Update step state payload (version-checked)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftStepUpdate {
    pub step_state: StepState,
    pub version: i64,
}

/// Finalize payload — closing data handed to the side-effect executor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftFinalize {
    /// Opaque closing data (cash counts, meter readings); the core does no
    /// close-out math with it
    #[serde(default)]
    pub closing: serde_json::Value,
}
