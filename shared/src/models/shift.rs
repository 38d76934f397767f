//! Shift Model
//!
//! Minimal shift record consumed by the finalize orchestrator. Opening,
//! cash tracking and reporting live outside this core.

use serde::{Deserialize, Serialize};

/// Shift status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum ShiftStatus {
    #[serde(rename = "OPEN")]
    #[cfg_attr(feature = "db", sqlx(rename = "OPEN"))]
    Open,
    #[serde(rename = "CLOSED")]
    #[cfg_attr(feature = "db", sqlx(rename = "CLOSED"))]
    Closed,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

/// Shift record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Shift {
    pub id: i64,
    pub store_id: i64,
    pub status: ShiftStatus,
    /// Business date the shift belongs to (YYYY-MM-DD)
    pub business_date: String,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
    /// Closing data captured at close (opaque to this core)
    pub closing_data: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}
