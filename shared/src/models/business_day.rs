//! Business Day Model
//!
//! One row per store per business date. Day close rolls shift results into
//! this aggregate; the rollup math itself lives outside this core.

use serde::{Deserialize, Serialize};

/// Business day status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum BusinessDayStatus {
    #[serde(rename = "OPEN")]
    #[cfg_attr(feature = "db", sqlx(rename = "OPEN"))]
    Open,
    #[serde(rename = "PENDING_CLOSE")]
    #[cfg_attr(feature = "db", sqlx(rename = "PENDING_CLOSE"))]
    PendingClose,
    #[serde(rename = "CLOSED")]
    #[cfg_attr(feature = "db", sqlx(rename = "CLOSED"))]
    Closed,
}

impl BusinessDayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::PendingClose => "PENDING_CLOSE",
            Self::Closed => "CLOSED",
        }
    }
}

/// Business day aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BusinessDay {
    pub id: i64,
    pub store_id: i64,
    /// YYYY-MM-DD
    pub business_date: String,
    pub status: BusinessDayStatus,
    /// Rolled-up closing totals (opaque to this core)
    pub totals: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
}
