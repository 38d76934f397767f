//! Sync Queue Model (outbox)
//!
//! Durable local record of mutations awaiting delivery to the remote
//! back office. Rows are deduplicated by idempotency key while pending and
//! terminate as either `synced` or `dead_lettered`.

use serde::{Deserialize, Serialize};

/// Mutation kind being propagated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum SyncOperation {
    #[serde(rename = "CREATE")]
    #[cfg_attr(feature = "db", sqlx(rename = "CREATE"))]
    Create,
    #[serde(rename = "UPDATE")]
    #[cfg_attr(feature = "db", sqlx(rename = "UPDATE"))]
    Update,
    #[serde(rename = "DELETE")]
    #[cfg_attr(feature = "db", sqlx(rename = "DELETE"))]
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Delivery direction
///
/// PUSH rows carry local mutations outward; PULL rows track an in-flight
/// inbound fetch so the same resource is never fetched twice concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum SyncDirection {
    #[serde(rename = "PUSH")]
    #[cfg_attr(feature = "db", sqlx(rename = "PUSH"))]
    Push,
    #[serde(rename = "PULL")]
    #[cfg_attr(feature = "db", sqlx(rename = "PULL"))]
    Pull,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "PUSH",
            Self::Pull => "PULL",
        }
    }
}

/// Failure classification recorded after a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum ErrorCategory {
    /// Malformed/unprocessable data; retrying cannot fix it
    #[serde(rename = "STRUCTURAL")]
    #[cfg_attr(feature = "db", sqlx(rename = "STRUCTURAL"))]
    Structural,
    /// Rejected by the server for a stable reason (auth, missing resource)
    #[serde(rename = "PERMANENT")]
    #[cfg_attr(feature = "db", sqlx(rename = "PERMANENT"))]
    Permanent,
    /// Concurrent-modification rejection
    #[serde(rename = "CONFLICT")]
    #[cfg_attr(feature = "db", sqlx(rename = "CONFLICT"))]
    Conflict,
    /// Network trouble or 5xx; expected to self-heal
    #[serde(rename = "TRANSIENT")]
    #[cfg_attr(feature = "db", sqlx(rename = "TRANSIENT"))]
    Transient,
    #[serde(rename = "UNKNOWN")]
    #[cfg_attr(feature = "db", sqlx(rename = "UNKNOWN"))]
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "STRUCTURAL",
            Self::Permanent => "PERMANENT",
            Self::Conflict => "CONFLICT",
            Self::Transient => "TRANSIENT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Why a row was parked in the dead-letter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum DeadLetterReason {
    #[serde(rename = "STRUCTURAL_FAILURE")]
    #[cfg_attr(feature = "db", sqlx(rename = "STRUCTURAL_FAILURE"))]
    StructuralFailure,
    #[serde(rename = "PERMANENT_ERROR")]
    #[cfg_attr(feature = "db", sqlx(rename = "PERMANENT_ERROR"))]
    PermanentError,
    #[serde(rename = "CONFLICT_ERROR")]
    #[cfg_attr(feature = "db", sqlx(rename = "CONFLICT_ERROR"))]
    ConflictError,
    #[serde(rename = "MAX_ATTEMPTS_EXCEEDED")]
    #[cfg_attr(feature = "db", sqlx(rename = "MAX_ATTEMPTS_EXCEEDED"))]
    MaxAttemptsExceeded,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuralFailure => "STRUCTURAL_FAILURE",
            Self::PermanentError => "PERMANENT_ERROR",
            Self::ConflictError => "CONFLICT_ERROR",
            Self::MaxAttemptsExceeded => "MAX_ATTEMPTS_EXCEEDED",
        }
    }
}

/// Known PULL fetch actions
///
/// Closed allowlist: an action name outside this enum never reaches a query
/// predicate, which removes the injection surface of free-form matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullAction {
    #[serde(rename = "fuel_totals")]
    FuelTotals,
    #[serde(rename = "lottery_business_day")]
    LotteryBusinessDay,
    #[serde(rename = "price_book")]
    PriceBook,
    #[serde(rename = "promotions")]
    Promotions,
}

impl PullAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FuelTotals => "fuel_totals",
            Self::LotteryBusinessDay => "lottery_business_day",
            Self::PriceBook => "price_book",
            Self::Promotions => "promotions",
        }
    }

    /// Parse an untrusted action name; anything outside the allowlist is None
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fuel_totals" => Some(Self::FuelTotals),
            "lottery_business_day" => Some(Self::LotteryBusinessDay),
            "price_book" => Some(Self::PriceBook),
            "promotions" => Some(Self::Promotions),
            _ => None,
        }
    }
}

/// Outbox row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct SyncQueueItem {
    pub id: i64,
    pub store_id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub payload: serde_json::Value,
    pub priority: i64,
    pub synced: bool,
    pub sync_attempts: i64,
    pub max_attempts: i64,
    pub last_sync_error: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub created_at: i64,
    pub synced_at: Option<i64>,
    pub sync_direction: SyncDirection,
    pub api_endpoint: Option<String>,
    pub http_status: Option<i64>,
    pub response_body: Option<String>,
    pub dead_lettered: bool,
    pub dead_letter_reason: Option<DeadLetterReason>,
    pub dead_lettered_at: Option<i64>,
    pub error_category: Option<ErrorCategory>,
    /// Epoch millis before which the dispatcher must not retry this row
    pub retry_after: Option<i64>,
    pub idempotency_key: String,
}

/// Enqueue payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEnqueue {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: SyncOperation,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "SyncEnqueue::default_direction")]
    pub sync_direction: SyncDirection,
    pub api_endpoint: Option<String>,
    /// Per-item attempt ceiling; the outbox default applies when absent
    pub max_attempts: Option<i64>,
    /// Distinguishes intents that would otherwise share an idempotency key
    /// (e.g. re-close of the same business date)
    pub discriminator: Option<String>,
}

impl SyncEnqueue {
    fn default_direction() -> SyncDirection {
        SyncDirection::Push
    }

    pub fn new(entity_type: &str, entity_id: &str, operation: SyncOperation) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            operation,
            payload: serde_json::Value::Null,
            priority: 0,
            sync_direction: SyncDirection::Push,
            api_endpoint: None,
            max_attempts: None,
            discriminator: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.sync_direction = direction;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }
}
