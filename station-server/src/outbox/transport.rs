//! Sync Transport — delivery of outbox items to the back office
//!
//! [`SyncTransport`] is the seam between the dispatcher and the network:
//! production uses [`HttpTransport`], tests substitute an in-memory fake.

use async_trait::async_trait;
use reqwest::Client;
use shared::models::{ErrorCategory, SyncDirection, SyncQueueItem};
use std::time::Duration;

use crate::outbox::service::AttemptOutcome;

/// Successful delivery receipt
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub http_status: Option<i64>,
}

/// Failed delivery attempt, carrying everything the retry policy needs
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub message: String,
    pub category: Option<ErrorCategory>,
    pub http_status: Option<i64>,
    pub response_body: Option<String>,
    /// Server-requested hold (epoch millis), from a Retry-After header
    pub retry_after: Option<i64>,
}

impl DeliveryError {
    /// Pre-network failure (serialization, bad config); nothing to classify
    /// beyond the category
    pub fn local(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            message: message.into(),
            category: Some(category),
            http_status: None,
            response_body: None,
            retry_after: None,
        }
    }
}

impl From<Result<DeliveryReceipt, DeliveryError>> for AttemptOutcome {
    fn from(result: Result<DeliveryReceipt, DeliveryError>) -> Self {
        match result {
            Ok(receipt) => AttemptOutcome::Success { http_status: receipt.http_status },
            Err(err) => AttemptOutcome::Failure {
                error: err.message,
                category: err.category,
                http_status: err.http_status,
                response_body: err.response_body,
                server_retry_after: err.retry_after,
            },
        }
    }
}

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn deliver(&self, item: &SyncQueueItem) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Map an HTTP status onto the retry taxonomy
pub fn classify_status(status: u16) -> ErrorCategory {
    match status {
        400 | 422 => ErrorCategory::Structural,
        401 | 403 | 404 | 405 | 410 => ErrorCategory::Permanent,
        409 => ErrorCategory::Conflict,
        408 | 425 | 429 => ErrorCategory::Transient,
        500..=599 => ErrorCategory::Transient,
        _ => ErrorCategory::Unknown,
    }
}

/// HTTP delivery to the back-office sync API
pub struct HttpTransport {
    client: Client,
    base_url: String,
    store_id: i64,
}

impl HttpTransport {
    pub fn new(base_url: String, store_id: i64) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                DeliveryError::local(
                    format!("Failed to build HTTP client: {e}"),
                    ErrorCategory::Structural,
                )
            })?;
        Ok(Self { client, base_url, store_id })
    }

    fn endpoint_for(&self, item: &SyncQueueItem) -> String {
        if let Some(endpoint) = &item.api_endpoint {
            return format!("{}{}", self.base_url, endpoint);
        }
        match item.sync_direction {
            SyncDirection::Push => {
                format!("{}/api/stations/{}/sync", self.base_url, self.store_id)
            }
            SyncDirection::Pull => {
                format!("{}/api/stations/{}/pull", self.base_url, self.store_id)
            }
        }
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn deliver(&self, item: &SyncQueueItem) -> Result<DeliveryReceipt, DeliveryError> {
        let url = self.endpoint_for(item);
        let envelope = serde_json::json!({
            "entity_type": item.entity_type,
            "entity_id": item.entity_id,
            "operation": item.operation,
            "payload": item.payload,
            "idempotency_key": item.idempotency_key,
        });

        let response = self
            .client
            .post(&url)
            .header("X-Idempotency-Key", &item.idempotency_key)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                let category = if e.is_timeout() || e.is_connect() {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Unknown
                };
                DeliveryError::local(format!("Sync request failed: {e}"), category)
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryReceipt { http_status: Some(status.as_u16() as i64) });
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .map(|secs| shared::util::now_millis() + secs * 1000);
        let body = response.text().await.unwrap_or_default();

        Err(DeliveryError {
            message: format!("Sync rejected with status {status}"),
            category: Some(classify_status(status.as_u16())),
            http_status: Some(status.as_u16() as i64),
            response_body: (!body.is_empty()).then_some(body),
            retry_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(400), ErrorCategory::Structural);
        assert_eq!(classify_status(422), ErrorCategory::Structural);
        assert_eq!(classify_status(401), ErrorCategory::Permanent);
        assert_eq!(classify_status(404), ErrorCategory::Permanent);
        assert_eq!(classify_status(409), ErrorCategory::Conflict);
        assert_eq!(classify_status(429), ErrorCategory::Transient);
        assert_eq!(classify_status(503), ErrorCategory::Transient);
        assert_eq!(classify_status(302), ErrorCategory::Unknown);
    }

    #[test]
    fn test_delivery_result_to_outcome() {
        let ok: AttemptOutcome = Ok(DeliveryReceipt { http_status: Some(200) }).into();
        assert!(matches!(ok, AttemptOutcome::Success { http_status: Some(200) }));

        let err: AttemptOutcome = Err::<DeliveryReceipt, _>(DeliveryError {
            message: "boom".into(),
            category: Some(ErrorCategory::Conflict),
            http_status: Some(409),
            response_body: None,
            retry_after: Some(12345),
        })
        .into();
        match err {
            AttemptOutcome::Failure { category, http_status, server_retry_after, .. } => {
                assert_eq!(category, Some(ErrorCategory::Conflict));
                assert_eq!(http_status, Some(409));
                assert_eq!(server_retry_after, Some(12345));
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }
}
