//! Sync Outbox
//!
//! Durable store-and-forward queue between local mutations and the back
//! office: idempotency-key dedup, categorized retry with backoff,
//! dead-lettering, and a background dispatcher with adaptive batch sizing.

pub mod idempotency;
pub mod retry;
pub mod service;
pub mod transport;
pub mod worker;

pub use idempotency::idempotency_key;
pub use retry::{RetryConfig, RetryDecision, RetryStrategy};
pub use service::{AttemptOutcome, SyncOutbox};
pub use transport::{DeliveryError, DeliveryReceipt, HttpTransport, SyncTransport};
pub use worker::SyncWorker;

#[cfg(test)]
pub(crate) mod test_support {
    use super::retry::{RetryConfig, RetryStrategy};
    use super::service::SyncOutbox;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    pub async fn memory_queue_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE sync_queue (
                id INTEGER PRIMARY KEY,
                store_id INTEGER NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT 'null',
                priority INTEGER NOT NULL DEFAULT 0,
                synced INTEGER NOT NULL DEFAULT 0,
                sync_attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 5,
                last_sync_error TEXT,
                last_attempt_at INTEGER,
                created_at INTEGER NOT NULL,
                synced_at INTEGER,
                sync_direction TEXT NOT NULL DEFAULT 'PUSH',
                api_endpoint TEXT,
                http_status INTEGER,
                response_body TEXT,
                dead_lettered INTEGER NOT NULL DEFAULT 0,
                dead_letter_reason TEXT,
                dead_lettered_at INTEGER,
                error_category TEXT,
                retry_after INTEGER,
                idempotency_key TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE UNIQUE INDEX idx_sync_queue_pending_key
                ON sync_queue(store_id, idempotency_key)
                WHERE synced = 0 AND dead_lettered = 0",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE UNIQUE INDEX idx_sync_queue_pending_pull
                ON sync_queue(store_id, entity_type)
                WHERE sync_direction = 'PULL' AND synced = 0 AND dead_lettered = 0",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    pub async fn memory_outbox_with(strategy: Arc<RetryStrategy>) -> SyncOutbox {
        SyncOutbox::open(memory_queue_pool().await, 1, strategy)
    }

    pub async fn memory_outbox() -> SyncOutbox {
        let strategy = Arc::new(RetryStrategy::new(RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        }));
        memory_outbox_with(strategy).await
    }
}
