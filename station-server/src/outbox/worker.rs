//! SyncWorker — background dispatcher for the sync outbox
//!
//! Periodically drains ready outbox rows through the transport, reports each
//! attempt back to the outbox (which applies the retry policy), and feeds
//! batch results into the adaptive batch sizing. Also runs the stale-pull and
//! retention housekeeping on a slower cadence.

use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::outbox::service::SyncOutbox;
use crate::outbox::transport::SyncTransport;

/// Queue scan cadence
const SCAN_INTERVAL_SECS: u64 = 5;
/// Housekeeping cadence
const CLEANUP_INTERVAL_SECS: u64 = 600;
/// Pending PULL rows older than this are presumed orphaned
const STALE_PULL_MAX_AGE_MINUTES: i64 = 30;
/// Delivered rows are kept this long for diagnostics (7 days)
const SYNCED_RETENTION_MINUTES: i64 = 7 * 24 * 60;

pub struct SyncWorker {
    outbox: Arc<SyncOutbox>,
    transport: Arc<dyn SyncTransport>,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub fn new(
        outbox: Arc<SyncOutbox>,
        transport: Arc<dyn SyncTransport>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { outbox, transport, shutdown }
    }

    pub async fn run(self) {
        tracing::info!("SyncWorker started");

        let mut scan_interval = tokio::time::interval(Duration::from_secs(SCAN_INTERVAL_SECS));
        let mut cleanup_interval =
            tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        cleanup_interval.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("SyncWorker shutting down");
                    break;
                }

                _ = scan_interval.tick() => {
                    self.drain_ready().await;
                }

                _ = cleanup_interval.tick() => {
                    self.run_housekeeping().await;
                }
            }
        }
    }

    /// Deliver one batch of ready rows and record the results
    pub async fn drain_ready(&self) {
        let batch = match self.outbox.next_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Failed to scan sync queue: {e}");
                return;
            }
        };
        if batch.is_empty() {
            return;
        }

        let total = batch.len();
        let mut failures = 0usize;
        for item in batch {
            let result = self.transport.deliver(&item).await;
            if result.is_err() {
                failures += 1;
            }
            if let Err(e) = self.outbox.record_attempt_result(item.id, result.into()).await {
                tracing::error!(id = item.id, "Failed to record sync attempt: {e}");
            }
        }

        if failures == 0 {
            self.outbox.strategy().record_batch_success();
        } else {
            let ratio = failures as f64 / total as f64;
            self.outbox.strategy().record_batch_failure(ratio);
        }
        tracing::debug!(
            total,
            failures,
            batch_size = self.outbox.strategy().current_batch_size(),
            "Sync batch dispatched"
        );
    }

    async fn run_housekeeping(&self) {
        if let Err(e) = self.outbox.cleanup_all_stale_pull_tracking(STALE_PULL_MAX_AGE_MINUTES).await
        {
            tracing::error!("Stale pull cleanup failed: {e}");
        }
        if let Err(e) = self.outbox.purge_synced_older_than(SYNCED_RETENTION_MINUTES).await {
            tracing::error!("Synced-row retention purge failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::retry::{RetryConfig, RetryStrategy};
    use crate::outbox::test_support::{memory_outbox, memory_outbox_with};
    use crate::outbox::transport::{DeliveryError, DeliveryReceipt};
    use async_trait::async_trait;
    use shared::models::{ErrorCategory, SyncEnqueue, SyncOperation};
    use std::sync::Mutex;

    /// Transport fake: fails delivery for entity ids in `fail_ids`
    struct FakeTransport {
        fail_ids: Vec<String>,
        delivered: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(fail_ids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SyncTransport for FakeTransport {
        async fn deliver(
            &self,
            item: &shared::models::SyncQueueItem,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            if self.fail_ids.contains(&item.entity_id) {
                return Err(DeliveryError::local("injected failure", ErrorCategory::Transient));
            }
            self.delivered.lock().unwrap().push(item.entity_id.clone());
            Ok(DeliveryReceipt { http_status: Some(200) })
        }
    }

    fn worker(outbox: Arc<SyncOutbox>, transport: Arc<FakeTransport>) -> SyncWorker {
        SyncWorker::new(outbox, transport, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_drain_delivers_and_terminates_rows() {
        let outbox = Arc::new(memory_outbox().await);
        for i in 0..3 {
            outbox
                .enqueue(SyncEnqueue::new("shift", &i.to_string(), SyncOperation::Update))
                .await
                .unwrap();
        }

        let transport = FakeTransport::new(&[]);
        worker(outbox.clone(), transport.clone()).drain_ready().await;

        assert_eq!(outbox.pending_count().await.unwrap(), 0);
        assert_eq!(transport.delivered.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_drain_records_failures_and_shrinks_batch() {
        let strategy = Arc::new(RetryStrategy::new(RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        }));
        let outbox = Arc::new(memory_outbox_with(strategy.clone()).await);
        outbox.enqueue(SyncEnqueue::new("shift", "ok", SyncOperation::Update)).await.unwrap();
        outbox.enqueue(SyncEnqueue::new("shift", "bad", SyncOperation::Update)).await.unwrap();

        let transport = FakeTransport::new(&["bad"]);
        worker(outbox.clone(), transport).drain_ready().await;

        // The failed row stays pending under a backoff hold
        assert_eq!(outbox.pending_count().await.unwrap(), 1);
        // 50% failure ratio halves the batch size
        assert_eq!(strategy.current_batch_size(), 25);
    }

    #[tokio::test]
    async fn test_clean_batches_recover_batch_size() {
        let strategy = Arc::new(RetryStrategy::new(RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        }));
        let outbox = Arc::new(memory_outbox_with(strategy.clone()).await);
        strategy.set_batch_size(5);

        let transport = FakeTransport::new(&[]);
        let worker = worker(outbox.clone(), transport);
        for i in 0..3 {
            outbox
                .enqueue(SyncEnqueue::new("shift", &i.to_string(), SyncOperation::Update))
                .await
                .unwrap();
            worker.drain_ready().await;
        }
        assert_eq!(strategy.current_batch_size(), 8);
    }
}
