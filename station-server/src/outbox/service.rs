//! Sync Outbox Service
//!
//! Durable queue of outbound mutations (and inbound fetch-tracking rows).
//! One handle is constructed at startup and passed to call sites; there is no
//! process-wide instance. Delivery failures never propagate to the enqueuing
//! caller — they become row state that drives the retry/dead-letter decision.

use crate::db::repository::{RepoResult, sync_queue};
use crate::outbox::idempotency::idempotency_key;
use crate::outbox::retry::{RetryDecision, RetryStrategy};
use shared::models::{
    DeadLetterReason, ErrorCategory, PullAction, SyncDirection, SyncEnqueue, SyncQueueItem,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::db::repository::RepoError;

/// Result of one delivery attempt, reported by the dispatcher
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success {
        http_status: Option<i64>,
    },
    Failure {
        error: String,
        category: Option<ErrorCategory>,
        http_status: Option<i64>,
        response_body: Option<String>,
        /// Server-supplied hold (epoch millis), honored over computed backoff
        server_retry_after: Option<i64>,
    },
}

/// Outbox handle, scoped to one store
pub struct SyncOutbox {
    pool: SqlitePool,
    store_id: i64,
    strategy: Arc<RetryStrategy>,
    default_max_attempts: i64,
    closed: AtomicBool,
}

impl SyncOutbox {
    pub fn open(pool: SqlitePool, store_id: i64, strategy: Arc<RetryStrategy>) -> Self {
        let default_max_attempts = strategy.config().max_attempts;
        Self {
            pool,
            store_id,
            strategy,
            default_max_attempts,
            closed: AtomicBool::new(false),
        }
    }

    /// Stop accepting work. In-flight row updates still complete.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn store_id(&self) -> i64 {
        self.store_id
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn strategy(&self) -> &Arc<RetryStrategy> {
        &self.strategy
    }

    fn ensure_open(&self) -> RepoResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RepoError::Conflict("Sync outbox is closed".into()));
        }
        Ok(())
    }

    /// Enqueue a sync intent, deduplicated against pending rows.
    ///
    /// An existing pending row for the same entity or the same idempotency
    /// key is returned unchanged. PULL intents are additionally collapsed per
    /// entity type so the same resource is never fetched twice concurrently.
    /// A losing concurrent insert falls back to the winner's row.
    pub async fn enqueue(&self, req: SyncEnqueue) -> RepoResult<SyncQueueItem> {
        self.ensure_open()?;

        if req.sync_direction == SyncDirection::Pull
            && let Some(existing) = sync_queue::pending_pull_by_entity_type(
                &self.pool,
                self.store_id,
                &req.entity_type,
            )
            .await?
        {
            tracing::debug!(
                entity_type = %req.entity_type,
                existing_id = existing.id,
                "PULL already tracked, reusing row"
            );
            return Ok(existing);
        }

        if let Some(existing) = sync_queue::find_pending_by_entity(
            &self.pool,
            self.store_id,
            &req.entity_type,
            &req.entity_id,
        )
        .await?
        {
            return Ok(existing);
        }

        let key = idempotency_key(
            &req.entity_type,
            &req.entity_id,
            req.operation,
            req.discriminator.as_deref(),
        );
        if let Some(existing) =
            sync_queue::find_pending_by_key(&self.pool, self.store_id, &key).await?
        {
            return Ok(existing);
        }

        let item =
            sync_queue::insert(&self.pool, self.store_id, &req, &key, self.default_max_attempts)
                .await?;
        tracing::debug!(
            id = item.id,
            entity_type = %item.entity_type,
            entity_id = %item.entity_id,
            direction = item.sync_direction.as_str(),
            "Enqueued sync item"
        );
        Ok(item)
    }

    /// Record the result of a delivery attempt and apply the retry policy
    pub async fn record_attempt_result(
        &self,
        item_id: i64,
        outcome: AttemptOutcome,
    ) -> RepoResult<()> {
        let item = sync_queue::find_by_id(&self.pool, self.store_id, item_id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("Sync item {item_id} not found")))?;

        match outcome {
            AttemptOutcome::Success { http_status } => {
                sync_queue::mark_synced(&self.pool, self.store_id, item.id, http_status).await?;
                tracing::debug!(id = item.id, entity_type = %item.entity_type, "Sync item delivered");
            }
            AttemptOutcome::Failure {
                error,
                category,
                http_status,
                response_body,
                server_retry_after,
            } => {
                let attempt = item.sync_attempts + 1;
                let decision = self.strategy.make_retry_decision(
                    attempt,
                    item.max_attempts,
                    category,
                    server_retry_after,
                );

                let retry_after = match &decision {
                    RetryDecision::Retry { delay_ms } => {
                        Some(shared::util::now_millis() + *delay_ms as i64)
                    }
                    RetryDecision::DeadLetter { .. } => None,
                };
                sync_queue::record_failure(
                    &self.pool,
                    self.store_id,
                    item.id,
                    &error,
                    category,
                    http_status,
                    response_body.as_deref(),
                    retry_after,
                )
                .await?;

                match decision {
                    RetryDecision::Retry { delay_ms } => {
                        tracing::warn!(
                            id = item.id,
                            entity_type = %item.entity_type,
                            attempt,
                            delay_ms,
                            error = %error,
                            "Sync attempt failed, will retry"
                        );
                    }
                    RetryDecision::DeadLetter { reason } => {
                        sync_queue::dead_letter(&self.pool, self.store_id, item.id, reason).await?;
                        tracing::error!(
                            id = item.id,
                            entity_type = %item.entity_type,
                            attempt,
                            reason = reason.as_str(),
                            error = %error,
                            "Sync item dead-lettered"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn get_pending_pull_item(
        &self,
        entity_type: &str,
    ) -> RepoResult<Option<SyncQueueItem>> {
        sync_queue::pending_pull_by_entity_type(&self.pool, self.store_id, entity_type).await
    }

    pub async fn has_pending_pull_for_entity_type(&self, entity_type: &str) -> RepoResult<bool> {
        Ok(self.get_pending_pull_item(entity_type).await?.is_some())
    }

    /// Look up a pending PULL row by the action name in its payload.
    ///
    /// The name is validated against the closed [`PullAction`] set before it
    /// reaches any query predicate; unknown names return None without
    /// touching storage.
    pub async fn get_pending_pull_item_by_action(
        &self,
        action: &str,
    ) -> RepoResult<Option<SyncQueueItem>> {
        let Some(action) = PullAction::parse(action) else {
            tracing::warn!(action, "Rejected unknown pull action name");
            return Ok(None);
        };
        sync_queue::pending_pull_by_action(&self.pool, self.store_id, action).await
    }

    /// Drop leftover PULL rows for an action, keeping the active one
    pub async fn cleanup_stale_pull_tracking(
        &self,
        action: PullAction,
        exclude_id: Option<i64>,
    ) -> RepoResult<u64> {
        let removed =
            sync_queue::delete_stale_pulls(&self.pool, self.store_id, action, exclude_id).await?;
        if removed > 0 {
            tracing::info!(action = action.as_str(), removed, "Cleaned stale pull tracking");
        }
        Ok(removed)
    }

    /// Drop pending PULL rows older than `max_age_minutes`, any action
    pub async fn cleanup_all_stale_pull_tracking(&self, max_age_minutes: i64) -> RepoResult<u64> {
        let cutoff = shared::util::now_millis() - max_age_minutes * 60_000;
        let removed =
            sync_queue::delete_pulls_older_than(&self.pool, self.store_id, cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, max_age_minutes, "Cleaned stale pull tracking (all actions)");
        }
        Ok(removed)
    }

    /// Purge pending entries for an entity before re-enqueuing a superseding
    /// intent
    pub async fn delete_by_entity_id(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> RepoResult<u64> {
        sync_queue::delete_by_entity(&self.pool, self.store_id, entity_type, entity_id).await
    }

    pub async fn has_pending_sync(&self, entity_type: &str, entity_id: &str) -> RepoResult<bool> {
        sync_queue::exists_pending(&self.pool, self.store_id, entity_type, entity_id).await
    }

    /// Rows ready for dispatch right now, bounded by the adaptive batch size
    pub async fn next_batch(&self) -> RepoResult<Vec<SyncQueueItem>> {
        let limit = self.strategy.current_batch_size() as i64;
        sync_queue::scan_ready(&self.pool, self.store_id, shared::util::now_millis(), limit).await
    }

    pub async fn pending_count(&self) -> RepoResult<i64> {
        sync_queue::count_pending(&self.pool, self.store_id).await
    }

    /// Retention housekeeping for delivered rows
    pub async fn purge_synced_older_than(&self, max_age_minutes: i64) -> RepoResult<u64> {
        let cutoff = shared::util::now_millis() - max_age_minutes * 60_000;
        sync_queue::purge_synced(&self.pool, self.store_id, cutoff).await
    }

    /// Manually park a pending item (operator action)
    pub async fn dead_letter_item(&self, item_id: i64, reason: DeadLetterReason) -> RepoResult<()> {
        sync_queue::dead_letter(&self.pool, self.store_id, item_id, reason).await
    }
}
