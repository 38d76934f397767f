//! Sync Queue Repository (outbox rows)
//!
//! Row-level operations only; dedup policy, retry decisions, and batch
//! sizing live in the outbox service. Pending uniqueness is enforced by
//! partial indexes, so insertion is INSERT OR IGNORE and the caller
//! re-selects to learn who won.

use super::{RepoError, RepoResult};
use shared::models::{
    DeadLetterReason, ErrorCategory, PullAction, SyncDirection, SyncEnqueue, SyncQueueItem,
};
use sqlx::SqlitePool;

const QUEUE_COLUMNS: &str = "id, store_id, entity_type, entity_id, operation, payload, priority, \
     synced, sync_attempts, max_attempts, last_sync_error, last_attempt_at, created_at, synced_at, \
     sync_direction, api_endpoint, http_status, response_body, dead_lettered, dead_letter_reason, \
     dead_lettered_at, error_category, retry_after, idempotency_key";

pub async fn find_by_id(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
) -> RepoResult<Option<SyncQueueItem>> {
    let item = sqlx::query_as::<_, SyncQueueItem>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ? AND store_id = ?"
    ))
    .bind(id)
    .bind(store_id)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

/// Find the live (pending, not dead-lettered) row holding this key, if any
pub async fn find_pending_by_key(
    pool: &SqlitePool,
    store_id: i64,
    idempotency_key: &str,
) -> RepoResult<Option<SyncQueueItem>> {
    let item = sqlx::query_as::<_, SyncQueueItem>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue \
         WHERE store_id = ? AND idempotency_key = ? AND synced = 0 AND dead_lettered = 0"
    ))
    .bind(store_id)
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

/// Oldest live row for an entity, regardless of operation
pub async fn find_pending_by_entity(
    pool: &SqlitePool,
    store_id: i64,
    entity_type: &str,
    entity_id: &str,
) -> RepoResult<Option<SyncQueueItem>> {
    let item = sqlx::query_as::<_, SyncQueueItem>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue \
         WHERE store_id = ? AND entity_type = ? AND entity_id = ? \
           AND synced = 0 AND dead_lettered = 0 \
         ORDER BY created_at ASC LIMIT 1"
    ))
    .bind(store_id)
    .bind(entity_type)
    .bind(entity_id)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

/// Insert a new pending row (INSERT OR IGNORE against the pending-key index).
///
/// Returns the live row for the key, which is the fresh row on success or the
/// pre-existing one when a concurrent enqueue won.
pub async fn insert(
    pool: &SqlitePool,
    store_id: i64,
    req: &SyncEnqueue,
    idempotency_key: &str,
    default_max_attempts: i64,
) -> RepoResult<SyncQueueItem> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    let max_attempts = req.max_attempts.unwrap_or(default_max_attempts);
    if max_attempts < 1 {
        return Err(RepoError::Validation("max_attempts must be at least 1".into()));
    }

    sqlx::query(
        "INSERT OR IGNORE INTO sync_queue \
         (id, store_id, entity_type, entity_id, operation, payload, priority, max_attempts, \
          created_at, sync_direction, api_endpoint, idempotency_key) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(store_id)
    .bind(&req.entity_type)
    .bind(&req.entity_id)
    .bind(req.operation.as_str())
    .bind(&req.payload)
    .bind(req.priority)
    .bind(max_attempts)
    .bind(now)
    .bind(req.sync_direction.as_str())
    .bind(&req.api_endpoint)
    .bind(idempotency_key)
    .execute(pool)
    .await?;

    if let Some(item) = find_pending_by_key(pool, store_id, idempotency_key).await? {
        return Ok(item);
    }
    // A losing PULL insert can be ignored by the pending-PULL unique index
    // without its key ever landing; the winner is the tracking row for the
    // entity type.
    if req.sync_direction == SyncDirection::Pull
        && let Some(winner) = pending_pull_by_entity_type(pool, store_id, &req.entity_type).await?
    {
        return Ok(winner);
    }
    Err(RepoError::Database("Failed to enqueue sync item".into()))
}

/// Mark a row delivered. Replay-safe: an already-synced row keeps its
/// original `synced_at`.
pub async fn mark_synced(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    http_status: Option<i64>,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE sync_queue SET synced = 1, synced_at = ?, http_status = ?, \
         last_sync_error = NULL, error_category = NULL, retry_after = NULL \
         WHERE id = ? AND store_id = ? AND synced = 0",
    )
    .bind(now)
    .bind(http_status)
    .bind(id)
    .bind(store_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a failed attempt: bump the counter and stash the diagnostics.
/// `retry_after` is epoch millis of the earliest next attempt.
#[allow(clippy::too_many_arguments)]
pub async fn record_failure(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    error: &str,
    category: Option<ErrorCategory>,
    http_status: Option<i64>,
    response_body: Option<&str>,
    retry_after: Option<i64>,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE sync_queue SET sync_attempts = sync_attempts + 1, last_sync_error = ?, \
         last_attempt_at = ?, http_status = ?, response_body = ?, error_category = ?, retry_after = ? \
         WHERE id = ? AND store_id = ? AND synced = 0 AND dead_lettered = 0",
    )
    .bind(error)
    .bind(now)
    .bind(http_status)
    .bind(response_body)
    .bind(category.map(|c| c.as_str()))
    .bind(retry_after)
    .bind(id)
    .bind(store_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Park a row in the dead-letter state. The row leaves the pending partial
/// indexes, freeing its idempotency key for a fresh enqueue.
pub async fn dead_letter(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    reason: DeadLetterReason,
) -> RepoResult<()> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE sync_queue SET dead_lettered = 1, dead_letter_reason = ?, dead_lettered_at = ?, \
         retry_after = NULL \
         WHERE id = ? AND store_id = ? AND synced = 0 AND dead_lettered = 0",
    )
    .bind(reason.as_str())
    .bind(now)
    .bind(id)
    .bind(store_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Pending PULL tracking row for an entity type
pub async fn pending_pull_by_entity_type(
    pool: &SqlitePool,
    store_id: i64,
    entity_type: &str,
) -> RepoResult<Option<SyncQueueItem>> {
    let item = sqlx::query_as::<_, SyncQueueItem>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue \
         WHERE store_id = ? AND entity_type = ? AND sync_direction = 'PULL' \
           AND synced = 0 AND dead_lettered = 0"
    ))
    .bind(store_id)
    .bind(entity_type)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

/// Pending PULL tracking row whose payload carries the given action
pub async fn pending_pull_by_action(
    pool: &SqlitePool,
    store_id: i64,
    action: PullAction,
) -> RepoResult<Option<SyncQueueItem>> {
    let item = sqlx::query_as::<_, SyncQueueItem>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue \
         WHERE store_id = ? AND sync_direction = 'PULL' \
           AND synced = 0 AND dead_lettered = 0 \
           AND json_extract(payload, '$.action') = ? \
         ORDER BY created_at ASC LIMIT 1"
    ))
    .bind(store_id)
    .bind(action.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

/// Delete stale pending PULL rows for an action, keeping `exclude_id`.
/// Returns the number of rows removed.
pub async fn delete_stale_pulls(
    pool: &SqlitePool,
    store_id: i64,
    action: PullAction,
    exclude_id: Option<i64>,
) -> RepoResult<u64> {
    let result = sqlx::query(
        "DELETE FROM sync_queue \
         WHERE store_id = ? AND sync_direction = 'PULL' \
           AND synced = 0 AND dead_lettered = 0 \
           AND json_extract(payload, '$.action') = ? \
           AND id != ?",
    )
    .bind(store_id)
    .bind(action.as_str())
    .bind(exclude_id.unwrap_or(-1))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Delete pending PULL rows older than the cutoff, regardless of action
pub async fn delete_pulls_older_than(
    pool: &SqlitePool,
    store_id: i64,
    cutoff_millis: i64,
) -> RepoResult<u64> {
    let result = sqlx::query(
        "DELETE FROM sync_queue \
         WHERE store_id = ? AND sync_direction = 'PULL' \
           AND synced = 0 AND dead_lettered = 0 AND created_at < ?",
    )
    .bind(store_id)
    .bind(cutoff_millis)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Drop all pending rows for an entity (used when the entity is deleted
/// locally before it ever synced)
pub async fn delete_by_entity(
    pool: &SqlitePool,
    store_id: i64,
    entity_type: &str,
    entity_id: &str,
) -> RepoResult<u64> {
    let result = sqlx::query(
        "DELETE FROM sync_queue \
         WHERE store_id = ? AND entity_type = ? AND entity_id = ? \
           AND synced = 0 AND dead_lettered = 0",
    )
    .bind(store_id)
    .bind(entity_type)
    .bind(entity_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn exists_pending(
    pool: &SqlitePool,
    store_id: i64,
    entity_type: &str,
    entity_id: &str,
) -> RepoResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sync_queue \
         WHERE store_id = ? AND entity_type = ? AND entity_id = ? \
           AND synced = 0 AND dead_lettered = 0",
    )
    .bind(store_id)
    .bind(entity_type)
    .bind(entity_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Rows eligible for dispatch right now: pending, not dead-lettered, and past
/// any server-imposed or backoff hold. Highest priority first, oldest first
/// within a priority.
pub async fn scan_ready(
    pool: &SqlitePool,
    store_id: i64,
    now_millis: i64,
    limit: i64,
) -> RepoResult<Vec<SyncQueueItem>> {
    let items = sqlx::query_as::<_, SyncQueueItem>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue \
         WHERE store_id = ? AND synced = 0 AND dead_lettered = 0 \
           AND (retry_after IS NULL OR retry_after <= ?) \
         ORDER BY priority DESC, created_at ASC \
         LIMIT ?"
    ))
    .bind(store_id)
    .bind(now_millis)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

pub async fn count_pending(pool: &SqlitePool, store_id: i64) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sync_queue WHERE store_id = ? AND synced = 0 AND dead_lettered = 0",
    )
    .bind(store_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Purge synced rows older than the cutoff (retention housekeeping)
pub async fn purge_synced(
    pool: &SqlitePool,
    store_id: i64,
    cutoff_millis: i64,
) -> RepoResult<u64> {
    let result = sqlx::query(
        "DELETE FROM sync_queue WHERE store_id = ? AND synced = 1 AND synced_at < ?",
    )
    .bind(store_id)
    .bind(cutoff_millis)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
