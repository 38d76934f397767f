//! Business Day Repository
//!
//! Tracks the trading-day lifecycle (OPEN -> PENDING_CLOSE -> CLOSED).
//! Every mutation here sits on the finalize path and must tolerate
//! re-invocation after a crash, so each step is a conditional UPDATE that
//! treats "already there" as success.

use super::{RepoError, RepoResult};
use shared::models::{BusinessDay, BusinessDayStatus};
use sqlx::SqlitePool;

const DAY_COLUMNS: &str =
    "id, store_id, business_date, status, totals, created_at, updated_at, closed_at";

pub async fn find_by_date(
    pool: &SqlitePool,
    store_id: i64,
    business_date: &str,
) -> RepoResult<Option<BusinessDay>> {
    let day = sqlx::query_as::<_, BusinessDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM business_day WHERE store_id = ? AND business_date = ?"
    ))
    .bind(store_id)
    .bind(business_date)
    .fetch_optional(pool)
    .await?;
    Ok(day)
}

/// Get or create the day row (INSERT OR IGNORE against the unique
/// (store_id, business_date) constraint)
pub async fn get_or_create_for_date(
    pool: &SqlitePool,
    store_id: i64,
    business_date: &str,
) -> RepoResult<BusinessDay> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT OR IGNORE INTO business_day (id, store_id, business_date, status, created_at, updated_at) \
         VALUES (?, ?, ?, 'OPEN', ?, ?)",
    )
    .bind(id)
    .bind(store_id)
    .bind(business_date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_date(pool, store_id, business_date)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create business day".into()))
}

/// OPEN -> PENDING_CLOSE, staging the closing totals.
///
/// A day already in PENDING_CLOSE is a crash-retry: succeed and overwrite the
/// staged totals. A CLOSED day cannot be re-staged.
pub async fn prepare_close(
    pool: &SqlitePool,
    store_id: i64,
    business_date: &str,
    totals: &serde_json::Value,
) -> RepoResult<BusinessDay> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE business_day SET status = 'PENDING_CLOSE', totals = ?, updated_at = ? \
         WHERE store_id = ? AND business_date = ? AND status IN ('OPEN', 'PENDING_CLOSE')",
    )
    .bind(totals)
    .bind(now)
    .bind(store_id)
    .bind(business_date)
    .execute(pool)
    .await?;

    let day = find_by_date(pool, store_id, business_date)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Business day {business_date} not found")))?;

    match day.status {
        BusinessDayStatus::PendingClose => Ok(day),
        BusinessDayStatus::Closed => Err(RepoError::Conflict(format!(
            "Business day {business_date} is already closed"
        ))),
        BusinessDayStatus::Open => Err(RepoError::Database(
            "prepare_close left day in OPEN status".into(),
        )),
    }
}

/// PENDING_CLOSE -> CLOSED, stamping the closure time.
///
/// Re-invocation on an already-CLOSED day is a no-op success.
pub async fn commit_close(
    pool: &SqlitePool,
    store_id: i64,
    business_date: &str,
) -> RepoResult<BusinessDay> {
    let now = shared::util::now_millis();
    sqlx::query(
        "UPDATE business_day SET status = 'CLOSED', closed_at = ?, updated_at = ? \
         WHERE store_id = ? AND business_date = ? AND status = 'PENDING_CLOSE'",
    )
    .bind(now)
    .bind(now)
    .bind(store_id)
    .bind(business_date)
    .execute(pool)
    .await?;

    let day = find_by_date(pool, store_id, business_date)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Business day {business_date} not found")))?;

    if day.status != BusinessDayStatus::Closed {
        return Err(RepoError::Conflict(format!(
            "Cannot commit close for business day in {:?} status",
            day.status
        )));
    }
    Ok(day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE business_day (
                id INTEGER PRIMARY KEY,
                store_id INTEGER NOT NULL,
                business_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                totals TEXT,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0,
                closed_at INTEGER,
                UNIQUE(store_id, business_date)
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let pool = test_pool().await;
        let a = get_or_create_for_date(&pool, 1, "2026-08-27").await.unwrap();
        let b = get_or_create_for_date(&pool, 1, "2026-08-27").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.status, BusinessDayStatus::Open);
    }

    #[tokio::test]
    async fn test_two_phase_close() {
        let pool = test_pool().await;
        get_or_create_for_date(&pool, 1, "2026-08-27").await.unwrap();

        let totals = serde_json::json!({"fuel": 5000, "inside": 1200});
        let staged = prepare_close(&pool, 1, "2026-08-27", &totals).await.unwrap();
        assert_eq!(staged.status, BusinessDayStatus::PendingClose);
        assert_eq!(staged.totals, Some(totals.clone()));

        // Crash retry restages without error
        let restaged = prepare_close(&pool, 1, "2026-08-27", &totals).await.unwrap();
        assert_eq!(restaged.status, BusinessDayStatus::PendingClose);

        let closed = commit_close(&pool, 1, "2026-08-27").await.unwrap();
        assert_eq!(closed.status, BusinessDayStatus::Closed);
        assert!(closed.closed_at.is_some());

        // Commit replay is a no-op success with the original closure time
        let replay = commit_close(&pool, 1, "2026-08-27").await.unwrap();
        assert_eq!(replay.closed_at, closed.closed_at);
    }

    #[tokio::test]
    async fn test_prepare_after_close_rejected() {
        let pool = test_pool().await;
        get_or_create_for_date(&pool, 1, "2026-08-27").await.unwrap();
        prepare_close(&pool, 1, "2026-08-27", &serde_json::json!({})).await.unwrap();
        commit_close(&pool, 1, "2026-08-27").await.unwrap();

        let err = prepare_close(&pool, 1, "2026-08-27", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_commit_without_prepare_rejected() {
        let pool = test_pool().await;
        get_or_create_for_date(&pool, 1, "2026-08-27").await.unwrap();
        let err = commit_close(&pool, 1, "2026-08-27").await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }
}
