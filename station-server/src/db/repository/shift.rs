//! Shift Repository

use super::{RepoError, RepoResult};
use shared::models::{Shift, ShiftStatus};
use sqlx::SqlitePool;

const SHIFT_COLUMNS: &str =
    "id, store_id, status, business_date, opened_at, closed_at, closing_data, created_at, updated_at";

pub async fn find_by_id(pool: &SqlitePool, store_id: i64, id: i64) -> RepoResult<Option<Shift>> {
    let shift = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {SHIFT_COLUMNS} FROM shift WHERE id = ? AND store_id = ?"
    ))
    .bind(id)
    .bind(store_id)
    .fetch_optional(pool)
    .await?;
    Ok(shift)
}

pub async fn find_open(pool: &SqlitePool, store_id: i64) -> RepoResult<Option<Shift>> {
    let shift = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {SHIFT_COLUMNS} FROM shift WHERE store_id = ? AND status = 'OPEN' \
         ORDER BY opened_at DESC LIMIT 1"
    ))
    .bind(store_id)
    .fetch_optional(pool)
    .await?;
    Ok(shift)
}

pub async fn open(pool: &SqlitePool, store_id: i64, business_date: &str) -> RepoResult<Shift> {
    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT INTO shift (id, store_id, status, business_date, opened_at, created_at, updated_at) \
         VALUES (?, ?, 'OPEN', ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(store_id)
    .bind(business_date)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, store_id, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to open shift".into()))
}

/// Close a shift, recording the closing snapshot.
///
/// Idempotent: closing an already-CLOSED shift is a no-op success, so a
/// finalize retry that died after this step converges instead of failing.
pub async fn close(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    closing_data: &serde_json::Value,
) -> RepoResult<Shift> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE shift SET status = 'CLOSED', closed_at = ?, closing_data = ?, updated_at = ? \
         WHERE id = ? AND store_id = ? AND status = 'OPEN'",
    )
    .bind(now)
    .bind(closing_data)
    .bind(now)
    .bind(id)
    .bind(store_id)
    .execute(pool)
    .await?;

    let shift = find_by_id(pool, store_id, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Shift {id} not found")))?;

    if rows.rows_affected() == 0 && shift.status != ShiftStatus::Closed {
        return Err(RepoError::Conflict(format!(
            "Cannot close shift in {:?} status",
            shift.status
        )));
    }
    Ok(shift)
}
