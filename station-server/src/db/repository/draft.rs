//! Close Draft Repository
//!
//! Owns the close-wizard draft state machine. All writes are optimistic:
//! a single conditional UPDATE guarded by `version` (step/payload mutations)
//! or by `status` (lifecycle transitions), verified via `rows_affected`.
//! A zero-row result is classified by re-reading the row, so the caller
//! always gets the authoritative current version or status back.

use super::{RepoError, RepoResult};
use shared::models::{Draft, DraftStatus, DraftType, StepState};
use sqlx::SqlitePool;

const DRAFT_COLUMNS: &str = "id, store_id, shift_id, business_date, draft_type, status, \
     step_state, payload, version, created_by, created_at, updated_at, closed_at";

pub async fn find_by_id(pool: &SqlitePool, store_id: i64, id: i64) -> RepoResult<Option<Draft>> {
    let draft = sqlx::query_as::<_, Draft>(&format!(
        "SELECT {DRAFT_COLUMNS} FROM close_drafts WHERE id = ? AND store_id = ?"
    ))
    .bind(id)
    .bind(store_id)
    .fetch_optional(pool)
    .await?;
    Ok(draft)
}

/// Find the single non-terminal draft for a shift, if any
pub async fn find_active(
    pool: &SqlitePool,
    store_id: i64,
    shift_id: i64,
) -> RepoResult<Option<Draft>> {
    let draft = sqlx::query_as::<_, Draft>(&format!(
        "SELECT {DRAFT_COLUMNS} FROM close_drafts \
         WHERE store_id = ? AND shift_id = ? AND status IN ('IN_PROGRESS', 'FINALIZING')"
    ))
    .bind(store_id)
    .bind(shift_id)
    .fetch_optional(pool)
    .await?;
    Ok(draft)
}

/// Idempotent wizard start: returns the existing non-terminal draft for the
/// shift, or creates one at version 1.
///
/// Creation is an INSERT OR IGNORE against the partial unique index on
/// active drafts, so a losing concurrent creator falls back to the winner's
/// row instead of erroring.
pub async fn create_or_get_active(
    pool: &SqlitePool,
    store_id: i64,
    shift_id: i64,
    draft_type: DraftType,
    business_date: &str,
    created_by: &str,
) -> RepoResult<Draft> {
    if let Some(existing) = find_active(pool, store_id, shift_id).await? {
        return Ok(existing);
    }

    let now = shared::util::now_millis();
    let id = shared::util::snowflake_id();
    sqlx::query(
        "INSERT OR IGNORE INTO close_drafts \
         (id, store_id, shift_id, business_date, draft_type, status, payload, version, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 'IN_PROGRESS', '{}', 1, ?, ?, ?)",
    )
    .bind(id)
    .bind(store_id)
    .bind(shift_id)
    .bind(business_date)
    .bind(draft_type.as_str())
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_active(pool, store_id, shift_id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create draft".into()))
}

/// Merge a payload patch into the draft (version-checked)
pub async fn update_payload(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    patch: &serde_json::Value,
    expected_version: i64,
) -> RepoResult<Draft> {
    let patch_obj = patch
        .as_object()
        .ok_or_else(|| RepoError::Validation("Payload patch must be a JSON object".into()))?;

    let current = find_by_id(pool, store_id, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Draft {id} not found")))?;
    require_in_progress(&current)?;

    // Shallow merge: top-level patch keys override stored sections, explicit
    // null removes a section. The version CAS below makes this
    // read-merge-write safe: if anyone commits in between, our write hits
    // zero rows.
    let mut merged = match current.payload {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in patch_obj {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE close_drafts SET payload = ?, version = version + 1, updated_at = ? \
         WHERE id = ? AND store_id = ? AND version = ? AND status = 'IN_PROGRESS'",
    )
    .bind(serde_json::Value::Object(merged))
    .bind(now)
    .bind(id)
    .bind(store_id)
    .bind(expected_version)
    .execute(pool)
    .await?;

    guarded_reload(pool, store_id, id, expected_version, rows.rows_affected()).await
}

/// Record the last completed wizard step (version-checked)
pub async fn update_step_state(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    step: StepState,
    expected_version: i64,
) -> RepoResult<Draft> {
    let current = find_by_id(pool, store_id, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Draft {id} not found")))?;
    require_in_progress(&current)?;

    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE close_drafts SET step_state = ?, version = version + 1, updated_at = ? \
         WHERE id = ? AND store_id = ? AND version = ? AND status = 'IN_PROGRESS'",
    )
    .bind(step.as_str())
    .bind(now)
    .bind(id)
    .bind(store_id)
    .bind(expected_version)
    .execute(pool)
    .await?;

    guarded_reload(pool, store_id, id, expected_version, rows.rows_affected()).await
}

/// IN_PROGRESS → FINALIZING. Acts as a mutex acquisition: exactly one
/// concurrent caller wins the CAS, the rest get `InvalidTransition`.
pub async fn begin_finalize(pool: &SqlitePool, store_id: i64, id: i64) -> RepoResult<Draft> {
    transition(pool, store_id, id, DraftStatus::InProgress, DraftStatus::Finalizing).await
}

/// FINALIZING → FINALIZED, stamping the closure time
pub async fn finalize_draft(pool: &SqlitePool, store_id: i64, id: i64) -> RepoResult<Draft> {
    transition(pool, store_id, id, DraftStatus::Finalizing, DraftStatus::Finalized).await
}

/// FINALIZING → IN_PROGRESS, releasing the finalize lock after a
/// side-effect failure so the operation stays retryable
pub async fn rollback_finalize(pool: &SqlitePool, store_id: i64, id: i64) -> RepoResult<Draft> {
    transition(pool, store_id, id, DraftStatus::Finalizing, DraftStatus::InProgress).await
}

/// IN_PROGRESS → EXPIRED (abandonment)
pub async fn expire_draft(pool: &SqlitePool, store_id: i64, id: i64) -> RepoResult<Draft> {
    transition(pool, store_id, id, DraftStatus::InProgress, DraftStatus::Expired).await
}

fn require_in_progress(draft: &Draft) -> RepoResult<()> {
    if draft.status != DraftStatus::InProgress {
        return Err(RepoError::Conflict(format!(
            "Cannot update draft in {} status",
            draft.status
        )));
    }
    Ok(())
}

/// Classify the result of a versioned UPDATE and return the fresh row.
///
/// Zero affected rows means the CAS lost: re-read and report either the
/// terminal/transitioning status or the authoritative current version.
async fn guarded_reload(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    expected_version: i64,
    rows_affected: u64,
) -> RepoResult<Draft> {
    let reread = find_by_id(pool, store_id, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Draft {id} not found")))?;

    if rows_affected > 0 {
        return Ok(reread);
    }
    require_in_progress(&reread)?;
    Err(RepoError::VersionConflict {
        current: reread.version,
        expected: expected_version,
    })
}

/// Status CAS: move the draft from `from` to `to` in one conditional UPDATE.
///
/// Every transition also bumps `version` (a transition is a mutation like any
/// other) and FINALIZED stamps `closed_at`.
async fn transition(
    pool: &SqlitePool,
    store_id: i64,
    id: i64,
    from: DraftStatus,
    to: DraftStatus,
) -> RepoResult<Draft> {
    let now = shared::util::now_millis();
    let sql = if to == DraftStatus::Finalized {
        "UPDATE close_drafts SET status = ?, version = version + 1, updated_at = ?, closed_at = ? \
         WHERE id = ? AND store_id = ? AND status = ?"
    } else {
        "UPDATE close_drafts SET status = ?, version = version + 1, updated_at = ? \
         WHERE id = ? AND store_id = ? AND status = ?"
    };

    let mut query = sqlx::query(sql).bind(to.as_str()).bind(now);
    if to == DraftStatus::Finalized {
        query = query.bind(now);
    }
    let rows = query
        .bind(id)
        .bind(store_id)
        .bind(from.as_str())
        .execute(pool)
        .await?;

    let reread = find_by_id(pool, store_id, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Draft {id} not found")))?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::InvalidTransition {
            from: reread.status,
            to,
        });
    }
    Ok(reread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory SQLite pool with the draft schema.
    ///
    /// Single connection: concurrent tasks serialize at the storage boundary,
    /// matching the single-writer embedded store this runs against.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE store (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE shift (
                id INTEGER PRIMARY KEY,
                store_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                business_date TEXT NOT NULL,
                opened_at INTEGER NOT NULL DEFAULT 0,
                closed_at INTEGER,
                closing_data TEXT,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE close_drafts (
                id INTEGER PRIMARY KEY,
                store_id INTEGER NOT NULL,
                shift_id INTEGER NOT NULL,
                business_date TEXT NOT NULL,
                draft_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'IN_PROGRESS',
                step_state TEXT,
                payload TEXT NOT NULL DEFAULT '{}',
                version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
                created_by TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0,
                closed_at INTEGER
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE UNIQUE INDEX idx_close_drafts_active
                ON close_drafts(store_id, shift_id)
                WHERE status IN ('IN_PROGRESS', 'FINALIZING')",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO store (id, name) VALUES (1, 'Station 1')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO shift (id, store_id, business_date, opened_at) VALUES (7, 1, '2026-08-27', 1000)",
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    async fn new_draft(pool: &SqlitePool) -> Draft {
        create_or_get_active(pool, 1, 7, DraftType::ShiftClose, "2026-08-27", "alice")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let pool = test_pool().await;
        let a = new_draft(&pool).await;
        let b = new_draft(&pool).await;
        assert_eq!(a.id, b.id);
        assert_eq!(b.version, 1);
        assert_eq!(b.status, DraftStatus::InProgress);
    }

    #[tokio::test]
    async fn test_serialized_updates_are_gapless() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        let mut version = d.version;
        for i in 0..5 {
            let patch = serde_json::json!({ "step": i });
            let updated = update_payload(&pool, 1, d.id, &patch, version).await.unwrap();
            assert_eq!(updated.version, version + 1);
            version = updated.version;
        }
        assert_eq!(version, 6);
    }

    #[tokio::test]
    async fn test_payload_merge_keeps_other_sections() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        let d = update_payload(&pool, 1, d.id, &serde_json::json!({"lottery": {"books": 3}}), 1)
            .await
            .unwrap();
        let d = update_payload(&pool, 1, d.id, &serde_json::json!({"reports": {"printed": true}}), 2)
            .await
            .unwrap();

        assert_eq!(d.payload["lottery"]["books"], 3);
        assert_eq!(d.payload["reports"]["printed"], true);

        // Explicit null removes a section
        let d = update_payload(&pool, 1, d.id, &serde_json::json!({"lottery": null}), 3)
            .await
            .unwrap();
        assert!(d.payload.get("lottery").is_none());
    }

    #[tokio::test]
    async fn test_stale_update_reports_current_version() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;
        update_payload(&pool, 1, d.id, &serde_json::json!({"a": 1}), 1)
            .await
            .unwrap();

        let err = update_payload(&pool, 1, d.id, &serde_json::json!({"b": 2}), 1)
            .await
            .unwrap_err();
        match err {
            RepoError::VersionConflict { current, expected } => {
                assert_eq!(current, 2);
                assert_eq!(expected, 1);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_stale_updates_single_winner() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        let mut tasks = Vec::new();
        for i in 0..5 {
            let pool = pool.clone();
            let id = d.id;
            tasks.push(tokio::spawn(async move {
                update_payload(&pool, 1, id, &serde_json::json!({ "writer": i }), 1).await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(updated) => {
                    wins += 1;
                    assert_eq!(updated.version, 2);
                }
                Err(RepoError::VersionConflict { current, expected }) => {
                    conflicts += 1;
                    assert_eq!(current, 2);
                    assert_eq!(expected, 1);
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 4);
    }

    #[tokio::test]
    async fn test_update_step_state() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        let d = update_step_state(&pool, 1, d.id, StepState::Lottery, 1).await.unwrap();
        assert_eq!(d.step_state, Some(StepState::Lottery));
        assert_eq!(d.version, 2);

        let err = update_step_state(&pool, 1, d.id, StepState::Reports, 1).await.unwrap_err();
        assert!(matches!(err, RepoError::VersionConflict { current: 2, expected: 1 }));
    }

    #[tokio::test]
    async fn test_finalize_lifecycle() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        let d = begin_finalize(&pool, 1, d.id).await.unwrap();
        assert_eq!(d.status, DraftStatus::Finalizing);

        // Second acquisition loses the CAS
        let err = begin_finalize(&pool, 1, d.id).await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::InvalidTransition { from: DraftStatus::Finalizing, to: DraftStatus::Finalizing }
        ));

        let d = finalize_draft(&pool, 1, d.id).await.unwrap();
        assert_eq!(d.status, DraftStatus::Finalized);
        assert!(d.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_rollback_restores_retryability() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        begin_finalize(&pool, 1, d.id).await.unwrap();
        let d = rollback_finalize(&pool, 1, d.id).await.unwrap();
        assert_eq!(d.status, DraftStatus::InProgress);
        assert!(d.closed_at.is_none());

        // Retry behaves exactly like a first attempt
        let d = begin_finalize(&pool, 1, d.id).await.unwrap();
        assert_eq!(d.status, DraftStatus::Finalizing);
    }

    #[tokio::test]
    async fn test_update_rejected_while_finalizing() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;
        let d = begin_finalize(&pool, 1, d.id).await.unwrap();

        let err = update_payload(&pool, 1, d.id, &serde_json::json!({"a": 1}), d.version)
            .await
            .unwrap_err();
        match err {
            RepoError::Conflict(msg) => {
                assert_eq!(msg, "Cannot update draft in FINALIZING status");
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_drafts_are_immutable() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;
        begin_finalize(&pool, 1, d.id).await.unwrap();
        let d = finalize_draft(&pool, 1, d.id).await.unwrap();

        let err = update_payload(&pool, 1, d.id, &serde_json::json!({"a": 1}), d.version)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        let err = expire_draft(&pool, 1, d.id).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidTransition { from: DraftStatus::Finalized, .. }));

        let err = begin_finalize(&pool, 1, d.id).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidTransition { from: DraftStatus::Finalized, .. }));
    }

    #[tokio::test]
    async fn test_expire_from_in_progress_only() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        let d = expire_draft(&pool, 1, d.id).await.unwrap();
        assert_eq!(d.status, DraftStatus::Expired);

        let err = expire_draft(&pool, 1, d.id).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidTransition { from: DraftStatus::Expired, .. }));
    }

    #[tokio::test]
    async fn test_new_draft_after_terminal() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;
        expire_draft(&pool, 1, d.id).await.unwrap();

        // Terminal drafts fall out of the active index; a fresh wizard start
        // creates a brand-new draft at version 1
        let fresh = new_draft(&pool).await;
        assert_ne!(fresh.id, d.id);
        assert_eq!(fresh.version, 1);
    }

    #[tokio::test]
    async fn test_missing_draft_is_not_found() {
        let pool = test_pool().await;
        let err = update_payload(&pool, 1, 999, &serde_json::json!({"a": 1}), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_scoping() {
        let pool = test_pool().await;
        let d = new_draft(&pool).await;

        // Same draft id under the wrong store is invisible
        assert!(find_by_id(&pool, 2, d.id).await.unwrap().is_none());
    }
}
