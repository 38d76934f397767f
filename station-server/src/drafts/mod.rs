//! Draft Finalize Orchestration
//!
//! Drives a close-wizard draft through FINALIZING into FINALIZED: acquires
//! the transition lock via CAS, executes the external side effects (shift
//! close, business-day roll-up), and enqueues the downstream sync intents.
//! Any side-effect failure rolls the draft back to IN_PROGRESS so the
//! operation is always safely retryable.

pub mod stores;

use std::sync::Arc;
use tokio::time::Duration;

use crate::db::repository::{RepoError, draft};
use crate::outbox::SyncOutbox;
use crate::utils::{AppError, AppResult};
use shared::models::{Draft, DraftStatus, DraftType, SyncDirection, SyncEnqueue, SyncOperation};
use sqlx::SqlitePool;
use stores::{BusinessDayStore, CloseEventSink, PosConnectionType, SettingsProvider, ShiftStore};

/// Wait step while another caller holds FINALIZING
const FINALIZE_POLL_INTERVAL_MS: u64 = 25;
/// Give up waiting after this many polls (~5s)
const FINALIZE_MAX_POLLS: u32 = 200;

/// Result of a finalize call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// Closure timestamp (epoch millis); identical for every caller that
    /// observes success on the same draft
    pub closed_at: i64,
    /// True when a prior finalize already completed and side effects were
    /// not re-executed
    pub already_finalized: bool,
}

pub struct FinalizeOrchestrator {
    pool: SqlitePool,
    store_id: i64,
    shifts: Arc<dyn ShiftStore>,
    days: Arc<dyn BusinessDayStore>,
    settings: Arc<dyn SettingsProvider>,
    events: Arc<dyn CloseEventSink>,
    outbox: Arc<SyncOutbox>,
}

impl FinalizeOrchestrator {
    pub fn new(
        pool: SqlitePool,
        store_id: i64,
        shifts: Arc<dyn ShiftStore>,
        days: Arc<dyn BusinessDayStore>,
        settings: Arc<dyn SettingsProvider>,
        events: Arc<dyn CloseEventSink>,
        outbox: Arc<SyncOutbox>,
    ) -> Self {
        Self { pool, store_id, shifts, days, settings, events, outbox }
    }

    /// Finalize a draft. Idempotent: a draft that is already FINALIZED
    /// returns success with its stored closure time and re-executes nothing.
    /// While another caller holds the FINALIZING transition, this waits for
    /// the outcome instead of failing fast, so concurrent callers converge
    /// on one closure timestamp.
    pub async fn finalize(
        &self,
        draft_id: i64,
        closing: &serde_json::Value,
    ) -> AppResult<FinalizeOutcome> {
        let mut polls = 0u32;
        let acquired = loop {
            let current = draft::find_by_id(&self.pool, self.store_id, draft_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Draft {draft_id} not found")))?;

            match current.status {
                DraftStatus::Finalized => {
                    let closed_at = current.closed_at.ok_or_else(|| {
                        AppError::internal("Finalized draft is missing closed_at")
                    })?;
                    return Ok(FinalizeOutcome { closed_at, already_finalized: true });
                }
                DraftStatus::Expired => {
                    return Err(AppError::conflict("Cannot finalize draft in EXPIRED status"));
                }
                DraftStatus::InProgress => {
                    match draft::begin_finalize(&self.pool, self.store_id, draft_id).await {
                        Ok(locked) => break locked,
                        // Lost the CAS to a concurrent finalizer; re-observe
                        Err(RepoError::InvalidTransition { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                DraftStatus::Finalizing => {
                    polls += 1;
                    if polls > FINALIZE_MAX_POLLS {
                        return Err(AppError::conflict("Finalize already in progress"));
                    }
                    tokio::time::sleep(Duration::from_millis(FINALIZE_POLL_INTERVAL_MS)).await;
                }
            }
        };

        if let Err(e) = self.run_side_effects(&acquired, closing).await {
            tracing::warn!(
                draft_id,
                error = %e,
                "Finalize side effects failed, rolling back to IN_PROGRESS"
            );
            if let Err(rollback_err) =
                draft::rollback_finalize(&self.pool, self.store_id, draft_id).await
            {
                tracing::error!(draft_id, error = %rollback_err, "Finalize rollback failed");
            }
            return Err(e);
        }

        let finalized = draft::finalize_draft(&self.pool, self.store_id, draft_id).await?;
        let closed_at = finalized
            .closed_at
            .ok_or_else(|| AppError::internal("Finalized draft is missing closed_at"))?;

        self.enqueue_downstream(&finalized).await;
        self.events.shift_closed(self.store_id, finalized.shift_id, closed_at).await;

        Ok(FinalizeOutcome { closed_at, already_finalized: false })
    }

    /// Close the shift and, for a day close, roll the totals into the
    /// business-day aggregate. Every step tolerates re-invocation: a prior
    /// attempt may have partially landed before its rollback.
    async fn run_side_effects(
        &self,
        draft: &Draft,
        closing: &serde_json::Value,
    ) -> AppResult<()> {
        let snapshot = if closing.is_null() { &draft.payload } else { closing };

        self.shifts.close(self.store_id, draft.shift_id, snapshot).await?;

        if draft.draft_type == DraftType::DayClose {
            self.days.get_or_create_for_date(self.store_id, &draft.business_date).await?;
            self.days.prepare_close(self.store_id, &draft.business_date, snapshot).await?;
            self.days.commit_close(self.store_id, &draft.business_date).await?;
        }
        Ok(())
    }

    /// Enqueue sync intents for the now-closed entities. Enqueue failures are
    /// logged, never surfaced: the close itself has committed and the outbox
    /// worker's stale handling picks up the slack.
    async fn enqueue_downstream(&self, draft: &Draft) {
        let shift_push = SyncEnqueue::new("shift", &draft.shift_id.to_string(), SyncOperation::Update)
            .with_payload(serde_json::json!({
                "shift_id": draft.shift_id,
                "business_date": draft.business_date,
                "draft_type": draft.draft_type,
            }));
        if let Err(e) = self.outbox.enqueue(shift_push).await {
            tracing::error!(draft_id = draft.id, error = %e, "Failed to enqueue shift sync");
        }

        if draft.draft_type == DraftType::DayClose {
            let day_push =
                SyncEnqueue::new("business_day", &draft.business_date, SyncOperation::Update)
                    .with_payload(serde_json::json!({
                        "business_date": draft.business_date,
                    }))
                    .with_discriminator(format!("close-{}", draft.id));
            if let Err(e) = self.outbox.enqueue(day_push).await {
                tracing::error!(draft_id = draft.id, error = %e, "Failed to enqueue day sync");
            }
        }

        // Fuel totals live on the forecourt controller when not standalone;
        // schedule a pull so the closed day picks them up
        if self.settings.pos_connection_type() != PosConnectionType::Standalone {
            let pull = SyncEnqueue::new("fuel_totals", &draft.business_date, SyncOperation::Update)
                .with_direction(SyncDirection::Pull)
                .with_payload(serde_json::json!({
                    "action": "fuel_totals",
                    "date": draft.business_date,
                }));
            if let Err(e) = self.outbox.enqueue(pull).await {
                tracing::error!(draft_id = draft.id, error = %e, "Failed to enqueue fuel pull");
            }
        }
    }
}
