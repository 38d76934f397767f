//! Close Draft API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::core::ServerState;
use crate::db::repository::{draft, shift};
use crate::utils::{AppError, AppResult};
use shared::models::{Draft, DraftCreate, DraftFinalize, DraftStepUpdate, DraftUpdate};

/// POST /api/drafts - start (or resume) a close wizard for a shift
///
/// Idempotent: an existing non-terminal draft for the shift is returned
/// unchanged.
pub async fn create(
    State(state): State<ServerState>,
    Json(req): Json<DraftCreate>,
) -> AppResult<Json<Draft>> {
    let store_id = state.config.store_id;
    let shift = shift::find_by_id(&state.pool, store_id, req.shift_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Shift {} not found", req.shift_id)))?;

    let created_by = req.created_by.as_deref().unwrap_or("unknown");
    let draft = draft::create_or_get_active(
        &state.pool,
        store_id,
        req.shift_id,
        req.draft_type,
        &shift.business_date,
        created_by,
    )
    .await?;
    Ok(Json(draft))
}

/// GET /api/drafts/{id}
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Draft>> {
    let draft = draft::find_by_id(&state.pool, state.config.store_id, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Draft {id} not found")))?;
    Ok(Json(draft))
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub shift_id: i64,
}

/// GET /api/drafts/active?shift_id= - the shift's non-terminal draft, if any
pub async fn get_active(
    State(state): State<ServerState>,
    Query(query): Query<ActiveQuery>,
) -> AppResult<Json<Option<Draft>>> {
    let draft = draft::find_active(&state.pool, state.config.store_id, query.shift_id).await?;
    Ok(Json(draft))
}

/// PUT /api/drafts/{id} - merge a payload patch (version-checked)
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(req): Json<DraftUpdate>,
) -> AppResult<Json<Draft>> {
    let draft = draft::update_payload(
        &state.pool,
        state.config.store_id,
        id,
        &req.payload,
        req.version,
    )
    .await?;
    Ok(Json(draft))
}

/// PUT /api/drafts/{id}/step - record the last completed wizard step
pub async fn update_step(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(req): Json<DraftStepUpdate>,
) -> AppResult<Json<Draft>> {
    let draft = draft::update_step_state(
        &state.pool,
        state.config.store_id,
        id,
        req.step_state,
        req.version,
    )
    .await?;
    Ok(Json(draft))
}

/// POST /api/drafts/{id}/finalize - run the close
pub async fn finalize(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(req): Json<DraftFinalize>,
) -> AppResult<Json<serde_json::Value>> {
    let outcome = state.orchestrator.finalize(id, &req.closing).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "closed_at": outcome.closed_at,
    })))
}

/// POST /api/drafts/{id}/expire - abandon an in-progress wizard
pub async fn expire(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Draft>> {
    let draft = draft::expire_draft(&state.pool, state.config.store_id, id).await?;
    Ok(Json(draft))
}
