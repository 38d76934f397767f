//! Health Check Routes

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::time::SystemTime;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/health/detailed", get(detailed_health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store_id: i64,
}

#[derive(Serialize)]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    database: CheckResult,
    sync_queue: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    status: &'static str,
    latency_ms: Option<u64>,
    message: Option<String>,
    pending: Option<i64>,
}

impl CheckResult {
    fn ok_with_latency(latency_ms: u64) -> Self {
        Self { status: "ok", latency_ms: Some(latency_ms), message: None, pending: None }
    }

    fn ok_with_pending(pending: i64) -> Self {
        Self { status: "ok", latency_ms: None, message: None, pending: Some(pending) }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { status: "error", latency_ms: None, message: Some(message.into()), pending: None }
    }
}

static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

fn get_uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(SystemTime::now);
    SystemTime::now().duration_since(*start).map(|d| d.as_secs()).unwrap_or(0)
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store_id: state.config.store_id,
    })
}

pub async fn detailed_health(State(state): State<ServerState>) -> Json<DetailedHealthResponse> {
    let db_start = std::time::Instant::now();
    let db_check = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => CheckResult::ok_with_latency(db_start.elapsed().as_millis() as u64),
        Err(e) => CheckResult::error(format!("Database error: {e}")),
    };

    let queue_check = match state.outbox.pending_count().await {
        Ok(pending) => CheckResult::ok_with_pending(pending),
        Err(e) => CheckResult::error(format!("Sync queue error: {e}")),
    };

    let all_ok = db_check.status == "ok" && queue_check.status == "ok";

    Json(DetailedHealthResponse {
        status: if all_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: get_uptime_seconds(),
        checks: HealthChecks { database: db_check, sync_queue: queue_check },
    })
}
