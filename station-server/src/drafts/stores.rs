//! Finalize Collaborators
//!
//! Narrow interfaces the orchestrator calls during finalize. Each has exactly
//! two implementations: the SQLite-backed one below and an in-memory fake in
//! the orchestrator tests.

use async_trait::async_trait;
use shared::models::{BusinessDay, Shift};
use sqlx::SqlitePool;

use crate::db::repository::{RepoResult, business_day, shift};

#[async_trait]
pub trait ShiftStore: Send + Sync {
    async fn find_by_id(&self, store_id: i64, id: i64) -> RepoResult<Option<Shift>>;
    /// Must tolerate re-invocation: closing an already-CLOSED shift succeeds
    async fn close(
        &self,
        store_id: i64,
        id: i64,
        closing_data: &serde_json::Value,
    ) -> RepoResult<Shift>;
}

#[async_trait]
pub trait BusinessDayStore: Send + Sync {
    async fn get_or_create_for_date(
        &self,
        store_id: i64,
        business_date: &str,
    ) -> RepoResult<BusinessDay>;
    async fn prepare_close(
        &self,
        store_id: i64,
        business_date: &str,
        totals: &serde_json::Value,
    ) -> RepoResult<BusinessDay>;
    async fn commit_close(&self, store_id: i64, business_date: &str) -> RepoResult<BusinessDay>;
}

/// How this station talks to the forecourt controller. Anything other than
/// standalone means fuel totals live remotely and must be pulled after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosConnectionType {
    Standalone,
    Commander,
    Passport,
}

pub trait SettingsProvider: Send + Sync {
    fn pos_connection_type(&self) -> PosConnectionType;
}

/// Receives "shift closed" signals after a successful finalize
#[async_trait]
pub trait CloseEventSink: Send + Sync {
    async fn shift_closed(&self, store_id: i64, shift_id: i64, closed_at: i64);
}

pub struct SqliteShiftStore {
    pool: SqlitePool,
}

impl SqliteShiftStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShiftStore for SqliteShiftStore {
    async fn find_by_id(&self, store_id: i64, id: i64) -> RepoResult<Option<Shift>> {
        shift::find_by_id(&self.pool, store_id, id).await
    }

    async fn close(
        &self,
        store_id: i64,
        id: i64,
        closing_data: &serde_json::Value,
    ) -> RepoResult<Shift> {
        shift::close(&self.pool, store_id, id, closing_data).await
    }
}

pub struct SqliteBusinessDayStore {
    pool: SqlitePool,
}

impl SqliteBusinessDayStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusinessDayStore for SqliteBusinessDayStore {
    async fn get_or_create_for_date(
        &self,
        store_id: i64,
        business_date: &str,
    ) -> RepoResult<BusinessDay> {
        business_day::get_or_create_for_date(&self.pool, store_id, business_date).await
    }

    async fn prepare_close(
        &self,
        store_id: i64,
        business_date: &str,
        totals: &serde_json::Value,
    ) -> RepoResult<BusinessDay> {
        business_day::prepare_close(&self.pool, store_id, business_date, totals).await
    }

    async fn commit_close(&self, store_id: i64, business_date: &str) -> RepoResult<BusinessDay> {
        business_day::commit_close(&self.pool, store_id, business_date).await
    }
}

/// Fixed connection type read from configuration at startup
pub struct ConfigSettingsProvider {
    connection_type: PosConnectionType,
}

impl ConfigSettingsProvider {
    pub fn new(connection_type: PosConnectionType) -> Self {
        Self { connection_type }
    }
}

impl SettingsProvider for ConfigSettingsProvider {
    fn pos_connection_type(&self) -> PosConnectionType {
        self.connection_type
    }
}

/// Default sink: the signal is an operational log line until a front-end
/// notification channel is attached
pub struct LoggingEventSink;

#[async_trait]
impl CloseEventSink for LoggingEventSink {
    async fn shift_closed(&self, store_id: i64, shift_id: i64, closed_at: i64) {
        tracing::info!(store_id, shift_id, closed_at, "Shift closed");
    }
}
