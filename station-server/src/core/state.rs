//! Server State
//!
//! One [`ServerState`] is built at startup and cloned into every handler and
//! background task. All shared services sit behind `Arc`, so a clone is a
//! handful of reference bumps.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::db::DbService;
use crate::drafts::FinalizeOrchestrator;
use crate::drafts::stores::{
    ConfigSettingsProvider, LoggingEventSink, SqliteBusinessDayStore, SqliteShiftStore,
};
use crate::outbox::{HttpTransport, RetryStrategy, SyncOutbox, SyncWorker};
use crate::utils::AppError;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub outbox: Arc<SyncOutbox>,
    pub orchestrator: Arc<FinalizeOrchestrator>,
    /// Cancelling this stops every background task
    pub shutdown: CancellationToken,
}

impl ServerState {
    /// Open the database, seed the store row, and wire up the outbox and
    /// finalize orchestrator
    pub async fn initialize(config: &Config) -> Result<Self, AppError> {
        let db = DbService::new(&config.db_path()).await?;
        db.seed_store(config.store_id, &config.store_name).await?;
        let pool = db.pool;

        let strategy = Arc::new(RetryStrategy::new(config.retry_config()));
        let outbox = Arc::new(SyncOutbox::open(pool.clone(), config.store_id, strategy));

        let orchestrator = Arc::new(FinalizeOrchestrator::new(
            pool.clone(),
            config.store_id,
            Arc::new(SqliteShiftStore::new(pool.clone())),
            Arc::new(SqliteBusinessDayStore::new(pool.clone())),
            Arc::new(ConfigSettingsProvider::new(config.pos_connection_type)),
            Arc::new(LoggingEventSink),
            outbox.clone(),
        ));

        Ok(Self {
            config: Arc::new(config.clone()),
            pool,
            outbox,
            orchestrator,
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawn the sync dispatch worker. Without a configured remote URL the
    /// outbox still accumulates rows; they are dispatched once a URL is set.
    pub fn start_background_tasks(&self) -> Result<(), AppError> {
        let Some(remote_url) = self.config.remote_sync_url.clone() else {
            tracing::warn!("REMOTE_SYNC_URL not set, sync worker disabled");
            return Ok(());
        };

        let transport = HttpTransport::new(remote_url, self.config.store_id)
            .map_err(|e| AppError::internal(e.message))?;
        let worker = SyncWorker::new(
            self.outbox.clone(),
            Arc::new(transport),
            self.shutdown.clone(),
        );
        tokio::spawn(worker.run());
        Ok(())
    }

    /// Signal shutdown to background tasks and stop accepting outbox work
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
        self.outbox.close();
    }
}
