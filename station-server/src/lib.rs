//! Station Server — local-first transactional core for a retail/fuel POS
//!
//! # Module structure
//!
//! ```text
//! station-server/src/
//! ├── core/      # Config, state, HTTP server
//! ├── api/       # HTTP routes and handlers
//! ├── db/        # SQLite pool, migrations, repositories
//! ├── drafts/    # Close-wizard finalize orchestration
//! ├── outbox/    # Sync outbox, retry strategy, dispatch worker
//! └── utils/     # Errors, logging
//! ```
//!
//! The close wizard persists its state as versioned drafts (optimistic
//! concurrency, CAS transitions); every finalized close enqueues durable
//! sync intents into the outbox, which a background worker delivers to the
//! back office with categorized retry and dead-lettering.

pub mod api;
pub mod core;
pub mod db;
pub mod drafts;
pub mod outbox;
pub mod utils;

pub use crate::core::{Config, Server, ServerState};
pub use utils::{AppError, AppResult};
pub use utils::logger::{init_logger, init_logger_with_file};

/// Load .env, create the working directory, and initialize logging
pub fn setup_environment() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let work_dir = std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/station".into());
    std::fs::create_dir_all(&work_dir)?;

    let log_dir = format!("{work_dir}/logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_level = std::env::var("LOG_LEVEL").ok();
    init_logger_with_file(log_level.as_deref(), Some(&log_dir));

    Ok(())
}
