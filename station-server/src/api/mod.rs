//! API Routes
//!
//! - [`health`] - liveness and component checks
//! - [`drafts`] - close-wizard draft lifecycle

pub mod drafts;
pub mod health;

use axum::Router;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().merge(health::router()).merge(drafts::router())
}
