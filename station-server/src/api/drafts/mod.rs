//! Close Draft API 模块

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/drafts", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/active", get(handler::get_active))
        .route("/{id}", get(handler::get_by_id).put(handler::update))
        .route("/{id}/step", put(handler::update_step))
        .route("/{id}/finalize", post(handler::finalize))
        .route("/{id}/expire", post(handler::expire))
}
