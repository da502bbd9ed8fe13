use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        .route("/trigger-poll", post(handlers::trigger_poll))
        .route("/files", get(handlers::list_files))
        .route("/files/{id}", get(handlers::get_file))
        .route("/queries", get(handlers::list_queries))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
