use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::db::Database;
use crate::jobs::Jobs;
use crate::pipeline::Pipeline;
use crate::summarizer::Summarizer;

pub mod handlers;
pub mod models;

/// Shared state for the HTTP surface. The summarizer is deliberately a single
/// process-wide instance: its quota cooldown and counters apply to every
/// in-flight search equally.
pub struct AppState {
    pub db: Database,
    pub summarizer: Arc<Summarizer>,
    pub pipeline: Arc<Pipeline>,
    pub jobs: Arc<Jobs>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search", post(handlers::submit_search))
        .route("/api/search/:id", get(handlers::fetch_search))
        .route("/api/usage", get(handlers::usage_stats))
        .route("/api/usage/reset", post(handlers::reset_usage_stats))
        .with_state(state)
        .layer(cors)
}
