pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::ServerConfig;
pub use db::{AppState, AttemptStore, MemoryStore, MongoStore};
pub use error::AppError;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_checker))
        .route("/attempts/:attempt_id/cheating-violation", post(handlers::record_violation))
        .route("/attempts/:attempt_id/cheating-warnings", get(handlers::get_warnings))
        .route("/attempts/:attempt_id/submit", post(handlers::submit_attempt))
        .layer(TraceLayer::new_for_http())
        // the exam client may be served from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
