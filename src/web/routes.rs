use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// Service metadata
pub fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::api::service_info))
        .route("/health", get(handlers::api::health))
        .route("/schema", get(handlers::api::get_schema))
}

// Question answering; both paths run the same pipeline
pub fn query_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate-sql", post(handlers::api::generate_sql))
        .route("/query", post(handlers::api::query))
}
