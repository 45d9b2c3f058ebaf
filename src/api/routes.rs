//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .route("/api/catalog", get(handlers::catalog::proxy_catalog))
        .with_state(state)
}
