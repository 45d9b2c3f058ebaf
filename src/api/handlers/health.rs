//! Health check and banner endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::api::server::AppState;
use crate::models::StatsSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub relay: StatsSnapshot,
}

/// Root banner
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Proxy is working. Use /api/catalog?q=...&inav=..."
    }))
}

/// Health check endpoint with relay counters
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            service: "catalog-relay",
            started_at: state.started_at,
            uptime_seconds: uptime,
            relay: state.executor.snapshot(),
        }),
    )
}
