//! Request logging middleware

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Request logging middleware
pub struct RequestLogging;

impl RequestLogging {
    /// Log request details. Paths only, query strings are omitted.
    pub async fn log_request(req: Request<Body>, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let start = Instant::now();

        debug!("{} {} - started", method, path);

        let response = next.run(req).await;

        let duration = start.elapsed();
        let status = response.status();

        if status.is_server_error() {
            warn!("{} {} - {} in {:?}", method, path, status, duration);
        } else {
            info!("{} {} - {} in {:?}", method, path, status, duration);
        }

        response
    }
}
