//! CORS middleware configuration

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

/// Create a CORS layer for the catalog API.
///
/// With no configured origins any origin may call the relay (without
/// credentials); otherwise only the listed origins are allowed, with
/// credentials.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::OPTIONS];

    if allowed_origins.is_empty() {
        debug!("CORS: No origins specified, allowing any origin");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        debug!("CORS: Allowing origins: {:?}", allowed_origins);
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([
                axum::http::header::ACCEPT,
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
            .allow_credentials(true)
    }
}
