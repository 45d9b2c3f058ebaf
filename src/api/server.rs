//! API server using Axum
//!
//! Serves the catalog relay endpoint and the health check.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::{ApiServerConfig, Config};
use crate::error::{RelayError, Result};
use crate::relay::RequestExecutor;

use super::middleware::{cors_layer, RequestLogging};
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<RequestExecutor>,
    pub upstream_url: Arc<str>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(executor: Arc<RequestExecutor>, upstream_url: &str) -> Self {
        Self {
            executor,
            upstream_url: Arc::from(upstream_url),
            started_at: Utc::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: &Config, executor: Arc<RequestExecutor>) -> Self {
        Self {
            config: config.api.clone(),
            state: AppState::new(executor, &config.relay.upstream_url),
        }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        build_router(self.state.clone(), &self.config.cors_origins)
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| RelayError::InvalidConfig(format!("Invalid API server address: {}", e)))?;

        let router = self.build_router();

        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| RelayError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}

/// Router with CORS, tracing and access logging applied
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    routes::create_router(state)
        .layer(axum::middleware::from_fn(RequestLogging::log_request))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}
