//! Catalog Relay - Entry Point
//!
//! Starts the API server with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog_relay::api::ApiServer;
use catalog_relay::config::LogConfig;
use catalog_relay::relay::RequestExecutor;
use catalog_relay::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log);

    info!("Starting Catalog Relay");
    info!(
        proxies = config.relay.proxies.len(),
        upstream = %config.relay.upstream_url,
        "Configuration loaded"
    );

    let executor = Arc::new(RequestExecutor::from_config(&config.relay)?);
    let api_server = ApiServer::new(&config, executor);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(shutdown_rx).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started - API: {}", config.api_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = api_task.await;

    info!("Catalog Relay stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("catalog_relay={},tower_http=info", log.level)))
        .unwrap_or_else(|_| EnvFilter::new("catalog_relay=info,tower_http=info"));

    let registry = tracing_subscriber::registry().with(filter);

    if log.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
