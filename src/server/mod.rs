//! HTTP server module
//!
//! Provides the Axum-based HTTP server for serving metrics.

pub mod handlers;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::collector::Collector;
use crate::config::Config;
use crate::error::AppResult;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Solr collector, one cycle per metrics request
    pub collector: Arc<Collector>,
}

impl AppState {
    /// Build the state, compiling user queries once
    pub fn new(config: Config) -> AppResult<Self> {
        let collector = Collector::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            collector: Arc::new(collector),
        })
    }
}

/// Build the router: `/`, `/health` and the configured metrics path
pub fn router(state: AppState) -> Router {
    let metrics_path = state.config.server.path.clone();

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(&metrics_path, get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bind_address(config: &Config) -> Result<SocketAddr> {
    let address = &config.server.bind_address;
    let ip: IpAddr = if address == "localhost" {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        address.parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid bind_address '{}': {}. Use an IP address (e.g., '0.0.0.0', '127.0.0.1') or 'localhost'.",
                address,
                e
            )
        })?
    };
    Ok(SocketAddr::from((ip, config.server.port)))
}

/// Run the HTTP server until a shutdown signal arrives
///
/// # Errors
/// Returns an error if the collector cannot be built or the listener
/// cannot bind
pub async fn run(config: Config) -> Result<()> {
    let addr = bind_address(&config)?;
    let metrics_path = config.server.path.clone();
    let app = router(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, metrics_path = %metrics_path, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal
///
/// A handler that fails to install never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let mut config = Config::default();
        assert_eq!(bind_address(&config).unwrap().to_string(), "0.0.0.0:9983");

        config.server.bind_address = "localhost".to_string();
        config.server.port = 9100;
        assert_eq!(bind_address(&config).unwrap().to_string(), "127.0.0.1:9100");

        config.server.bind_address = "::1".to_string();
        assert_eq!(bind_address(&config).unwrap().to_string(), "[::1]:9100");

        config.server.bind_address = "solr-exporter.local".to_string();
        assert!(bind_address(&config).is_err());
    }
}
