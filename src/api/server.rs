//! HTTP server startup and graceful shutdown.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use crate::api::{routes, ApiState};
use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::storage::create_pool;

/// Connect to the database, assemble the router, and serve until a shutdown
/// signal arrives.
pub async fn start(config: AppConfig) -> Result<()> {
    let pool = create_pool(&config.database).await?;
    let state = ApiState::new(&config, pool);
    let app = routes::build_router(state);

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind {}: {}", address, e)))?;

    info!(address = %address, environment = ?config.environment, "careportal API listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::transport(format!("HTTP server error: {}", e)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
