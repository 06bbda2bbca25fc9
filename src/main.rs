use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;

use coffee_tracker_api::config::Settings;
use coffee_tracker_api::database::{DatabaseManager, PoolConfig};
use coffee_tracker_api::server::{create_app, on_shutdown, on_startup, AppState};
use coffee_tracker_api::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing
    let _telemetry = telemetry::init_telemetry(&settings.otel, settings.database.echo)?;
    tracing::info!("Configuration loaded");

    // Initialize the database before accepting connections
    let pool_config = PoolConfig::from_settings(&settings.database)?;
    let database = DatabaseManager::instance();
    on_startup(&database, &pool_config)
        .await
        .context("Database initialization failed")?;

    // Create Axum app
    let addr = settings.server_addr();
    let state = AppState::new(settings, Arc::clone(&database));
    let app = create_app(state);

    // Start server
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await;

    // Dispose the pool even if serving failed
    let disposed = on_shutdown(&database).await;
    served?;
    disposed?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
