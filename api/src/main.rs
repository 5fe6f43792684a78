use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;

use api::{create_router, AppState};
use common::config::Settings;
use common::db::{DbPool, DispatchRepository, PgReminderStore};
use common::delivery::http::HttpDeliveryAdapter;
use common::rate_limit::pacer_from_config;
use common::reminder::ReminderEngine;
use common::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Settings::load()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.tracing_endpoint.as_deref(),
    )?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        ledger_mode = ?config.reminders.ledger_mode,
        "Starting reminder API server"
    );

    // Initialize database connection pool
    let db_pool = DbPool::new(&config.database).await?;
    db_pool.run_migrations().await?;
    tracing::info!("Database connection pool established");

    // Initialize Prometheus metrics recorder (rendered on /metrics)
    let metrics_handle = telemetry::init_metrics_recorder()?;

    let adapter = HttpDeliveryAdapter::new(&config.delivery)?;
    let store = Arc::new(PgReminderStore::new(db_pool.clone()));
    let ledger = Arc::new(DispatchRepository::new(db_pool.clone()));

    let engine = ReminderEngine::from_config(
        &config.reminders,
        store,
        ledger,
        Arc::new(adapter),
        pacer_from_config(&config.delivery.pacing),
    )?;

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    // Create application state and router
    let state = AppState::new(engine, config).with_metrics(metrics_handle);
    let app = create_router(state);

    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    telemetry::shutdown_tracer();
    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
