// Scheduler binary entry point: runs every reminder stage on a fixed interval

use common::config::Settings;
use common::db::{DbPool, DispatchRepository, PgReminderStore};
use common::delivery::HttpDeliveryAdapter;
use common::rate_limit::pacer_from_config;
use common::reminder::ReminderEngine;
use common::scheduler::{ReminderScheduler, Scheduler};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    info!("Starting reminder scheduler");

    if !settings.scheduler.enabled {
        warn!("In-process scheduler is disabled (scheduler.enabled = false), exiting");
        return Ok(());
    }

    telemetry::init_metrics(settings.observability.metrics_port)?;

    // Initialize database connection pool
    let db_pool = DbPool::new(&settings.database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        e
    })?;
    db_pool.run_migrations().await?;
    info!("Database connection pool initialized");

    let adapter = HttpDeliveryAdapter::new(&settings.delivery)?;
    let engine = ReminderEngine::from_config(
        &settings.reminders,
        Arc::new(PgReminderStore::new(db_pool.clone())),
        Arc::new(DispatchRepository::new(db_pool.clone())),
        Arc::new(adapter),
        pacer_from_config(&settings.delivery.pacing),
    )?;

    let scheduler = Arc::new(ReminderScheduler::new(settings.scheduler.clone(), engine));
    info!(
        poll_interval_seconds = settings.scheduler.poll_interval_seconds,
        ledger_mode = ?settings.reminders.ledger_mode,
        "Reminder scheduler created"
    );

    // Set up graceful shutdown
    let scheduler_for_shutdown = scheduler.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, initiating graceful shutdown");
        if let Err(e) = scheduler_for_shutdown.stop().await {
            error!(error = %e, "Error during scheduler shutdown");
        }
    });

    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Scheduler error");
        return Err(e);
    }

    db_pool.close().await;
    telemetry::shutdown_tracer();
    info!("Scheduler stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
