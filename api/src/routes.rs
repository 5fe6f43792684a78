use std::time::Duration;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::cron_auth_middleware;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_seconds);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler));

    // Cron trigger routes, one per stage id
    let cron_routes = Router::new()
        .route(
            "/api/cron/reminders/:stage",
            get(handlers::reminders::run_stage),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            cron_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(cron_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
