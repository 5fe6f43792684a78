// Telemetry module for structured logging, metrics, and tracing

use crate::reminder::outcome::DispatchOutcome;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting and trace context
///
/// This function sets up the tracing subscriber with:
/// - JSON formatting for structured logs
/// - Trace context (trace_id, span_id) in all log entries
/// - Log levels from configuration or environment
/// - Optional OpenTelemetry integration
#[tracing::instrument(skip_all)]
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    // Create environment filter from log level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    // Create JSON formatting layer with trace context
    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    // Initialize the subscriber with optional OpenTelemetry layer
    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        // Initialize OpenTelemetry if endpoint is provided
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized with JSON formatting"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
///
/// This function sets up OpenTelemetry tracing with:
/// - OTLP exporter to send traces to a collector (e.g., Jaeger)
/// - Service name and version as resource attributes
/// - Random ID generator for trace and span IDs
/// - Always-on sampler for all traces
#[tracing::instrument(skip_all)]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    // Create OTLP exporter
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    // Create tracer provider with resource attributes
    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", "event-reminders"),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    // Set global tracer provider
    global::set_tracer_provider(tracer_provider.clone());

    // Get tracer
    let tracer = tracer_provider.tracer("event-reminders");

    tracing::info!(
        endpoint = endpoint,
        "OpenTelemetry tracer initialized with OTLP exporter"
    );

    Ok(tracer)
}

/// Shutdown OpenTelemetry tracer provider
///
/// This should be called on graceful shutdown to flush remaining spans
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Initialize Prometheus metrics exporter with its own HTTP listener
///
/// Used by the standalone scheduler, which has no HTTP server of its own.
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    // Build and install the Prometheus exporter
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_metrics();

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Install the Prometheus recorder and return a handle for rendering `/metrics`
#[tracing::instrument(skip_all)]
pub fn init_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_metrics();
    tracing::info!("Prometheus metrics recorder installed");

    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "reminder_emails_sent_total",
        "Reminders accepted by the delivery adapter"
    );
    describe_counter!(
        "reminder_emails_failed_total",
        "Reminders that failed or were rejected by the delivery adapter"
    );
    describe_counter!(
        "reminder_events_processed_total",
        "Events a dispatch pass ran for"
    );
    describe_counter!(
        "reminder_events_skipped_total",
        "Events skipped by the idempotency guard"
    );
    describe_histogram!(
        "reminder_run_duration_seconds",
        "Duration of one stage run in seconds"
    );
}

/// Record the counts of one completed dispatch pass
#[inline]
pub fn record_dispatch_outcome(stage: &'static str, outcome: &DispatchOutcome) {
    counter!("reminder_events_processed_total", "stage" => stage).increment(1);
    counter!("reminder_emails_sent_total", "stage" => stage).increment(outcome.sent as u64);
    counter!("reminder_emails_failed_total", "stage" => stage).increment(outcome.failed as u64);
}

/// Record an event skipped by the idempotency guard
#[inline]
pub fn record_event_skipped(stage: &'static str, reason: &'static str) {
    counter!("reminder_events_skipped_total", "stage" => stage, "reason" => reason).increment(1);
}

/// Record the duration of one stage run
#[inline]
pub fn record_run_duration(stage: &'static str, duration_seconds: f64) {
    histogram!("reminder_run_duration_seconds", "stage" => stage).record(duration_seconds);
}
