use std::sync::Arc;

use common::auth::CronAuth;
use common::config::Settings;
use common::reminder::ReminderEngine;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: ReminderEngine,
    pub auth: CronAuth,
    pub config: Arc<Settings>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(engine: ReminderEngine, config: Settings) -> Self {
        Self {
            engine,
            auth: CronAuth::new(config.auth.cron_secret.clone()),
            config: Arc::new(config),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
