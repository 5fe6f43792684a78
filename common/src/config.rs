// Configuration management with layered configuration (file, env)

use crate::reminder::stage::{StageConfig, StageKind};
use chrono::Duration;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret the external trigger presents as a bearer token
    pub cron_secret: String,
}

/// Which idempotency ledger guards a dispatch pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Flag in the event metadata map only; overlapping runs may both dispatch
    Metadata,
    /// Dedicated dispatch record claimed with compare-and-swap before sending
    Record,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSettings {
    pub kind: StageKind,
    pub lead_minutes: i64,
    pub tolerance_minutes: i64,
}

impl From<&StageSettings> for StageConfig {
    fn from(settings: &StageSettings) -> Self {
        StageConfig::from_minutes(
            settings.kind,
            settings.lead_minutes,
            settings.tolerance_minutes,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_ledger_mode")]
    pub ledger_mode: LedgerMode,
    /// IANA zone whose calendar day scopes a ledger key
    #[serde(default = "default_ledger_timezone")]
    pub ledger_timezone: String,
    /// Age after which a DISPATCHING claim is treated as abandoned
    #[serde(default = "default_claim_timeout_seconds")]
    pub claim_timeout_seconds: u64,
    #[serde(default = "default_stages")]
    pub stages: Vec<StageSettings>,
}

fn default_ledger_mode() -> LedgerMode {
    LedgerMode::Record
}

fn default_ledger_timezone() -> String {
    "UTC".to_string()
}

fn default_claim_timeout_seconds() -> u64 {
    900
}

fn default_stages() -> Vec<StageSettings> {
    StageKind::ALL
        .iter()
        .map(|kind| {
            let defaults = kind.default_config();
            StageSettings {
                kind: *kind,
                lead_minutes: defaults.lead.num_minutes(),
                tolerance_minutes: defaults.tolerance.num_minutes(),
            }
        })
        .collect()
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            ledger_mode: default_ledger_mode(),
            ledger_timezone: default_ledger_timezone(),
            claim_timeout_seconds: default_claim_timeout_seconds(),
            stages: default_stages(),
        }
    }
}

/// Longest lead a stage may target
pub const MAX_STAGE_LEAD_MINUTES: i64 = 7 * 24 * 60;
/// Tolerance may exceed the lead by at most one day
pub const MAX_TOLERANCE_OVER_LEAD_MINUTES: i64 = 24 * 60;
/// Longest a DISPATCHING claim is held before it counts as abandoned
pub const MAX_CLAIM_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

impl RemindersConfig {
    /// Check the stage table, time zone and claim timeout
    pub fn validate(&self) -> Result<(), String> {
        self.timezone()?;
        if self.stages.is_empty() {
            return Err("At least one reminder stage must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.kind) {
                return Err(format!("Duplicate reminder stage '{}'", stage.kind));
            }
            if stage.lead_minutes < 0 || stage.tolerance_minutes < 0 {
                return Err(format!(
                    "Stage '{}' lead and tolerance must not be negative",
                    stage.kind
                ));
            }
            if stage.lead_minutes > MAX_STAGE_LEAD_MINUTES {
                return Err(format!(
                    "Stage '{}' lead_minutes must be at most {}",
                    stage.kind, MAX_STAGE_LEAD_MINUTES
                ));
            }
            if stage.tolerance_minutes > stage.lead_minutes + MAX_TOLERANCE_OVER_LEAD_MINUTES {
                return Err(format!(
                    "Stage '{}' tolerance_minutes must be at most lead_minutes + {}",
                    stage.kind, MAX_TOLERANCE_OVER_LEAD_MINUTES
                ));
            }
        }
        if self.claim_timeout_seconds == 0 {
            return Err("Reminder claim_timeout_seconds must be greater than 0".to_string());
        }
        self.claim_timeout()?;
        Ok(())
    }

    /// Claim timeout as a signed duration
    pub fn claim_timeout(&self) -> Result<Duration, String> {
        if self.claim_timeout_seconds > MAX_CLAIM_TIMEOUT_SECONDS {
            return Err(format!(
                "Reminder claim_timeout_seconds must be at most {}",
                MAX_CLAIM_TIMEOUT_SECONDS
            ));
        }
        i64::try_from(self.claim_timeout_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                format!(
                    "Reminder claim_timeout_seconds {} is out of range",
                    self.claim_timeout_seconds
                )
            })
    }

    /// Parsed ledger time zone
    pub fn timezone(&self) -> Result<Tz, String> {
        Tz::from_str(&self.ledger_timezone)
            .map_err(|e| format!("Invalid ledger timezone '{}': {}", self.ledger_timezone, e))
    }

    /// Stage table in configuration order
    pub fn stage_table(&self) -> Vec<StageConfig> {
        self.stages.iter().map(StageConfig::from).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingMode {
    None,
    Fixed,
    TokenBucket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    pub mode: PacingMode,
    /// Pause between sends for `fixed`
    #[serde(default)]
    pub delay_ms: u64,
    /// Steady send rate for `token_bucket`
    #[serde(default = "default_per_second")]
    pub per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_per_second() -> u32 {
    2
}

fn default_burst() -> u32 {
    1
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            mode: PacingMode::TokenBucket,
            delay_ms: 0,
            per_second: default_per_second(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub provider_url: String,
    pub api_key: String,
    pub from_address: String,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub pacing: PacingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        // Validate server config
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        // Validate database config
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        // Validate auth config
        if self.auth.cron_secret.is_empty() {
            return Err("Cron secret cannot be empty".to_string());
        }

        // Validate reminder stages
        self.reminders.validate()?;

        // Validate delivery config
        if self.delivery.provider_url.is_empty() {
            return Err("Delivery provider_url cannot be empty".to_string());
        }
        if self.delivery.from_address.is_empty() {
            return Err("Delivery from_address cannot be empty".to_string());
        }
        match self.delivery.pacing.mode {
            PacingMode::TokenBucket if self.delivery.pacing.per_second == 0 => {
                return Err("Token bucket pacing per_second must be greater than 0".to_string());
            }
            _ => {}
        }

        // Validate scheduler config
        if self.scheduler.enabled && self.scheduler.poll_interval_seconds == 0 {
            return Err("Scheduler poll_interval_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout_seconds: default_request_timeout_seconds(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/learning_platform".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            auth: AuthConfig {
                cron_secret: "change-me-in-production".to_string(),
            },
            reminders: RemindersConfig::default(),
            delivery: DeliveryConfig {
                provider_url: "http://localhost:8025/api/messages".to_string(),
                api_key: String::new(),
                from_address: "reminders@localhost".to_string(),
                timeout_seconds: 10,
                pacing: PacingConfig::default(),
            },
            scheduler: SchedulerConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
                tracing_endpoint: None,
            },
        }
    }
}
