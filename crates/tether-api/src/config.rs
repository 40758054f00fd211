//! Configuration management for the webhook reliability service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tether_deploy::PipelineConfig;
use tether_outbound::{BackoffConfig, CircuitConfig, SendConfig};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The service works out-of-the-box with development defaults; the two
/// webhook secrets must be overridden for any real deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // Outbound delivery
    /// Destination URL for outbound dispatch webhooks.
    ///
    /// Environment variable: `AUTOMATION_URL`
    #[serde(default = "default_automation_url", alias = "AUTOMATION_URL")]
    pub automation_url: String,
    /// Shared secret used to sign outbound payloads.
    ///
    /// Environment variable: `OUTBOUND_SECRET`
    #[serde(default = "default_secret", alias = "OUTBOUND_SECRET")]
    pub outbound_secret: String,
    /// Per-attempt delivery timeout in seconds.
    ///
    /// Environment variable: `DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout", alias = "DELIVERY_TIMEOUT_SECONDS")]
    pub delivery_timeout_seconds: u64,
    /// Retries after the initial delivery attempt.
    ///
    /// Environment variable: `MAX_RETRIES`
    #[serde(default = "default_max_retries", alias = "MAX_RETRIES")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms", alias = "RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: u64,
    /// Maximum backoff delay in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor", alias = "RETRY_JITTER_FACTOR")]
    pub retry_jitter_factor: f64,
    /// Overall delivery deadline in seconds. Zero disables the deadline.
    ///
    /// Environment variable: `DELIVERY_DEADLINE_SECONDS`
    #[serde(default, alias = "DELIVERY_DEADLINE_SECONDS")]
    pub delivery_deadline_seconds: u64,

    // Circuit breaker
    /// Failures within the window that open a destination's circuit.
    ///
    /// Environment variable: `CIRCUIT_FAILURE_THRESHOLD`
    #[serde(default = "default_failure_threshold", alias = "CIRCUIT_FAILURE_THRESHOLD")]
    pub circuit_failure_threshold: u32,
    /// Rolling failure window in seconds.
    ///
    /// Environment variable: `CIRCUIT_FAILURE_WINDOW_SECONDS`
    #[serde(default = "default_failure_window", alias = "CIRCUIT_FAILURE_WINDOW_SECONDS")]
    pub circuit_failure_window_seconds: u64,
    /// Open-circuit cooldown in seconds before a probe is admitted.
    ///
    /// Environment variable: `CIRCUIT_COOLDOWN_SECONDS`
    #[serde(default = "default_cooldown", alias = "CIRCUIT_COOLDOWN_SECONDS")]
    pub circuit_cooldown_seconds: u64,

    // Inbound / deployment
    /// Shared secret used to verify inbound CI webhooks.
    ///
    /// Environment variable: `INBOUND_SECRET`
    #[serde(default = "default_secret", alias = "INBOUND_SECRET")]
    pub inbound_secret: String,
    /// Shell command that snapshots the current deployment.
    ///
    /// Environment variable: `BACKUP_COMMAND`
    #[serde(default = "default_backup_command", alias = "BACKUP_COMMAND")]
    pub backup_command: String,
    /// Shell command that deploys the new version.
    ///
    /// Environment variable: `DEPLOY_COMMAND`
    #[serde(default = "default_deploy_command", alias = "DEPLOY_COMMAND")]
    pub deploy_command: String,
    /// Shell command that restores the snapshot on failure.
    ///
    /// Environment variable: `ROLLBACK_COMMAND`
    #[serde(default = "default_rollback_command", alias = "ROLLBACK_COMMAND")]
    pub rollback_command: String,
    /// Health endpoint polled after a deploy.
    ///
    /// Environment variable: `HEALTH_CHECK_URL`
    #[serde(default = "default_health_check_url", alias = "HEALTH_CHECK_URL")]
    pub health_check_url: String,
    /// Total health-check budget in seconds before rollback.
    ///
    /// Environment variable: `HEALTH_CHECK_TIMEOUT_SECONDS`
    #[serde(default = "default_health_timeout", alias = "HEALTH_CHECK_TIMEOUT_SECONDS")]
    pub health_check_timeout_seconds: u64,
    /// Wait between health probe attempts in seconds.
    ///
    /// Environment variable: `HEALTH_CHECK_INTERVAL_SECONDS`
    #[serde(default = "default_health_interval", alias = "HEALTH_CHECK_INTERVAL_SECONDS")]
    pub health_check_interval_seconds: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `config.toml`, and environment
    /// variable overrides, then validates it.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the outbound sender's delivery policy.
    pub fn to_send_config(&self) -> SendConfig {
        SendConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            max_retries: self.max_retries,
            backoff: BackoffConfig {
                base: Duration::from_millis(self.retry_base_delay_ms),
                multiplier: 2.0,
                cap: Duration::from_millis(self.retry_max_delay_ms),
                jitter_factor: self.retry_jitter_factor,
            },
            deadline: (self.delivery_deadline_seconds > 0)
                .then(|| Duration::from_secs(self.delivery_deadline_seconds)),
        }
    }

    /// Converts to circuit breaker configuration.
    pub fn to_circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_failure_threshold,
            failure_window: Duration::from_secs(self.circuit_failure_window_seconds),
            cooldown: Duration::from_secs(self.circuit_cooldown_seconds),
        }
    }

    /// Converts to deployment pipeline configuration.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            health_check_timeout: Duration::from_secs(self.health_check_timeout_seconds),
            health_check_interval: Duration::from_secs(self.health_check_interval_seconds),
        }
    }

    /// Parses the server socket address from host and port.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("invalid server address")
    }

    /// Validates configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.automation_url.is_empty() {
            anyhow::bail!("automation_url must not be empty");
        }

        if self.outbound_secret.is_empty() || self.inbound_secret.is_empty() {
            anyhow::bail!("webhook secrets must not be empty");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.circuit_failure_threshold == 0 {
            anyhow::bail!("circuit_failure_threshold must be greater than 0");
        }

        if self.health_check_interval_seconds == 0 {
            anyhow::bail!("health_check_interval_seconds must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            automation_url: default_automation_url(),
            outbound_secret: default_secret(),
            delivery_timeout_seconds: default_delivery_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: default_jitter_factor(),
            delivery_deadline_seconds: 0,
            circuit_failure_threshold: default_failure_threshold(),
            circuit_failure_window_seconds: default_failure_window(),
            circuit_cooldown_seconds: default_cooldown(),
            inbound_secret: default_secret(),
            backup_command: default_backup_command(),
            deploy_command: default_deploy_command(),
            rollback_command: default_rollback_command(),
            health_check_url: default_health_check_url(),
            health_check_timeout_seconds: default_health_timeout(),
            health_check_interval_seconds: default_health_interval(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_automation_url() -> String {
    "http://127.0.0.1:9000/webhook".to_string()
}

fn default_secret() -> String {
    "development-secret".to_string()
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_window() -> u64 {
    60
}

fn default_cooldown() -> u64 {
    30
}

fn default_backup_command() -> String {
    "scripts/backup.sh".to_string()
}

fn default_deploy_command() -> String {
    "scripts/deploy.sh".to_string()
}

fn default_rollback_command() -> String {
    "scripts/rollback.sh".to_string()
}

fn default_health_check_url() -> String {
    "http://127.0.0.1:3000/health".to_string()
}

fn default_health_timeout() -> u64 {
    60
}

fn default_health_interval() -> u64 {
    2
}

fn default_log_level() -> String {
    "info,tether=debug".to_string()
}
