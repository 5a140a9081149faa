//! Configuration management
//!
//! Handles loading and validating client configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub session: SessionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Collaboration backend to connect to
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Backend host name or IP
    pub host: String,
    /// Backend port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Wrap the connection in TLS
    #[serde(default = "default_true")]
    pub secure: bool,
}

/// Host-side driving cadence for `Reactor::tick`
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Milliseconds between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Connection-owned reconnect policy
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts before giving up (0 = never reconnect)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Cap for the retry delay
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Delay growth per retry
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// TLS configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TlsConfig {
    /// Extra PEM bundle trusted in addition to the webpki roots
    #[serde(default)]
    pub ca_path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
        }
    }
}

/// Largest accepted `reconnect.backoff_multiplier`
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

// Default value functions
fn default_port() -> u16 { 3448 }
fn default_true() -> bool { true }
fn default_tick_interval() -> u64 { 100 }
fn default_max_retries() -> u32 { 20 }
fn default_initial_delay() -> u64 { 500 }
fn default_max_delay() -> u64 { 10_000 }
fn default_backoff_multiplier() -> f64 { 1.5 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.session.host.is_empty() {
            anyhow::bail!("session.host must not be empty");
        }
        if self.session.port == 0 {
            anyhow::bail!("session.port must be > 0");
        }
        if self.scheduler.tick_interval_ms == 0 {
            anyhow::bail!("scheduler.tick_interval_ms must be > 0");
        }
        if self.reconnect.initial_delay_ms == 0 {
            anyhow::bail!("reconnect.initial_delay_ms must be > 0");
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            anyhow::bail!("reconnect.max_delay_ms must be >= reconnect.initial_delay_ms");
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.reconnect.backoff_multiplier) {
            anyhow::bail!(
                "reconnect.backoff_multiplier must be between 1.0 and {}",
                MAX_BACKOFF_MULTIPLIER
            );
        }
        Ok(())
    }
}
