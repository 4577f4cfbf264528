//! # Dashboard Configuration
//!
//! Everything the control session and the status poller need to reach one
//! printer, plus the timing knobs that were tuned empirically against slow
//! firmware and therefore belong in configuration.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [printer]
//! host = "192.168.1.50"
//! serial_number = "SNMOMC9900728"
//! check_code = "a1b2c3d4"
//!
//! [session]
//! step_timeout_ms = 5000
//! settle_delay_ms = 500
//!
//! [poller]
//! interval_ms = 3000
//! milestones = [25, 50, 75]
//! ```
//!
//! Missing sections and fields fall back to the defaults below.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionConfig;
use crate::status::PollerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the printer link, control sessions, poller and API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub poller: PollerSection,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the printer lives and the shared secret its HTTP API expects.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_status_port")]
    pub status_port: u16,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub check_code: String,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            control_port: default_control_port(),
            status_port: default_status_port(),
            serial_number: String::new(),
            check_code: String::new(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl PrinterConfig {
    /// Base URL of the printer's HTTP status endpoint.
    pub fn status_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.status_port)
    }
}

/// Control-session timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSection {
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_logout_grace_ms")]
    pub logout_grace_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            logout_grace_ms: default_logout_grace_ms(),
        }
    }
}

impl SessionSection {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            step_timeout: Duration::from_millis(self.step_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            logout_grace: Duration::from_millis(self.logout_grace_ms),
        }
    }
}

/// Status polling cadence and notification thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerSection {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
    #[serde(default = "default_milestones")]
    pub milestones: Vec<u8>,
    /// Upper bound on how long a finished job keeps masking an idle printer.
    #[serde(default)]
    pub job_cache_ttl_secs: Option<u64>,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            inter_call_delay_ms: default_inter_call_delay_ms(),
            milestones: default_milestones(),
            job_cache_ttl_secs: None,
        }
    }
}

impl PollerSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn to_poller_config(&self) -> PollerConfig {
        PollerConfig {
            inter_call_delay: Duration::from_millis(self.inter_call_delay_ms),
            milestones: self.milestones.clone(),
            job_cache_ttl: self.job_cache_ttl_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Config {
    /// Reject values that would make polling or sessions misbehave.
    pub fn validate(&self) -> Result<(), String> {
        if self.printer.host.trim().is_empty() {
            return Err("printer.host must not be empty".to_string());
        }
        if self.session.step_timeout_ms == 0 {
            return Err("session.step_timeout_ms must be > 0".to_string());
        }
        if self.poller.interval_ms == 0 {
            return Err("poller.interval_ms must be > 0".to_string());
        }
        for milestone in &self.poller.milestones {
            if *milestone == 0 || *milestone > 100 {
                return Err(format!("Milestone {}% must be between 1 and 100", milestone));
            }
        }
        if let Some(ttl) = self.poller.job_cache_ttl_secs {
            if ttl == 0 {
                return Err("poller.job_cache_ttl_secs must be > 0 when set".to_string());
            }
        }
        Ok(())
    }
}

// Default value functions
fn default_host() -> String { "192.168.1.50".to_string() }
fn default_control_port() -> u16 { 8899 }
fn default_status_port() -> u16 { 8898 }
fn default_http_timeout_ms() -> u64 { 5000 }
fn default_step_timeout_ms() -> u64 { 5000 }
fn default_settle_delay_ms() -> u64 { 500 }
fn default_logout_grace_ms() -> u64 { 300 }
fn default_interval_ms() -> u64 { 3000 }
fn default_inter_call_delay_ms() -> u64 { 100 }
fn default_milestones() -> Vec<u8> { vec![50] }
fn default_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_log_level() -> String { "info".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}
