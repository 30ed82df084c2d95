//! Configuration file parsing and structures.
//!
//! pulsed uses TOML for declarative configuration. Each integration owns a
//! statically typed section under `[integrations]`; an absent section leaves
//! that integration unregistered.

use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tracing_subscriber::filter::LevelFilter;

#[cfg(feature = "integration_adtpulse")]
pub use crate::integrations::adtpulse::AdtPulseConfig;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP API; disabled when the section is absent
    #[serde(default)]
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"pulsed::integrations::adtpulse" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
pub struct IntegrationsConfig {
    /// ADT Pulse alarm and sensors
    #[cfg(feature = "integration_adtpulse")]
    #[serde(default)]
    pub adtpulse: Option<AdtPulseConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.as_ref().to_path_buf(), e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML in {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}
