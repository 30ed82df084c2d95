use std::time::Duration;

use serde::Deserialize;

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    15
}

/// Configuration for the ADT Pulse integration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Enable the integration (default: true when section is present)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the Pulse bridge, e.g. "http://127.0.0.1:8600"
    pub url: String,

    /// Pulse portal username
    pub username: String,

    /// Pulse portal password
    pub password: String,

    /// Browser fingerprint registered with the Pulse portal for 2FA
    pub fingerprint: String,

    /// Seconds between status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }
}
