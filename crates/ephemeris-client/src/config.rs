//! Client configuration.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// How a service reaches and talks to the registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the registry, without a path.
    pub registry_url: String,
    /// Pause between failed registration attempts.
    #[serde(with = "serde_duration_secs")]
    pub retry_interval: Duration,
    /// Period of the heartbeat loop.
    #[serde(with = "serde_duration_secs")]
    pub heartbeat_interval: Duration,
    /// Per-request timeout for every registry call.
    #[serde(with = "serde_duration_secs")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            registry_url: "http://127.0.0.1:80".to_owned(),
            retry_interval: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Loads `ephemeris.toml` (if present) overlaid with `EPHEMERIS_` env vars.
    pub fn load() -> Result<Self> {
        Self::load_from("ephemeris.toml")
    }

    /// Loads from a specific file, overlaid with `EPHEMERIS_` env vars.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("EPHEMERIS_"))
            .extract()
            .map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Targets a different registry.
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
