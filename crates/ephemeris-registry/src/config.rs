//! Configuration types for the registry.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{RegistryError, Result};

/// Registry configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// HTTP API configuration.
    pub api: ApiConfig,
    /// Heartbeat and sweep configuration.
    pub heartbeat: HeartbeatConfig,
    /// Patch delivery configuration.
    pub notify: NotifyConfig,
}

impl RegistryConfig {
    /// Loads `registry.toml` (if present) overlaid with `REGISTRY_` env vars.
    pub fn load() -> Result<Self> {
        Self::load_from("registry.toml")
    }

    /// Loads from a specific file, overlaid with `REGISTRY_` env vars.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("REGISTRY_").split("__"))
            .extract()
            .map_err(|e| RegistryError::Config(e.to_string()))
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| RegistryError::Config(e.to_string()))
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 80),
        }
    }
}

/// Heartbeat and liveness sweep configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// How often the sweep runs.
    #[serde(with = "serde_duration_secs")]
    pub sweep_interval: Duration,
    /// Silence after which an instance is evicted.
    #[serde(with = "serde_duration_secs")]
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(20),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Patch delivery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Per-recipient request timeout.
    #[serde(with = "serde_duration_secs")]
    pub delivery_timeout: Duration,
    /// Maximum deliveries in flight at once.
    pub max_in_flight: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(5),
            max_in_flight: 64,
        }
    }
}

/// Serde helper for Duration as seconds.
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
