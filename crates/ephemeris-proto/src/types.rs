//! Identifiers shared between the registry and its clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical role of a service instance.
///
/// Several instances may share a name; the registry tells them apart by
/// their `serviceURL`. Roles outside the known set round-trip through
/// [`ServiceName::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceName {
    Log,
    ProxyNode,
    Web,
    Payment,
    Shell,
    User,
    Custom(String),
}

impl ServiceName {
    /// Returns the wire form of the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Log => "log",
            Self::ProxyNode => "proxy-node",
            Self::Web => "web",
            Self::Payment => "payment",
            Self::Shell => "shell",
            Self::User => "user",
            Self::Custom(name) => name,
        }
    }

    /// Returns true if the name carries no role at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<&str> for ServiceName {
    fn from(value: &str) -> Self {
        match value {
            "log" => Self::Log,
            "proxy-node" => Self::ProxyNode,
            "web" => Self::Web,
            "payment" => Self::Payment,
            "shell" => Self::Shell,
            "user" => Self::User,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for ServiceName {
    fn from(value: String) -> Self {
        match Self::from(value.as_str()) {
            Self::Custom(_) => Self::Custom(value),
            known => known,
        }
    }
}

impl From<ServiceName> for String {
    fn from(value: ServiceName) -> Self {
        match value {
            ServiceName::Custom(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl FromStr for ServiceName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry-issued correlation handle for one registration.
///
/// Reissued on every registration, including re-registration after the
/// registry lost track of an instance. Heartbeats are keyed by it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    /// Mints a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an identifier received over the wire.
    ///
    /// Surrounding whitespace is dropped, since heartbeat bodies are raw text.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no identifier has been assigned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
