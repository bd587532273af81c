//! Shared-secret authorization between the registry and its clients.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::{ProtoError, Result};

/// Environment variable holding the shared registry key.
pub const REGKEY_ENV: &str = "REGKEY";

/// Process-wide shared secret carried in the `regkey` header.
///
/// Read once at startup. Never printed by `Debug`.
#[derive(Clone)]
pub struct RegKey(Arc<SecretString>);

impl RegKey {
    /// Wraps an already-loaded secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::new(SecretString::from(secret.into())))
    }

    /// Reads the key from the `REGKEY` environment variable.
    pub fn from_env() -> Result<Self> {
        match std::env::var(REGKEY_ENV) {
            Ok(value) if !value.is_empty() => Ok(Self::new(value)),
            _ => Err(ProtoError::RegKeyMissing(REGKEY_ENV)),
        }
    }

    /// Returns the raw value for placing in an outgoing header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Compares a presented key in constant time.
    #[must_use]
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        let expected = self.expose().as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected.ct_eq(candidate).into()
    }
}

impl fmt::Debug for RegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RegKey([REDACTED])")
    }
}
