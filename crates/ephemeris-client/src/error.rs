//! Error types for the registration client.

use ephemeris_proto::{ProtoError, ServiceName};
use hyper::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The registry does not recognise this instance or its key.
    #[error("registry rejected the request as unauthorized")]
    Unauthorized,

    /// The registry answered with an unexpected status.
    #[error("registry responded {0}")]
    Status(StatusCode),

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request took longer than the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// No patch has ever mentioned this role.
    #[error("no providers known for {0}")]
    NotFound(ServiceName),

    /// The operation was abandoned because shutdown began.
    #[error("cancelled")]
    Cancelled,

    /// The local patch listener could not be bound.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    /// A response body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid registration or missing registry key.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns true if the registry has lost track of this instance.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unauthorized_is_unauthorized() {
        assert!(ClientError::Unauthorized.is_unauthorized());
        assert!(!ClientError::Status(StatusCode::NOT_FOUND).is_unauthorized());
        assert!(!ClientError::Transport("refused".to_owned()).is_unauthorized());
    }
}
