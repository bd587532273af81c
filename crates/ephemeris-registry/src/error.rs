//! Error types for the registry.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ephemeris_proto::{ProtoError, ServiceId, ServiceName};
use thiserror::Error;

/// Registry errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No instance with this name and URL is registered.
    #[error("service {service_name} at {service_url} not found")]
    NotFound {
        service_name: ServiceName,
        service_url: String,
    },

    /// Heartbeat from an instance the registry does not know.
    #[error("service not registered: {0}")]
    Unregistered(ServiceId),

    /// Missing or wrong `regkey` header.
    #[error("unauthorized")]
    Unauthorized,

    /// Request payload could not be decoded or was incomplete.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Heartbeat kind outside the supported set.
    #[error("unknown heartbeat kind: {0}")]
    UnknownHeartbeatKind(String),

    /// Patch delivery to a recipient failed.
    #[error("patch delivery to {target} failed: {reason}")]
    Delivery { target: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtoError> for RegistryError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::MissingField(_) => Self::Malformed(err.to_string()),
            ProtoError::RegKeyMissing(_) => Self::Config(err.to_string()),
        }
    }
}

impl RegistryError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::UnknownHeartbeatKind(_) => StatusCode::NOT_FOUND,
            Self::Unregistered(_) | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Delivery { .. } | Self::Config(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
