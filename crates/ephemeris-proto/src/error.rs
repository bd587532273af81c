//! Error types for the data model.

use thiserror::Error;

/// Data model and shared-secret errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// A required registration field was empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The shared registry key is not configured.
    #[error("registry key not configured (set {0})")]
    RegKeyMissing(&'static str),
}

/// Result type for data model operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
