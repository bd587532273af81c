//! Shared data model for the Ephemeris service registry.
//!
//! Both the registry and every dependent service link this crate. It defines:
//!
//! - [`Registration`]: one running service instance and the roles it depends on
//! - [`Patch`]: the added/removed diff the registry pushes to dependents
//! - [`ServiceName`] and [`ServiceId`]: role names and registry-issued handles
//! - [`RegKey`]: the shared secret carried in the `regkey` header
//!
//! # Wire Format
//!
//! All bodies are JSON except heartbeats and deregistration, which carry
//! raw text (the `serviceID` and `serviceURL` respectively).
//!
//! ```text
//! POST   /services                     regkey   Registration  -> serviceID
//! GET    /services?serviceName=<name>           -             -> [Registration]
//! DELETE /services?serviceName=<name>           serviceURL    -> 200
//! POST   /heartbeat/basic                       serviceID     -> 200 | 401
//! POST   <serviceUpdateURL>            regkey   Patch         -> 200
//! ```

mod auth;
mod error;
mod registration;
mod types;

pub use auth::{RegKey, REGKEY_ENV};
pub use error::{ProtoError, Result};
pub use registration::{Patch, Registration};
pub use types::{ServiceId, ServiceName};

/// HTTP routing constants shared by server and client.
pub mod wire {
    /// Registration, query and deregistration endpoint.
    pub const SERVICES_PATH: &str = "/services";

    /// Heartbeat endpoints live under this prefix, one per heartbeat kind.
    pub const HEARTBEAT_PATH_PREFIX: &str = "/heartbeat";

    /// Path of the basic heartbeat.
    pub const BASIC_HEARTBEAT_PATH: &str = "/heartbeat/basic";

    /// Header carrying the shared registry key.
    pub const REGKEY_HEADER: &str = "regkey";

    /// Query parameter selecting a role.
    pub const SERVICE_NAME_QUERY: &str = "serviceName";
}
