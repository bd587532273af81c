//! Ephemeris registry - service directory, liveness tracking and topology push.
//!
//! The registry is responsible for:
//!
//! - **Registration**: Admitting service instances and handing out their IDs
//! - **Discovery**: Answering "who provides role X" queries
//! - **Liveness**: Evicting instances whose heartbeats stop arriving
//! - **Topology push**: Sending each instance the changes to the roles it depends on
//!
//! # Architecture
//!
//! The registry pushes rather than waits to be polled:
//! - Instances register over HTTP and advertise an update URL
//! - Every admission or removal is turned into a patch per interested instance
//! - Instances keep a local provider cache fed by those patches
//!
//! # Example
//!
//! ```ignore
//! use ephemeris_registry::{api, RegKey, RegistryConfig, RegistryService};
//!
//! let config = RegistryConfig::load()?;
//! let service = Arc::new(RegistryService::new(&config, RegKey::from_env()?));
//! let app = api::router(service);
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod notifier;
pub mod service;
pub mod store;

// Re-export main types
pub use config::{ApiConfig, HeartbeatConfig, NotifyConfig, RegistryConfig};
pub use ephemeris_proto::RegKey;
pub use error::{RegistryError, Result};
pub use heartbeat::{HeartbeatKind, HeartbeatTracker, Validator};
pub use notifier::{HttpDelivery, PatchDelivery, PatchNotifier, RecordingDelivery};
pub use service::RegistryService;
pub use store::{Admission, RegistryStore};
