//! Ephemeris client - everything a service needs to take part in the registry.
//!
//! A participating service:
//!
//! - **Registers** itself, retrying until the registry acknowledges it
//! - **Heartbeats** on a fixed period, re-registering if the registry forgot it
//! - **Receives patches** about the roles it depends on into a [`ProviderCache`]
//! - **Deregisters** once on shutdown
//!
//! # Example
//!
//! ```no_run
//! use ephemeris_client::{ClientConfig, HttpRegistryApi, ServiceHost};
//! use ephemeris_proto::{RegKey, Registration, ServiceName};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load()?;
//! let regkey = RegKey::from_env()?;
//! let api = Arc::new(HttpRegistryApi::new(&config, regkey.clone()));
//!
//! let bound = ServiceHost::bind("0.0.0.0:8080".parse()?).await?;
//! let ip = ephemeris_client::outbound_ipv4().await?;
//! let public = ephemeris_client::public_ipv4().await?;
//! let registration = Registration::new(ServiceName::Web, format!("http://{ip}:8080"))
//!     .requires(ServiceName::Log)
//!     .with_update_url(format!("http://{ip}:8080/services"))
//!     .with_public_ipv4(public);
//!
//! let host = bound
//!     .start(registration, axum::Router::new(), api, regkey, &config)
//!     .await?;
//! let _loggers = host.cache().get(&ServiceName::Log)?;
//! host.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod net;
pub mod receiver;
pub mod transport;

pub use cache::ProviderCache;
pub use client::{ClientState, RegistrationClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use host::{BoundHost, ServiceHost};
pub use net::{outbound_ipv4, outbound_ipv6, public_ipv4, public_ipv4_from, PUBLIC_IP_ECHO_URL};
pub use receiver::patch_router;
pub use transport::{HttpRegistryApi, RegistryApi};
