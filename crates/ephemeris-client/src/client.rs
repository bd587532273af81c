//! Registration lifecycle of one service instance.
//!
//! ```text
//! Unregistered -> Registering -> Registered(id) -> Terminated
//!                      ^               |
//!                      +- Unauthorized-+
//! ```

use ephemeris_proto::{Registration, ServiceId};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ProviderCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::transport::RegistryApi;

/// Where an instance stands with the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Never registered, or registration was abandoned.
    Unregistered,
    /// A registration request is in progress or waiting to be retried.
    Registering,
    /// Acknowledged; heartbeats use this ID.
    Registered(ServiceId),
    /// Deregistered; no further registry traffic.
    Terminated,
}

/// Keeps one instance registered and alive.
pub struct RegistrationClient {
    api: Arc<dyn RegistryApi>,
    registration: Registration,
    cache: Arc<ProviderCache>,
    state: RwLock<ClientState>,
    retry_interval: Duration,
    heartbeat_interval: Duration,
}

impl RegistrationClient {
    pub fn new(
        api: Arc<dyn RegistryApi>,
        registration: Registration,
        cache: Arc<ProviderCache>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            api,
            registration,
            cache,
            state: RwLock::new(ClientState::Unregistered),
            retry_interval: config.retry_interval,
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state.read().clone()
    }

    /// The ID currently used for heartbeats, if registered.
    pub fn service_id(&self) -> Option<ServiceId> {
        match &*self.state.read() {
            ClientState::Registered(id) => Some(id.clone()),
            _ => None,
        }
    }

    pub const fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn cache(&self) -> &Arc<ProviderCache> {
        &self.cache
    }

    /// Registers, retrying on a fixed interval until acknowledged.
    ///
    /// There is no deadline; only `cancel` ends the loop early, leaving the
    /// client `Unregistered`.
    pub async fn register(&self, cancel: &CancellationToken) -> Result<ServiceId> {
        self.registration.validate()?;
        {
            let mut state = self.state.write();
            if *state == ClientState::Terminated {
                return Err(ClientError::Cancelled);
            }
            *state = ClientState::Registering;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            debug!(attempt, service_url = %self.registration.service_url, "registering");

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(self.abandon()),
                outcome = self.api.register(&self.registration) => outcome,
            };

            match outcome {
                Ok(service_id) => {
                    let mut state = self.state.write();
                    if *state == ClientState::Terminated {
                        return Err(ClientError::Cancelled);
                    }
                    *state = ClientState::Registered(service_id.clone());
                    drop(state);

                    info!(
                        service_name = %self.registration.service_name,
                        service_id = %service_id,
                        attempt,
                        "service registered"
                    );
                    return Ok(service_id);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        retry_in = ?self.retry_interval,
                        "registration attempt failed"
                    );
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(self.abandon()),
                () = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    /// Sends one heartbeat, re-registering if the registry forgot us.
    ///
    /// On re-registration the provider cache is cleared first; the catch-up
    /// patch that accompanies the new registration refills it.
    pub async fn heartbeat_once(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(service_id) = self.service_id() else {
            debug!("not registered, skipping heartbeat");
            return Ok(());
        };

        match self.api.heartbeat(&service_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unauthorized() => {
                warn!(
                    service_id = %service_id,
                    "registry no longer recognises this instance, re-registering"
                );
                self.cache.clear();
                self.register(cancel).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Heartbeats on a fixed period until cancelled or terminated.
    pub async fn run_heartbeats(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.state() == ClientState::Terminated {
                break;
            }

            match self.heartbeat_once(&cancel).await {
                Ok(()) => {}
                Err(ClientError::Cancelled) => break,
                Err(e) => warn!(error = %e, "heartbeat failed"),
            }
        }

        debug!("heartbeat loop stopped");
    }

    /// Removes this instance from the registry, once, without retrying.
    pub async fn deregister(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), ClientState::Terminated);
        if previous == ClientState::Terminated {
            return;
        }

        match self
            .api
            .deregister(&self.registration.service_name, &self.registration.service_url)
            .await
        {
            Ok(()) => info!(
                service_name = %self.registration.service_name,
                service_url = %self.registration.service_url,
                "service deregistered"
            ),
            Err(e) => warn!(error = %e, "deregistration failed"),
        }
    }

    fn abandon(&self) -> ClientError {
        let mut state = self.state.write();
        if *state == ClientState::Registering {
            *state = ClientState::Unregistered;
        }
        ClientError::Cancelled
    }
}

impl std::fmt::Debug for RegistrationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationClient")
            .field("service_name", &self.registration.service_name)
            .field("service_url", &self.registration.service_url)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}
