//! Registry service: the store, the heartbeat tracker and the sweep wired together.

use ephemeris_proto::{RegKey, Registration, ServiceId, ServiceName};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::heartbeat::{HeartbeatKind, HeartbeatTracker, Validator};
use crate::notifier::{HttpDelivery, PatchDelivery, PatchNotifier};
use crate::store::RegistryStore;

/// One registry instance and everything it owns.
///
/// Handlers receive it behind an `Arc`; several can coexist in one process.
#[derive(Debug)]
pub struct RegistryService {
    store: Arc<RegistryStore>,
    tracker: Arc<HeartbeatTracker>,
    regkey: RegKey,
    sweep_interval: Duration,
}

impl RegistryService {
    /// Creates a registry that pushes patches over HTTP.
    pub fn new(config: &RegistryConfig, regkey: RegKey) -> Self {
        let delivery = Arc::new(HttpDelivery::new(regkey.clone()));
        Self::with_delivery(config, regkey, delivery)
    }

    /// Creates a registry over a custom patch transport.
    pub fn with_delivery(
        config: &RegistryConfig,
        regkey: RegKey,
        delivery: Arc<dyn PatchDelivery>,
    ) -> Self {
        let notifier = Arc::new(PatchNotifier::new(delivery, &config.notify));
        let store = Arc::new(RegistryStore::new(notifier));
        let validator: Arc<dyn Validator> = store.clone();
        let tracker = Arc::new(HeartbeatTracker::new(&config.heartbeat, validator));

        Self {
            store,
            tracker,
            regkey,
            sweep_interval: config.heartbeat.sweep_interval,
        }
    }

    pub fn store(&self) -> &Arc<RegistryStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<HeartbeatTracker> {
        &self.tracker
    }

    pub const fn regkey(&self) -> &RegKey {
        &self.regkey
    }

    /// Admits a registration and returns its new ID.
    ///
    /// The ID counts as seen from this moment, so a fresh instance survives
    /// until its first heartbeat is due.
    pub async fn register(&self, registration: Registration) -> Result<ServiceId> {
        registration.validate()?;

        let admission = self.store.admit(registration);
        self.tracker.record(&admission.service_id);
        self.store.announce(&admission).await?;

        Ok(admission.service_id)
    }

    /// Removes an instance and its heartbeat record.
    pub fn deregister(&self, service_name: &ServiceName, service_url: &str) -> Result<Registration> {
        let removed = self.store.remove(service_name, service_url)?;
        self.tracker.forget(&removed.service_id);
        Ok(removed)
    }

    fn evict(&self, stale: &Registration) -> Result<Registration> {
        let removed = self.store.evict(stale)?;
        self.tracker.forget(&removed.service_id);
        Ok(removed)
    }

    /// Accepts a heartbeat from a registered instance.
    pub fn heartbeat(&self, kind: HeartbeatKind, service_id: &ServiceId) -> Result<()> {
        self.tracker.accept(kind, service_id)
    }

    /// Returns the current instances of a role.
    pub fn query(&self, service_name: &ServiceName) -> Vec<Registration> {
        self.store.query(service_name)
    }

    /// Evicts every instance whose heartbeat is overdue.
    ///
    /// Both tables are copied before any eviction runs, so no lock is held
    /// while removals fan out. Heartbeat records left behind by IDs the
    /// store never adopted are pruned once they go stale too.
    pub fn sweep(&self) -> Vec<Registration> {
        let registrations = self.store.snapshot();
        let heartbeats = self.tracker.snapshot();
        let now = Instant::now();

        let mut evicted = Vec::new();
        for registration in &registrations {
            let last_seen = heartbeats.get(&registration.service_id).copied();
            if !self.tracker.is_stale(last_seen, now) {
                continue;
            }

            info!(
                service_name = %registration.service_name,
                service_url = %registration.service_url,
                silent_for = ?last_seen.map(|seen| now.saturating_duration_since(seen)),
                "evicting inactive service"
            );
            match self.evict(registration) {
                Ok(removed) => evicted.push(removed),
                // Deregistered, or replaced under the same URL, since the
                // snapshot was taken.
                Err(RegistryError::NotFound { .. }) => {}
                Err(e) => warn!(error = %e, "eviction failed"),
            }
        }

        for (service_id, seen) in heartbeats {
            if self.tracker.is_stale(Some(seen), now) && !self.store.is_registered(&service_id) {
                debug!(service_id = %service_id, "pruning orphaned heartbeat record");
                self.tracker.forget(&service_id);
            }
        }

        evicted
    }

    /// Runs [`sweep`](Self::sweep) on a fixed period until cancelled.
    pub async fn run_sweeps(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.sweep_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("checking for inactive services");
                    let evicted = self.sweep();
                    if !evicted.is_empty() {
                        info!(count = evicted.len(), "sweep evicted services");
                    }
                }
            }
        }

        debug!("sweep loop stopped");
    }
}
