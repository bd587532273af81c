//! Heartbeat tracking for registered instances.

use dashmap::DashMap;
use ephemeris_proto::ServiceId;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::HeartbeatConfig;
use crate::error::{RegistryError, Result};

/// Answers whether a service ID belongs to a live registration.
pub trait Validator: Send + Sync {
    fn is_registered(&self, service_id: &ServiceId) -> bool;
}

/// Supported heartbeat kinds, selected by the last path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatKind {
    /// Body is the raw service ID.
    Basic,
}

impl FromStr for HeartbeatKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "basic" => Ok(Self::Basic),
            other => Err(RegistryError::UnknownHeartbeatKind(other.to_owned())),
        }
    }
}

/// Records when each instance was last heard from.
pub struct HeartbeatTracker {
    last_seen: DashMap<ServiceId, Instant>,
    validator: Arc<dyn Validator>,
    timeout: Duration,
}

impl HeartbeatTracker {
    /// Creates a tracker that rejects IDs unknown to `validator`.
    pub fn new(config: &HeartbeatConfig, validator: Arc<dyn Validator>) -> Self {
        Self {
            last_seen: DashMap::new(),
            validator,
            timeout: config.timeout,
        }
    }

    /// Accepts a heartbeat.
    ///
    /// Fails with [`RegistryError::Unregistered`] when the ID is not
    /// registered; clients treat that as the signal to register again.
    pub fn accept(&self, kind: HeartbeatKind, service_id: &ServiceId) -> Result<()> {
        if !self.validator.is_registered(service_id) {
            return Err(RegistryError::Unregistered(service_id.clone()));
        }
        debug!(service_id = %service_id, kind = ?kind, "heartbeat accepted");
        self.record(service_id);
        Ok(())
    }

    /// Marks an instance as seen now without validation.
    pub fn record(&self, service_id: &ServiceId) {
        self.last_seen.insert(service_id.clone(), Instant::now());
    }

    /// Drops the record of an evicted or deregistered instance.
    pub fn forget(&self, service_id: &ServiceId) {
        self.last_seen.remove(service_id);
    }

    /// Returns when an instance was last seen.
    pub fn last_seen(&self, service_id: &ServiceId) -> Option<Instant> {
        self.last_seen.get(service_id).map(|r| *r)
    }

    /// Copies the whole table so the caller can iterate without holding locks.
    pub fn snapshot(&self) -> HashMap<ServiceId, Instant> {
        self.last_seen
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }

    /// Returns true if an instance last seen at `last_seen` is overdue.
    ///
    /// Never having been seen counts as overdue.
    #[must_use]
    pub fn is_stale(&self, last_seen: Option<Instant>, now: Instant) -> bool {
        last_seen.map_or(true, |seen| now.saturating_duration_since(seen) > self.timeout)
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the number of tracked IDs.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

impl std::fmt::Debug for HeartbeatTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatTracker")
            .field("tracked", &self.last_seen.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FixedValidator(Mutex<HashSet<ServiceId>>);

    impl Validator for FixedValidator {
        fn is_registered(&self, service_id: &ServiceId) -> bool {
            self.0.lock().contains(service_id)
        }
    }

    fn make_tracker(timeout: Duration) -> (HeartbeatTracker, Arc<FixedValidator>) {
        let validator = Arc::new(FixedValidator::default());
        let config = HeartbeatConfig {
            sweep_interval: Duration::from_secs(20),
            timeout,
        };
        (HeartbeatTracker::new(&config, validator.clone()), validator)
    }

    #[test]
    fn accept_known_id_records_time() {
        let (tracker, validator) = make_tracker(Duration::from_secs(20));
        let id = ServiceId::generate();
        validator.0.lock().insert(id.clone());

        tracker.accept(HeartbeatKind::Basic, &id).unwrap();

        assert!(tracker.last_seen(&id).is_some());
    }

    #[test]
    fn accept_unknown_id_is_rejected() {
        let (tracker, _) = make_tracker(Duration::from_secs(20));
        let id = ServiceId::generate();

        let result = tracker.accept(HeartbeatKind::Basic, &id);

        assert!(matches!(result, Err(RegistryError::Unregistered(_))));
        assert!(tracker.last_seen(&id).is_none());
    }

    #[test]
    fn staleness() {
        let (tracker, _) = make_tracker(Duration::from_secs(20));
        let now = Instant::now();

        assert!(tracker.is_stale(None, now));
        assert!(!tracker.is_stale(Some(now), now));
        assert!(tracker.is_stale(
            Some(now),
            now + Duration::from_secs(21)
        ));
    }

    #[test]
    fn forget_drops_record() {
        let (tracker, _) = make_tracker(Duration::from_secs(20));
        let id = ServiceId::generate();
        tracker.record(&id);
        assert_eq!(tracker.len(), 1);

        tracker.forget(&id);
        assert!(tracker.is_empty());
    }

    #[test]
    fn basic_kind_parses() {
        assert_eq!("basic".parse::<HeartbeatKind>().unwrap(), HeartbeatKind::Basic);
    }

    #[rstest]
    #[case("info")]
    #[case("Basic")]
    #[case("")]
    fn other_kinds_are_unknown(#[case] raw: &str) {
        assert!(matches!(
            raw.parse::<HeartbeatKind>(),
            Err(RegistryError::UnknownHeartbeatKind(_))
        ));
    }
}
