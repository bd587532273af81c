//! Local view of the providers this service depends on.

use ephemeris_proto::{Patch, Registration, ServiceName};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Read-mostly map of role to known instances, fed only by pushed patches.
///
/// A role that patches drained to zero stays present and reads as empty;
/// only a role no patch has mentioned since the last [`clear`](Self::clear)
/// is reported as not found.
#[derive(Debug, Default)]
pub struct ProviderCache {
    providers: RwLock<HashMap<ServiceName, Vec<Registration>>>,
}

impl ProviderCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the known instances of a role.
    pub fn get(&self, service_name: &ServiceName) -> Result<Vec<Registration>> {
        self.providers
            .read()
            .get(service_name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(service_name.clone()))
    }

    /// Applies a pushed patch under one write lock.
    pub fn apply(&self, patch: &Patch) {
        let mut providers = self.providers.write();

        for added in &patch.added {
            let instances = providers.entry(added.service_name.clone()).or_default();
            match instances
                .iter_mut()
                .find(|known| known.service_url == added.service_url)
            {
                Some(known) => *known = added.clone(),
                None => instances.push(added.clone()),
            }
        }

        for removed in &patch.removed {
            let Some(instances) = providers.get_mut(&removed.service_name) else {
                continue;
            };
            let position = instances
                .iter()
                .position(|known| {
                    !removed.service_id.is_empty() && known.service_id == removed.service_id
                })
                .or_else(|| {
                    instances
                        .iter()
                        .position(|known| known.service_url == removed.service_url)
                });
            if let Some(index) = position {
                instances.remove(index);
            }
        }

        debug!(
            added = patch.added.len(),
            removed = patch.removed.len(),
            "provider cache updated"
        );
    }

    /// Forgets everything, including which roles were ever seen.
    pub fn clear(&self) {
        self.providers.write().clear();
    }

    /// Roles mentioned by a patch since the last clear.
    pub fn names(&self) -> Vec<ServiceName> {
        self.providers.read().keys().cloned().collect()
    }
}
