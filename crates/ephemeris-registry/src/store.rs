//! Authoritative directory of registered service instances.

use ephemeris_proto::{Patch, Registration, ServiceId, ServiceName};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::heartbeat::Validator;
use crate::notifier::PatchNotifier;

/// Outcome of admitting a registration into the table.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Freshly minted ID returned to the registrant.
    pub service_id: ServiceId,
    /// The registration as submitted, carrying `service_id`.
    pub registration: Registration,
    /// What the table holds for this instance after admission.
    ///
    /// Differs from `registration` when an entry with the same URL already
    /// existed: the old entry, and its old ID, stay in place.
    pub entry: Registration,
    /// False if the table already had this instance.
    pub inserted: bool,
}

/// Thread-safe registry of service instances keyed by role.
///
/// Mutations take the write lock once; reads share it. Patch fan-out is
/// spawned, never awaited, while a lock is held.
#[derive(Debug)]
pub struct RegistryStore {
    table: RwLock<HashMap<ServiceName, Vec<Registration>>>,
    notifier: Arc<PatchNotifier>,
}

impl RegistryStore {
    /// Creates an empty store that announces changes through `notifier`.
    pub fn new(notifier: Arc<PatchNotifier>) -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    /// Registers an instance and announces it.
    ///
    /// A second registration for the same name and URL leaves the table
    /// untouched but still returns a new ID and still triggers the
    /// announcements.
    pub async fn add(&self, registration: Registration) -> Result<ServiceId> {
        let admission = self.admit(registration);
        self.announce(&admission).await?;
        Ok(admission.service_id)
    }

    /// Assigns an ID and inserts the instance unless its URL is taken.
    pub fn admit(&self, mut registration: Registration) -> Admission {
        let service_id = ServiceId::generate();
        registration.service_id = service_id.clone();

        let mut table = self.table.write();
        let instances = table
            .entry(registration.service_name.clone())
            .or_default();

        let (entry, inserted) = match instances
            .iter()
            .find(|existing| existing.service_url == registration.service_url)
        {
            Some(existing) => (existing.clone(), false),
            None => {
                instances.push(registration.clone());
                (registration.clone(), true)
            }
        };
        drop(table);

        if inserted {
            info!(
                service_name = %registration.service_name,
                service_url = %registration.service_url,
                service_id = %service_id,
                "service registered"
            );
        } else {
            // The returned ID is never adopted by the table, so heartbeats
            // using it will be rejected and the client will register again.
            info!(
                service_name = %registration.service_name,
                service_url = %registration.service_url,
                kept_id = %entry.service_id,
                issued_id = %service_id,
                "duplicate registration, keeping existing entry"
            );
        }

        Admission {
            service_id,
            registration,
            entry,
            inserted,
        }
    }

    /// Tells the registrant about its dependencies and everyone else about it.
    ///
    /// The registrant's catch-up patch is awaited and its failure is
    /// returned; announcements to other instances are best-effort.
    pub async fn announce(&self, admission: &Admission) -> Result<()> {
        let catch_up = self.catch_up_for(&admission.registration);
        let recipients = self.others(&admission.entry);
        let notified = self
            .notifier
            .fan_out(&Patch::added(vec![admission.entry.clone()]), &recipients);
        debug!(
            service_url = %admission.entry.service_url,
            notified,
            "announced new instance"
        );

        if catch_up.is_empty() {
            debug!(
                service_name = %admission.registration.service_name,
                "no providers to send in catch-up patch"
            );
            return Ok(());
        }

        self.notifier
            .deliver(&admission.registration.update_url, &catch_up)
            .await
    }

    /// Removes an instance, announcing its departure first.
    pub fn remove(&self, service_name: &ServiceName, service_url: &str) -> Result<Registration> {
        self.remove_matching(service_name, service_url, None)
    }

    /// Removes `stale` only if the table still holds that exact entry.
    ///
    /// An instance that deregistered and came back under the same URL has a
    /// new ID and is left alone.
    pub fn evict(&self, stale: &Registration) -> Result<Registration> {
        self.remove_matching(
            &stale.service_name,
            &stale.service_url,
            Some(&stale.service_id),
        )
    }

    fn remove_matching(
        &self,
        service_name: &ServiceName,
        service_url: &str,
        service_id: Option<&ServiceId>,
    ) -> Result<Registration> {
        let not_found = || RegistryError::NotFound {
            service_name: service_name.clone(),
            service_url: service_url.to_owned(),
        };

        let mut table = self.table.write();
        let index = table
            .get(service_name)
            .and_then(|instances| {
                instances.iter().position(|r| {
                    r.service_url == service_url
                        && service_id.map_or(true, |id| r.service_id == *id)
                })
            })
            .ok_or_else(not_found)?;

        let departing = table
            .get(service_name)
            .and_then(|instances| instances.get(index))
            .cloned()
            .ok_or_else(not_found)?;

        let recipients: Vec<&Registration> = table
            .values()
            .flatten()
            .filter(|r| !r.same_instance(&departing))
            .collect();
        let notified = self
            .notifier
            .fan_out(&Patch::removed(vec![departing.clone()]), recipients);

        if let Some(instances) = table.get_mut(service_name) {
            instances.remove(index);
        }
        drop(table);

        info!(
            service_name = %departing.service_name,
            service_url = %departing.service_url,
            notified,
            "service removed"
        );
        Ok(departing)
    }

    /// Returns the current instances of a role, possibly none.
    pub fn query(&self, service_name: &ServiceName) -> Vec<Registration> {
        self.table
            .read()
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Copies every registration.
    pub fn snapshot(&self) -> Vec<Registration> {
        self.table.read().values().flatten().cloned().collect()
    }

    /// Returns the number of registered instances.
    pub fn len(&self) -> usize {
        self.table.read().values().map(Vec::len).sum()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn catch_up_for(&self, registrant: &Registration) -> Patch {
        let table = self.table.read();
        let added = registrant
            .required_services
            .iter()
            .filter_map(|name| table.get(name))
            .flatten()
            .filter(|r| !r.same_instance(registrant))
            .cloned()
            .collect();
        Patch::added(added)
    }

    fn others(&self, subject: &Registration) -> Vec<Registration> {
        self.table
            .read()
            .values()
            .flatten()
            .filter(|r| !r.same_instance(subject))
            .cloned()
            .collect()
    }
}

impl Validator for RegistryStore {
    fn is_registered(&self, service_id: &ServiceId) -> bool {
        self.table
            .read()
            .values()
            .flatten()
            .any(|r| &r.service_id == service_id)
    }
}
