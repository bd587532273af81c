//! Service instance registrations and the diffs pushed between them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{ProtoError, Result};
use crate::types::{ServiceId, ServiceName};

/// One running instance of a logical service.
///
/// Immutable once accepted by the registry; liveness is tracked out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub service_name: ServiceName,
    /// Reachable base address. Unique within `service_name`.
    #[serde(rename = "serviceURL")]
    pub service_url: String,
    /// Assigned by the registry; empty until then.
    #[serde(rename = "serviceID", default)]
    pub service_id: ServiceId,
    /// Address peers on other hosts should dial.
    #[serde(rename = "publicIPv4", default, skip_serializing_if = "Option::is_none")]
    pub public_ipv4: Option<Ipv4Addr>,
    #[serde(rename = "publicIPv6", default, skip_serializing_if = "Option::is_none")]
    pub public_ipv6: Option<Ipv6Addr>,
    /// Free text, never interpreted by the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capability tags, never interpreted by the registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Roles this instance wants topology updates for.
    #[serde(default)]
    pub required_services: BTreeSet<ServiceName>,
    /// Where the registry pushes patches.
    #[serde(rename = "serviceUpdateURL", default)]
    pub update_url: String,
}

impl Registration {
    /// Creates a registration with no dependencies.
    pub fn new(service_name: impl Into<ServiceName>, service_url: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_url: service_url.into(),
            service_id: ServiceId::default(),
            public_ipv4: None,
            public_ipv6: None,
            description: None,
            tags: Vec::new(),
            required_services: BTreeSet::new(),
            update_url: String::new(),
        }
    }

    /// Declares a dependency on another role.
    #[must_use]
    pub fn requires(mut self, name: impl Into<ServiceName>) -> Self {
        self.required_services.insert(name.into());
        self
    }

    /// Sets the address the registry pushes patches to.
    #[must_use]
    pub fn with_update_url(mut self, url: impl Into<String>) -> Self {
        self.update_url = url.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_public_ipv4(mut self, addr: Ipv4Addr) -> Self {
        self.public_ipv4 = Some(addr);
        self
    }

    #[must_use]
    pub const fn with_public_ipv6(mut self, addr: Ipv6Addr) -> Self {
        self.public_ipv6 = Some(addr);
        self
    }

    /// Returns true if this instance wants updates about `name`.
    #[must_use]
    pub fn depends_on(&self, name: &ServiceName) -> bool {
        self.required_services.contains(name)
    }

    /// Returns true if both registrations describe the same instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        self.service_name == other.service_name && self.service_url == other.service_url
    }

    /// Checks the fields the registry cannot work without.
    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(ProtoError::MissingField("serviceName"));
        }
        if self.service_url.trim().is_empty() {
            return Err(ProtoError::MissingField("serviceURL"));
        }
        if !self.required_services.is_empty() && self.update_url.trim().is_empty() {
            return Err(ProtoError::MissingField("serviceUpdateURL"));
        }
        Ok(())
    }
}

/// Incremental topology diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub added: Vec<Registration>,
    #[serde(default)]
    pub removed: Vec<Registration>,
}

impl Patch {
    /// A patch announcing new instances.
    #[must_use]
    pub fn added(registrations: Vec<Registration>) -> Self {
        Self {
            added: registrations,
            removed: Vec::new(),
        }
    }

    /// A patch announcing departed instances.
    #[must_use]
    pub fn removed(registrations: Vec<Registration>) -> Self {
        Self {
            added: Vec::new(),
            removed: registrations,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Keeps only the entries `recipient` declared a dependency on.
    #[must_use]
    pub fn scoped_to(&self, recipient: &Registration) -> Self {
        let keep = |reg: &&Registration| recipient.depends_on(&reg.service_name);
        Self {
            added: self.added.iter().filter(keep).cloned().collect(),
            removed: self.removed.iter().filter(keep).cloned().collect(),
        }
    }
}
