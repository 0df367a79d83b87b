use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Role, RolePolicy};

/// A single thing a caller is allowed to do against the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Create transfer and disposal requests.
    RequestStock,
    /// Approve or reject transfer/disposal requests, quarantine batches.
    ApproveStock,
    /// Open and post cycle-count sessions.
    CountStock,
    /// Maintain items, locations and thresholds.
    ManageCatalog,
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Capability::RequestStock => "REQUEST_STOCK",
            Capability::ApproveStock => "APPROVE_STOCK",
            Capability::CountStock => "COUNT_STOCK",
            Capability::ManageCatalog => "MANAGE_CATALOG",
        };
        f.write_str(name)
    }
}

/// Resolved capabilities of one caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive the capability set from the caller's roles.
    pub fn from_roles(roles: &[Role], policy: &RolePolicy) -> Self {
        let caps = roles
            .iter()
            .flat_map(|r| policy.capabilities_for(r).iter().copied())
            .collect();
        Self(caps)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_approver(&self) -> bool {
        self.contains(Capability::ApproveStock)
    }

    /// Requesters may create requests; an approver never counts as one, so the
    /// same principal cannot both raise and sign off a movement.
    pub fn is_requester(&self) -> bool {
        self.contains(Capability::RequestStock) && !self.is_approver()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
