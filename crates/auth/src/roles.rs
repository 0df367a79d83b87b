use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Capability;

/// Role identifier issued by the Auth collaborator.
///
/// Roles are opaque to the engine; only the [`RolePolicy`] gives them meaning.
/// Comparison is case-insensitive via [`Role::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const STAFF: &'static str = "STAFF";
    pub const MANAGER: &'static str = "MANAGER";
    pub const ADMIN: &'static str = "ADMIN";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn normalized(&self) -> String {
        self.0.trim().to_ascii_uppercase()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role → capability mapping.
///
/// The default policy separates duties: STAFF request and count, MANAGER
/// approves and counts, ADMIN additionally manages the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    grants: HashMap<String, Vec<Capability>>,
}

impl RolePolicy {
    /// A policy that grants nothing.
    pub fn empty() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    /// Grant `capability` to every role in `roles` (names are case-insensitive).
    pub fn grant<I, S>(mut self, roles: I, capability: Capability) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for role in roles {
            let key = role.as_ref().trim().to_ascii_uppercase();
            if key.is_empty() {
                continue;
            }
            let entry = self.grants.entry(key).or_default();
            if !entry.contains(&capability) {
                entry.push(capability);
            }
        }
        self
    }

    pub fn capabilities_for(&self, role: &Role) -> &[Capability] {
        self.grants
            .get(&role.normalized())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::empty()
            .grant([Role::STAFF], Capability::RequestStock)
            .grant([Role::STAFF, Role::MANAGER, Role::ADMIN], Capability::CountStock)
            .grant([Role::MANAGER, Role::ADMIN], Capability::ApproveStock)
            .grant([Role::ADMIN], Capability::ManageCatalog)
    }
}
