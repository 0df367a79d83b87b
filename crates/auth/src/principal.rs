use medstock_core::UserId;

use crate::{CapabilitySet, Role, RolePolicy};

/// The caller of a workflow operation: who they are and what they may do.
///
/// Built once at the boundary (see [`crate::AuthClaims::to_actor`]) and passed
/// explicitly into every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    user_id: UserId,
    capabilities: CapabilitySet,
}

impl Actor {
    pub fn new(user_id: UserId, capabilities: CapabilitySet) -> Self {
        Self {
            user_id,
            capabilities,
        }
    }

    pub fn from_roles(user_id: UserId, roles: &[Role], policy: &RolePolicy) -> Self {
        Self::new(user_id, CapabilitySet::from_roles(roles, policy))
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}
