//! Capability guards, checked before any state is read.

use thiserror::Error;

use medstock_core::DomainError;

use crate::{Actor, Capability};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("missing capability '{0}'")]
    MissingCapability(Capability),

    /// Approvers may not raise requests they could later approve themselves.
    #[error("approvers may not create requests")]
    SeparationOfDuties,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::forbidden(value.to_string())
    }
}

/// Require a single capability.
pub fn require(actor: &Actor, capability: Capability) -> Result<(), AuthzError> {
    if actor.capabilities().contains(capability) {
        Ok(())
    } else {
        Err(AuthzError::MissingCapability(capability))
    }
}

/// Require the approver capability (approve / reject / quarantine).
pub fn require_approver(actor: &Actor) -> Result<(), AuthzError> {
    require(actor, Capability::ApproveStock)
}

/// Require the requester capability and the absence of the approver one.
pub fn require_requester(actor: &Actor) -> Result<(), AuthzError> {
    require(actor, Capability::RequestStock)?;
    if actor.capabilities().is_approver() {
        return Err(AuthzError::SeparationOfDuties);
    }
    Ok(())
}
