//! `medstock-auth`: capability boundary between the Auth collaborator and the
//! stock engine.
//!
//! Roles arrive as opaque strings. They are turned into a [`CapabilitySet`]
//! exactly once, at the boundary, and workflows only ever check capabilities.

pub mod authorize;
pub mod capability;
pub mod claims;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, require, require_approver, require_requester};
pub use capability::{Capability, CapabilitySet};
pub use claims::{AuthClaims, TokenValidationError, validate_claims};
pub use principal::Actor;
pub use roles::{Role, RolePolicy};
