use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use medstock_core::UserId;

use crate::{Actor, Role, RolePolicy};

/// Verified claims handed over by the Auth collaborator.
///
/// Decoding and signature checks happen upstream; this is what remains once a
/// token has been trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Roles as issued. Unknown roles are carried but grant nothing.
    pub roles: Vec<Role>,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthClaims {
    /// Validate the time window and derive the caller's capabilities.
    pub fn to_actor(
        &self,
        policy: &RolePolicy,
        now: DateTime<Utc>,
    ) -> Result<Actor, TokenValidationError> {
        validate_claims(self, now)?;
        Ok(Actor::from_roles(self.sub, &self.roles, policy))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claim time window.
pub fn validate_claims(claims: &AuthClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
