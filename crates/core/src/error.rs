//! Error taxonomy for the stock engine.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the engine.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse classification of a [`DomainError`], used by boundary layers to
/// pick a transport status without matching every variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Forbidden,
    Internal,
}

/// Engine-level error.
///
/// Every variant other than `Internal` is deterministic: retrying the same
/// request against the same state yields the same error. When any of these is
/// returned from a mutating operation, the enclosing unit of work has been
/// rolled back and no ledger row or quantity change is visible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Client input was malformed (missing ids, non-positive quantity, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The entity is in a state incompatible with the request
    /// (terminal workflow status, duplicate key, re-post).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough stock to satisfy the request. Classified as a conflict.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    /// The caller lacks the capability required for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Storage or transaction failure. Opaque to callers.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient_stock(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Conflict(_) | DomainError::InsufficientStock { .. } => ErrorKind::Conflict,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
