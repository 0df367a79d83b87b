//! Single-transition review lifecycle shared by transfers and disposals.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED (terminal)
//!    └─────reject───▶ REJECTED (terminal)
//! ```

use serde::{Deserialize, Serialize};

use medstock_core::{DomainError, DomainResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// Outcome of checking a requested transition against the current status.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The transition must be applied now.
    Apply,
    /// The record is already in the requested terminal state; nothing to do.
    AlreadyApplied,
}

impl ReviewStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReviewStatus::Pending)
    }

    /// Approving an approved record is a no-op; approving a rejected one is a
    /// conflict.
    pub fn check_approve(self, what: &str) -> DomainResult<Decision> {
        match self {
            ReviewStatus::Pending => Ok(Decision::Apply),
            ReviewStatus::Approved => Ok(Decision::AlreadyApplied),
            ReviewStatus::Rejected => Err(DomainError::conflict(format!(
                "{what} was rejected and cannot be approved"
            ))),
        }
    }

    /// Rejecting a rejected record is a no-op; rejecting an approved one is a
    /// conflict.
    pub fn check_reject(self, what: &str) -> DomainResult<Decision> {
        match self {
            ReviewStatus::Pending => Ok(Decision::Apply),
            ReviewStatus::Rejected => Ok(Decision::AlreadyApplied),
            ReviewStatus::Approved => Err(DomainError::conflict(format!(
                "{what} was approved and cannot be rejected"
            ))),
        }
    }
}

impl core::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
        })
    }
}
