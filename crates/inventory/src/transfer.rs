//! Transfers between locations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{DomainError, DomainResult, ItemId, LocationId, TransferId, UserId, ensure_positive};

use crate::workflow::{Decision, ReviewStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub notes: Option<String>,
}

impl TransferLine {
    pub fn new(item_id: ItemId, quantity: Decimal) -> Self {
        Self {
            item_id,
            quantity,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub transfer_no: String,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub lines: Vec<TransferLine>,
    pub notes: Option<String>,
}

impl NewTransfer {
    pub fn validate(&self) -> DomainResult<()> {
        if self.transfer_no.trim().is_empty() {
            return Err(DomainError::validation("transferNo cannot be empty"));
        }
        if self.from_location_id == self.to_location_id {
            return Err(DomainError::validation(
                "source and destination locations must differ",
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("a transfer needs at least one line"));
        }
        for (i, line) in self.lines.iter().enumerate() {
            ensure_positive(line.quantity, &format!("lines[{i}].quantity"))?;
        }
        Ok(())
    }

    /// Build the pending record. Call [`validate`](Self::validate) first.
    pub fn open(self, id: TransferId, requested_by: UserId, at: DateTime<Utc>) -> Transfer {
        Transfer {
            id,
            transfer_no: self.transfer_no.trim().to_string(),
            from_location_id: self.from_location_id,
            to_location_id: self.to_location_id,
            status: ReviewStatus::Pending,
            requested_by,
            requested_at: at,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            notes: self.notes,
            lines: self.lines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub transfer_no: String,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub status: ReviewStatus,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<TransferLine>,
}

impl Transfer {
    pub fn check_approve(&self) -> DomainResult<Decision> {
        self.status.check_approve(&format!("transfer {}", self.transfer_no))
    }

    pub fn mark_approved(&mut self, reviewer: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        if self.check_approve()? == Decision::Apply {
            self.status = ReviewStatus::Approved;
            self.reviewed_by = Some(reviewer);
            self.reviewed_at = Some(at);
        }
        Ok(())
    }

    /// Returns the decision so callers can tell a fresh rejection from a no-op.
    pub fn reject(
        &mut self,
        reviewer: UserId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<Decision> {
        let decision = self
            .status
            .check_reject(&format!("transfer {}", self.transfer_no))?;
        if decision == Decision::Apply {
            self.status = ReviewStatus::Rejected;
            self.reviewed_by = Some(reviewer);
            self.reviewed_at = Some(at);
            self.rejection_reason = reason;
        }
        Ok(decision)
    }

    /// Prefix of the idempotency keys of the moves recorded for one line.
    pub fn line_event_prefix(&self, line_index: usize) -> String {
        format!("transfer:{}:line:{line_index}", self.id)
    }
}
