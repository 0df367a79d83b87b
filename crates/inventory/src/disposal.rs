//! Disposal (write-off) requests against a single batch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{
    BatchId, DisposalId, DomainError, DomainResult, ItemId, LocationId, UserId, ensure_positive,
};

use crate::workflow::{Decision, ReviewStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDisposal {
    pub batch_id: BatchId,
    /// Defaults to the batch's home location when omitted.
    pub from_location_id: Option<LocationId>,
    pub quantity: Decimal,
    pub reason: Option<String>,
}

impl NewDisposal {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity, "quantity")?;
        Ok(())
    }
}

/// Details an approver must supply to finalize a disposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposalApproval {
    pub method: String,
    pub reference_no: String,
    pub witness: Option<String>,
    pub disposed_at: Option<DateTime<Utc>>,
}

impl DisposalApproval {
    pub fn new(method: impl Into<String>, reference_no: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            reference_no: reference_no.into(),
            witness: None,
            disposed_at: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.method.trim().is_empty() {
            return Err(DomainError::validation("disposal method is required"));
        }
        if self.reference_no.trim().is_empty() {
            return Err(DomainError::validation("disposal referenceNo is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposalRequest {
    pub id: DisposalId,
    pub batch_id: BatchId,
    pub item_id: ItemId,
    pub from_location_id: LocationId,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub status: ReviewStatus,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub method: Option<String>,
    pub reference_no: Option<String>,
    pub witness: Option<String>,
    pub disposed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl DisposalRequest {
    pub fn open(
        id: DisposalId,
        request: NewDisposal,
        item_id: ItemId,
        from_location_id: LocationId,
        requested_by: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            batch_id: request.batch_id,
            item_id,
            from_location_id,
            quantity: request.quantity,
            reason: request.reason,
            status: ReviewStatus::Pending,
            requested_by,
            requested_at: at,
            reviewed_by: None,
            reviewed_at: None,
            method: None,
            reference_no: None,
            witness: None,
            disposed_at: None,
            rejection_reason: None,
        }
    }

    pub fn check_approve(&self) -> DomainResult<Decision> {
        self.status.check_approve(&format!("disposal {}", self.id))
    }

    pub fn mark_approved(
        &mut self,
        reviewer: UserId,
        approval: DisposalApproval,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.check_approve()? == Decision::Apply {
            self.status = ReviewStatus::Approved;
            self.reviewed_by = Some(reviewer);
            self.reviewed_at = Some(at);
            self.disposed_at = Some(approval.disposed_at.unwrap_or(at));
            self.method = Some(approval.method);
            self.reference_no = Some(approval.reference_no);
            self.witness = approval.witness;
        }
        Ok(())
    }

    pub fn reject(
        &mut self,
        reviewer: UserId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<Decision> {
        let decision = self.status.check_reject(&format!("disposal {}", self.id))?;
        if decision == Decision::Apply {
            self.status = ReviewStatus::Rejected;
            self.reviewed_by = Some(reviewer);
            self.reviewed_at = Some(at);
            self.rejection_reason = reason;
        }
        Ok(decision)
    }

    pub fn move_event_key(&self) -> String {
        format!("disposal:{}:batch:{}", self.id, self.batch_id)
    }
}
