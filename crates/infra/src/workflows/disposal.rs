use chrono::Utc;
use tracing::{info, instrument};

use medstock_auth::{Actor, require_approver, require_requester};
use medstock_core::{DisposalId, DomainError, DomainResult};
use medstock_inventory::{
    BatchStatus, Decision, DisposalApproval, DisposalRequest, EventId, MoveReason, NewDisposal,
    NewStockMove,
};

use crate::recorder::record_in;
use crate::store::{LedgerTx, UnitOfWork};

/// PENDING → APPROVED | REJECTED write-off of stock from one batch.
#[derive(Debug, Clone)]
pub struct DisposalWorkflow<U> {
    uow: U,
}

impl<U: UnitOfWork> DisposalWorkflow<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    /// The batch must hold the requested quantity now; approval checks again.
    #[instrument(skip(self, actor, request), fields(batch_id = %request.batch_id, user_id = %actor.user_id()))]
    pub fn create(&self, actor: &Actor, request: NewDisposal) -> DomainResult<DisposalRequest> {
        require_requester(actor)?;
        request.validate()?;

        self.uow.run_atomically("create_disposal", |tx| {
            let batch = tx
                .batch(request.batch_id)
                .ok_or_else(|| DomainError::not_found("batch", request.batch_id))?;
            if batch.status == BatchStatus::Disposed {
                return Err(DomainError::conflict(format!(
                    "batch {} is already disposed",
                    batch.id
                )));
            }
            let from = match (request.from_location_id, batch.location_id) {
                (Some(asked), Some(home)) if asked != home => {
                    return Err(DomainError::validation(format!(
                        "batch {} is held at location {home}, not {asked}",
                        batch.id
                    )));
                }
                (Some(at), _) | (None, Some(at)) => at,
                (None, None) => {
                    return Err(DomainError::validation("fromLocationId is required"));
                }
            };
            if tx.location(from).is_none() {
                return Err(DomainError::not_found("location", from));
            }
            if batch.qty_on_hand < request.quantity {
                return Err(DomainError::insufficient_stock(request.quantity, batch.qty_on_hand));
            }

            let disposal = DisposalRequest::open(
                DisposalId::new(),
                request,
                batch.item_id,
                from,
                actor.user_id(),
                Utc::now(),
            );
            tx.put_disposal(disposal.clone());
            info!(disposal_id = %disposal.id, quantity = %disposal.quantity, "disposal requested");
            Ok(disposal)
        })
    }

    /// Record the DISPOSAL move and close the request. A batch emptied by the
    /// write-off becomes DISPOSED.
    #[instrument(skip(self, actor, approval), fields(user_id = %actor.user_id()))]
    pub fn approve(
        &self,
        actor: &Actor,
        disposal_id: DisposalId,
        approval: DisposalApproval,
    ) -> DomainResult<DisposalRequest> {
        require_approver(actor)?;
        approval.validate()?;

        self.uow.run_atomically("approve_disposal", |tx| {
            let mut disposal = tx
                .disposal(disposal_id)
                .ok_or_else(|| DomainError::not_found("disposal", disposal_id))?;
            if disposal.check_approve()? == Decision::AlreadyApplied {
                return Ok(disposal);
            }

            let batch = tx
                .batch(disposal.batch_id)
                .ok_or_else(|| DomainError::not_found("batch", disposal.batch_id))?;
            if batch.qty_on_hand < disposal.quantity {
                return Err(DomainError::insufficient_stock(disposal.quantity, batch.qty_on_hand));
            }

            let now = Utc::now();
            let disposed_at = approval.disposed_at.unwrap_or(now);
            let req = NewStockMove::new(
                disposal.item_id,
                disposal.quantity,
                MoveReason::Disposal,
                EventId::new(disposal.move_event_key())?,
            )
            .from(disposal.from_location_id)
            .batch(disposal.batch_id)
            .reference("DISPOSAL", disposal.id)
            .occurred_at(disposed_at);
            record_in(tx, req, now)?;

            let mut batch = tx
                .batch(disposal.batch_id)
                .ok_or_else(|| DomainError::not_found("batch", disposal.batch_id))?;
            if batch.qty_on_hand.is_zero() {
                batch.mark_disposed(disposed_at)?;
                tx.update_batch_status(&batch)?;
            }

            disposal.mark_approved(actor.user_id(), approval, now)?;
            tx.put_disposal(disposal.clone());
            info!(disposal_id = %disposal.id, batch_id = %disposal.batch_id, "disposal approved");
            Ok(disposal)
        })
    }

    #[instrument(skip(self, actor, reason), fields(user_id = %actor.user_id()))]
    pub fn reject(
        &self,
        actor: &Actor,
        disposal_id: DisposalId,
        reason: Option<String>,
    ) -> DomainResult<DisposalRequest> {
        require_approver(actor)?;

        self.uow.run_atomically("reject_disposal", |tx| {
            let mut disposal = tx
                .disposal(disposal_id)
                .ok_or_else(|| DomainError::not_found("disposal", disposal_id))?;
            if disposal.reject(actor.user_id(), reason, Utc::now())? == Decision::Apply {
                tx.put_disposal(disposal.clone());
                info!(disposal_id = %disposal.id, "disposal rejected");
            }
            Ok(disposal)
        })
    }

    pub fn get(&self, disposal_id: DisposalId) -> DomainResult<DisposalRequest> {
        self.uow
            .read(|tx| tx.disposal(disposal_id))?
            .ok_or_else(|| DomainError::not_found("disposal", disposal_id))
    }
}
