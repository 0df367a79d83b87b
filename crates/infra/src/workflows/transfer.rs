use chrono::Utc;
use tracing::{info, instrument};

use medstock_auth::{Actor, require_approver, require_requester};
use medstock_core::{DomainError, DomainResult, TransferId};
use medstock_inventory::{Decision, MoveReason, NewTransfer, Transfer};

use crate::allocator::{PlanMoves, plan_in, record_plan_in};
use crate::store::{LedgerTx, UnitOfWork};

/// PENDING → APPROVED | REJECTED for stock moving between two locations.
#[derive(Debug, Clone)]
pub struct TransferWorkflow<U> {
    uow: U,
}

impl<U: UnitOfWork> TransferWorkflow<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    /// Persist a pending transfer. No stock moves until approval.
    #[instrument(skip(self, actor, request), fields(transfer_no = %request.transfer_no, user_id = %actor.user_id()))]
    pub fn create(&self, actor: &Actor, request: NewTransfer) -> DomainResult<Transfer> {
        require_requester(actor)?;
        request.validate()?;

        self.uow.run_atomically("create_transfer", |tx| {
            for location in [request.from_location_id, request.to_location_id] {
                if tx.location(location).is_none() {
                    return Err(DomainError::not_found("location", location));
                }
            }
            for line in &request.lines {
                if tx.item(line.item_id).is_none() {
                    return Err(DomainError::not_found("item", line.item_id));
                }
            }
            if tx.transfer_by_no(&request.transfer_no).is_some() {
                return Err(DomainError::conflict(format!(
                    "transferNo {} already exists",
                    request.transfer_no.trim()
                )));
            }

            let transfer = request.open(TransferId::new(), actor.user_id(), Utc::now());
            tx.put_transfer(transfer.clone());
            info!(transfer_id = %transfer.id, lines = transfer.lines.len(), "transfer requested");
            Ok(transfer)
        })
    }

    /// Allocate every line FEFO at the source and flip to APPROVED, all or
    /// nothing. Approving an approved transfer returns it unchanged.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id()))]
    pub fn approve(&self, actor: &Actor, transfer_id: TransferId) -> DomainResult<Transfer> {
        require_approver(actor)?;

        self.uow.run_atomically("approve_transfer", |tx| {
            let mut transfer = tx
                .transfer(transfer_id)
                .ok_or_else(|| DomainError::not_found("transfer", transfer_id))?;
            if transfer.check_approve()? == Decision::AlreadyApplied {
                return Ok(transfer);
            }

            let now = Utc::now();
            let ref_id = transfer.id.to_string();
            for (index, line) in transfer.lines.iter().enumerate() {
                let plan = plan_in(tx, line.item_id, transfer.from_location_id, line.quantity)?;
                let spec = PlanMoves {
                    reason: MoveReason::Transfer,
                    to_location_id: Some(transfer.to_location_id),
                    ref_type: "TRANSFER",
                    ref_id: ref_id.clone(),
                    event_prefix: transfer.line_event_prefix(index),
                };
                record_plan_in(tx, &plan, &spec, now)?;
            }

            transfer.mark_approved(actor.user_id(), now)?;
            tx.put_transfer(transfer.clone());
            info!(transfer_id = %transfer.id, transfer_no = %transfer.transfer_no, "transfer approved");
            Ok(transfer)
        })
    }

    #[instrument(skip(self, actor, reason), fields(user_id = %actor.user_id()))]
    pub fn reject(
        &self,
        actor: &Actor,
        transfer_id: TransferId,
        reason: Option<String>,
    ) -> DomainResult<Transfer> {
        require_approver(actor)?;

        self.uow.run_atomically("reject_transfer", |tx| {
            let mut transfer = tx
                .transfer(transfer_id)
                .ok_or_else(|| DomainError::not_found("transfer", transfer_id))?;
            if transfer.reject(actor.user_id(), reason, Utc::now())? == Decision::Apply {
                tx.put_transfer(transfer.clone());
                info!(transfer_id = %transfer.id, "transfer rejected");
            }
            Ok(transfer)
        })
    }

    pub fn get(&self, transfer_id: TransferId) -> DomainResult<Transfer> {
        self.uow
            .read(|tx| tx.transfer(transfer_id))?
            .ok_or_else(|| DomainError::not_found("transfer", transfer_id))
    }

    pub fn list(&self) -> DomainResult<Vec<Transfer>> {
        self.uow.read(|tx| tx.transfers())
    }
}
