//! Batch registry: lookups and lifecycle status changes.

use chrono::NaiveDate;
use tracing::{info, instrument};

use medstock_auth::{Actor, require_approver};
use medstock_core::{BatchId, DomainError, DomainResult, ItemId};
use medstock_inventory::Batch;

use crate::store::{LedgerTx, UnitOfWork};

#[derive(Debug, Clone)]
pub struct BatchRegistry<U> {
    uow: U,
}

impl<U: UnitOfWork> BatchRegistry<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    pub fn get(&self, id: BatchId) -> DomainResult<Batch> {
        self.uow
            .read(|tx| tx.batch(id))?
            .ok_or_else(|| DomainError::not_found("batch", id))
    }

    pub fn for_item(&self, item: ItemId) -> DomainResult<Vec<Batch>> {
        self.uow.read(|tx| tx.batches_for_item(item))
    }

    fn transition(
        &self,
        op: &'static str,
        id: BatchId,
        change: impl FnOnce(&mut Batch) -> DomainResult<()>,
    ) -> DomainResult<Batch> {
        self.uow.run_atomically(op, |tx| {
            let mut batch = tx
                .batch(id)
                .ok_or_else(|| DomainError::not_found("batch", id))?;
            change(&mut batch)?;
            tx.update_batch_status(&batch)?;
            Ok(batch)
        })
    }

    /// Withdraw a batch from allocation.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id()))]
    pub fn quarantine(&self, actor: &Actor, id: BatchId) -> DomainResult<Batch> {
        require_approver(actor)?;
        let batch = self.transition("quarantine_batch", id, Batch::quarantine)?;
        info!(batch_id = %id, "batch quarantined");
        Ok(batch)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id()))]
    pub fn release(&self, actor: &Actor, id: BatchId) -> DomainResult<Batch> {
        require_approver(actor)?;
        let batch = self.transition("release_batch", id, Batch::release)?;
        info!(batch_id = %id, "batch released");
        Ok(batch)
    }

    /// Flag every batch whose expiry date is before `today` as EXPIRED.
    #[instrument(skip(self))]
    pub fn expire_due(&self, today: NaiveDate) -> DomainResult<Vec<Batch>> {
        self.uow.run_atomically("expire_due_batches", |tx| {
            let mut expired = Vec::new();
            for mut batch in tx.batches() {
                if batch.is_past_expiry(today) && batch.expire() {
                    tx.update_batch_status(&batch)?;
                    expired.push(batch);
                }
            }
            if !expired.is_empty() {
                info!(count = expired.len(), "batches expired");
            }
            Ok(expired)
        })
    }
}
