//! Stock move recorder: the only writer of ledger rows and batch quantities.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use medstock_core::{BatchId, DomainError, DomainResult, StockMoveId};
use medstock_inventory::{
    Batch, BatchEffect, BatchStatus, GoodsReceived, MoveReason, NewStockMove, StockMove,
};

use crate::allocator::loose_in;
use crate::store::{LedgerTx, UnitOfWork};

/// Result of a record call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// A new ledger row was appended.
    Recorded(StockMove),
    /// The event id was already recorded with the same payload; nothing was
    /// applied and the original row is returned.
    Replayed(StockMove),
}

impl MoveOutcome {
    pub fn stock_move(&self) -> &StockMove {
        match self {
            MoveOutcome::Recorded(m) | MoveOutcome::Replayed(m) => m,
        }
    }

    pub fn into_move(self) -> StockMove {
        match self {
            MoveOutcome::Recorded(m) | MoveOutcome::Replayed(m) => m,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, MoveOutcome::Replayed(_))
    }
}

/// Outcome of a goods receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptOutcome {
    pub batch: Batch,
    pub stock_move: MoveOutcome,
}

fn check_batch(batch: &Batch, req: &NewStockMove, effect: BatchEffect) -> DomainResult<()> {
    if batch.item_id != req.item_id {
        return Err(DomainError::validation(format!(
            "batch {} does not hold item {}",
            batch.id, req.item_id
        )));
    }
    let side = match effect {
        BatchEffect::Decrement => req.from_location_id,
        BatchEffect::Increment => req.to_location_id,
    };
    if let (Some(home), Some(at)) = (batch.location_id, side) {
        if home != at {
            return Err(DomainError::validation(format!(
                "batch {} is held at location {home}, not {at}",
                batch.id
            )));
        }
    }

    let allowed = match (batch.status, req.reason) {
        (BatchStatus::Disposed, _) => false,
        (BatchStatus::Active, _) => true,
        (_, MoveReason::Issue | MoveReason::Transfer) => false,
        (BatchStatus::Expired, MoveReason::Receipt | MoveReason::Quarantine) => false,
        (BatchStatus::Quarantined | BatchStatus::Expired, _) => true,
    };
    if !allowed {
        return Err(DomainError::conflict(format!(
            "batch {} is {:?}; {} not allowed",
            batch.id, batch.status, req.reason
        )));
    }
    Ok(())
}

/// Record one move inside an open unit of work.
///
/// Checks, in order: shape, idempotency, references, location non-negativity
/// (unbatched moves may only draw loose stock), then the batch counter (conditional decrement / increment), and finally
/// appends the ledger row.
pub fn record_in<T: LedgerTx + ?Sized>(
    tx: &mut T,
    req: NewStockMove,
    now: DateTime<Utc>,
) -> DomainResult<MoveOutcome> {
    req.validate()?;

    if let Some(existing) = tx.move_by_event_id(&req.event_id) {
        if req.matches(&existing) {
            debug!(event_id = %req.event_id, move_id = %existing.id, "replayed stock move");
            return Ok(MoveOutcome::Replayed(existing));
        }
        return Err(DomainError::conflict(format!(
            "eventId {} was already used for a different move",
            req.event_id
        )));
    }

    let item = tx
        .item(req.item_id)
        .ok_or_else(|| DomainError::not_found("item", req.item_id))?;
    if req.reason == MoveReason::Receipt && !item.active {
        return Err(DomainError::validation(format!("item {} is inactive", item.sku)));
    }
    for location in [req.from_location_id, req.to_location_id].into_iter().flatten() {
        if tx.location(location).is_none() {
            return Err(DomainError::not_found("location", location));
        }
    }

    if let Some(from) = req.from_location_id {
        let on_hand = tx.on_hand(req.item_id, from);
        // Unbatched stock leaving a location cannot eat into batch-held stock.
        let available = match req.batch_id {
            Some(_) => on_hand,
            None => loose_in(tx, req.item_id, from),
        };
        if available < req.quantity {
            return Err(DomainError::insufficient_stock(req.quantity, available));
        }
    }

    if let (Some(batch_id), Some(effect)) = (req.batch_id, req.batch_effect()) {
        let batch = tx
            .batch(batch_id)
            .ok_or_else(|| DomainError::not_found("batch", batch_id))?;
        check_batch(&batch, &req, effect)?;
        match effect {
            BatchEffect::Decrement => tx.decrement_batch(batch_id, req.quantity)?,
            BatchEffect::Increment => tx.increment_batch(batch_id, req.quantity)?,
        };
    }

    let recorded = tx.append_move(req.into_move(StockMoveId::new(), 0, now))?;
    debug!(
        move_id = %recorded.id,
        event_id = %recorded.event_id,
        item_id = %recorded.item_id,
        reason = %recorded.reason,
        quantity = %recorded.quantity,
        "recorded stock move"
    );
    Ok(MoveOutcome::Recorded(recorded))
}

/// Register (or top up) a batch and record the RECEIPT inside an open unit.
pub fn receive_in<T: LedgerTx + ?Sized>(
    tx: &mut T,
    event: GoodsReceived,
    now: DateTime<Utc>,
) -> DomainResult<ReceiptOutcome> {
    event.validate()?;

    if let Some(existing) = tx.move_by_event_id(&event.event_id) {
        let same = existing.reason == MoveReason::Receipt
            && existing.item_id == event.item_id
            && existing.quantity == event.quantity
            && existing.to_location_id == Some(event.location_id)
            && event.batch_id.is_none_or(|b| existing.batch_id == Some(b));
        let batch = existing.batch_id.and_then(|b| tx.batch(b));
        return match (same, batch) {
            (true, Some(batch)) => Ok(ReceiptOutcome {
                batch,
                stock_move: MoveOutcome::Replayed(existing),
            }),
            _ => Err(DomainError::conflict(format!(
                "eventId {} was already used for a different move",
                event.event_id
            ))),
        };
    }

    let occurred_at = event.occurred_at.unwrap_or(now);
    let batch_id = match event.batch_id {
        Some(id) => id,
        None => {
            if tx.item(event.item_id).is_none() {
                return Err(DomainError::not_found("item", event.item_id));
            }
            let batch = Batch {
                id: BatchId::new(),
                item_id: event.item_id,
                location_id: Some(event.location_id),
                lot_no: event.lot_no.clone(),
                expiry_date: event.expiry_date,
                qty_on_hand: Decimal::ZERO,
                status: BatchStatus::Active,
                received_seq: tx.next_batch_seq(),
                received_at: occurred_at,
                disposed_at: None,
            };
            let id = batch.id;
            tx.insert_batch(batch)?;
            id
        }
    };

    let req = NewStockMove::new(event.item_id, event.quantity, MoveReason::Receipt, event.event_id)
        .to(event.location_id)
        .batch(batch_id)
        .reference("GOODS_RECEIPT", batch_id)
        .occurred_at(occurred_at);
    let stock_move = record_in(tx, req, now)?;
    let batch = tx
        .batch(batch_id)
        .ok_or_else(|| DomainError::internal(format!("batch {batch_id} vanished mid-unit")))?;
    Ok(ReceiptOutcome { batch, stock_move })
}

/// Public entry point for direct move recording.
#[derive(Debug, Clone)]
pub struct StockRecorder<U> {
    uow: U,
}

impl<U: UnitOfWork> StockRecorder<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    #[instrument(skip(self, req), fields(event_id = %req.event_id, item_id = %req.item_id, reason = %req.reason))]
    pub fn record_move(&self, req: NewStockMove) -> DomainResult<MoveOutcome> {
        self.uow
            .run_atomically("record_move", |tx| record_in(tx, req, Utc::now()))
    }

    /// Consume a goods-received event from procurement.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, item_id = %event.item_id))]
    pub fn receive_goods(&self, event: GoodsReceived) -> DomainResult<ReceiptOutcome> {
        self.uow
            .run_atomically("receive_goods", |tx| receive_in(tx, event, Utc::now()))
    }
}
