//! FEFO allocation against the stock held at one location.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

use medstock_core::{BatchId, DomainError, DomainResult, ItemId, LocationId, ensure_positive};
use medstock_inventory::{
    Allocation, Batch, BatchStatus, EventId, MoveReason, NewStockMove, StockMove, allocate,
    write_down,
};

use crate::recorder::record_in;
use crate::store::{LedgerTx, UnitOfWork};

/// How a required quantity will be drawn at a location.
///
/// Batches at the location are consumed first-expiry-first. Stock that
/// arrived without a batch (e.g. the destination side of a transfer) covers
/// whatever the batches cannot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockPlan {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub allocations: Vec<Allocation>,
    pub unbatched: Decimal,
}

impl StockPlan {
    pub fn total(&self) -> Decimal {
        self.allocations.iter().map(|a| a.quantity).sum::<Decimal>() + self.unbatched
    }
}

/// Non-disposed batches of `item` whose home is `location`.
fn batches_at<T: LedgerTx + ?Sized>(tx: &T, item: ItemId, location: LocationId) -> Vec<Batch> {
    tx.batches_for_item(item)
        .into_iter()
        .filter(|b| b.location_id == Some(location) && b.status != BatchStatus::Disposed)
        .collect()
}

/// Location on-hand not accounted for by any batch there.
pub fn loose_in<T: LedgerTx + ?Sized>(tx: &T, item: ItemId, location: LocationId) -> Decimal {
    let held: Decimal = batches_at(tx, item, location).iter().map(|b| b.qty_on_hand).sum();
    (tx.on_hand(item, location) - held).max(Decimal::ZERO)
}

fn check_refs<T: LedgerTx + ?Sized>(
    tx: &T,
    item: ItemId,
    location: LocationId,
    required: Decimal,
) -> DomainResult<()> {
    ensure_positive(required, "required quantity")?;
    if tx.item(item).is_none() {
        return Err(DomainError::not_found("item", item));
    }
    if tx.location(location).is_none() {
        return Err(DomainError::not_found("location", location));
    }
    Ok(())
}

/// Build a plan inside an open unit of work. Fails without side effects when
/// the location cannot cover `required`.
pub fn plan_in<T: LedgerTx + ?Sized>(
    tx: &T,
    item: ItemId,
    location: LocationId,
    required: Decimal,
) -> DomainResult<StockPlan> {
    check_refs(tx, item, location, required)?;

    let batches = batches_at(tx, item, location);
    let allocatable: Decimal = batches
        .iter()
        .filter(|b| b.is_allocatable())
        .map(|b| b.qty_on_hand)
        .sum();
    let on_hand = tx.on_hand(item, location);
    let loose = loose_in(tx, item, location);
    let available = (allocatable + loose).min(on_hand.max(Decimal::ZERO));

    if available < required {
        return Err(DomainError::insufficient_stock(required, available));
    }

    let from_batches = allocatable.min(required);
    let allocations = if from_batches.is_zero() {
        Vec::new()
    } else {
        allocate(&batches, from_batches)?
    };
    Ok(StockPlan {
        item_id: item,
        location_id: location,
        allocations,
        unbatched: required - from_batches,
    })
}

/// Plan a shrinkage found by a count: loose stock goes first, then every
/// batch still holding stock at the location (any status but DISPOSED), FEFO.
pub fn write_down_plan_in<T: LedgerTx + ?Sized>(
    tx: &T,
    item: ItemId,
    location: LocationId,
    required: Decimal,
) -> DomainResult<StockPlan> {
    check_refs(tx, item, location, required)?;

    let on_hand = tx.on_hand(item, location);
    if on_hand < required {
        return Err(DomainError::insufficient_stock(required, on_hand.max(Decimal::ZERO)));
    }
    let unbatched = loose_in(tx, item, location).min(required);
    let from_batches = required - unbatched;
    let allocations = if from_batches.is_zero() {
        Vec::new()
    } else {
        write_down(&batches_at(tx, item, location), from_batches)?
    };
    Ok(StockPlan {
        item_id: item,
        location_id: location,
        allocations,
        unbatched,
    })
}

/// Parameters shared by every move a plan turns into.
pub struct PlanMoves<'a> {
    pub reason: MoveReason,
    pub to_location_id: Option<LocationId>,
    pub ref_type: &'a str,
    pub ref_id: String,
    /// Prefix of the per-allocation idempotency keys.
    pub event_prefix: String,
}

/// Record one move per allocation (plus one for the unbatched remainder).
pub fn record_plan_in<T: LedgerTx + ?Sized>(
    tx: &mut T,
    plan: &StockPlan,
    spec: &PlanMoves<'_>,
    now: chrono::DateTime<Utc>,
) -> DomainResult<Vec<StockMove>> {
    let mut recorded = Vec::with_capacity(plan.allocations.len() + 1);
    let mut push = |tx: &mut T, key: String, qty: Decimal, batch: Option<BatchId>| -> DomainResult<()> {
        let mut req = NewStockMove::new(plan.item_id, qty, spec.reason, EventId::new(key)?)
            .from(plan.location_id)
            .reference(spec.ref_type, &spec.ref_id);
        req.to_location_id = spec.to_location_id;
        req.batch_id = batch;
        recorded.push(record_in(tx, req, now)?.into_move());
        Ok(())
    };

    for alloc in &plan.allocations {
        let key = format!("{}:batch:{}", spec.event_prefix, alloc.batch_id);
        push(tx, key, alloc.quantity, Some(alloc.batch_id))?;
    }
    if plan.unbatched > Decimal::ZERO {
        let key = format!("{}:unbatched", spec.event_prefix);
        push(tx, key, plan.unbatched, None)?;
    }
    Ok(recorded)
}

#[derive(Debug, Clone)]
pub struct FefoAllocator<U> {
    uow: U,
}

impl<U: UnitOfWork> FefoAllocator<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    /// Read-only plan against committed state.
    pub fn preview(&self, item: ItemId, location: LocationId, required: Decimal) -> DomainResult<StockPlan> {
        self.uow.read(|tx| plan_in(tx, item, location, required))?
    }

    /// Dispense `quantity` out of `location` as ISSUE moves (ward use).
    ///
    /// The event id is the caller's idempotency key; each allocation derives
    /// its own key from it, so a retry replays instead of issuing twice.
    #[instrument(skip(self, reference))]
    pub fn issue_stock(
        &self,
        item: ItemId,
        location: LocationId,
        quantity: Decimal,
        event_id: EventId,
        reference: Option<(String, String)>,
    ) -> DomainResult<Vec<StockMove>> {
        self.uow.run_atomically("issue_stock", |tx| {
            let now = Utc::now();
            let prefix = format!("issue:{event_id}");
            let scope = format!("{prefix}:");
            let earlier: Vec<StockMove> = tx
                .moves_for_item(item)
                .into_iter()
                .filter(|m| m.event_id.as_str().starts_with(&scope))
                .collect();
            if !earlier.is_empty() {
                let total: Decimal = earlier.iter().map(|m| m.quantity).sum();
                let same_place = earlier.iter().all(|m| m.from_location_id == Some(location));
                if total != quantity || !same_place {
                    return Err(DomainError::conflict(format!(
                        "eventId {event_id} was already used for a different issue"
                    )));
                }
                debug!(%event_id, "issue already recorded");
                return Ok(earlier);
            }

            let plan = plan_in(tx, item, location, quantity)?;
            let (ref_type, ref_id) = reference.unwrap_or_else(|| ("ISSUE".to_string(), event_id.to_string()));
            let spec = PlanMoves {
                reason: MoveReason::Issue,
                to_location_id: None,
                ref_type: &ref_type,
                ref_id,
                event_prefix: prefix,
            };
            record_plan_in(tx, &plan, &spec, now)
        })
    }
}
