//! First-expiry-first-out allocation.

use core::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{BatchId, DomainError, DomainResult, ensure_positive};

use crate::batch::{Batch, BatchStatus};

/// Quantity drawn from one batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub batch_id: BatchId,
    pub quantity: Decimal,
}

fn fefo_cmp(a: &Batch, b: &Batch) -> Ordering {
    let by_expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiry
        .then(a.received_seq.cmp(&b.received_seq))
        .then(a.id.cmp(&b.id))
}

/// Allocatable batches in consumption order: earliest expiry first, batches
/// without expiry last, then registration order.
pub fn fefo_order<'a>(batches: impl IntoIterator<Item = &'a Batch>) -> Vec<&'a Batch> {
    let mut ordered: Vec<&Batch> = batches.into_iter().filter(|b| b.is_allocatable()).collect();
    ordered.sort_by(|a, b| fefo_cmp(a, b));
    ordered
}

/// Plan a draw of `required` across `candidates`.
///
/// Either the whole quantity is covered or nothing is returned.
pub fn allocate<'a>(
    candidates: impl IntoIterator<Item = &'a Batch>,
    required: Decimal,
) -> DomainResult<Vec<Allocation>> {
    ensure_positive(required, "required quantity")?;
    draw(fefo_order(candidates), required)
}

/// Plan a write-down of `required` (count shrinkage) across every batch that
/// still holds stock, whatever its status, in FEFO order.
pub fn write_down<'a>(
    candidates: impl IntoIterator<Item = &'a Batch>,
    required: Decimal,
) -> DomainResult<Vec<Allocation>> {
    ensure_positive(required, "required quantity")?;
    let mut ordered: Vec<&Batch> = candidates
        .into_iter()
        .filter(|b| b.status != BatchStatus::Disposed && b.qty_on_hand > Decimal::ZERO)
        .collect();
    ordered.sort_by(|a, b| fefo_cmp(a, b));
    draw(ordered, required)
}

fn draw(ordered: Vec<&Batch>, required: Decimal) -> DomainResult<Vec<Allocation>> {
    let available: Decimal = ordered.iter().map(|b| b.qty_on_hand).sum();
    if available < required {
        return Err(DomainError::insufficient_stock(required, available));
    }

    let mut still_needed = required;
    let mut plan = Vec::new();
    for batch in ordered {
        if still_needed.is_zero() {
            break;
        }
        let take = batch.qty_on_hand.min(still_needed);
        plan.push(Allocation {
            batch_id: batch.id,
            quantity: take,
        });
        still_needed -= take;
    }
    Ok(plan)
}
