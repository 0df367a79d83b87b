//! Ledger reconciliation.
//!
//! On-hand is recomputed purely by summing ledger rows, and every batch's
//! remaining quantity is recomputed from the rows that name it. Neither
//! computation reads the maintained counters it is checking. Batches at a
//! location may never hold more than the ledger says is there.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use medstock_core::{BatchId, DomainResult, ItemId, LocationId};
use medstock_inventory::{BatchEffect, BatchStatus, StockMove};

use crate::signals::StockLevel;
use crate::store::{LedgerTx, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchDiscrepancy {
    pub batch_id: BatchId,
    pub recorded: Decimal,
    pub from_ledger: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelDiscrepancy {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub maintained: Decimal,
    pub from_ledger: Decimal,
}

/// Batches at a location holding more than the ledger on-hand there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverheldLevel {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub held_in_batches: Decimal,
    pub from_ledger: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub moves_checked: usize,
    pub batches_checked: usize,
    pub batch_discrepancies: Vec<BatchDiscrepancy>,
    pub level_discrepancies: Vec<LevelDiscrepancy>,
    /// Item/location pairs whose ledger sum is below zero.
    pub negative_levels: Vec<StockLevel>,
    pub overheld_levels: Vec<OverheldLevel>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.batch_discrepancies.is_empty()
            && self.level_discrepancies.is_empty()
            && self.negative_levels.is_empty()
            && self.overheld_levels.is_empty()
    }
}

/// Sum ledger rows into per-location on-hand.
pub fn levels_from_moves<'a>(
    moves: impl IntoIterator<Item = &'a StockMove>,
) -> BTreeMap<(ItemId, LocationId), Decimal> {
    let mut levels: BTreeMap<(ItemId, LocationId), Decimal> = BTreeMap::new();
    for m in moves {
        if let Some(to) = m.to_location_id {
            *levels.entry((m.item_id, to)).or_default() += m.quantity;
        }
        if let Some(from) = m.from_location_id {
            *levels.entry((m.item_id, from)).or_default() -= m.quantity;
        }
    }
    levels
}

pub fn audit_in<T: LedgerTx + ?Sized>(tx: &T) -> AuditReport {
    let moves = tx.moves();
    let batches = tx.batches();

    let mut batch_sums: BTreeMap<BatchId, Decimal> = BTreeMap::new();
    for m in &moves {
        if let (Some(batch_id), Some(effect)) = (m.batch_id, m.batch_effect()) {
            let sum = batch_sums.entry(batch_id).or_default();
            match effect {
                BatchEffect::Increment => *sum += m.quantity,
                BatchEffect::Decrement => *sum -= m.quantity,
            }
        }
    }
    let batch_discrepancies = batches
        .iter()
        .filter_map(|b| {
            let from_ledger = batch_sums.get(&b.id).copied().unwrap_or_default();
            (from_ledger != b.qty_on_hand).then(|| BatchDiscrepancy {
                batch_id: b.id,
                recorded: b.qty_on_hand,
                from_ledger,
            })
        })
        .collect();

    let levels = levels_from_moves(&moves);
    let level_discrepancies = levels
        .iter()
        .filter_map(|(&(item_id, location_id), &from_ledger)| {
            let maintained = tx.on_hand(item_id, location_id);
            (maintained != from_ledger).then_some(LevelDiscrepancy {
                item_id,
                location_id,
                maintained,
                from_ledger,
            })
        })
        .collect();
    let negative_levels = levels
        .iter()
        .filter(|(_, qty)| qty.is_sign_negative() && !qty.is_zero())
        .map(|(&(item_id, location_id), &on_hand)| StockLevel {
            item_id,
            location_id,
            on_hand,
        })
        .collect();

    let mut held: BTreeMap<(ItemId, LocationId), Decimal> = BTreeMap::new();
    for b in batches.iter().filter(|b| b.status != BatchStatus::Disposed) {
        if let Some(location_id) = b.location_id {
            *held.entry((b.item_id, location_id)).or_default() += b.qty_on_hand;
        }
    }
    let overheld_levels = held
        .into_iter()
        .filter_map(|((item_id, location_id), held_in_batches)| {
            let from_ledger = levels.get(&(item_id, location_id)).copied().unwrap_or_default();
            (held_in_batches > from_ledger).then_some(OverheldLevel {
                item_id,
                location_id,
                held_in_batches,
                from_ledger,
            })
        })
        .collect();

    AuditReport {
        moves_checked: moves.len(),
        batches_checked: batches.len(),
        batch_discrepancies,
        level_discrepancies,
        negative_levels,
        overheld_levels,
    }
}

#[derive(Debug, Clone)]
pub struct LedgerAudit<U> {
    uow: U,
}

impl<U: UnitOfWork> LedgerAudit<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    /// On-hand of `item` per location, from ledger rows only.
    pub fn on_hand_by_location(&self, item: ItemId) -> DomainResult<Vec<StockLevel>> {
        self.uow.read(|tx| {
            levels_from_moves(&tx.moves_for_item(item))
                .into_iter()
                .map(|((item_id, location_id), on_hand)| StockLevel {
                    item_id,
                    location_id,
                    on_hand,
                })
                .collect()
        })
    }

    pub fn run(&self) -> DomainResult<AuditReport> {
        let report = self.uow.read(|tx| audit_in(tx))?;
        if !report.is_clean() {
            warn!(
                batches = report.batch_discrepancies.len(),
                levels = report.level_discrepancies.len(),
                negative = report.negative_levels.len(),
                overheld = report.overheld_levels.len(),
                "ledger audit found discrepancies"
            );
        }
        Ok(report)
    }
}
