//! Ledger entries.
//!
//! A [`StockMove`] is append-only. Quantities are always recorded positive;
//! direction comes from which of `from_location_id` / `to_location_id` is set.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{BatchId, DomainError, DomainResult, ItemId, LocationId, StockMoveId, ensure_positive};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveReason {
    Receipt,
    Issue,
    Transfer,
    Adjustment,
    Quarantine,
    Disposal,
}

impl MoveReason {
    /// Reasons that count as consumption when they leave a location.
    pub fn is_usage(self) -> bool {
        matches!(
            self,
            MoveReason::Issue | MoveReason::Transfer | MoveReason::Adjustment | MoveReason::Disposal
        )
    }
}

impl core::fmt::Display for MoveReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            MoveReason::Receipt => "RECEIPT",
            MoveReason::Issue => "ISSUE",
            MoveReason::Transfer => "TRANSFER",
            MoveReason::Adjustment => "ADJUSTMENT",
            MoveReason::Quarantine => "QUARANTINE",
            MoveReason::Disposal => "DISPOSAL",
        })
    }
}

/// Caller-supplied idempotency key. Globally unique across the ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::validation("eventId cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMove {
    pub id: StockMoveId,
    pub item_id: ItemId,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub batch_id: Option<BatchId>,
    pub quantity: Decimal,
    pub reason: MoveReason,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub event_id: EventId,
    pub occurred_at: DateTime<Utc>,
    /// Position in the ledger; strictly increasing.
    pub recorded_seq: u64,
}

fn effect_of(reason: MoveReason, outbound: bool) -> BatchEffect {
    match reason {
        MoveReason::Receipt => BatchEffect::Increment,
        MoveReason::Adjustment if !outbound => BatchEffect::Increment,
        MoveReason::Adjustment
        | MoveReason::Issue
        | MoveReason::Transfer
        | MoveReason::Quarantine
        | MoveReason::Disposal => BatchEffect::Decrement,
    }
}

impl StockMove {
    /// Effect this row had on its batch, if it names one.
    pub fn batch_effect(&self) -> Option<BatchEffect> {
        self.batch_id?;
        Some(effect_of(self.reason, self.from_location_id.is_some()))
    }

    /// Signed effect of this move on the on-hand at `location`.
    pub fn delta_at(&self, location: LocationId) -> Decimal {
        let mut delta = Decimal::ZERO;
        if self.to_location_id == Some(location) {
            delta += self.quantity;
        }
        if self.from_location_id == Some(location) {
            delta -= self.quantity;
        }
        delta
    }
}

/// How a move changes its batch's remaining quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BatchEffect {
    Increment,
    Decrement,
}

/// Request to append a move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockMove {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub reason: MoveReason,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub batch_id: Option<BatchId>,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub event_id: EventId,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewStockMove {
    pub fn new(item_id: ItemId, quantity: Decimal, reason: MoveReason, event_id: EventId) -> Self {
        Self {
            item_id,
            quantity,
            reason,
            from_location_id: None,
            to_location_id: None,
            batch_id: None,
            ref_type: None,
            ref_id: None,
            event_id,
            occurred_at: None,
        }
    }

    pub fn from(mut self, location: LocationId) -> Self {
        self.from_location_id = Some(location);
        self
    }

    pub fn to(mut self, location: LocationId) -> Self {
        self.to_location_id = Some(location);
        self
    }

    pub fn batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn reference(mut self, ref_type: impl Into<String>, ref_id: impl ToString) -> Self {
        self.ref_type = Some(ref_type.into());
        self.ref_id = Some(ref_id.to_string());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Shape checks that need no stored state.
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity, "quantity")?;

        let (from, to) = (self.from_location_id, self.to_location_id);
        match self.reason {
            MoveReason::Receipt => {
                if to.is_none() || from.is_some() {
                    return Err(DomainError::validation(
                        "RECEIPT moves need a destination and no source",
                    ));
                }
            }
            MoveReason::Issue | MoveReason::Quarantine | MoveReason::Disposal => {
                if from.is_none() {
                    return Err(DomainError::validation(format!(
                        "{} moves need a source location",
                        self.reason
                    )));
                }
            }
            MoveReason::Transfer => match (from, to) {
                (Some(f), Some(t)) if f != t => {}
                (Some(_), Some(_)) => {
                    return Err(DomainError::validation(
                        "TRANSFER source and destination must differ",
                    ));
                }
                _ => {
                    return Err(DomainError::validation(
                        "TRANSFER moves need both a source and a destination",
                    ));
                }
            },
            MoveReason::Adjustment => {
                if from.is_some() == to.is_some() {
                    return Err(DomainError::validation(
                        "ADJUSTMENT moves need exactly one of source or destination",
                    ));
                }
            }
        }
        Ok(())
    }

    /// `None` when the move names no batch.
    pub fn batch_effect(&self) -> Option<BatchEffect> {
        self.batch_id?;
        Some(effect_of(self.reason, self.from_location_id.is_some()))
    }

    /// Whether `existing` was recorded from an identical request. Used to tell
    /// a retried request apart from an event id reused for something else.
    pub fn matches(&self, existing: &StockMove) -> bool {
        self.item_id == existing.item_id
            && self.quantity == existing.quantity
            && self.reason == existing.reason
            && self.from_location_id == existing.from_location_id
            && self.to_location_id == existing.to_location_id
            && self.batch_id == existing.batch_id
            && self.ref_type == existing.ref_type
            && self.ref_id == existing.ref_id
            && self.occurred_at.is_none_or(|at| at == existing.occurred_at)
    }

    pub fn into_move(self, id: StockMoveId, recorded_seq: u64, now: DateTime<Utc>) -> StockMove {
        StockMove {
            id,
            item_id: self.item_id,
            from_location_id: self.from_location_id,
            to_location_id: self.to_location_id,
            batch_id: self.batch_id,
            quantity: self.quantity,
            reason: self.reason,
            ref_type: self.ref_type,
            ref_id: self.ref_id,
            event_id: self.event_id,
            occurred_at: self.occurred_at.unwrap_or(now),
            recorded_seq,
        }
    }
}

/// Goods-received event emitted by procurement.
///
/// Names an existing batch to top it up, or omits `batch_id` to register a new
/// batch from `lot_no` / `expiry_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub lot_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: Decimal,
    pub location_id: LocationId,
    pub event_id: EventId,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl GoodsReceived {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity, "quantity")?;
        if self.batch_id.is_some() && (self.lot_no.is_some() || self.expiry_date.is_some()) {
            return Err(DomainError::validation(
                "a top-up names an existing batch and cannot carry lot or expiry",
            ));
        }
        Ok(())
    }
}
