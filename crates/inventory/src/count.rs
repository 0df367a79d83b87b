//! Cycle-count sessions.
//!
//! A session is created OPEN with one line per counted item (optionally per
//! batch) and is POSTED exactly once. Posting turns each non-zero variance into
//! one ADJUSTMENT move at the session's location.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{
    BatchId, CountSessionId, DomainError, DomainResult, ItemId, LocationId, UserId,
    ensure_non_negative,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountStatus {
    Open,
    Posted,
}

/// Line as submitted. `system_qty` and `variance` may be left for the engine
/// to fill in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCountLine {
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub counted_qty: Decimal,
    pub system_qty: Option<Decimal>,
    pub variance: Option<Decimal>,
    pub notes: Option<String>,
}

impl NewCountLine {
    pub fn new(item_id: ItemId, counted_qty: Decimal) -> Self {
        Self {
            item_id,
            batch_id: None,
            counted_qty,
            system_qty: None,
            variance: None,
            notes: None,
        }
    }

    pub fn with_system(mut self, system_qty: Decimal, variance: Decimal) -> Self {
        self.system_qty = Some(system_qty);
        self.variance = Some(variance);
        self
    }

    /// Fix the line's numbers. `ledger_qty` is used when no system quantity
    /// was supplied. A supplied variance must equal `counted - system`.
    pub fn resolve(self, ledger_qty: Decimal) -> DomainResult<CountLine> {
        ensure_non_negative(self.counted_qty, "countedQty")?;
        let system_qty = match self.system_qty {
            Some(q) => ensure_non_negative(q, "systemQty")?,
            None => ledger_qty,
        };
        let computed = self.counted_qty - system_qty;
        if let Some(supplied) = self.variance {
            if supplied != computed {
                return Err(DomainError::validation(format!(
                    "variance {supplied} disagrees with countedQty {} - systemQty {system_qty} = {computed}",
                    self.counted_qty
                )));
            }
        }
        Ok(CountLine {
            item_id: self.item_id,
            batch_id: self.batch_id,
            counted_qty: self.counted_qty,
            system_qty,
            variance: computed,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLine {
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub counted_qty: Decimal,
    pub system_qty: Decimal,
    pub variance: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCountSession {
    pub session_no: String,
    pub location_id: LocationId,
    pub notes: Option<String>,
    pub lines: Vec<NewCountLine>,
}

impl NewCountSession {
    pub fn validate(&self) -> DomainResult<()> {
        if self.session_no.trim().is_empty() {
            return Err(DomainError::validation("sessionNo cannot be empty"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("a count session needs at least one line"));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentDirection {
    /// Counted more than the system held.
    Inbound,
    /// Counted less than the system held.
    Outbound,
}

/// One adjusting move a post will record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlannedAdjustment {
    pub line_index: usize,
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    /// Magnitude; always positive.
    pub quantity: Decimal,
    pub direction: AdjustmentDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSession {
    pub id: CountSessionId,
    pub session_no: String,
    pub location_id: LocationId,
    pub status: CountStatus,
    pub notes: Option<String>,
    pub lines: Vec<CountLine>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub posted_by: Option<UserId>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl CountSession {
    pub fn open(
        id: CountSessionId,
        session_no: String,
        location_id: LocationId,
        notes: Option<String>,
        lines: Vec<CountLine>,
        created_by: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_no: session_no.trim().to_string(),
            location_id,
            status: CountStatus::Open,
            notes,
            lines,
            created_by,
            created_at: at,
            posted_by: None,
            posted_at: None,
        }
    }

    pub fn planned_adjustments(&self) -> Vec<PlannedAdjustment> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.variance.is_zero())
            .map(|(line_index, line)| PlannedAdjustment {
                line_index,
                item_id: line.item_id,
                batch_id: line.batch_id,
                quantity: line.variance.abs(),
                direction: if line.variance.is_sign_negative() {
                    AdjustmentDirection::Outbound
                } else {
                    AdjustmentDirection::Inbound
                },
            })
            .collect()
    }

    /// Re-posting is a conflict: the adjustments must provably happen once.
    pub fn mark_posted(&mut self, by: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status == CountStatus::Posted {
            return Err(DomainError::conflict(format!(
                "count session {} is already posted",
                self.session_no
            )));
        }
        self.status = CountStatus::Posted;
        self.posted_by = Some(by);
        self.posted_at = Some(at);
        Ok(())
    }

    /// Idempotency key of the adjusting move for one line.
    pub fn line_event_key(&self, line_index: usize) -> String {
        format!("count:{}:line:{line_index}", self.id)
    }
}
