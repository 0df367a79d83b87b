//! Batches (lots) of an item and their lifecycle.
//!
//! A batch's `qty_on_hand` is only ever changed by the stock move recorder;
//! workflows change its `status`. Batches are never deleted.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{BatchId, DomainError, DomainResult, ItemId, LocationId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Active,
    Quarantined,
    Expired,
    Disposed,
}

impl BatchStatus {
    /// EXPIRED and DISPOSED never return to ACTIVE.
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Expired | BatchStatus::Disposed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub item_id: ItemId,
    /// Location the batch was received into.
    pub location_id: Option<LocationId>,
    pub lot_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub qty_on_hand: Decimal,
    pub status: BatchStatus,
    /// Registration order; the final FEFO tie-breaker.
    pub received_seq: u64,
    pub received_at: DateTime<Utc>,
    pub disposed_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Only active batches with stock left are offered to the allocator.
    pub fn is_allocatable(&self) -> bool {
        self.status == BatchStatus::Active && self.qty_on_hand > Decimal::ZERO
    }

    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date.map(|d| (d - today).num_days())
    }

    pub fn is_past_expiry(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }

    pub fn quarantine(&mut self) -> DomainResult<()> {
        match self.status {
            BatchStatus::Active => {
                self.status = BatchStatus::Quarantined;
                Ok(())
            }
            BatchStatus::Quarantined => Ok(()),
            other => Err(DomainError::conflict(format!(
                "batch {} is {:?} and cannot be quarantined",
                self.id, other
            ))),
        }
    }

    pub fn release(&mut self) -> DomainResult<()> {
        match self.status {
            BatchStatus::Quarantined => {
                self.status = BatchStatus::Active;
                Ok(())
            }
            BatchStatus::Active => Ok(()),
            other => Err(DomainError::conflict(format!(
                "batch {} is {:?} and cannot be released",
                self.id, other
            ))),
        }
    }

    /// Flag the batch as expired. Returns `false` when nothing changed.
    pub fn expire(&mut self) -> bool {
        match self.status {
            BatchStatus::Active | BatchStatus::Quarantined => {
                self.status = BatchStatus::Expired;
                true
            }
            BatchStatus::Expired | BatchStatus::Disposed => false,
        }
    }

    /// Final state once all stock of the batch has been written off.
    pub fn mark_disposed(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.qty_on_hand != Decimal::ZERO {
            return Err(DomainError::conflict(format!(
                "batch {} still holds {} and cannot be marked disposed",
                self.id, self.qty_on_hand
            )));
        }
        self.status = BatchStatus::Disposed;
        self.disposed_at = Some(at);
        Ok(())
    }
}
