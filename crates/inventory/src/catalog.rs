//! Catalog records referenced by the ledger.
//!
//! Items and locations are owned by catalog management; the ledger reads them
//! to validate references and never mutates them as a side effect of a move.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{DomainError, DomainResult, ItemId, LocationId, ensure_non_negative};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub sku: String,
    pub name: String,
    pub unit_of_measure: String,
    /// Default minimum quantity when no [`Threshold`] overrides it.
    pub min_qty: Decimal,
    pub active: bool,
}

/// Desired state of an item, keyed by SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub sku: String,
    pub name: String,
    pub unit_of_measure: String,
    pub min_qty: Decimal,
    pub active: bool,
}

impl ItemSpec {
    pub fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit_of_measure.trim().is_empty() {
            return Err(DomainError::validation("unit of measure cannot be empty"));
        }
        ensure_non_negative(self.min_qty, "min_qty")?;
        Ok(())
    }

    pub fn into_item(self, id: ItemId) -> Item {
        Item {
            id,
            sku: self.sku.trim().to_string(),
            name: self.name,
            unit_of_measure: self.unit_of_measure,
            min_qty: self.min_qty,
            active: self.active,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationKind {
    Warehouse,
    Room,
    Ward,
    /// Quarantine / hold area.
    Hold,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub code: String,
    pub name: String,
    pub kind: LocationKind,
}

/// Desired state of a location, keyed by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    pub code: String,
    pub name: String,
    pub kind: LocationKind,
}

impl LocationSpec {
    pub fn validate(&self) -> DomainResult<()> {
        if self.code.trim().is_empty() {
            return Err(DomainError::validation("location code cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        Ok(())
    }

    pub fn into_location(self, id: LocationId) -> Location {
        Location {
            id,
            code: self.code.trim().to_string(),
            name: self.name,
            kind: self.kind,
        }
    }
}

/// Minimum quantity for an item, optionally narrowed to one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub item_id: ItemId,
    pub location_id: Option<LocationId>,
    pub min_qty: Decimal,
}

impl Threshold {
    pub fn new(item_id: ItemId, location_id: Option<LocationId>, min_qty: Decimal) -> DomainResult<Self> {
        ensure_non_negative(min_qty, "min_qty")?;
        Ok(Self {
            item_id,
            location_id,
            min_qty,
        })
    }
}
