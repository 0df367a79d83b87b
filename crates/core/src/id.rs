//! Strongly-typed identifiers used across the stock engine.
//!
//! Every entity gets its own UUID newtype so a `BatchId` can never be passed
//! where a `LocationId` is expected. Ids are serde-transparent: they travel as
//! strings at the boundary and compare as UUIDs everywhere else.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! entity_id {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s.trim())
                    .map_err(|e| DomainError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

entity_id!(
    /// Catalog item (a stocked product such as a drug or consumable).
    ItemId,
    "ItemId"
);
entity_id!(
    /// Physical or logical place that holds stock (warehouse, ward, hold area).
    LocationId,
    "LocationId"
);
entity_id!(
    /// A received lot of an item.
    BatchId,
    "BatchId"
);
entity_id!(StockMoveId, "StockMoveId");
entity_id!(TransferId, "TransferId");
entity_id!(DisposalId, "DisposalId");
entity_id!(CountSessionId, "CountSessionId");
entity_id!(NotificationId, "NotificationId");
entity_id!(
    /// Identity of the human or service acting on the ledger.
    UserId,
    "UserId"
);
