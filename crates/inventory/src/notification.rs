//! Derived alerts. Not authoritative: they can always be regenerated from
//! ledger and batch state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medstock_core::{BatchId, DomainError, DomainResult, ItemId, LocationId, NotificationId};

use crate::signals::{ExpiryBand, ExpirySignal, ReorderSignal};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    LowStock,
    Expiry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    /// Identifies the condition; at most one unresolved notification per key.
    pub dedupe_key: String,
    pub item_id: ItemId,
    pub location_id: Option<LocationId>,
    pub batch_id: Option<BatchId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn low_stock(signal: &ReorderSignal, at: DateTime<Utc>) -> Self {
        let scope = signal
            .location_id
            .map(|l| l.to_string())
            .unwrap_or_else(|| "all".to_string());
        Self {
            id: NotificationId::new(),
            kind: NotificationKind::LowStock,
            dedupe_key: format!("low-stock:{}:{scope}", signal.item_id),
            item_id: signal.item_id,
            location_id: signal.location_id,
            batch_id: None,
            message: format!(
                "on hand {} is at or below minimum {} (suggest reordering {})",
                signal.on_hand, signal.min_qty, signal.suggested_reorder
            ),
            created_at: at,
            resolved_at: None,
        }
    }

    pub fn expiry(signal: &ExpirySignal, at: DateTime<Utc>) -> Self {
        let message = match signal.band {
            ExpiryBand::Expired => format!(
                "batch expired on {} with {} remaining",
                signal.expiry_date, signal.qty_on_hand
            ),
            _ => format!(
                "batch expires on {} ({} days) with {} remaining",
                signal.expiry_date, signal.days_until_expiry, signal.qty_on_hand
            ),
        };
        Self {
            id: NotificationId::new(),
            kind: NotificationKind::Expiry,
            dedupe_key: format!("expiry:{}", signal.batch_id),
            item_id: signal.item_id,
            location_id: signal.location_id,
            batch_id: Some(signal.batch_id),
            message,
            created_at: at,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.is_resolved() {
            return Err(DomainError::conflict(format!(
                "notification {} is already resolved",
                self.id
            )));
        }
        self.resolved_at = Some(at);
        Ok(())
    }
}
