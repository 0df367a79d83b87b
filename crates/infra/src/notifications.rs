//! LOW_STOCK / EXPIRY notifications derived from ledger and batch state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use medstock_core::{DomainError, DomainResult, NotificationId};
use medstock_inventory::signals::expiry_signals;
use medstock_inventory::{ForecastParams, Notification, ReorderSignal};

use crate::signals::reorder_in;
use crate::store::{LedgerTx, UnitOfWork};

fn is_low(signal: &ReorderSignal) -> bool {
    signal.min_qty > Decimal::ZERO && signal.on_hand <= signal.min_qty
}

#[derive(Debug, Clone)]
pub struct NotificationCenter<U> {
    uow: U,
    params: ForecastParams,
}

impl<U: UnitOfWork> NotificationCenter<U> {
    pub fn new(uow: U, params: ForecastParams) -> Self {
        Self { uow, params }
    }

    /// Raise notifications for current conditions. A condition that already
    /// has an unresolved notification is not raised again. Returns the newly
    /// created notifications.
    #[instrument(skip(self))]
    pub fn refresh(&self, as_of: DateTime<Utc>) -> DomainResult<Vec<Notification>> {
        self.uow.run_atomically("refresh_notifications", |tx| {
            let open: HashSet<String> = tx
                .notifications()
                .into_iter()
                .filter(|n| !n.is_resolved())
                .map(|n| n.dedupe_key)
                .collect();

            let mut candidates = Vec::new();
            let locations = tx.locations();
            for item in tx.items().into_iter().filter(|i| i.active) {
                let overall = reorder_in(tx, item.id, None, as_of, &self.params)?;
                if is_low(&overall) {
                    candidates.push(Notification::low_stock(&overall, as_of));
                }
                for loc in &locations {
                    if tx.threshold(item.id, Some(loc.id)).is_none() {
                        continue;
                    }
                    let scoped = reorder_in(tx, item.id, Some(loc.id), as_of, &self.params)?;
                    if is_low(&scoped) {
                        candidates.push(Notification::low_stock(&scoped, as_of));
                    }
                }
            }
            for signal in expiry_signals(&tx.batches(), as_of.date_naive(), self.params.expiry_window_days) {
                if signal.band.is_alerting() {
                    candidates.push(Notification::expiry(&signal, as_of));
                }
            }

            let mut raised = Vec::new();
            let mut seen = open;
            for n in candidates {
                if seen.insert(n.dedupe_key.clone()) {
                    tx.put_notification(n.clone());
                    raised.push(n);
                }
            }
            if !raised.is_empty() {
                info!(count = raised.len(), "notifications raised");
            }
            Ok(raised)
        })
    }

    pub fn resolve(&self, id: NotificationId, at: DateTime<Utc>) -> DomainResult<Notification> {
        self.uow.run_atomically("resolve_notification", |tx| {
            let mut n = tx
                .notification(id)
                .ok_or_else(|| DomainError::not_found("notification", id))?;
            n.resolve(at)?;
            tx.put_notification(n.clone());
            Ok(n)
        })
    }

    pub fn unresolved(&self) -> DomainResult<Vec<Notification>> {
        self.uow.read(|tx| {
            let mut open: Vec<Notification> =
                tx.notifications().into_iter().filter(|n| !n.is_resolved()).collect();
            open.sort_by_key(|n| n.created_at);
            open
        })
    }
}
