//! Read-only reorder / expiry signal engine and dashboard snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use medstock_core::{DomainError, DomainResult, ItemId, LocationId};
use medstock_inventory::signals::{expiry_signals, total_usage};
use medstock_inventory::{ExpirySignal, ExternalForecast, ForecastParams, ReorderSignal, StockRisk};

use crate::store::{LedgerTx, UnitOfWork};

/// External demand-forecasting model.
///
/// Returning `None` (or a forecast with no fields set) keeps the heuristic.
pub trait ForecastSource: Send + Sync {
    fn forecast(&self, item: ItemId, location: Option<LocationId>) -> Option<ExternalForecast>;
}

impl<F> ForecastSource for F
where
    F: Fn(ItemId, Option<LocationId>) -> Option<ExternalForecast> + Send + Sync,
{
    fn forecast(&self, item: ItemId, location: Option<LocationId>) -> Option<ExternalForecast> {
        self(item, location)
    }
}

/// Ledger on-hand of `item` summed over every location.
pub fn total_on_hand_in<T: LedgerTx + ?Sized>(tx: &T, item: ItemId) -> Decimal {
    tx.locations().iter().map(|l| tx.on_hand(item, l.id)).sum()
}

/// Minimum quantity for `item` at `location`: the location threshold, then
/// the item-wide threshold, then the item's own minimum.
pub fn min_qty_in<T: LedgerTx + ?Sized>(tx: &T, item: ItemId, location: Option<LocationId>) -> DomainResult<Decimal> {
    if let Some(t) = location.and_then(|l| tx.threshold(item, Some(l))) {
        return Ok(t.min_qty);
    }
    if let Some(t) = tx.threshold(item, None) {
        return Ok(t.min_qty);
    }
    tx.item(item)
        .map(|i| i.min_qty)
        .ok_or_else(|| DomainError::not_found("item", item))
}

/// Heuristic reorder signal computed from committed ledger rows.
pub fn reorder_in<T: LedgerTx + ?Sized>(
    tx: &T,
    item: ItemId,
    location: Option<LocationId>,
    as_of: DateTime<Utc>,
    params: &ForecastParams,
) -> DomainResult<ReorderSignal> {
    let min_qty = min_qty_in(tx, item, location)?;
    let on_hand = match location {
        Some(l) => tx.on_hand(item, l),
        None => total_on_hand_in(tx, item),
    };
    let usage = total_usage(&tx.moves_for_item(item), item, location, as_of, params.lookback_days);
    Ok(ReorderSignal::compute(item, location, on_hand, usage, min_qty, params))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub on_hand: Decimal,
}

/// Point-in-time view for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    pub as_of: DateTime<Utc>,
    pub stock_levels: Vec<StockLevel>,
    pub low_stock_count: usize,
    pub expiring: Vec<ExpirySignal>,
    pub reorder: Vec<ReorderSignal>,
}

pub struct SignalEngine<U> {
    uow: U,
    params: ForecastParams,
    forecasts: Option<Arc<dyn ForecastSource>>,
}

impl<U: Clone> Clone for SignalEngine<U> {
    fn clone(&self) -> Self {
        Self {
            uow: self.uow.clone(),
            params: self.params.clone(),
            forecasts: self.forecasts.clone(),
        }
    }
}

impl<U: UnitOfWork> SignalEngine<U> {
    pub fn new(uow: U, params: ForecastParams) -> Self {
        Self {
            uow,
            params,
            forecasts: None,
        }
    }

    pub fn with_forecast_source(mut self, source: Arc<dyn ForecastSource>) -> Self {
        self.forecasts = Some(source);
        self
    }

    pub fn params(&self) -> &ForecastParams {
        &self.params
    }

    fn apply_forecast(&self, signal: ReorderSignal) -> ReorderSignal {
        let external = self
            .forecasts
            .as_ref()
            .and_then(|src| src.forecast(signal.item_id, signal.location_id));
        match external {
            Some(forecast) => signal.with_override(&forecast, &self.params),
            None => signal,
        }
    }

    /// Reorder signal for one item, across all locations or at one.
    pub fn reorder_signal(
        &self,
        item: ItemId,
        location: Option<LocationId>,
        as_of: DateTime<Utc>,
    ) -> DomainResult<ReorderSignal> {
        let signal = self
            .uow
            .read(|tx| reorder_in(tx, item, location, as_of, &self.params))??;
        Ok(self.apply_forecast(signal))
    }

    /// Signals for every active item, most urgent first.
    pub fn reorder_signals(
        &self,
        location: Option<LocationId>,
        as_of: DateTime<Utc>,
    ) -> DomainResult<Vec<ReorderSignal>> {
        let heuristic = self.uow.read(|tx| {
            tx.items()
                .into_iter()
                .filter(|i| i.active)
                .map(|i| reorder_in(tx, i.id, location, as_of, &self.params))
                .collect::<DomainResult<Vec<_>>>()
        })??;
        let mut signals: Vec<ReorderSignal> =
            heuristic.into_iter().map(|s| self.apply_forecast(s)).collect();
        signals.sort_by_key(|s| match s.risk {
            StockRisk::High => 0,
            StockRisk::Medium => 1,
            StockRisk::Unknown => 2,
            StockRisk::Low => 3,
        });
        Ok(signals)
    }

    /// Batches expiring within the configured window, soonest first.
    pub fn expiry_signals(&self, today: NaiveDate) -> DomainResult<Vec<ExpirySignal>> {
        self.uow
            .read(|tx| expiry_signals(&tx.batches(), today, self.params.expiry_window_days))
    }

    /// Non-zero on-hand per item and location.
    pub fn stock_levels(&self) -> DomainResult<Vec<StockLevel>> {
        self.uow.read(|tx| {
            let locations = tx.locations();
            let mut levels = BTreeMap::new();
            for item in tx.items() {
                for loc in &locations {
                    let on_hand = tx.on_hand(item.id, loc.id);
                    if !on_hand.is_zero() {
                        levels.insert((item.id, loc.id), on_hand);
                    }
                }
            }
            levels
                .into_iter()
                .map(|((item_id, location_id), on_hand)| StockLevel {
                    item_id,
                    location_id,
                    on_hand,
                })
                .collect()
        })
    }

    pub fn dashboard(&self, as_of: DateTime<Utc>) -> DomainResult<DashboardSnapshot> {
        let reorder = self.reorder_signals(None, as_of)?;
        let low_stock_count = reorder
            .iter()
            .filter(|s| s.min_qty > Decimal::ZERO && s.on_hand <= s.min_qty)
            .count();
        Ok(DashboardSnapshot {
            as_of,
            stock_levels: self.stock_levels()?,
            low_stock_count,
            expiring: self.expiry_signals(as_of.date_naive())?,
            reorder,
        })
    }
}
