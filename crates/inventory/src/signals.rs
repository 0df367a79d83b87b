//! Reorder and expiry heuristics.
//!
//! Everything here is a pure function of ledger rows, batches and
//! [`ForecastParams`]; the infrastructure layer decides which rows to feed in.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use medstock_core::{BatchId, ItemId, LocationId, ceil_whole};

use crate::batch::{Batch, BatchStatus};
use crate::stock_move::{MoveReason, StockMove};

/// Tunables for the signal engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastParams {
    pub lookback_days: u32,
    pub lead_time_days: u32,
    pub review_days: u32,
    pub safety_factor: Decimal,
    pub expiry_window_days: u32,
}

impl Default for ForecastParams {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            lead_time_days: 14,
            review_days: 7,
            safety_factor: Decimal::new(15, 1),
            expiry_window_days: 60,
        }
    }
}

impl ForecastParams {
    /// Days of cover needed until the next delivery could arrive.
    pub fn cover_days(&self) -> u32 {
        self.lead_time_days + self.review_days
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockRisk {
    High,
    Medium,
    Low,
    Unknown,
}

/// Where the numbers of a [`ReorderSignal`] came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalSource {
    Heuristic,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderSignal {
    pub item_id: ItemId,
    pub location_id: Option<LocationId>,
    pub on_hand: Decimal,
    pub min_qty: Decimal,
    pub avg_daily_usage: Decimal,
    pub reorder_point: Decimal,
    pub suggested_reorder: Decimal,
    pub days_to_stockout: Option<i64>,
    pub risk: StockRisk,
    pub source: SignalSource,
}

/// Output of an external forecasting model for one item. Fields left `None`
/// fall back to the heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalForecast {
    pub avg_daily_usage: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
    pub suggested_reorder: Option<Decimal>,
    pub days_to_stockout: Option<i64>,
}

impl ExternalForecast {
    fn is_empty(&self) -> bool {
        self.avg_daily_usage.is_none()
            && self.reorder_point.is_none()
            && self.suggested_reorder.is_none()
            && self.days_to_stockout.is_none()
    }
}

/// Whether `m` is consumption of `item` inside `(as_of - lookback, as_of]`.
/// With a `scope`, only moves leaving that location count. Without one,
/// TRANSFER moves stay inside the hospital and are not consumption.
pub fn is_usage(
    m: &StockMove,
    item: ItemId,
    scope: Option<LocationId>,
    as_of: DateTime<Utc>,
    lookback_days: u32,
) -> bool {
    let window_start = as_of - Duration::days(i64::from(lookback_days));
    m.item_id == item
        && m.reason.is_usage()
        && (scope.is_some() || m.reason != MoveReason::Transfer)
        && m.from_location_id
            .is_some_and(|from| scope.is_none_or(|s| s == from))
        && m.occurred_at > window_start
        && m.occurred_at <= as_of
}

pub fn total_usage<'a>(
    moves: impl IntoIterator<Item = &'a StockMove>,
    item: ItemId,
    scope: Option<LocationId>,
    as_of: DateTime<Utc>,
    lookback_days: u32,
) -> Decimal {
    moves
        .into_iter()
        .filter(|m| is_usage(m, item, scope, as_of, lookback_days))
        .map(|m| m.quantity)
        .sum()
}

fn risk_for(
    avg_daily_usage: Decimal,
    days_to_stockout: Option<i64>,
    on_hand: Decimal,
    reorder_point: Decimal,
    cover_days: u32,
) -> StockRisk {
    if avg_daily_usage <= Decimal::ZERO && days_to_stockout.is_none() {
        return StockRisk::Unknown;
    }
    match days_to_stockout {
        Some(days) if days <= i64::from(cover_days) => StockRisk::High,
        _ if on_hand <= reorder_point => StockRisk::Medium,
        _ => StockRisk::Low,
    }
}

impl ReorderSignal {
    /// Heuristic signal from total usage over the lookback window.
    pub fn compute(
        item_id: ItemId,
        location_id: Option<LocationId>,
        on_hand: Decimal,
        total_usage: Decimal,
        min_qty: Decimal,
        params: &ForecastParams,
    ) -> Self {
        // Divide last: the average is rounded and only reported.
        let lookback = Decimal::from(params.lookback_days);
        let (avg_daily_usage, demand) = if params.lookback_days == 0 {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            (
                total_usage / lookback,
                total_usage * Decimal::from(params.cover_days()) * params.safety_factor / lookback,
            )
        };
        let reorder_point = min_qty.max(demand);
        let suggested_reorder = ceil_whole((reorder_point - on_hand).max(Decimal::ZERO));
        let days_to_stockout = if avg_daily_usage > Decimal::ZERO {
            (on_hand * lookback / total_usage).floor().to_i64()
        } else {
            None
        };

        Self {
            item_id,
            location_id,
            on_hand,
            min_qty,
            avg_daily_usage,
            reorder_point,
            suggested_reorder,
            days_to_stockout,
            risk: risk_for(
                avg_daily_usage,
                days_to_stockout,
                on_hand,
                reorder_point,
                params.cover_days(),
            ),
            source: SignalSource::Heuristic,
        }
    }

    /// Replace the fields the model supplied and re-derive the risk.
    pub fn with_override(mut self, forecast: &ExternalForecast, params: &ForecastParams) -> Self {
        if forecast.is_empty() {
            return self;
        }
        if let Some(v) = forecast.avg_daily_usage {
            self.avg_daily_usage = v;
        }
        if let Some(v) = forecast.reorder_point {
            self.reorder_point = v;
        }
        if let Some(v) = forecast.suggested_reorder {
            self.suggested_reorder = v;
        }
        if forecast.days_to_stockout.is_some() {
            self.days_to_stockout = forecast.days_to_stockout;
        }
        self.risk = risk_for(
            self.avg_daily_usage,
            self.days_to_stockout,
            self.on_hand,
            self.reorder_point,
            params.cover_days(),
        );
        self.source = SignalSource::External;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryBand {
    Expired,
    Critical,
    Soon,
    Upcoming,
}

impl ExpiryBand {
    pub fn from_days(days_until_expiry: i64) -> Self {
        match days_until_expiry {
            d if d < 0 => ExpiryBand::Expired,
            d if d <= 7 => ExpiryBand::Critical,
            d if d <= 14 => ExpiryBand::Soon,
            _ => ExpiryBand::Upcoming,
        }
    }

    /// Bands that warrant a notification.
    pub fn is_alerting(self) -> bool {
        self != ExpiryBand::Upcoming
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirySignal {
    pub batch_id: BatchId,
    pub item_id: ItemId,
    pub location_id: Option<LocationId>,
    pub lot_no: Option<String>,
    pub expiry_date: NaiveDate,
    pub days_until_expiry: i64,
    pub qty_on_hand: Decimal,
    pub band: ExpiryBand,
}

/// Batches holding stock whose expiry falls within `window_days` of `today`
/// (past-due included), soonest first.
pub fn expiry_signals<'a>(
    batches: impl IntoIterator<Item = &'a Batch>,
    today: NaiveDate,
    window_days: u32,
) -> Vec<ExpirySignal> {
    let mut out: Vec<(u64, ExpirySignal)> = batches
        .into_iter()
        .filter(|b| b.qty_on_hand > Decimal::ZERO && b.status != BatchStatus::Disposed)
        .filter_map(|b| {
            let expiry_date = b.expiry_date?;
            let days = (expiry_date - today).num_days();
            (days <= i64::from(window_days)).then(|| {
                (
                    b.received_seq,
                    ExpirySignal {
                        batch_id: b.id,
                        item_id: b.item_id,
                        location_id: b.location_id,
                        lot_no: b.lot_no.clone(),
                        expiry_date,
                        days_until_expiry: days,
                        qty_on_hand: b.qty_on_hand,
                        band: ExpiryBand::from_days(days),
                    },
                )
            })
        })
        .collect();
    out.sort_by(|(sa, a), (sb, b)| a.expiry_date.cmp(&b.expiry_date).then(sa.cmp(sb)));
    out.into_iter().map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock_move::{EventId, MoveReason, NewStockMove};
    use medstock_core::StockMoveId;
    use rust_decimal_macros::dec;

    #[test]
    fn worked_reorder_example() {
        // avg usage 5/day over 30 days, min 20, on hand 60.
        let params = ForecastParams::default();
        let s = ReorderSignal::compute(ItemId::new(), None, dec!(60), dec!(150), dec!(20), &params);

        assert_eq!(s.avg_daily_usage, dec!(5));
        assert_eq!(s.reorder_point, dec!(157.5));
        assert_eq!(s.suggested_reorder, dec!(98));
        assert_eq!(s.days_to_stockout, Some(12));
        assert_eq!(s.risk, StockRisk::High);
        assert_eq!(s.source, SignalSource::Heuristic);
    }

    #[test]
    fn reorder_math_is_exact_for_non_terminating_averages() {
        // 20 over 30 days is 0.666.../day; demand is 20 * 21 * 1.5 / 30 = 21.
        let params = ForecastParams::default();
        let s = ReorderSignal::compute(ItemId::new(), None, dec!(2), dec!(20), dec!(0), &params);
        assert_eq!(s.reorder_point, dec!(21));
        assert_eq!(s.suggested_reorder, dec!(19));
        assert_eq!(s.days_to_stockout, Some(3));
        assert_eq!(s.risk, StockRisk::High);
    }

    #[test]
    fn no_usage_means_unknown_risk() {
        let params = ForecastParams::default();
        let s = ReorderSignal::compute(ItemId::new(), None, dec!(5), dec!(0), dec!(20), &params);
        assert_eq!(s.reorder_point, dec!(20));
        assert_eq!(s.suggested_reorder, dec!(15));
        assert_eq!(s.days_to_stockout, None);
        assert_eq!(s.risk, StockRisk::Unknown);
    }

    #[test]
    fn medium_and_low_risk() {
        let params = ForecastParams::default();
        // 1/day: rp = max(0, 31.5); 30 on hand lasts 30 days > 21.
        let medium = ReorderSignal::compute(ItemId::new(), None, dec!(30), dec!(30), dec!(0), &params);
        assert_eq!(medium.risk, StockRisk::Medium);

        let low = ReorderSignal::compute(ItemId::new(), None, dec!(100), dec!(30), dec!(0), &params);
        assert_eq!(low.risk, StockRisk::Low);
        assert_eq!(low.suggested_reorder, dec!(0));
    }

    #[test]
    fn external_override_replaces_only_supplied_fields() {
        let params = ForecastParams::default();
        let base = ReorderSignal::compute(ItemId::new(), None, dec!(60), dec!(150), dec!(20), &params);
        let forecast = ExternalForecast {
            days_to_stockout: Some(40),
            reorder_point: Some(dec!(50)),
            ..ExternalForecast::default()
        };
        let s = base.clone().with_override(&forecast, &params);

        assert_eq!(s.source, SignalSource::External);
        assert_eq!(s.avg_daily_usage, base.avg_daily_usage);
        assert_eq!(s.suggested_reorder, base.suggested_reorder);
        assert_eq!(s.days_to_stockout, Some(40));
        assert_eq!(s.risk, StockRisk::Low);

        let untouched = base.clone().with_override(&ExternalForecast::default(), &params);
        assert_eq!(untouched, base);
    }

    #[test]
    fn usage_window_and_direction() {
        let item = ItemId::new();
        let (a, b) = (LocationId::new(), LocationId::new());
        let as_of = Utc::now();
        let mv = |reason, qty, days_ago: i64, from: Option<LocationId>, to: Option<LocationId>| {
            let mut m = NewStockMove::new(item, qty, reason, EventId::new("e").unwrap())
                .occurred_at(as_of - Duration::days(days_ago));
            m.from_location_id = from;
            m.to_location_id = to;
            m.into_move(StockMoveId::new(), 0, as_of)
        };
        let moves = vec![
            mv(MoveReason::Issue, dec!(10), 1, Some(a), None),
            mv(MoveReason::Transfer, dec!(5), 2, Some(a), Some(b)),
            mv(MoveReason::Receipt, dec!(100), 3, None, Some(a)),
            mv(MoveReason::Adjustment, dec!(3), 4, None, Some(a)),
            mv(MoveReason::Issue, dec!(50), 31, Some(a), None),
            mv(MoveReason::Disposal, dec!(2), 5, Some(b), None),
        ];

        // The A -> B transfer is internal when looking hospital-wide.
        assert_eq!(total_usage(&moves, item, None, as_of, 30), dec!(12));
        assert_eq!(total_usage(&moves, item, Some(a), as_of, 30), dec!(15));
        assert_eq!(total_usage(&moves, item, Some(b), as_of, 30), dec!(2));
    }

    #[test]
    fn expiry_bands_and_window() {
        assert_eq!(ExpiryBand::from_days(-1), ExpiryBand::Expired);
        assert_eq!(ExpiryBand::from_days(0), ExpiryBand::Critical);
        assert_eq!(ExpiryBand::from_days(7), ExpiryBand::Critical);
        assert_eq!(ExpiryBand::from_days(14), ExpiryBand::Soon);
        assert_eq!(ExpiryBand::from_days(15), ExpiryBand::Upcoming);

        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let batch = |days: i64, qty: Decimal, status| Batch {
            id: BatchId::new(),
            item_id: ItemId::new(),
            location_id: None,
            lot_no: None,
            expiry_date: Some(today + Duration::days(days)),
            qty_on_hand: qty,
            status,
            received_seq: 0,
            received_at: Utc::now(),
            disposed_at: None,
        };
        let batches = vec![
            batch(30, dec!(1), BatchStatus::Active),
            batch(-3, dec!(1), BatchStatus::Expired),
            batch(90, dec!(1), BatchStatus::Active),
            batch(5, dec!(0), BatchStatus::Active),
            batch(2, dec!(4), BatchStatus::Quarantined),
        ];
        let signals = expiry_signals(&batches, today, 60);
        let bands: Vec<ExpiryBand> = signals.iter().map(|s| s.band).collect();
        assert_eq!(
            bands,
            vec![ExpiryBand::Expired, ExpiryBand::Critical, ExpiryBand::Upcoming]
        );
    }
}
