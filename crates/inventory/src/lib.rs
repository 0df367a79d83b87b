//! Inventory stock ledger domain.
//!
//! This crate contains the business rules of the stock engine, implemented
//! purely as deterministic domain logic (no IO, no storage, no clocks). The
//! infrastructure layer feeds it state read inside a unit of work and persists
//! whatever it decides.

pub mod batch;
pub mod catalog;
pub mod count;
pub mod disposal;
pub mod fefo;
pub mod notification;
pub mod signals;
pub mod stock_move;
pub mod transfer;
pub mod workflow;

pub use batch::{Batch, BatchStatus};
pub use catalog::{Item, ItemSpec, Location, LocationKind, LocationSpec, Threshold};
pub use count::{
    AdjustmentDirection, CountLine, CountSession, CountStatus, NewCountLine, NewCountSession,
    PlannedAdjustment,
};
pub use disposal::{DisposalApproval, DisposalRequest, NewDisposal};
pub use fefo::{Allocation, allocate, fefo_order, write_down};
pub use notification::{Notification, NotificationKind};
pub use signals::{
    ExpiryBand, ExpirySignal, ExternalForecast, ForecastParams, ReorderSignal, SignalSource,
    StockRisk,
};
pub use stock_move::{BatchEffect, EventId, GoodsReceived, MoveReason, NewStockMove, StockMove};
pub use transfer::{NewTransfer, Transfer, TransferLine};
pub use workflow::{Decision, ReviewStatus};
