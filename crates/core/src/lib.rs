//! `medstock-core`: building blocks shared by every layer of the stock engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! typed identifiers, the error taxonomy and decimal quantity helpers.

pub mod error;
pub mod id;
pub mod quantity;

pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{
    BatchId, CountSessionId, DisposalId, ItemId, LocationId, NotificationId, StockMoveId,
    TransferId, UserId,
};
pub use quantity::{ceil_whole, ensure_non_negative, ensure_positive, quantity_from_f64};
