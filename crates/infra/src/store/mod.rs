//! Persistence boundary of the stock engine.
//!
//! Every mutating operation runs as exactly one [`UnitOfWork::run_atomically`]
//! call: the closure receives a [`LedgerTx`] handle, and either everything it
//! did becomes visible at once (closure returned `Ok`) or nothing does.
//!
//! Readers go through [`UnitOfWork::read`] and only ever see committed state.

pub mod in_memory;
pub mod state;

pub use in_memory::InMemoryLedgerStore;
pub use state::LedgerState;

use std::sync::Arc;

use rust_decimal::Decimal;

use medstock_core::{
    BatchId, CountSessionId, DisposalId, DomainResult, ItemId, LocationId, NotificationId,
    TransferId,
};
use medstock_inventory::{
    Batch, CountSession, DisposalRequest, EventId, Item, Location, Notification, StockMove,
    Threshold, Transfer,
};

/// Access to ledger state inside one unit of work.
///
/// Reads return owned values so implementations are free to materialize rows
/// from any backend.
pub trait LedgerTx {
    // catalog
    fn item(&self, id: ItemId) -> Option<Item>;
    fn item_by_sku(&self, sku: &str) -> Option<Item>;
    fn items(&self) -> Vec<Item>;
    fn put_item(&mut self, item: Item);

    fn location(&self, id: LocationId) -> Option<Location>;
    fn location_by_code(&self, code: &str) -> Option<Location>;
    fn locations(&self) -> Vec<Location>;
    fn put_location(&mut self, location: Location);

    /// Exact match on `(item, location)`; `None` location is the item-wide row.
    fn threshold(&self, item: ItemId, location: Option<LocationId>) -> Option<Threshold>;
    fn put_threshold(&mut self, threshold: Threshold);

    // batch registry
    fn batch(&self, id: BatchId) -> Option<Batch>;
    fn batches_for_item(&self, item: ItemId) -> Vec<Batch>;
    fn batches(&self) -> Vec<Batch>;
    fn insert_batch(&mut self, batch: Batch) -> DomainResult<()>;
    /// Persist a status change. The remaining quantity of the stored row is
    /// kept; only the recorder changes it.
    fn update_batch_status(&mut self, batch: &Batch) -> DomainResult<()>;
    fn next_batch_seq(&mut self) -> u64;

    /// Conditional decrement: succeeds only when the batch still holds at
    /// least `qty` (`UPDATE .. SET qty = qty - $1 WHERE qty >= $1`).
    fn decrement_batch(&mut self, id: BatchId, qty: Decimal) -> DomainResult<Batch>;
    fn increment_batch(&mut self, id: BatchId, qty: Decimal) -> DomainResult<Batch>;

    // ledger
    fn move_by_event_id(&self, event_id: &EventId) -> Option<StockMove>;
    /// Append a row, assigning its `recorded_seq`. Fails with a conflict if
    /// the event id already exists.
    fn append_move(&mut self, entry: StockMove) -> DomainResult<StockMove>;
    fn moves(&self) -> Vec<StockMove>;
    fn moves_for_item(&self, item: ItemId) -> Vec<StockMove>;
    /// Current on-hand of `item` at `location` as derived from the ledger.
    fn on_hand(&self, item: ItemId, location: LocationId) -> Decimal;

    // workflows
    fn transfer(&self, id: TransferId) -> Option<Transfer>;
    fn transfer_by_no(&self, transfer_no: &str) -> Option<Transfer>;
    fn transfers(&self) -> Vec<Transfer>;
    fn put_transfer(&mut self, transfer: Transfer);

    fn disposal(&self, id: DisposalId) -> Option<DisposalRequest>;
    fn disposals(&self) -> Vec<DisposalRequest>;
    fn put_disposal(&mut self, disposal: DisposalRequest);

    fn count_session(&self, id: CountSessionId) -> Option<CountSession>;
    fn count_session_by_no(&self, session_no: &str) -> Option<CountSession>;
    fn put_count_session(&mut self, session: CountSession);

    fn notification(&self, id: NotificationId) -> Option<Notification>;
    fn notifications(&self) -> Vec<Notification>;
    fn put_notification(&mut self, notification: Notification);
}

/// Transaction runner.
pub trait UnitOfWork: Send + Sync {
    type Tx: LedgerTx;

    /// Run `f` atomically and in isolation from every other unit of work.
    /// `op` names the operation in logs when the unit is rolled back.
    fn run_atomically<T, F>(&self, op: &'static str, f: F) -> DomainResult<T>
    where
        F: FnOnce(&mut Self::Tx) -> DomainResult<T>;

    /// Run `f` against committed state.
    fn read<T, F>(&self, f: F) -> DomainResult<T>
    where
        F: FnOnce(&Self::Tx) -> T;
}

impl<U> UnitOfWork for Arc<U>
where
    U: UnitOfWork,
{
    type Tx = U::Tx;

    fn run_atomically<T, F>(&self, op: &'static str, f: F) -> DomainResult<T>
    where
        F: FnOnce(&mut Self::Tx) -> DomainResult<T>,
    {
        (**self).run_atomically(op, f)
    }

    fn read<T, F>(&self, f: F) -> DomainResult<T>
    where
        F: FnOnce(&Self::Tx) -> T,
    {
        (**self).read(f)
    }
}
