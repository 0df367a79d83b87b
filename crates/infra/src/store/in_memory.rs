use std::sync::RwLock;

use tracing::{error, warn};

use medstock_core::{DomainError, DomainResult, ErrorKind};

use super::{LedgerState, UnitOfWork};

/// In-memory ledger store.
///
/// A unit of work takes the write lock, runs against a private copy of the
/// committed state and swaps the copy in only on success. Writers are
/// therefore fully serialized and readers never observe a partial unit.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously captured snapshot.
    pub fn from_snapshot(mut state: LedgerState) -> Self {
        state.reindex();
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> DomainResult<LedgerState> {
        self.read(LedgerState::clone)
    }
}

fn poisoned() -> DomainError {
    error!("ledger store lock poisoned");
    DomainError::internal("lock poisoned")
}

impl UnitOfWork for InMemoryLedgerStore {
    type Tx = LedgerState;

    fn run_atomically<T, F>(&self, op: &'static str, f: F) -> DomainResult<T>
    where
        F: FnOnce(&mut Self::Tx) -> DomainResult<T>,
    {
        let mut committed = self.state.write().map_err(|_| poisoned())?;
        let mut working = committed.clone();
        match f(&mut working) {
            Ok(value) => {
                *committed = working;
                Ok(value)
            }
            Err(err) => {
                if err.kind() == ErrorKind::Internal {
                    error!(op, error = %err, "unit of work failed; rolled back");
                } else {
                    warn!(op, error = %err, "unit of work rolled back");
                }
                Err(err)
            }
        }
    }

    fn read<T, F>(&self, f: F) -> DomainResult<T>
    where
        F: FnOnce(&Self::Tx) -> T,
    {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(f(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerTx;
    use chrono::Utc;
    use medstock_core::{ItemId, LocationId, StockMoveId};
    use medstock_inventory::{EventId, MoveReason, NewStockMove};
    use rust_decimal_macros::dec;

    #[test]
    fn failed_unit_leaves_no_trace() {
        let store = InMemoryLedgerStore::new();
        let (item, loc) = (ItemId::new(), LocationId::new());

        let result: DomainResult<()> = store.run_atomically("test", |tx| {
            let entry = NewStockMove::new(item, dec!(5), MoveReason::Receipt, EventId::new("rx").unwrap())
                .to(loc)
                .into_move(StockMoveId::new(), 0, Utc::now());
            tx.append_move(entry)?;
            Err(DomainError::conflict("abort"))
        });
        assert!(result.is_err());

        let (moves, on_hand) = store
            .read(|tx| (tx.moves().len(), tx.on_hand(item, loc)))
            .unwrap();
        assert_eq!(moves, 0);
        assert_eq!(on_hand, dec!(0));
    }
}
