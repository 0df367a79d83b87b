//! Plain-data ledger state.
//!
//! `LedgerState` is both the in-memory transaction handle and the on-disk
//! snapshot format read by the `ledger-audit` binary. The lookup indexes are
//! not serialized; [`LedgerState::reindex`] rebuilds them from the rows.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{
    BatchId, CountSessionId, DisposalId, DomainError, DomainResult, ItemId, LocationId,
    NotificationId, TransferId,
};
use medstock_inventory::{
    Batch, CountSession, DisposalRequest, EventId, Item, Location, Notification, StockMove,
    Threshold, Transfer,
};

use super::LedgerTx;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    items: BTreeMap<ItemId, Item>,
    locations: BTreeMap<LocationId, Location>,
    thresholds: Vec<Threshold>,
    batches: BTreeMap<BatchId, Batch>,
    moves: Vec<StockMove>,
    transfers: BTreeMap<TransferId, Transfer>,
    disposals: BTreeMap<DisposalId, DisposalRequest>,
    count_sessions: BTreeMap<CountSessionId, CountSession>,
    notifications: BTreeMap<NotificationId, Notification>,
    batch_seq: u64,

    #[serde(skip)]
    event_index: HashMap<EventId, usize>,
    #[serde(skip)]
    levels: HashMap<(ItemId, LocationId), Decimal>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON snapshot and rebuild its indexes.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut state: LedgerState = serde_json::from_str(json)?;
        state.reindex();
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn reindex(&mut self) {
        self.event_index.clear();
        self.levels.clear();
        for pos in 0..self.moves.len() {
            let entry = self.moves[pos].clone();
            self.index_move(&entry, pos);
        }
    }

    fn index_move(&mut self, entry: &StockMove, pos: usize) {
        self.event_index.insert(entry.event_id.clone(), pos);
        if let Some(to) = entry.to_location_id {
            *self.levels.entry((entry.item_id, to)).or_default() += entry.quantity;
        }
        if let Some(from) = entry.from_location_id {
            *self.levels.entry((entry.item_id, from)).or_default() -= entry.quantity;
        }
    }

    fn batch_mut(&mut self, id: BatchId) -> DomainResult<&mut Batch> {
        self.batches
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("batch", id))
    }
}

impl LedgerTx for LedgerState {
    fn item(&self, id: ItemId) -> Option<Item> {
        self.items.get(&id).cloned()
    }

    fn item_by_sku(&self, sku: &str) -> Option<Item> {
        let sku = sku.trim();
        self.items.values().find(|i| i.sku == sku).cloned()
    }

    fn items(&self) -> Vec<Item> {
        self.items.values().cloned().collect()
    }

    fn put_item(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    fn location(&self, id: LocationId) -> Option<Location> {
        self.locations.get(&id).cloned()
    }

    fn location_by_code(&self, code: &str) -> Option<Location> {
        let code = code.trim();
        self.locations.values().find(|l| l.code == code).cloned()
    }

    fn locations(&self) -> Vec<Location> {
        self.locations.values().cloned().collect()
    }

    fn put_location(&mut self, location: Location) {
        self.locations.insert(location.id, location);
    }

    fn threshold(&self, item: ItemId, location: Option<LocationId>) -> Option<Threshold> {
        self.thresholds
            .iter()
            .find(|t| t.item_id == item && t.location_id == location)
            .cloned()
    }

    fn put_threshold(&mut self, threshold: Threshold) {
        match self
            .thresholds
            .iter_mut()
            .find(|t| t.item_id == threshold.item_id && t.location_id == threshold.location_id)
        {
            Some(existing) => *existing = threshold,
            None => self.thresholds.push(threshold),
        }
    }

    fn batch(&self, id: BatchId) -> Option<Batch> {
        self.batches.get(&id).cloned()
    }

    fn batches_for_item(&self, item: ItemId) -> Vec<Batch> {
        self.batches
            .values()
            .filter(|b| b.item_id == item)
            .cloned()
            .collect()
    }

    fn batches(&self) -> Vec<Batch> {
        self.batches.values().cloned().collect()
    }

    fn insert_batch(&mut self, batch: Batch) -> DomainResult<()> {
        if self.batches.contains_key(&batch.id) {
            return Err(DomainError::conflict(format!("batch {} already exists", batch.id)));
        }
        self.batches.insert(batch.id, batch);
        Ok(())
    }

    fn update_batch_status(&mut self, batch: &Batch) -> DomainResult<()> {
        let stored = self.batch_mut(batch.id)?;
        stored.status = batch.status;
        stored.disposed_at = batch.disposed_at;
        Ok(())
    }

    fn next_batch_seq(&mut self) -> u64 {
        self.batch_seq += 1;
        self.batch_seq
    }

    fn decrement_batch(&mut self, id: BatchId, qty: Decimal) -> DomainResult<Batch> {
        let batch = self.batch_mut(id)?;
        if batch.qty_on_hand < qty {
            return Err(DomainError::insufficient_stock(qty, batch.qty_on_hand));
        }
        batch.qty_on_hand -= qty;
        Ok(batch.clone())
    }

    fn increment_batch(&mut self, id: BatchId, qty: Decimal) -> DomainResult<Batch> {
        let batch = self.batch_mut(id)?;
        batch.qty_on_hand += qty;
        Ok(batch.clone())
    }

    fn move_by_event_id(&self, event_id: &EventId) -> Option<StockMove> {
        self.event_index
            .get(event_id)
            .and_then(|pos| self.moves.get(*pos))
            .cloned()
    }

    fn append_move(&mut self, mut entry: StockMove) -> DomainResult<StockMove> {
        if self.event_index.contains_key(&entry.event_id) {
            return Err(DomainError::conflict(format!(
                "eventId {} already recorded",
                entry.event_id
            )));
        }
        let pos = self.moves.len();
        entry.recorded_seq = pos as u64 + 1;
        self.index_move(&entry, pos);
        self.moves.push(entry.clone());
        Ok(entry)
    }

    fn moves(&self) -> Vec<StockMove> {
        self.moves.clone()
    }

    fn moves_for_item(&self, item: ItemId) -> Vec<StockMove> {
        self.moves
            .iter()
            .filter(|m| m.item_id == item)
            .cloned()
            .collect()
    }

    fn on_hand(&self, item: ItemId, location: LocationId) -> Decimal {
        self.levels
            .get(&(item, location))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn transfer(&self, id: TransferId) -> Option<Transfer> {
        self.transfers.get(&id).cloned()
    }

    fn transfer_by_no(&self, transfer_no: &str) -> Option<Transfer> {
        let transfer_no = transfer_no.trim();
        self.transfers
            .values()
            .find(|t| t.transfer_no == transfer_no)
            .cloned()
    }

    fn transfers(&self) -> Vec<Transfer> {
        self.transfers.values().cloned().collect()
    }

    fn put_transfer(&mut self, transfer: Transfer) {
        self.transfers.insert(transfer.id, transfer);
    }

    fn disposal(&self, id: DisposalId) -> Option<DisposalRequest> {
        self.disposals.get(&id).cloned()
    }

    fn disposals(&self) -> Vec<DisposalRequest> {
        self.disposals.values().cloned().collect()
    }

    fn put_disposal(&mut self, disposal: DisposalRequest) {
        self.disposals.insert(disposal.id, disposal);
    }

    fn count_session(&self, id: CountSessionId) -> Option<CountSession> {
        self.count_sessions.get(&id).cloned()
    }

    fn count_session_by_no(&self, session_no: &str) -> Option<CountSession> {
        let session_no = session_no.trim();
        self.count_sessions
            .values()
            .find(|s| s.session_no == session_no)
            .cloned()
    }

    fn put_count_session(&mut self, session: CountSession) {
        self.count_sessions.insert(session.id, session);
    }

    fn notification(&self, id: NotificationId) -> Option<Notification> {
        self.notifications.get(&id).cloned()
    }

    fn notifications(&self) -> Vec<Notification> {
        self.notifications.values().cloned().collect()
    }

    fn put_notification(&mut self, notification: Notification) {
        self.notifications.insert(notification.id, notification);
    }
}
