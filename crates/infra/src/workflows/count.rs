use chrono::Utc;
use tracing::{info, instrument};

use medstock_auth::{Actor, Capability, require};
use medstock_core::{CountSessionId, DomainError, DomainResult};
use medstock_inventory::{
    AdjustmentDirection, CountSession, EventId, MoveReason, NewCountSession, NewStockMove,
    StockMove,
};

use crate::allocator::{PlanMoves, record_plan_in, write_down_plan_in};
use crate::recorder::record_in;
use crate::store::{LedgerTx, UnitOfWork};

/// A posted session and the adjusting moves its post produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedCount {
    pub session: CountSession,
    pub moves: Vec<StockMove>,
}

/// Counted-vs-system reconciliation for one location at a time.
#[derive(Debug, Clone)]
pub struct CountReconciler<U> {
    uow: U,
}

impl<U: UnitOfWork> CountReconciler<U> {
    pub fn new(uow: U) -> Self {
        Self { uow }
    }

    /// Open a session. Lines without a system quantity take it from the
    /// ledger (or from the named batch) at this moment.
    #[instrument(skip(self, actor, request), fields(session_no = %request.session_no, user_id = %actor.user_id()))]
    pub fn create_session(&self, actor: &Actor, request: NewCountSession) -> DomainResult<CountSession> {
        require(actor, Capability::CountStock)?;
        request.validate()?;

        self.uow.run_atomically("create_count_session", |tx| {
            let location = request.location_id;
            if tx.location(location).is_none() {
                return Err(DomainError::not_found("location", location));
            }
            if tx.count_session_by_no(&request.session_no).is_some() {
                return Err(DomainError::conflict(format!(
                    "sessionNo {} already exists",
                    request.session_no.trim()
                )));
            }

            let mut lines = Vec::with_capacity(request.lines.len());
            for line in request.lines {
                if tx.item(line.item_id).is_none() {
                    return Err(DomainError::not_found("item", line.item_id));
                }
                let ledger_qty = match line.batch_id {
                    Some(batch_id) => {
                        let batch = tx
                            .batch(batch_id)
                            .ok_or_else(|| DomainError::not_found("batch", batch_id))?;
                        if batch.item_id != line.item_id {
                            return Err(DomainError::validation(format!(
                                "batch {batch_id} does not hold item {}",
                                line.item_id
                            )));
                        }
                        if batch.location_id.is_some_and(|home| home != location) {
                            return Err(DomainError::validation(format!(
                                "batch {batch_id} is not held at the counted location"
                            )));
                        }
                        batch.qty_on_hand
                    }
                    None => tx.on_hand(line.item_id, location),
                };
                lines.push(line.resolve(ledger_qty)?);
            }

            let session = CountSession::open(
                CountSessionId::new(),
                request.session_no,
                location,
                request.notes,
                lines,
                actor.user_id(),
                Utc::now(),
            );
            tx.put_count_session(session.clone());
            info!(session_id = %session.id, lines = session.lines.len(), "count session opened");
            Ok(session)
        })
    }

    /// Emit the ADJUSTMENT moves for every non-zero variance and flip to
    /// POSTED, once.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id()))]
    pub fn post(&self, actor: &Actor, session_no: &str) -> DomainResult<PostedCount> {
        require(actor, Capability::CountStock)?;

        self.uow.run_atomically("post_count_session", |tx| {
            let mut session = tx
                .count_session_by_no(session_no)
                .ok_or_else(|| DomainError::not_found("count session", session_no))?;
            let now = Utc::now();
            session.mark_posted(actor.user_id(), now)?;

            let mut moves = Vec::new();
            for adj in session.planned_adjustments() {
                let key = session.line_event_key(adj.line_index);
                // A shortfall on an unbatched line is written off loose stock
                // first, then the location's batches FEFO.
                if adj.direction == AdjustmentDirection::Outbound && adj.batch_id.is_none() {
                    let plan = write_down_plan_in(tx, adj.item_id, session.location_id, adj.quantity)?;
                    let spec = PlanMoves {
                        reason: MoveReason::Adjustment,
                        to_location_id: None,
                        ref_type: "COUNT_SESSION",
                        ref_id: session.id.to_string(),
                        event_prefix: key,
                    };
                    moves.extend(record_plan_in(tx, &plan, &spec, now)?);
                    continue;
                }

                let mut req = NewStockMove::new(
                    adj.item_id,
                    adj.quantity,
                    MoveReason::Adjustment,
                    EventId::new(key)?,
                )
                .reference("COUNT_SESSION", session.id);
                req = match adj.direction {
                    AdjustmentDirection::Outbound => req.from(session.location_id),
                    AdjustmentDirection::Inbound => req.to(session.location_id),
                };
                req.batch_id = adj.batch_id;
                moves.push(record_in(tx, req, now)?.into_move());
            }

            tx.put_count_session(session.clone());
            info!(session_id = %session.id, adjustments = moves.len(), "count session posted");
            Ok(PostedCount { session, moves })
        })
    }

    pub fn get(&self, session_no: &str) -> DomainResult<CountSession> {
        self.uow
            .read(|tx| tx.count_session_by_no(session_no))?
            .ok_or_else(|| DomainError::not_found("count session", session_no))
    }
}
