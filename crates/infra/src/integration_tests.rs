//! End-to-end tests of the stock engine over the in-memory store.
//!
//! Verifies:
//! - FEFO consumption through transfer approval and ward issues
//! - single-shot workflow transitions under retries and concurrency
//! - all-or-nothing units of work
//! - ledger / batch reconciliation after mixed workloads

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use medstock_auth::{Actor, Role};
    use medstock_core::{DomainError, ErrorKind, ItemId, LocationId, UserId};
    use medstock_inventory::{
        Batch, BatchStatus, CountStatus, DisposalApproval, EventId, ExternalForecast, GoodsReceived,
        ItemSpec, LocationKind, LocationSpec, MoveReason, NewCountLine, NewCountSession,
        NewDisposal, NewStockMove, NewTransfer, NotificationKind, ReviewStatus, SignalSource,
        StockRisk, TransferLine,
    };

    use crate::config::EngineConfig;
    use crate::engine::StockEngine;
    use crate::store::{InMemoryLedgerStore, LedgerTx, UnitOfWork};

    type Engine = StockEngine<Arc<InMemoryLedgerStore>>;

    struct Fixture {
        engine: Engine,
        store: Arc<InMemoryLedgerStore>,
        admin: Actor,
        manager: Actor,
        staff: Actor,
        main: LocationId,
        ward: LocationId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let engine = StockEngine::new(store.clone(), EngineConfig::default());
        let admin = engine.actor(UserId::new(), &[Role::new(Role::ADMIN)]);
        let manager = engine.actor(UserId::new(), &[Role::new(Role::MANAGER)]);
        let staff = engine.actor(UserId::new(), &[Role::new(Role::STAFF)]);

        let location = |code: &str, kind| {
            engine
                .catalog()
                .create_or_update_location_by_code(
                    &admin,
                    LocationSpec {
                        code: code.to_string(),
                        name: code.to_string(),
                        kind,
                    },
                )
                .unwrap()
                .into_inner()
                .id
        };
        let main = location("MAIN-STORE", LocationKind::Warehouse);
        let ward = location("WARD-3", LocationKind::Ward);

        Fixture {
            engine,
            store,
            admin,
            manager,
            staff,
            main,
            ward,
        }
    }

    impl Fixture {
        fn item(&self, sku: &str, min_qty: Decimal) -> ItemId {
            self.engine
                .catalog()
                .create_or_update_item_by_sku(
                    &self.admin,
                    ItemSpec {
                        sku: sku.to_string(),
                        name: sku.to_string(),
                        unit_of_measure: "unit".to_string(),
                        min_qty,
                        active: true,
                    },
                )
                .unwrap()
                .into_inner()
                .id
        }

        fn receive(
            &self,
            item: ItemId,
            location: LocationId,
            qty: Decimal,
            expiry: Option<NaiveDate>,
            key: &str,
        ) -> Batch {
            self.engine
                .recorder()
                .receive_goods(GoodsReceived {
                    item_id: item,
                    batch_id: None,
                    lot_no: Some(format!("LOT-{key}")),
                    expiry_date: expiry,
                    quantity: qty,
                    location_id: location,
                    event_id: EventId::new(key).unwrap(),
                    occurred_at: None,
                })
                .unwrap()
                .batch
        }

        fn batch_qty(&self, batch: &Batch) -> Decimal {
            self.engine.batches().get(batch.id).unwrap().qty_on_hand
        }

        fn on_hand(&self, item: ItemId, location: LocationId) -> Decimal {
            self.store.read(|tx| tx.on_hand(item, location)).unwrap()
        }

        fn move_count(&self) -> usize {
            self.store.read(|tx| tx.moves().len()).unwrap()
        }

        fn transfer(&self, no: &str, lines: Vec<TransferLine>) -> NewTransfer {
            NewTransfer {
                transfer_no: no.to_string(),
                from_location_id: self.main,
                to_location_id: self.ward,
                lines,
                notes: None,
            }
        }

        fn assert_reconciled(&self) {
            let report = self.engine.audit().run().unwrap();
            assert!(report.is_clean(), "audit found discrepancies: {report:?}");
        }
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn transfer_approval_consumes_earliest_expiry_first() {
        let f = fixture();
        let x = f.item("ITEM-X", dec!(0));
        // Later expiry is received first so registration order cannot explain the result.
        let b = f.receive(x, f.main, dec!(100), date(2024, 6, 1), "rx-b");
        let a = f.receive(x, f.main, dec!(50), date(2024, 1, 1), "rx-a");

        let transfer = f
            .engine
            .transfers()
            .create(&f.staff, f.transfer("TR-1", vec![TransferLine::new(x, dec!(80))]))
            .unwrap();
        assert_eq!(f.on_hand(x, f.main), dec!(150));

        let approved = f.engine.transfers().approve(&f.manager, transfer.id).unwrap();
        assert_eq!(approved.status, ReviewStatus::Approved);
        assert_eq!(approved.reviewed_by, Some(f.manager.user_id()));

        assert_eq!(f.batch_qty(&a), dec!(0));
        assert_eq!(f.batch_qty(&b), dec!(70));

        let moves: Vec<_> = f
            .store
            .read(|tx| tx.moves())
            .unwrap()
            .into_iter()
            .filter(|m| m.reason == MoveReason::Transfer)
            .collect();
        assert_eq!(moves.len(), 2);
        assert_eq!((moves[0].batch_id, moves[0].quantity), (Some(a.id), dec!(50)));
        assert_eq!((moves[1].batch_id, moves[1].quantity), (Some(b.id), dec!(30)));
        assert!(moves.iter().all(|m| m.to_location_id == Some(f.ward)));
        assert!(moves.iter().all(|m| m.ref_id == Some(transfer.id.to_string())));

        assert_eq!(f.on_hand(x, f.main), dec!(70));
        assert_eq!(f.on_hand(x, f.ward), dec!(80));
        f.assert_reconciled();
    }

    #[test]
    fn disposal_approval_fails_when_batch_shrank_below_request() {
        let f = fixture();
        let y = f.item("ITEM-Y", dec!(0));
        let c = f.receive(y, f.main, dec!(20), date(2024, 3, 1), "rx-c");

        let disposal = f
            .engine
            .disposals()
            .create(
                &f.staff,
                NewDisposal {
                    batch_id: c.id,
                    from_location_id: None,
                    quantity: dec!(15),
                    reason: Some("damaged in transit".to_string()),
                },
            )
            .unwrap();

        // A ward issue lands between request and approval.
        f.engine
            .allocator()
            .issue_stock(y, f.main, dec!(10), EventId::new("issue-1").unwrap(), None)
            .unwrap();
        assert_eq!(f.batch_qty(&c), dec!(10));
        let before = f.move_count();

        let err = f
            .engine
            .disposals()
            .approve(&f.manager, disposal.id, DisposalApproval::new("incineration", "DSP-7"))
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(15), dec!(10)));

        let after = f.engine.disposals().get(disposal.id).unwrap();
        assert_eq!(after.status, ReviewStatus::Pending);
        assert_eq!(f.batch_qty(&c), dec!(10));
        assert_eq!(f.move_count(), before);
    }

    #[test]
    fn disposal_creation_checks_remaining_quantity() {
        let f = fixture();
        let y = f.item("ITEM-Y", dec!(0));
        let c = f.receive(y, f.main, dec!(10), None, "rx-c");

        let err = f
            .engine
            .disposals()
            .create(
                &f.staff,
                NewDisposal {
                    batch_id: c.id,
                    from_location_id: None,
                    quantity: dec!(15),
                    reason: None,
                },
            )
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn reorder_signal_matches_worked_example() {
        let f = fixture();
        let z = f.item("ITEM-Z", dec!(20));
        f.receive(z, f.main, dec!(210), None, "rx-z");
        f.engine
            .allocator()
            .issue_stock(z, f.main, dec!(150), EventId::new("issue-z").unwrap(), None)
            .unwrap();

        let signal = f
            .engine
            .signals()
            .reorder_signal(z, None, Utc::now() + Duration::minutes(1))
            .unwrap();
        assert_eq!(signal.on_hand, dec!(60));
        assert_eq!(signal.avg_daily_usage, dec!(5));
        assert_eq!(signal.reorder_point, dec!(157.5));
        assert_eq!(signal.suggested_reorder, dec!(98));
        assert_eq!(signal.days_to_stockout, Some(12));
        assert_eq!(signal.risk, StockRisk::High);
        assert_eq!(signal.source, SignalSource::Heuristic);
    }

    #[test]
    fn external_forecast_overrides_supplied_fields() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let source = Arc::new(|_: ItemId, _: Option<LocationId>| {
            Some(ExternalForecast {
                avg_daily_usage: Some(dec!(1)),
                days_to_stockout: Some(60),
                ..ExternalForecast::default()
            })
        });
        let engine = StockEngine::new(store, EngineConfig::default()).with_forecast_source(source);
        let admin = engine.actor(UserId::new(), &[Role::new(Role::ADMIN)]);
        let item = engine
            .catalog()
            .create_or_update_item_by_sku(
                &admin,
                ItemSpec {
                    sku: "GLOVES-M".to_string(),
                    name: "Nitrile gloves M".to_string(),
                    unit_of_measure: "box".to_string(),
                    min_qty: dec!(5),
                    active: true,
                },
            )
            .unwrap()
            .into_inner();

        let signal = engine.signals().reorder_signal(item.id, None, Utc::now()).unwrap();
        assert_eq!(signal.source, SignalSource::External);
        assert_eq!(signal.avg_daily_usage, dec!(1));
        assert_eq!(signal.days_to_stockout, Some(60));
        assert_eq!(signal.reorder_point, dec!(5));
        // 0 on hand is still at or below the reorder point.
        assert_eq!(signal.risk, StockRisk::Medium);
    }

    #[test]
    fn count_post_emits_one_adjustment_and_refuses_repost() {
        let f = fixture();
        let item = f.item("SAL-500", dec!(0));
        let batch = f.receive(item, f.main, dec!(985), None, "rx-sal");

        let session = f
            .engine
            .counts()
            .create_session(
                &f.staff,
                NewCountSession {
                    session_no: "CS-2024-01".to_string(),
                    location_id: f.main,
                    notes: None,
                    lines: vec![NewCountLine::new(item, dec!(980)).with_system(dec!(985), dec!(-5))],
                },
            )
            .unwrap();
        assert_eq!(session.status, CountStatus::Open);

        let posted = f.engine.counts().post(&f.staff, "CS-2024-01").unwrap();
        assert_eq!(posted.session.status, CountStatus::Posted);
        assert_eq!(posted.moves.len(), 1);
        let adj = &posted.moves[0];
        assert_eq!(adj.reason, MoveReason::Adjustment);
        assert_eq!(adj.quantity, dec!(5));
        assert_eq!(adj.from_location_id, Some(f.main));
        assert_eq!(adj.to_location_id, None);
        // The only stock at MAIN is the batch, so the shrinkage comes off it.
        assert_eq!(adj.batch_id, Some(batch.id));
        assert_eq!(f.batch_qty(&batch), dec!(980));

        let before = f.move_count();
        let err = f.engine.counts().post(&f.manager, "CS-2024-01").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(f.move_count(), before);
        assert_eq!(f.on_hand(item, f.main), dec!(980));
        f.assert_reconciled();

        // Everything the ledger still holds can be issued and nothing is stranded.
        f.engine
            .allocator()
            .issue_stock(item, f.main, dec!(980), EventId::new("after-count").unwrap(), None)
            .unwrap();
        assert_eq!(f.batch_qty(&batch), dec!(0));
        assert_eq!(f.on_hand(item, f.main), dec!(0));
        f.assert_reconciled();
    }

    #[test]
    fn count_shrinkage_comes_off_loose_stock_before_batches() {
        let f = fixture();
        let item = f.item("GAUZE", dec!(0));
        let late = f.receive(item, f.main, dec!(10), date(2027, 6, 1), "rx-late");
        let early = f.receive(item, f.main, dec!(10), date(2026, 1, 1), "rx-early");
        f.engine
            .recorder()
            .record_move(
                NewStockMove::new(item, dec!(2), MoveReason::Adjustment, EventId::new("found").unwrap())
                    .to(f.main),
            )
            .unwrap();
        f.engine.batches().quarantine(&f.manager, early.id).unwrap();

        f.engine
            .counts()
            .create_session(
                &f.staff,
                NewCountSession {
                    session_no: "CS-LOOSE".to_string(),
                    location_id: f.main,
                    notes: None,
                    lines: vec![NewCountLine::new(item, dec!(15))],
                },
            )
            .unwrap();
        let posted = f.engine.counts().post(&f.staff, "CS-LOOSE").unwrap();

        let drawn: Vec<_> = posted.moves.iter().map(|m| (m.batch_id, m.quantity)).collect();
        assert_eq!(drawn, vec![(Some(early.id), dec!(5)), (None, dec!(2))]);
        assert!(posted.moves.iter().all(|m| m.reason == MoveReason::Adjustment));
        assert_eq!(f.batch_qty(&early), dec!(5));
        assert_eq!(f.batch_qty(&late), dec!(10));
        assert_eq!(f.on_hand(item, f.main), dec!(15));
        f.assert_reconciled();
    }

    #[test]
    fn concurrent_count_posts_apply_once() {
        let f = fixture();
        let item = f.item("SAL-500", dec!(0));
        f.receive(item, f.main, dec!(100), None, "rx-sal");
        f.engine
            .counts()
            .create_session(
                &f.staff,
                NewCountSession {
                    session_no: "CS-RACE".to_string(),
                    location_id: f.main,
                    notes: None,
                    lines: vec![NewCountLine::new(item, dec!(90))],
                },
            )
            .unwrap();

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let f = &f;
                    scope.spawn(move || f.engine.counts().post(&f.staff, "CS-RACE"))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(DomainError::is_conflict));
        assert_eq!(f.on_hand(item, f.main), dec!(90));
        let adjustments = f
            .store
            .read(|tx| tx.moves().iter().filter(|m| m.reason == MoveReason::Adjustment).count())
            .unwrap();
        assert_eq!(adjustments, 1);
        f.assert_reconciled();
    }

    #[test]
    fn count_lines_capture_system_quantity_and_adjust_batches() {
        let f = fixture();
        let item = f.item("SYR-5ML", dec!(0));
        let batch = f.receive(item, f.main, dec!(40), date(2027, 1, 1), "rx-syr");

        let mut line = NewCountLine::new(item, dec!(43));
        line.batch_id = Some(batch.id);
        f.engine
            .counts()
            .create_session(
                &f.staff,
                NewCountSession {
                    session_no: "CS-2".to_string(),
                    location_id: f.main,
                    notes: Some("quarterly".to_string()),
                    lines: vec![line],
                },
            )
            .unwrap();
        let stored = f.engine.counts().get("CS-2").unwrap();
        assert_eq!(stored.lines[0].system_qty, dec!(40));
        assert_eq!(stored.lines[0].variance, dec!(3));

        let posted = f.engine.counts().post(&f.staff, "CS-2").unwrap();
        assert_eq!(posted.moves[0].to_location_id, Some(f.main));
        assert_eq!(f.batch_qty(&batch), dec!(43));
        f.assert_reconciled();
    }

    #[test]
    fn count_rejects_variance_that_disagrees() {
        let f = fixture();
        let item = f.item("SAL-500", dec!(0));
        let err = f
            .engine
            .counts()
            .create_session(
                &f.staff,
                NewCountSession {
                    session_no: "CS-3".to_string(),
                    location_id: f.main,
                    notes: None,
                    lines: vec![NewCountLine::new(item, dec!(980)).with_system(dec!(985), dec!(5))],
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.engine.counts().get("CS-3").is_err());
    }

    #[test]
    fn duplicate_event_id_is_recorded_once() {
        let f = fixture();
        let item = f.item("ITEM-D", dec!(0));
        let adj = || {
            NewStockMove::new(item, dec!(12), MoveReason::Adjustment, EventId::new("adj-1").unwrap())
                .to(f.main)
        };

        let first = f.engine.recorder().record_move(adj()).unwrap();
        let second = f.engine.recorder().record_move(adj()).unwrap();
        assert!(!first.is_replay());
        assert!(second.is_replay());
        assert_eq!(first.stock_move().id, second.stock_move().id);
        assert_eq!(f.move_count(), 1);
        assert_eq!(f.on_hand(item, f.main), dec!(12));

        let mut different = adj();
        different.quantity = dec!(13);
        let err = f.engine.recorder().record_move(different).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(f.move_count(), 1);
    }

    #[test]
    fn replayed_receipt_does_not_double_the_batch() {
        let f = fixture();
        let item = f.item("ITEM-R", dec!(0));
        let event = GoodsReceived {
            item_id: item,
            batch_id: None,
            lot_no: Some("L-77".to_string()),
            expiry_date: date(2027, 5, 1),
            quantity: dec!(25),
            location_id: f.main,
            event_id: EventId::new("po-77:line:1").unwrap(),
            occurred_at: None,
        };
        let first = f.engine.recorder().receive_goods(event.clone()).unwrap();
        let second = f.engine.recorder().receive_goods(event).unwrap();

        assert_eq!(first.batch.id, second.batch.id);
        assert!(second.stock_move.is_replay());
        assert_eq!(f.engine.batches().for_item(item).unwrap().len(), 1);
        assert_eq!(f.batch_qty(&first.batch), dec!(25));
    }

    #[test]
    fn outbound_move_cannot_drive_location_negative() {
        let f = fixture();
        let item = f.item("ITEM-N", dec!(0));
        f.engine
            .recorder()
            .record_move(
                NewStockMove::new(item, dec!(3), MoveReason::Adjustment, EventId::new("found").unwrap())
                    .to(f.main),
            )
            .unwrap();

        let err = f
            .engine
            .recorder()
            .record_move(
                NewStockMove::new(item, dec!(4), MoveReason::Issue, EventId::new("iss").unwrap())
                    .from(f.main),
            )
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(4), dec!(3)));
    }

    #[test]
    fn unbatched_outbound_move_cannot_take_batch_held_stock() {
        let f = fixture();
        let item = f.item("ITEM-U", dec!(0));
        let batch = f.receive(item, f.main, dec!(3), None, "rx-u");

        let err = f
            .engine
            .recorder()
            .record_move(
                NewStockMove::new(item, dec!(1), MoveReason::Adjustment, EventId::new("adj").unwrap())
                    .from(f.main),
            )
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(1), dec!(0)));
        assert_eq!(f.batch_qty(&batch), dec!(3));
        assert_eq!(f.on_hand(item, f.main), dec!(3));
    }

    #[test]
    fn second_approval_is_a_no_op() {
        let f = fixture();
        let x = f.item("ITEM-X", dec!(0));
        let batch = f.receive(x, f.main, dec!(50), date(2025, 1, 1), "rx-x");
        let t = f
            .engine
            .transfers()
            .create(&f.staff, f.transfer("TR-2", vec![TransferLine::new(x, dec!(20))]))
            .unwrap();

        let first = f.engine.transfers().approve(&f.manager, t.id).unwrap();
        let moves = f.move_count();
        let second = f.engine.transfers().approve(&f.admin, t.id).unwrap();

        assert_eq!(first, second);
        assert_eq!(f.move_count(), moves);
        assert_eq!(f.batch_qty(&batch), dec!(30));

        let err = f.engine.transfers().reject(&f.manager, t.id, None).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn rejected_transfer_cannot_be_approved_and_moves_nothing() {
        let f = fixture();
        let x = f.item("ITEM-X", dec!(0));
        f.receive(x, f.main, dec!(50), None, "rx-x");
        let t = f
            .engine
            .transfers()
            .create(&f.staff, f.transfer("TR-3", vec![TransferLine::new(x, dec!(20))]))
            .unwrap();

        let rejected = f
            .engine
            .transfers()
            .reject(&f.manager, t.id, Some("ward closed".to_string()))
            .unwrap();
        assert_eq!(rejected.status, ReviewStatus::Rejected);
        let again = f.engine.transfers().reject(&f.manager, t.id, None).unwrap();
        assert_eq!(again.rejection_reason.as_deref(), Some("ward closed"));

        assert!(f.engine.transfers().approve(&f.manager, t.id).unwrap_err().is_conflict());
        assert_eq!(f.on_hand(x, f.main), dec!(50));
    }

    #[test]
    fn failing_line_rolls_back_the_whole_approval() {
        let f = fixture();
        let plenty = f.item("ITEM-P", dec!(0));
        let scarce = f.item("ITEM-S", dec!(0));
        let p = f.receive(plenty, f.main, dec!(100), date(2025, 1, 1), "rx-p");
        let s = f.receive(scarce, f.main, dec!(5), date(2025, 1, 1), "rx-s");

        let t = f
            .engine
            .transfers()
            .create(
                &f.staff,
                f.transfer(
                    "TR-4",
                    vec![TransferLine::new(plenty, dec!(60)), TransferLine::new(scarce, dec!(6))],
                ),
            )
            .unwrap();
        let moves = f.move_count();

        let err = f.engine.transfers().approve(&f.manager, t.id).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(6), dec!(5)));

        assert_eq!(f.engine.transfers().get(t.id).unwrap().status, ReviewStatus::Pending);
        assert_eq!(f.move_count(), moves);
        assert_eq!(f.batch_qty(&p), dec!(100));
        assert_eq!(f.batch_qty(&s), dec!(5));
        assert_eq!(f.on_hand(plenty, f.ward), dec!(0));
    }

    #[test]
    fn concurrent_approvals_apply_once() {
        let f = fixture();
        let x = f.item("ITEM-X", dec!(0));
        let batch = f.receive(x, f.main, dec!(100), date(2025, 1, 1), "rx-x");
        let t = f
            .engine
            .transfers()
            .create(&f.staff, f.transfer("TR-5", vec![TransferLine::new(x, dec!(40))]))
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let approved = f.engine.transfers().approve(&f.manager, t.id).unwrap();
                    assert_eq!(approved.status, ReviewStatus::Approved);
                });
            }
        });

        assert_eq!(f.batch_qty(&batch), dec!(60));
        let transfer_moves = f
            .store
            .read(|tx| tx.moves().iter().filter(|m| m.reason == MoveReason::Transfer).count())
            .unwrap();
        assert_eq!(transfer_moves, 1);
    }

    #[test]
    fn concurrent_issues_never_overdraw_a_batch() {
        let f = fixture();
        let item = f.item("ITEM-C", dec!(0));
        let batch = f.receive(item, f.ward, dec!(100), date(2025, 1, 1), "rx-c");

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..10)
                .map(|i| {
                    let f = &f;
                    scope.spawn(move || {
                        f.engine.allocator().issue_stock(
                            item,
                            f.ward,
                            dec!(15),
                            EventId::new(format!("dispense-{i}")).unwrap(),
                            None,
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 6);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(DomainError::is_conflict));
        assert_eq!(f.batch_qty(&batch), dec!(10));
        f.assert_reconciled();
    }

    #[test]
    fn issue_retry_replays_instead_of_issuing_twice() {
        let f = fixture();
        let item = f.item("ITEM-I", dec!(0));
        f.receive(item, f.ward, dec!(30), date(2025, 1, 1), "rx-i");
        let key = || EventId::new("mar-1234").unwrap();

        let first = f.engine.allocator().issue_stock(item, f.ward, dec!(10), key(), None).unwrap();
        let again = f.engine.allocator().issue_stock(item, f.ward, dec!(10), key(), None).unwrap();
        assert_eq!(first, again);
        assert_eq!(f.on_hand(item, f.ward), dec!(20));

        let err = f
            .engine
            .allocator()
            .issue_stock(item, f.ward, dec!(11), key(), None)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn capabilities_are_checked_before_anything_else() {
        let f = fixture();
        let x = f.item("ITEM-X", dec!(0));
        let request = f.transfer("TR-6", vec![TransferLine::new(x, dec!(1))]);

        let err = f.engine.transfers().create(&f.manager, request.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let t = f.engine.transfers().create(&f.staff, request).unwrap();
        let err = f.engine.transfers().approve(&f.staff, t.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let outsider = f.engine.actor(UserId::new(), &[Role::new("VISITOR")]);
        let err = f
            .engine
            .catalog()
            .set_threshold(&outsider, x, None, dec!(5))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        // Unknown ids are reported only to callers allowed to act.
        let err = f
            .engine
            .disposals()
            .approve(&f.staff, medstock_core::DisposalId::new(), DisposalApproval::new("m", "r"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    fn pending_disposal(f: &Fixture, qty: Decimal) -> (Batch, medstock_inventory::DisposalRequest) {
        let item = f.item("ITEM-DSP", dec!(0));
        let batch = f.receive(item, f.main, dec!(20), date(2024, 1, 1), "rx-dsp");
        let disposal = f
            .engine
            .disposals()
            .create(
                &f.staff,
                NewDisposal {
                    batch_id: batch.id,
                    from_location_id: None,
                    quantity: qty,
                    reason: Some("expired".to_string()),
                },
            )
            .unwrap();
        (batch, disposal)
    }

    #[test]
    fn second_disposal_approval_is_a_no_op() {
        let f = fixture();
        let (batch, d) = pending_disposal(&f, dec!(12));

        let first = f
            .engine
            .disposals()
            .approve(&f.manager, d.id, DisposalApproval::new("incineration", "DSP-1"))
            .unwrap();
        let moves = f.move_count();
        let second = f
            .engine
            .disposals()
            .approve(&f.admin, d.id, DisposalApproval::new("landfill", "DSP-2"))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.reference_no.as_deref(), Some("DSP-1"));
        assert_eq!(f.move_count(), moves);
        assert_eq!(f.batch_qty(&batch), dec!(8));
        assert!(f.engine.disposals().reject(&f.manager, d.id, None).unwrap_err().is_conflict());
    }

    #[test]
    fn concurrent_disposal_approvals_apply_once() {
        let f = fixture();
        let (batch, d) = pending_disposal(&f, dec!(12));
        let id = d.id;

        std::thread::scope(|scope| {
            for i in 0..8 {
                let f = &f;
                scope.spawn(move || {
                    let approved = f
                        .engine
                        .disposals()
                        .approve(&f.manager, id, DisposalApproval::new("incineration", format!("DSP-{i}")))
                        .unwrap();
                    assert_eq!(approved.status, ReviewStatus::Approved);
                });
            }
        });

        assert_eq!(f.batch_qty(&batch), dec!(8));
        let disposal_moves = f
            .store
            .read(|tx| tx.moves().iter().filter(|m| m.reason == MoveReason::Disposal).count())
            .unwrap();
        assert_eq!(disposal_moves, 1);
        f.assert_reconciled();
    }

    #[test]
    fn disposal_approval_needs_method_and_reference() {
        let f = fixture();
        let item = f.item("ITEM-E", dec!(0));
        let batch = f.receive(item, f.main, dec!(8), date(2024, 1, 1), "rx-e");
        let d = f
            .engine
            .disposals()
            .create(
                &f.staff,
                NewDisposal {
                    batch_id: batch.id,
                    from_location_id: Some(f.main),
                    quantity: dec!(8),
                    reason: Some("expired".to_string()),
                },
            )
            .unwrap();

        let err = f
            .engine
            .disposals()
            .approve(&f.manager, d.id, DisposalApproval::new("incineration", ""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.engine.disposals().get(d.id).unwrap().status, ReviewStatus::Pending);
    }

    #[test]
    fn expired_batch_is_skipped_by_fefo_and_can_be_disposed() {
        let f = fixture();
        let item = f.item("ITEM-E", dec!(0));
        let today = Utc::now().date_naive();
        let old = f.receive(item, f.main, dec!(8), Some(today - Duration::days(3)), "rx-old");
        let fresh = f.receive(item, f.main, dec!(20), Some(today + Duration::days(200)), "rx-new");

        let expired = f.engine.batches().expire_due(today).unwrap();
        assert_eq!(expired.iter().map(|b| b.id).collect::<Vec<_>>(), vec![old.id]);
        assert!(f.engine.batches().expire_due(today).unwrap().is_empty());

        let plan = f.engine.allocator().preview(item, f.main, dec!(5)).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].batch_id, fresh.id);
        assert!(f.engine.allocator().preview(item, f.main, dec!(21)).is_err());

        let d = f
            .engine
            .disposals()
            .create(
                &f.staff,
                NewDisposal {
                    batch_id: old.id,
                    from_location_id: None,
                    quantity: dec!(8),
                    reason: Some("expired".to_string()),
                },
            )
            .unwrap();
        let mut approval = DisposalApproval::new("returned to supplier", "RMA-19");
        approval.witness = Some("duty pharmacist".to_string());
        let approved = f.engine.disposals().approve(&f.manager, d.id, approval).unwrap();
        assert_eq!(approved.status, ReviewStatus::Approved);
        assert_eq!(approved.method.as_deref(), Some("returned to supplier"));

        let old = f.engine.batches().get(old.id).unwrap();
        assert_eq!(old.status, BatchStatus::Disposed);
        assert!(old.disposed_at.is_some());
        assert_eq!(old.qty_on_hand, dec!(0));
        assert_eq!(f.on_hand(item, f.main), dec!(20));
        f.assert_reconciled();
    }

    #[test]
    fn quarantined_batch_is_withheld_until_released() {
        let f = fixture();
        let item = f.item("ITEM-Q", dec!(0));
        let batch = f.receive(item, f.main, dec!(10), date(2026, 1, 1), "rx-q");

        assert_eq!(
            f.engine.batches().quarantine(&f.staff, batch.id).unwrap_err().kind(),
            ErrorKind::Forbidden
        );
        f.engine.batches().quarantine(&f.manager, batch.id).unwrap();
        assert!(f.engine.allocator().preview(item, f.main, dec!(1)).unwrap_err().is_conflict());

        f.engine.batches().release(&f.manager, batch.id).unwrap();
        assert!(f.engine.allocator().preview(item, f.main, dec!(10)).is_ok());
    }

    #[test]
    fn stock_moved_to_a_ward_can_be_issued_there() {
        let f = fixture();
        let item = f.item("ITEM-W", dec!(0));
        f.receive(item, f.main, dec!(30), date(2025, 1, 1), "rx-w");
        let t = f
            .engine
            .transfers()
            .create(&f.staff, f.transfer("TR-7", vec![TransferLine::new(item, dec!(12))]))
            .unwrap();
        f.engine.transfers().approve(&f.manager, t.id).unwrap();

        let moves = f
            .engine
            .allocator()
            .issue_stock(item, f.ward, dec!(12), EventId::new("ward-dose").unwrap(), None)
            .unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].batch_id, None);
        assert_eq!(f.on_hand(item, f.ward), dec!(0));
        f.assert_reconciled();
    }

    #[test]
    fn notifications_are_raised_once_until_resolved() {
        let f = fixture();
        let item = f.item("ITEM-L", dec!(50));
        let today = Utc::now().date_naive();
        f.receive(item, f.main, dec!(10), Some(today + Duration::days(5)), "rx-l");

        let now = Utc::now();
        let raised = f.engine.notifications().refresh(now).unwrap();
        let kinds: Vec<_> = raised.iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NotificationKind::LowStock));
        assert!(kinds.contains(&NotificationKind::Expiry));
        assert_eq!(raised.len(), 2);

        assert!(f.engine.notifications().refresh(now).unwrap().is_empty());

        let low = raised
            .iter()
            .find(|n| n.kind == NotificationKind::LowStock)
            .unwrap();
        f.engine.notifications().resolve(low.id, now).unwrap();
        assert!(f.engine.notifications().resolve(low.id, now).unwrap_err().is_conflict());
        assert_eq!(f.engine.notifications().unresolved().unwrap().len(), 1);

        let again = f.engine.notifications().refresh(now).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].kind, NotificationKind::LowStock);
    }

    #[test]
    fn location_threshold_takes_precedence() {
        let f = fixture();
        let item = f.item("ITEM-T", dec!(5));
        f.receive(item, f.ward, dec!(8), None, "rx-t");
        f.engine
            .catalog()
            .set_threshold(&f.admin, item, Some(f.ward), dec!(10))
            .unwrap();

        let ward = f.engine.signals().reorder_signal(item, Some(f.ward), Utc::now()).unwrap();
        assert_eq!(ward.min_qty, dec!(10));
        let overall = f.engine.signals().reorder_signal(item, None, Utc::now()).unwrap();
        assert_eq!(overall.min_qty, dec!(5));
    }

    #[test]
    fn dashboard_snapshot_reflects_committed_state() {
        let f = fixture();
        let low = f.item("ITEM-LOW", dec!(100));
        let fine = f.item("ITEM-OK", dec!(1));
        let today = Utc::now().date_naive();
        f.receive(low, f.main, dec!(10), Some(today + Duration::days(10)), "rx-1");
        f.receive(fine, f.ward, dec!(10), None, "rx-2");

        let snapshot = f.engine.signals().dashboard(Utc::now()).unwrap();
        assert_eq!(snapshot.low_stock_count, 1);
        assert_eq!(snapshot.stock_levels.len(), 2);
        assert_eq!(snapshot.expiring.len(), 1);
        assert_eq!(snapshot.reorder.len(), 2);
    }

    #[test]
    fn upsert_reports_create_versus_update() {
        let f = fixture();
        let spec = |name: &str| ItemSpec {
            sku: "AMOX-500".to_string(),
            name: name.to_string(),
            unit_of_measure: "cap".to_string(),
            min_qty: dec!(10),
            active: true,
        };
        let created = f
            .engine
            .catalog()
            .create_or_update_item_by_sku(&f.admin, spec("Amoxicillin"))
            .unwrap();
        let updated = f
            .engine
            .catalog()
            .create_or_update_item_by_sku(&f.admin, spec("Amoxicillin 500mg"))
            .unwrap();
        assert!(created.was_created());
        assert!(!updated.was_created());

        let (a, b) = (created.into_inner(), updated.into_inner());
        assert_eq!(a.id, b.id);
        assert_eq!(f.engine.catalog().item_by_sku("AMOX-500").unwrap().name, "Amoxicillin 500mg");
    }

    #[test]
    fn audit_reads_on_hand_from_moves_only() {
        let f = fixture();
        let item = f.item("ITEM-A", dec!(0));
        f.receive(item, f.main, dec!(40), date(2025, 1, 1), "rx-a");
        let t = f
            .engine
            .transfers()
            .create(&f.staff, f.transfer("TR-8", vec![TransferLine::new(item, dec!(15))]))
            .unwrap();
        f.engine.transfers().approve(&f.manager, t.id).unwrap();

        let mut levels = f.engine.audit().on_hand_by_location(item).unwrap();
        levels.sort_by_key(|l| l.on_hand);
        let pairs: Vec<_> = levels.iter().map(|l| (l.location_id, l.on_hand)).collect();
        let mut expected = vec![(f.ward, dec!(15)), (f.main, dec!(25))];
        expected.sort_by_key(|(_, q)| *q);
        assert_eq!(pairs, expected);

        let snapshot = f.store.snapshot().unwrap();
        let restored = InMemoryLedgerStore::from_snapshot(snapshot);
        let report = restored.read(|tx| crate::audit::audit_in(tx)).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.moves_checked, 2);
    }

    #[test]
    fn expired_claims_are_refused() {
        let f = fixture();
        let now = Utc::now();
        let claims = medstock_auth::AuthClaims {
            sub: UserId::new(),
            roles: vec![Role::new(Role::STAFF)],
            issued_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
        };
        let err = f.engine.actor_from_claims(&claims, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Receive(u32, i64),
        Issue(u32),
        Dispose(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..50, -30i64..120).prop_map(|(q, d)| Op::Receive(q, d)),
            (1u32..60).prop_map(Op::Issue),
            (1u32..20).prop_map(Op::Dispose),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn ledger_and_batches_stay_reconciled(ops in prop::collection::vec(op(), 1..25)) {
            let f = fixture();
            let item = f.item("PROP", dec!(0));
            let today = Utc::now().date_naive();

            for (i, op) in ops.iter().enumerate() {
                match op {
                    Op::Receive(qty, days) => {
                        f.receive(item, f.main, Decimal::from(*qty), Some(today + Duration::days(*days)), &format!("rx-{i}"));
                    }
                    Op::Issue(qty) => {
                        let _ = f.engine.allocator().issue_stock(
                            item,
                            f.main,
                            Decimal::from(*qty),
                            EventId::new(format!("iss-{i}")).unwrap(),
                            None,
                        );
                    }
                    Op::Dispose(qty) => {
                        let batches = f.engine.batches().for_item(item).unwrap();
                        if let Some(b) = batches.iter().find(|b| b.qty_on_hand >= Decimal::from(*qty) && b.status != BatchStatus::Disposed) {
                            let d = f.engine.disposals().create(&f.staff, NewDisposal {
                                batch_id: b.id,
                                from_location_id: None,
                                quantity: Decimal::from(*qty),
                                reason: None,
                            });
                            if let Ok(d) = d {
                                let _ = f.engine.disposals().approve(&f.manager, d.id, DisposalApproval::new("incineration", format!("R-{i}")));
                            }
                        }
                    }
                }
                prop_assert!(f.on_hand(item, f.main) >= Decimal::ZERO);
            }

            for b in f.engine.batches().for_item(item).unwrap() {
                prop_assert!(b.qty_on_hand >= Decimal::ZERO);
            }
            let report = f.engine.audit().run().unwrap();
            prop_assert!(report.is_clean());
        }
    }
}
