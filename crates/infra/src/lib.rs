//! Infrastructure layer: unit of work, in-memory ledger store, and the
//! services that drive the inventory domain through it.

pub mod allocator;
pub mod audit;
pub mod batches;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod notifications;
pub mod recorder;
pub mod signals;
pub mod store;
pub mod workflows;

mod integration_tests;

pub use allocator::{FefoAllocator, StockPlan};
pub use audit::{AuditReport, LedgerAudit, OverheldLevel};
pub use batches::BatchRegistry;
pub use catalog::{CatalogService, Upserted};
pub use config::{ConfigError, EngineConfig};
pub use engine::StockEngine;
pub use notifications::NotificationCenter;
pub use recorder::{MoveOutcome, ReceiptOutcome, StockRecorder};
pub use signals::{DashboardSnapshot, ForecastSource, SignalEngine, StockLevel};
pub use store::{InMemoryLedgerStore, LedgerState, LedgerTx, UnitOfWork};
pub use workflows::count::PostedCount;
pub use workflows::{CountReconciler, DisposalWorkflow, TransferWorkflow};
