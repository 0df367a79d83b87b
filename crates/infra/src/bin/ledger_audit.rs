//! Reconcile a ledger snapshot and print stock signals as JSON.
//!
//! Usage: `ledger-audit <snapshot.json> [YYYY-MM-DD]`

use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use medstock_infra::{
    AuditReport, DashboardSnapshot, EngineConfig, InMemoryLedgerStore, LedgerState, StockEngine,
};

#[derive(Serialize)]
struct Report {
    audit: AuditReport,
    dashboard: DashboardSnapshot,
}

fn main() -> anyhow::Result<()> {
    medstock_observability::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: ledger-audit <snapshot.json> [YYYY-MM-DD]");
    };
    let as_of = match args.next() {
        Some(day) => NaiveDate::parse_from_str(&day, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{day}'"))?
            .and_hms_opt(23, 59, 59)
            .context("invalid time of day")?
            .and_utc(),
        None => Utc::now(),
    };

    let config = EngineConfig::from_env().context("loading configuration")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let state = LedgerState::from_json(&raw).with_context(|| format!("parsing {path}"))?;

    let engine = StockEngine::new(Arc::new(InMemoryLedgerStore::from_snapshot(state)), config);
    let audit = engine.audit().run()?;
    let dashboard = engine.signals().dashboard(as_of)?;
    info!(
        moves = audit.moves_checked,
        batches = audit.batches_checked,
        clean = audit.is_clean(),
        "ledger audit finished"
    );

    let clean = audit.is_clean();
    println!("{}", serde_json::to_string_pretty(&Report { audit, dashboard })?);
    if !clean {
        bail!("ledger and batch registry disagree");
    }
    Ok(())
}
