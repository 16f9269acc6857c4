//! `harvest collect`: run a project's collection in the foreground.
//!
//! Ctrl-C requests a cooperative cancel. The in-flight fetch finishes,
//! fetched items are persisted, and the project is left `Collecting`.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

use crate::adapter::{AdapterRegistry, Credentials};
use crate::config::Config;
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::progress::ProgressMode;
use crate::project_cmd::parse_project_id;
use crate::sqlite_store::SqliteStore;

pub async fn run_collect(config: &Config, id: &str, progress: Option<String>) -> Result<()> {
    let id = parse_project_id(id)?;
    let mode = match progress.as_deref() {
        None => ProgressMode::default_for_tty(),
        Some(s) => match ProgressMode::parse(s) {
            Some(mode) => mode,
            None => bail!("invalid --progress value '{}': expected off, human or json", s),
        },
    };

    let store = Arc::new(SqliteStore::open(config).await?);
    let adapters = Arc::new(AdapterRegistry::from_config(config)?);
    let credentials = Credentials::from_env(config);
    info!(sources = adapters.len(), credentials = ?credentials, "adapters loaded");

    let orchestrator =
        Arc::new(Orchestrator::new(store.clone(), store.clone(), adapters).configured(config));
    let mut handle = orchestrator.spawn(id, credentials, Arc::from(mode.reporter()))?;

    let result = tokio::select! {
        res = &mut handle => res?,
        _ = tokio::signal::ctrl_c() => {
            info!(project = %id, "interrupt received, cancelling");
            // The run may have finished in the meantime; then there is nothing to cancel.
            let _ = orchestrator.cancel(id);
            handle.await?
        }
    };
    store.close().await;
    let summary = result?;

    println!("collect {}", id);
    println!("  items collected: {}", summary.items_collected);
    println!("  outcome: {}", summary.outcome.as_str());
    for skipped in &summary.skipped {
        println!("  skipped: {} ({})", skipped.source, skipped.reason);
    }
    match summary.outcome {
        RunOutcome::Completed => println!("ok"),
        RunOutcome::Paused => println!("paused; run `harvest collect {}` to continue", id),
        RunOutcome::Cancelled => println!(
            "cancelled; run `harvest pause {}` then `harvest collect {}` to continue",
            id, id
        ),
    }

    Ok(())
}
