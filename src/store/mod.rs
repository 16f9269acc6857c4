//! Storage abstraction for projects and collected items.
//!
//! The orchestrator only sees these two traits, so a run can be driven
//! against SQLite ([`SqliteStore`](crate::sqlite_store::SqliteStore)) or the
//! in-memory store used by tests.
//!
//! Implementations must be `Send + Sync` to be shared across tokio tasks.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{FetchedItem, Project, ProjectStatus};

/// Project records, their status and running totals, and source checkpoints.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create`](ProjectStore::create) | Insert a new project |
/// | [`get`](ProjectStore::get) | Load one project |
/// | [`list`](ProjectStore::list) | All projects, newest first |
/// | [`update_status`](ProjectStore::update_status) | Persist a lifecycle transition |
/// | [`add_collected`](ProjectStore::add_collected) | Atomically advance the collected count |
/// | [`completed_sources`](ProjectStore::completed_sources) | Sources already finished in this collection |
/// | [`mark_source_done`](ProjectStore::mark_source_done) | Record a finished source |
/// | [`clear_checkpoints`](ProjectStore::clear_checkpoints) | Forget finished sources |
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create(&self, project: &Project) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Project>>;

    async fn list(&self) -> Result<Vec<Project>>;

    /// Writes only the status (and `updated_at`); the collected count is
    /// never overwritten from a stale in-memory copy.
    async fn update_status(&self, id: Uuid, status: ProjectStatus) -> Result<()>;

    /// Adds `n` to the project's total and returns the new total.
    async fn add_collected(&self, id: Uuid, n: u64) -> Result<u64>;

    async fn completed_sources(&self, id: Uuid) -> Result<Vec<String>>;

    async fn mark_source_done(&self, id: Uuid, source: &str) -> Result<()>;

    async fn clear_checkpoints(&self, id: Uuid) -> Result<()>;
}

/// Idempotent batch writes keyed by (project, source, external id).
///
/// A call is all-or-nothing for the structured metadata. Re-writing an item
/// with a known key replaces the stored row.
#[async_trait]
pub trait BatchPersister: Send + Sync {
    /// Returns the number of items written.
    async fn write_batch(&self, project_id: Uuid, source: &str, items: &[FetchedItem])
        -> Result<u64>;
}
