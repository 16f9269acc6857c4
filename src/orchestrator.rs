//! Collection orchestrator.
//!
//! Drives one project's enabled sources through a controlled run:
//!
//! ```text
//! start(project)
//!   ├─ Draft/Paused ─▶ Collecting (persisted before any network work)
//!   ├─ for each enabled source, in project order:
//!   │     cancelled?  → stop
//!   │     paused?     → block until resume/cancel, re-assert Collecting
//!   │     authenticate, availability, quota hint (0 → skip)
//!   │     fetch through RetryPolicy  (exhausted → skip source)
//!   │     write_batch × ⌈n / batch_size⌉, add_collected after each batch
//!   │     checkpoint source, report progress + status
//!   └─ Collecting ─▶ Completed  (unless cancelled or left paused)
//! ```
//!
//! Pause, resume and cancel are cooperative. They are observed between
//! sources (and during retry backoff), never in the middle of a fetch.
//! Per-source failures become [`SkippedSource`] entries in the
//! [`RunSummary`]; only precondition violations and persistence failures
//! fail the call.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapter::{AdapterRegistry, Credentials, FetchRequest, SourceAdapter};
use crate::config::Config;
use crate::control::RunControl;
use crate::error::CollectError;
use crate::models::{FetchedItem, Project, ProjectStatus};
use crate::progress::{format_number, CollectionReporter};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{BatchPersister, ProjectStore};

/// Batch size and per-source result cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSettings {
    pub batch_size: usize,
    pub max_results: usize,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_results: 1000,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every enabled source was attempted and the project is `Completed`.
    Completed,
    /// The run stopped on a pause; `start` again to continue.
    Paused,
    /// The run stopped on cancel; project status was left as it was.
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Paused => "paused",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Items durably written during this run.
    pub items_collected: u64,
    pub outcome: RunOutcome,
    pub skipped: Vec<SkippedSource>,
}

/// Point-in-time view of a project's collection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStatus {
    pub project_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub total_items_collected: u64,
    /// Whether this process has a live run for the project.
    pub active: bool,
    pub paused: bool,
}

enum Boundary {
    Proceed,
    /// Paused by this process; block until resume or cancel.
    Wait,
    /// Persisted `Paused` that this run never saw, e.g. from another process.
    PausedElsewhere,
}

enum SourceOutcome {
    Collected(u64),
    Skipped(String),
    /// Cancelled during retry backoff; nothing was written.
    Cancelled,
}

type RunMap = Arc<Mutex<HashMap<Uuid, RunControl>>>;

/// Removes the run's control entry however the run ends.
struct RunGuard {
    runs: RunMap,
    id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Owns the collection lifecycle of every project in this process.
///
/// Collaborators are injected at construction; tests pass fake adapters
/// and the in-memory store.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use crisis_harvest::adapter::{AdapterRegistry, Credentials};
/// use crisis_harvest::orchestrator::Orchestrator;
/// use crisis_harvest::progress::NoProgress;
/// use crisis_harvest::store::memory::InMemoryStore;
///
/// # async fn run(project_id: uuid::Uuid) -> Result<(), crisis_harvest::error::CollectError> {
/// let store = Arc::new(InMemoryStore::new());
/// let orchestrator = Orchestrator::new(store.clone(), store, Arc::new(AdapterRegistry::new()));
/// let summary = orchestrator
///     .start(project_id, &Credentials::new(), &NoProgress)
///     .await?;
/// println!("{} items", summary.items_collected);
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    projects: Arc<dyn ProjectStore>,
    persister: Arc<dyn BatchPersister>,
    adapters: Arc<AdapterRegistry>,
    retry: RetryPolicy,
    settings: CollectionSettings,
    runs: RunMap,
    // Serializes status read-modify-write between pause and the run loop.
    status_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        persister: Arc<dyn BatchPersister>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            projects,
            persister,
            adapters,
            retry: RetryPolicy::default(),
            settings: CollectionSettings::default(),
            runs: Arc::new(Mutex::new(HashMap::new())),
            status_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Retry policy and collection settings from the config file.
    pub fn configured(self, config: &Config) -> Self {
        self.with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_settings(CollectionSettings {
                batch_size: config.collection.batch_size,
                max_results: config.collection.max_results,
            })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_settings(mut self, settings: CollectionSettings) -> Self {
        self.settings = CollectionSettings {
            batch_size: settings.batch_size.max(1),
            max_results: settings.max_results,
        };
        self
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Runs collection for a project to completion, pause or cancel.
    pub async fn start(
        &self,
        project_id: Uuid,
        credentials: &Credentials,
        reporter: &dyn CollectionReporter,
    ) -> Result<RunSummary, CollectError> {
        let (control, _guard) = self.register_run(project_id)?;
        self.run(project_id, &control, credentials, reporter).await
    }

    /// Like [`start`](Self::start) on a dedicated tokio task.
    ///
    /// The run is registered before this returns, so `pause`, `resume` and
    /// `cancel` can target it immediately.
    pub fn spawn(
        self: &Arc<Self>,
        project_id: Uuid,
        credentials: Credentials,
        reporter: Arc<dyn CollectionReporter>,
    ) -> Result<JoinHandle<Result<RunSummary, CollectError>>, CollectError> {
        let (control, guard) = self.register_run(project_id)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _guard = guard;
            this.run(project_id, &control, &credentials, reporter.as_ref())
                .await
        }))
    }

    /// Requests a pause and persists `Paused` right away.
    ///
    /// Legal from `Collecting` only. Without a live run in this process the
    /// status change alone is made, which is how a project left
    /// `Collecting` by a crash, or by a run in another process, is paused.
    pub async fn pause(&self, project_id: Uuid) -> Result<(), CollectError> {
        let _lock = self.status_lock.lock().await;
        let mut project = self.load(project_id).await?;
        project.pause_collection()?;

        let live = self.control(project_id);
        if let Some(control) = &live {
            control.pause();
        }
        self.projects
            .update_status(project_id, ProjectStatus::Paused)
            .await?;

        info!(project = %project_id, live_run = live.is_some(), "collection paused");
        Ok(())
    }

    /// Releases a paused live run. The run loop re-asserts `Collecting`.
    pub async fn resume(&self, project_id: Uuid) -> Result<(), CollectError> {
        let control = self
            .control(project_id)
            .ok_or(CollectError::NoActiveRun(project_id))?;
        if !control.is_paused() {
            let project = self.load(project_id).await?;
            return Err(CollectError::conflict(project_id, project.status, "resume"));
        }
        control.resume();
        info!(project = %project_id, "collection resumed");
        Ok(())
    }

    /// Requests cancellation of a live run.
    pub fn cancel(&self, project_id: Uuid) -> Result<(), CollectError> {
        let control = self
            .control(project_id)
            .ok_or(CollectError::NoActiveRun(project_id))?;
        control.cancel();
        info!(project = %project_id, "collection cancel requested");
        Ok(())
    }

    pub async fn status(&self, project_id: Uuid) -> Result<CollectionStatus, CollectError> {
        let project = self.load(project_id).await?;
        let control = self.control(project_id);
        Ok(CollectionStatus {
            project_id,
            name: project.name,
            status: project.status,
            total_items_collected: project.total_items_collected,
            active: control.is_some(),
            paused: control.map(|c| c.is_paused()).unwrap_or(false),
        })
    }

    fn register_run(&self, project_id: Uuid) -> Result<(RunControl, RunGuard), CollectError> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(&project_id) {
            return Err(CollectError::RunAlreadyActive(project_id));
        }
        let control = RunControl::new();
        runs.insert(project_id, control.clone());
        Ok((
            control,
            RunGuard {
                runs: Arc::clone(&self.runs),
                id: project_id,
            },
        ))
    }

    fn control(&self, project_id: Uuid) -> Option<RunControl> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&project_id)
            .cloned()
    }

    async fn load(&self, project_id: Uuid) -> Result<Project, CollectError> {
        self.projects
            .get(project_id)
            .await?
            .ok_or(CollectError::ProjectNotFound(project_id))
    }

    async fn run(
        &self,
        project_id: Uuid,
        control: &RunControl,
        credentials: &Credentials,
        reporter: &dyn CollectionReporter,
    ) -> Result<RunSummary, CollectError> {
        let (project, done) = self.enter_collecting(project_id).await?;

        let total_sources = project.sources.len();
        let mut finished = project
            .sources
            .iter()
            .filter(|s| done.contains(*s))
            .count();

        info!(
            project = %project_id,
            name = %project.name,
            sources = total_sources,
            already_done = finished,
            "collection started"
        );
        reporter.on_status(&format!("Starting collection for {}", project.name));
        reporter.on_progress(fraction(finished, total_sources));

        let request = FetchRequest {
            keywords: project.keywords.clone(),
            date_range: project.date_range,
            max_results: self.settings.max_results,
        };

        let mut items_collected = 0u64;
        let mut skipped = Vec::new();
        let mut outcome = RunOutcome::Completed;

        for source in &project.sources {
            if done.contains(source) {
                continue;
            }
            if control.is_cancelled() {
                outcome = RunOutcome::Cancelled;
                break;
            }
            match self.check_boundary(project_id, control).await? {
                Boundary::Proceed => {}
                Boundary::Wait => {
                    if !self.wait_for_resume(project_id, control, reporter).await? {
                        outcome = RunOutcome::Cancelled;
                        break;
                    }
                }
                Boundary::PausedElsewhere => {
                    info!(project = %project_id, "project paused outside this run");
                    reporter.on_status("Collection paused");
                    outcome = RunOutcome::Paused;
                    break;
                }
            }

            reporter.on_status(&format!("Collecting from {}...", source));

            match self
                .collect_source(project_id, source, &request, credentials, control)
                .await?
            {
                SourceOutcome::Collected(n) => {
                    items_collected += n;
                    reporter.on_status(&format!(
                        "Collected {} items from {}",
                        format_number(n),
                        source
                    ));
                }
                SourceOutcome::Skipped(reason) => {
                    warn!(project = %project_id, source = %source, reason = %reason, "source skipped");
                    reporter.on_status(&format!("Skipped {}: {}", source, reason));
                    skipped.push(SkippedSource {
                        source: source.clone(),
                        reason,
                    });
                }
                SourceOutcome::Cancelled => {
                    outcome = RunOutcome::Cancelled;
                    break;
                }
            }

            self.projects.mark_source_done(project_id, source).await?;
            finished += 1;
            reporter.on_progress(fraction(finished, total_sources));
        }

        if outcome == RunOutcome::Completed && control.is_cancelled() {
            outcome = RunOutcome::Cancelled;
        }
        if outcome == RunOutcome::Completed {
            outcome = self.finish(project_id, control, reporter).await?;
        }

        match outcome {
            RunOutcome::Completed => {
                let mut message = format!(
                    "Collection completed: {} items",
                    format_number(items_collected)
                );
                if !skipped.is_empty() {
                    let names: Vec<&str> = skipped.iter().map(|s| s.source.as_str()).collect();
                    message.push_str(&format!(" (skipped: {})", names.join(", ")));
                }
                reporter.on_status(&message);
            }
            RunOutcome::Paused => reporter.on_status("Collection paused"),
            RunOutcome::Cancelled => reporter.on_status("Collection cancelled"),
        }

        info!(
            project = %project_id,
            items = items_collected,
            skipped = skipped.len(),
            outcome = ?outcome,
            "collection run finished"
        );

        Ok(RunSummary {
            items_collected,
            outcome,
            skipped,
        })
    }

    /// Validates the start transition and persists `Collecting`. Returns the
    /// project and the sources a paused run already finished.
    async fn enter_collecting(
        &self,
        project_id: Uuid,
    ) -> Result<(Project, Vec<String>), CollectError> {
        let _lock = self.status_lock.lock().await;
        let mut project = self.load(project_id).await?;
        let continuing = project.status == ProjectStatus::Paused;
        project.start_collection()?;

        let done = if continuing {
            self.projects.completed_sources(project_id).await?
        } else {
            self.projects.clear_checkpoints(project_id).await?;
            Vec::new()
        };

        self.projects
            .update_status(project_id, ProjectStatus::Collecting)
            .await?;
        Ok((project, done))
    }

    async fn reassert_collecting(&self, project_id: Uuid) -> Result<(), CollectError> {
        let _lock = self.status_lock.lock().await;
        let mut project = self.load(project_id).await?;
        if project.status == ProjectStatus::Paused {
            project.resume_collection()?;
            self.projects
                .update_status(project_id, ProjectStatus::Collecting)
                .await?;
        }
        Ok(())
    }

    /// Decides what happens at a source boundary.
    ///
    /// Runs under `status_lock`, the same lock `pause` holds while it sets
    /// the live signal and persists `Paused`, so the two reads agree.
    async fn check_boundary(
        &self,
        project_id: Uuid,
        control: &RunControl,
    ) -> Result<Boundary, CollectError> {
        let _lock = self.status_lock.lock().await;
        if control.is_paused() {
            return Ok(Boundary::Wait);
        }
        let mut project = self.load(project_id).await?;
        if project.status != ProjectStatus::Paused {
            return Ok(Boundary::Proceed);
        }
        if control.take_resumed() {
            // Paused and resumed while a source was in flight.
            project.resume_collection()?;
            self.projects
                .update_status(project_id, ProjectStatus::Collecting)
                .await?;
            return Ok(Boundary::Proceed);
        }
        Ok(Boundary::PausedElsewhere)
    }

    /// Blocks on a local pause. Returns `false` if the run was cancelled.
    async fn wait_for_resume(
        &self,
        project_id: Uuid,
        control: &RunControl,
        reporter: &dyn CollectionReporter,
    ) -> Result<bool, CollectError> {
        reporter.on_status("Collection paused");
        info!(project = %project_id, "run blocked on pause");
        if !control.wait_while_paused().await {
            return Ok(false);
        }
        control.take_resumed();
        self.reassert_collecting(project_id).await?;
        reporter.on_status("Collection resumed");
        Ok(true)
    }

    /// Completes the project. A local pause that arrives after the last
    /// source blocks here like any other boundary.
    async fn finish(
        &self,
        project_id: Uuid,
        control: &RunControl,
        reporter: &dyn CollectionReporter,
    ) -> Result<RunOutcome, CollectError> {
        loop {
            {
                let _lock = self.status_lock.lock().await;
                if !control.is_paused() {
                    let mut project = self.load(project_id).await?;
                    if project.status == ProjectStatus::Paused {
                        if !control.take_resumed() {
                            return Ok(RunOutcome::Paused);
                        }
                        project.resume_collection()?;
                    }

                    project.complete_collection()?;
                    self.projects
                        .update_status(project_id, ProjectStatus::Completed)
                        .await?;
                    self.projects.clear_checkpoints(project_id).await?;
                    return Ok(RunOutcome::Completed);
                }
            }
            if !self.wait_for_resume(project_id, control, reporter).await? {
                return Ok(RunOutcome::Cancelled);
            }
        }
    }

    async fn collect_source(
        &self,
        project_id: Uuid,
        source: &str,
        request: &FetchRequest,
        credentials: &Credentials,
        control: &RunControl,
    ) -> Result<SourceOutcome, CollectError> {
        let Some(adapter) = self.adapters.get(source) else {
            return Ok(SourceOutcome::Skipped("no adapter registered".to_string()));
        };

        if let Some(secret) = credentials.get(source) {
            if let Err(e) = adapter.authenticate(secret).await {
                return Ok(SourceOutcome::Skipped(format!("authentication failed: {}", e)));
            }
        }

        if !adapter.is_available().await {
            return Ok(SourceOutcome::Skipped("adapter unavailable".to_string()));
        }

        // Quota counts requests, not items: it can only veto the fetch.
        if adapter.remaining_quota() == 0 {
            return Ok(SourceOutcome::Skipped(
                "rate limited: request quota exhausted".to_string(),
            ));
        }

        let items = match self.fetch_with_retry(adapter.as_ref(), request, control).await {
            Ok(items) => items,
            Err(outcome) => return Ok(outcome),
        };

        let items = valid_items(project_id, source, items);
        let mut written = 0u64;
        for batch in items.chunks(self.settings.batch_size) {
            let n = self
                .persister
                .write_batch(project_id, source, batch)
                .await
                .map_err(|e| {
                    error!(project = %project_id, source, error = %format!("{:#}", e), "batch write failed");
                    CollectError::Persistence(e)
                })?;
            let total = self.projects.add_collected(project_id, n).await?;
            written += n;
            debug!(project = %project_id, source, batch = n, total, "batch persisted");
        }

        info!(project = %project_id, source, items = written, "source collected");
        Ok(SourceOutcome::Collected(written))
    }

    async fn fetch_with_retry(
        &self,
        adapter: &dyn SourceAdapter,
        request: &FetchRequest,
        control: &RunControl,
    ) -> Result<Vec<FetchedItem>, SourceOutcome> {
        let mut attempt = 1u32;
        loop {
            match adapter.fetch(request).await {
                Ok(items) => return Ok(items),
                Err(e) => match self.retry.decide(attempt, e.kind) {
                    RetryDecision::RetryAfter(wait) => {
                        warn!(
                            source = adapter.source_id(),
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            error = %e,
                            "fetch failed, retrying"
                        );
                        if !control.sleep(wait).await {
                            return Err(SourceOutcome::Cancelled);
                        }
                        attempt += 1;
                    }
                    RetryDecision::Exhausted => {
                        let reason = if e.kind.is_transient() {
                            format!("{} (gave up after {} attempts)", e, attempt)
                        } else {
                            e.to_string()
                        };
                        return Err(SourceOutcome::Skipped(reason));
                    }
                },
            }
        }
    }
}

fn valid_items(project_id: Uuid, source: &str, items: Vec<FetchedItem>) -> Vec<FetchedItem> {
    let before = items.len();
    let valid: Vec<FetchedItem> = items
        .into_iter()
        .filter(|item| match item.validate() {
            Ok(()) => true,
            Err(reason) => {
                debug!(project = %project_id, source, reason = %reason, "dropping item");
                false
            }
        })
        .collect();
    if valid.len() < before {
        warn!(
            project = %project_id,
            source,
            dropped = before - valid.len(),
            "dropped invalid items"
        );
    }
    valid
}

fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_of_sources() {
        assert_eq!(fraction(0, 4), 0.0);
        assert_eq!(fraction(1, 4), 0.25);
        assert_eq!(fraction(4, 4), 1.0);
        assert_eq!(fraction(0, 0), 1.0);
    }

    #[test]
    fn settings_clamp_batch_size() {
        let store = Arc::new(crate::store::memory::InMemoryStore::new());
        let orchestrator = Orchestrator::new(
            store.clone(),
            store,
            Arc::new(AdapterRegistry::new()),
        )
        .with_settings(CollectionSettings {
            batch_size: 0,
            max_results: 10,
        });
        assert_eq!(orchestrator.settings.batch_size, 1);
    }
}
