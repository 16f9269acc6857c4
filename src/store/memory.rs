//! In-memory [`ProjectStore`] and [`BatchPersister`] for tests and dry runs.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Items are keyed by the same
//! (project, source, external id) triple the SQLite schema enforces.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{FetchedItem, Project, ProjectStatus, StoredItem};

use super::{BatchPersister, ProjectStore};

type ItemKey = (Uuid, String, String);

/// In-memory store for tests.
pub struct InMemoryStore {
    projects: RwLock<HashMap<Uuid, Project>>,
    items: RwLock<HashMap<ItemKey, StoredItem>>,
    checkpoints: RwLock<HashMap<Uuid, Vec<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            items: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Stored items of a project, ordered by source then external id.
    pub fn items(&self, project_id: Uuid) -> Result<Vec<StoredItem>> {
        let items = self.items.read().map_err(|_| poisoned())?;
        let mut out: Vec<StoredItem> = items
            .values()
            .filter(|i| i.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        Ok(out)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn create(&self, project: &Project) -> Result<()> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        if projects.contains_key(&project.id) {
            anyhow::bail!("project {} already exists", project.id);
        }
        projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Project>> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        Ok(projects.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        let mut out: Vec<Project> = projects.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update_status(&self, id: Uuid, status: ProjectStatus) -> Result<()> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| anyhow!("project not found: {}", id))?;
        project.status = status;
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn add_collected(&self, id: Uuid, n: u64) -> Result<u64> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| anyhow!("project not found: {}", id))?;
        project.total_items_collected += n;
        project.updated_at = Utc::now();
        Ok(project.total_items_collected)
    }

    async fn completed_sources(&self, id: Uuid) -> Result<Vec<String>> {
        let checkpoints = self.checkpoints.read().map_err(|_| poisoned())?;
        Ok(checkpoints.get(&id).cloned().unwrap_or_default())
    }

    async fn mark_source_done(&self, id: Uuid, source: &str) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().map_err(|_| poisoned())?;
        let done = checkpoints.entry(id).or_default();
        if !done.iter().any(|s| s == source) {
            done.push(source.to_string());
        }
        Ok(())
    }

    async fn clear_checkpoints(&self, id: Uuid) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().map_err(|_| poisoned())?;
        checkpoints.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BatchPersister for InMemoryStore {
    async fn write_batch(
        &self,
        project_id: Uuid,
        source: &str,
        items: &[FetchedItem],
    ) -> Result<u64> {
        let mut stored = self.items.write().map_err(|_| poisoned())?;
        for item in items {
            let row = StoredItem::from_fetched(project_id, source, item, None);
            stored.insert(
                (project_id, source.to_string(), item.external_id.clone()),
                row,
            );
        }
        Ok(items.len() as u64)
    }
}
