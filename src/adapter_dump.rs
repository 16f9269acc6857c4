//! Adapter over JSON-lines exports.
//!
//! Browser-automation scrapers run out of process and drop their results as
//! `*.jsonl` files, one [`ItemRecord`] per line. This adapter walks the
//! configured root, applies the include/exclude globs, and filters records
//! by keyword and date range the same way an API-backed source would.

use async_trait::async_trait;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::adapter::{FetchRequest, ItemRecord, SourceAdapter};
use crate::config::DumpAdapterConfig;
use crate::error::FetchError;
use crate::models::FetchedItem;

pub struct DumpAdapter {
    name: String,
    description: String,
    config: DumpAdapterConfig,
    include: GlobSet,
    exclude: GlobSet,
}

impl DumpAdapter {
    pub fn new(name: String, config: DumpAdapterConfig) -> anyhow::Result<Self> {
        let include = build_globset(&config.include_globs)?;
        let exclude = build_globset(&config.exclude_globs)?;
        let description = format!("JSON-lines export at {}", config.root.display());
        Ok(Self {
            name,
            description,
            config,
            include,
            exclude,
        })
    }

    fn scan(&self, request: &FetchRequest) -> Result<Vec<FetchedItem>, FetchError> {
        let root = &self.config.root;
        if !root.exists() {
            return Err(FetchError::permanent(format!(
                "export root does not exist: {}",
                root.display()
            )));
        }

        let collected_at = Utc::now();
        let mut items = Vec::new();

        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| FetchError::transient(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            for record in read_records(path)? {
                if matches_request(&record, request) {
                    items.push(record.into_item(collected_at));
                }
            }
        }

        // Oldest first, ties broken by id, for deterministic batches.
        items.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        items.truncate(request.max_results);

        Ok(items)
    }
}

fn read_records(path: &Path) -> Result<Vec<ItemRecord>, FetchError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        let message = format!("{}: {}", path.display(), e);
        // Not UTF-8: rereading the same bytes will not help.
        if e.kind() == std::io::ErrorKind::InvalidData {
            FetchError::permanent(message)
        } else {
            FetchError::transient(message)
        }
    })?;

    let mut records = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ItemRecord = serde_json::from_str(line).map_err(|e| {
            FetchError::permanent(format!("{}:{}: {}", path.display(), n + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

fn matches_request(record: &ItemRecord, request: &FetchRequest) -> bool {
    if !request.date_range.contains(record.published_at.date_naive()) {
        return false;
    }
    let content = record.content.to_lowercase();
    request.keywords.iter().any(|k| content.contains(k.as_str()))
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[async_trait]
impl SourceAdapter for DumpAdapter {
    fn source_id(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn adapter_type(&self) -> &str {
        "dump"
    }

    async fn authenticate(&self, _credentials: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.config.root.is_dir()
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<FetchedItem>, FetchError> {
        self.scan(request)
    }
}
