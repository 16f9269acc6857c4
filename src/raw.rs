//! Raw-content store.
//!
//! Every persisted batch is also written verbatim as one pretty-printed JSON
//! file so analysis can be re-run against exactly what a source returned:
//!
//! ```text
//! {raw_dir}/{project}/{source}/{YYYY-MM-DD}/{millis}-{n}.json
//! ```
//!
//! The date is the publication date of the batch's first item.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::models::FetchedItem;

/// On-disk shape of one batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBatchFile {
    pub project_id: Uuid,
    pub source: String,
    pub written_at: DateTime<Utc>,
    pub items: Vec<FetchedItem>,
}

pub struct RawContentStore {
    root: PathBuf,
    seq: AtomicU64,
}

impl RawContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the batch and returns the file path.
    pub async fn write_batch(
        &self,
        project_id: Uuid,
        source: &str,
        items: &[FetchedItem],
    ) -> Result<PathBuf> {
        let written_at = Utc::now();
        let day = items
            .first()
            .map(|i| i.published_at)
            .unwrap_or(written_at)
            .format("%Y-%m-%d")
            .to_string();

        let dir = self
            .root
            .join(project_id.to_string())
            .join(path_segment(source))
            .join(day);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        // The sequence number keeps names unique within one millisecond.
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}-{}.json", written_at.timestamp_millis(), n));

        let file = RawBatchFile {
            project_id,
            source: source.to_string(),
            written_at,
            items: items.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}

pub async fn read_batch(path: &Path) -> Result<RawBatchFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid raw batch file: {}", path.display()))
}

/// Source ids come from config keys; keep them from escaping the root.
fn path_segment(source: &str) -> String {
    let cleaned: String = source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn item(id: &str) -> FetchedItem {
        FetchedItem {
            external_id: id.into(),
            author: "anon".into(),
            content: "nước lên nhanh".into(),
            published_at: Utc.with_ymd_and_hms(2024, 9, 8, 6, 0, 0).unwrap(),
            engagement: Default::default(),
            url: None,
            collected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_dated_batch_file() {
        let tmp = TempDir::new().unwrap();
        let store = RawContentStore::new(tmp.path());
        let project = Uuid::new_v4();

        let a = store.write_batch(project, "reddit", &[item("1"), item("2")]).await.unwrap();
        let b = store.write_batch(project, "reddit", &[item("3")]).await.unwrap();
        assert_ne!(a, b);

        let expected_dir = tmp
            .path()
            .join(project.to_string())
            .join("reddit")
            .join("2024-09-08");
        assert_eq!(a.parent().unwrap(), expected_dir);

        let file = read_batch(&a).await.unwrap();
        assert_eq!(file.project_id, project);
        assert_eq!(file.source, "reddit");
        assert_eq!(file.items.len(), 2);
        assert_eq!(file.items[0].content, "nước lên nhanh");
    }

    #[test]
    fn path_segments_stay_inside_root() {
        assert_eq!(path_segment("reddit"), "reddit");
        assert_eq!(path_segment("../etc"), ".._etc");
        assert_eq!(path_segment(".."), "_");
        assert_eq!(path_segment("a/b"), "a_b");
    }
}
