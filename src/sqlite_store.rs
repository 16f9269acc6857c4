//! SQLite-backed [`ProjectStore`] and [`BatchPersister`].
//!
//! Batch writes go to the raw-content store first (best effort), then every
//! metadata row of the batch is upserted in one transaction. A row only
//! carries a `raw_path` when that file was actually written.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::models::{
    DateRange, Engagement, FetchedItem, Project, ProjectStatus, StoredItem,
};
use crate::raw::RawContentStore;
use crate::store::{BatchPersister, ProjectStore};

pub struct SqliteStore {
    pool: SqlitePool,
    raw: Option<RawContentStore>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, raw: None }
    }

    /// Connects to the configured database with the configured raw store.
    /// The schema must already exist (`harvest init`).
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Ok(Self::new(pool).with_raw_store(RawContentStore::new(&config.storage.raw_dir)))
    }

    /// Also write each batch to `raw`.
    pub fn with_raw_store(mut self, raw: RawContentStore) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Items stored for a project, optionally for one source.
    pub async fn count_items(&self, project_id: Uuid, source: Option<&str>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE project_id = ? AND (? IS NULL OR source = ?)",
        )
        .bind(project_id.to_string())
        .bind(source)
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    /// Most recently published first.
    pub async fn list_items(
        &self,
        project_id: Uuid,
        source: Option<&str>,
        limit: i64,
    ) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM items
            WHERE project_id = ? AND (? IS NULL OR source = ?)
            ORDER BY published_at DESC, source ASC, external_id ASC
            LIMIT ?
            "#,
        )
        .bind(project_id.to_string())
        .bind(source)
        .bind(source)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    pub async fn get_item(
        &self,
        project_id: Uuid,
        source: &str,
        external_id: &str,
    ) -> Result<Option<StoredItem>> {
        let row = sqlx::query(
            "SELECT * FROM items WHERE project_id = ? AND source = ? AND external_id = ?",
        )
        .bind(project_id.to_string())
        .bind(source)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_item).transpose()
    }
}

/// Counters above `i64::MAX` are stored saturated instead of wrapping.
fn to_sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn ts_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("timestamp out of range: {}", ts))
}

fn row_to_project(row: &SqliteRow) -> Result<Project> {
    let id: String = row.get("id");
    let start: String = row.get("start_date");
    let end: String = row.get("end_date");
    let keywords_json: String = row.get("keywords_json");
    let sources_json: String = row.get("sources_json");
    let status: String = row.get("status");
    let total: i64 = row.get("total_items_collected");

    let date_range = DateRange::new(
        NaiveDate::parse_from_str(&start, "%Y-%m-%d")?,
        NaiveDate::parse_from_str(&end, "%Y-%m-%d")?,
    )?;

    Ok(Project {
        id: Uuid::parse_str(&id).with_context(|| format!("bad project id: {}", id))?,
        name: row.get("name"),
        target_event: row.get("target_event"),
        region: row.get("region"),
        date_range,
        keywords: serde_json::from_str(&keywords_json)?,
        sources: serde_json::from_str(&sources_json)?,
        status: status.parse()?,
        total_items_collected: total.max(0) as u64,
        created_at: ts_to_datetime(row.get("created_at"))?,
        updated_at: ts_to_datetime(row.get("updated_at"))?,
    })
}

fn row_to_item(row: &SqliteRow) -> Result<StoredItem> {
    let project_id: String = row.get("project_id");
    let count = |col: &str| -> u64 { row.get::<i64, _>(col).max(0) as u64 };

    Ok(StoredItem {
        project_id: Uuid::parse_str(&project_id)?,
        source: row.get("source"),
        external_id: row.get("external_id"),
        author: row.get("author"),
        content: row.get("content"),
        published_at: ts_to_datetime(row.get("published_at"))?,
        engagement: Engagement {
            likes: count("likes"),
            shares: count("shares"),
            comments: count("comments"),
            views: count("views"),
        },
        url: row.get("url"),
        collected_at: ts_to_datetime(row.get("collected_at"))?,
        raw_path: row.get("raw_path"),
        content_hash: row.get("content_hash"),
    })
}

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn create(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, target_event, region, start_date, end_date,
                                  keywords_json, sources_json, status,
                                  total_items_collected, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(&project.target_event)
        .bind(&project.region)
        .bind(project.date_range.start().to_string())
        .bind(project.date_range.end().to_string())
        .bind(serde_json::to_string(&project.keywords)?)
        .bind(serde_json::to_string(&project.sources)?)
        .bind(project.status.as_str())
        .bind(to_sql_count(project.total_items_collected))
        .bind(project.created_at.timestamp())
        .bind(project.updated_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_project).transpose()
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at DESC, name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_project).collect()
    }

    async fn update_status(&self, id: Uuid, status: ProjectStatus) -> Result<()> {
        let result = sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().timestamp())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("project not found: {}", id);
        }
        Ok(())
    }

    async fn add_collected(&self, id: Uuid, n: u64) -> Result<u64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE projects
            SET total_items_collected = total_items_collected + ?, updated_at = ?
            WHERE id = ?
            RETURNING total_items_collected
            "#,
        )
        .bind(to_sql_count(n))
        .bind(Utc::now().timestamp())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        total
            .map(|t| t.max(0) as u64)
            .ok_or_else(|| anyhow!("project not found: {}", id))
    }

    async fn completed_sources(&self, id: Uuid) -> Result<Vec<String>> {
        let sources: Vec<String> = sqlx::query_scalar(
            "SELECT source FROM collection_checkpoints WHERE project_id = ? ORDER BY completed_at, source",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    async fn mark_source_done(&self, id: Uuid, source: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_checkpoints (project_id, source, completed_at) VALUES (?, ?, ?)
            ON CONFLICT(project_id, source) DO UPDATE SET completed_at = excluded.completed_at
            "#,
        )
        .bind(id.to_string())
        .bind(source)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_checkpoints(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM collection_checkpoints WHERE project_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BatchPersister for SqliteStore {
    async fn write_batch(
        &self,
        project_id: Uuid,
        source: &str,
        items: &[FetchedItem],
    ) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let raw_path = match &self.raw {
            Some(raw) => match raw.write_batch(project_id, source, items).await {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    warn!(project = %project_id, source, error = %format!("{:#}", e), "raw content write failed; storing metadata only");
                    None
                }
            },
            None => None,
        };

        let mut tx = self.pool.begin().await?;

        for item in items {
            let row = StoredItem::from_fetched(project_id, source, item, raw_path.clone());
            sqlx::query(
                r#"
                INSERT INTO items (project_id, source, external_id, author, content, published_at,
                                   likes, shares, comments, views, url, collected_at,
                                   raw_path, content_hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(project_id, source, external_id) DO UPDATE SET
                    author = excluded.author,
                    content = excluded.content,
                    published_at = excluded.published_at,
                    likes = excluded.likes,
                    shares = excluded.shares,
                    comments = excluded.comments,
                    views = excluded.views,
                    url = excluded.url,
                    collected_at = excluded.collected_at,
                    raw_path = excluded.raw_path,
                    content_hash = excluded.content_hash
                "#,
            )
            .bind(row.project_id.to_string())
            .bind(&row.source)
            .bind(&row.external_id)
            .bind(&row.author)
            .bind(&row.content)
            .bind(row.published_at.timestamp())
            .bind(to_sql_count(row.engagement.likes))
            .bind(to_sql_count(row.engagement.shares))
            .bind(to_sql_count(row.engagement.comments))
            .bind(to_sql_count(row.engagement.views))
            .bind(&row.url)
            .bind(row.collected_at.timestamp())
            .bind(&row.raw_path)
            .bind(&row.content_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(items.len() as u64)
    }
}
