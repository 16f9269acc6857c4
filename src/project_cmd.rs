//! Project management and inspection commands.
//!
//! Backs `harvest project create|list|show|archive`, `harvest status`,
//! `harvest pause` and `harvest items`. Output goes to stdout.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::adapter::AdapterRegistry;
use crate::config::Config;
use crate::models::{content_preview, DateRange, NewProject, Project, ProjectStatus};
use crate::orchestrator::Orchestrator;
use crate::sqlite_store::SqliteStore;
use crate::store::ProjectStore;

/// Arguments of `harvest project create`.
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub name: String,
    pub event: String,
    pub region: String,
    pub start: String,
    pub end: String,
    pub keywords: Vec<String>,
    pub sources: Vec<String>,
}

pub fn parse_project_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).with_context(|| format!("invalid project id: {}", id))
}

pub async fn run_create(config: &Config, args: CreateArgs) -> Result<()> {
    let project = Project::new(NewProject {
        name: args.name,
        target_event: args.event,
        region: args.region,
        date_range: DateRange::parse(&args.start, &args.end)?,
        keywords: args.keywords,
        sources: args.sources,
    })?;

    let configured = config.adapters.source_ids();
    for source in &project.sources {
        if !configured.contains(source) {
            warn!(source = %source, "source has no configured adapter; it will be skipped at collection time");
        }
    }

    let store = SqliteStore::open(config).await?;
    store.create(&project).await?;
    store.close().await;

    println!("created project {}", project.id);
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let projects = store.list().await?;
    store.close().await;

    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<11} {:>8}  {:<23}  NAME",
        "ID", "STATUS", "ITEMS", "RANGE"
    );
    for p in &projects {
        println!(
            "{:<36}  {:<11} {:>8}  {} .. {}  {}",
            p.id,
            p.status,
            p.total_items_collected,
            p.date_range.start(),
            p.date_range.end(),
            p.name
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let id = parse_project_id(id)?;
    let store = SqliteStore::open(config).await?;
    let project = store
        .get(id)
        .await?
        .with_context(|| format!("project not found: {}", id))?;
    let done = store.completed_sources(id).await?;

    println!("--- Project ---");
    println!("id:           {}", project.id);
    println!("name:         {}", project.name);
    println!("event:        {}", project.target_event);
    println!("region:       {}", project.region);
    println!(
        "date range:   {} .. {} ({} days)",
        project.date_range.start(),
        project.date_range.end(),
        project.date_range.days()
    );
    println!("keywords:     {}", project.keywords.join(", "));
    println!("status:       {}", project.status);
    println!("items:        {}", project.total_items_collected);
    println!("created_at:   {}", project.created_at.to_rfc3339());
    println!("updated_at:   {}", project.updated_at.to_rfc3339());
    println!();

    println!("--- Sources ({}) ---", project.sources.len());
    for source in &project.sources {
        let stored = store.count_items(id, Some(source)).await?;
        let mark = if done.contains(source) { "done" } else { "" };
        println!("{:<16} {:>8} items  {}", source, stored, mark);
    }

    store.close().await;
    Ok(())
}

pub async fn run_archive(config: &Config, id: &str) -> Result<()> {
    let id = parse_project_id(id)?;
    let store = SqliteStore::open(config).await?;
    let mut project = store
        .get(id)
        .await?
        .with_context(|| format!("project not found: {}", id))?;
    project.archive()?;
    store.update_status(id, ProjectStatus::Archived).await?;
    store.close().await;

    println!("archived project {}", id);
    Ok(())
}

fn orchestrator(store: Arc<SqliteStore>, config: &Config) -> Orchestrator {
    // Status and pause never fetch, so no adapters are needed.
    Orchestrator::new(store.clone(), store, Arc::new(AdapterRegistry::new())).configured(config)
}

pub async fn run_status(config: &Config, id: &str) -> Result<()> {
    let id = parse_project_id(id)?;
    let store = Arc::new(SqliteStore::open(config).await?);
    let status = orchestrator(store.clone(), config).status(id).await?;
    let stored = store.count_items(id, None).await?;
    store.close().await;

    println!("project {}", status.project_id);
    println!("  name: {}", status.name);
    println!("  status: {}", status.status);
    println!("  items collected: {}", status.total_items_collected);
    println!("  items stored: {}", stored);
    Ok(())
}

pub async fn run_pause(config: &Config, id: &str) -> Result<()> {
    let id = parse_project_id(id)?;
    let store = Arc::new(SqliteStore::open(config).await?);
    orchestrator(store.clone(), config).pause(id).await?;
    store.close().await;

    println!("paused project {}", id);
    Ok(())
}

pub async fn run_items(
    config: &Config,
    id: &str,
    source: Option<String>,
    limit: i64,
) -> Result<()> {
    let id = parse_project_id(id)?;
    let store = SqliteStore::open(config).await?;
    let items = store.list_items(id, source.as_deref(), limit).await?;
    store.close().await;

    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }

    for item in &items {
        println!(
            "{}  {:<12} {:<20} {:>6}  {}",
            item.published_at.format("%Y-%m-%d %H:%M"),
            item.source,
            item.external_id,
            item.engagement.total(),
            content_preview(&item.content).replace('\n', " ")
        );
    }
    Ok(())
}
