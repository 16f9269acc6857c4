//! Source adapter contract and registry.
//!
//! Every platform (authenticated HTTP API, browser-automation scraper
//! export, test fake) is reached through [`SourceAdapter`]. The orchestrator
//! knows nothing beyond this trait.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             AdapterRegistry              │
//! │  ┌─────────┐ ┌─────────┐ ┌────────────┐  │
//! │  │  dump   │ │  http   │ │  custom    │  │
//! │  │ (jsonl) │ │ (JSON)  │ │  (Rust)    │  │
//! │  └─────────┘ └─────────┘ └────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        Orchestrator::start() → BatchPersister
//! ```
//!
//! # Usage
//!
//! ```rust
//! use crisis_harvest::adapter::AdapterRegistry;
//!
//! let adapters = AdapterRegistry::new();
//! assert!(adapters.is_empty());
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter_dump::DumpAdapter;
use crate::adapter_http::HttpAdapter;
use crate::config::Config;
use crate::error::FetchError;
use crate::models::{DateRange, Engagement, FetchedItem};

/// What to fetch: the project's keyword set and date range, capped.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub keywords: Vec<String>,
    pub date_range: DateRange,
    pub max_results: usize,
}

/// Wire shape shared by the built-in adapters: one line of a JSON-lines
/// export, or one element of an HTTP search response. Unknown fields are
/// ignored.
#[derive(Debug, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub author: String,
    #[serde(alias = "text")]
    pub content: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub views: u64,
}

impl ItemRecord {
    pub fn into_item(self, collected_at: DateTime<Utc>) -> FetchedItem {
        FetchedItem {
            external_id: self.id,
            author: self.author,
            content: self.content,
            published_at: self.published_at,
            engagement: Engagement {
                likes: self.likes,
                shares: self.shares,
                comments: self.comments,
                views: self.views,
            }
            .clamped(),
            url: self.url,
            collected_at,
        }
    }
}

/// A data source the orchestrator can collect from.
///
/// Adapters are shared behind `Arc`, so any session state set by
/// [`authenticate`](SourceAdapter::authenticate) lives behind interior
/// mutability. Every failure must carry the right
/// [`FailureKind`](crate::error::FailureKind): the retry policy trusts it.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use crisis_harvest::adapter::{FetchRequest, SourceAdapter};
/// use crisis_harvest::error::FetchError;
/// use crisis_harvest::models::FetchedItem;
///
/// pub struct ArchiveAdapter;
///
/// #[async_trait]
/// impl SourceAdapter for ArchiveAdapter {
///     fn source_id(&self) -> &str { "archive" }
///     fn description(&self) -> &str { "Posts from a local archive" }
///
///     async fn authenticate(&self, _credentials: &str) -> Result<(), FetchError> { Ok(()) }
///     async fn is_available(&self) -> bool { true }
///
///     async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<FetchedItem>, FetchError> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The id projects use to enable this source (e.g. `"reddit"`).
    fn source_id(&self) -> &str;

    /// One-line description, shown by `harvest sources`.
    fn description(&self) -> &str;

    /// Adapter kind (`"dump"`, `"http"`, `"custom"`).
    fn adapter_type(&self) -> &str {
        "custom"
    }

    /// Establish a session with resolved credential material.
    async fn authenticate(&self, credentials: &str) -> Result<(), FetchError>;

    /// Whether the source can be queried right now.
    async fn is_available(&self) -> bool;

    /// Requests left in the current rate-limit window, or `-1` when not
    /// applicable. The orchestrator skips the source on `0` and otherwise
    /// ignores the value.
    fn remaining_quota(&self) -> i64 {
        -1
    }

    /// Fetch items matching any keyword within the date range, at most
    /// `max_results` of them.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<FetchedItem>, FetchError>;
}

/// Credential material resolved by the caller before a run, keyed by source id.
#[derive(Clone, Default)]
pub struct Credentials {
    secrets: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, secret: impl Into<String>) {
        self.secrets.insert(source.into(), secret.into());
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.secrets.get(source).map(String::as_str)
    }

    /// Reads each configured `credentials_env` variable that is set.
    pub fn from_env(config: &Config) -> Self {
        let mut creds = Self::new();
        for (name, http) in &config.adapters.http {
            if let Some(var) = &http.credentials_env {
                if let Ok(value) = std::env::var(var) {
                    creds.insert(name.clone(), value);
                }
            }
        }
        creds
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources: Vec<&String> = self.secrets.keys().collect();
        sources.sort();
        f.debug_struct("Credentials")
            .field("sources", &sources)
            .finish()
    }
}

/// Registry of adapters, looked up by source id.
///
/// Use [`AdapterRegistry::from_config`] to load the built-in adapters from
/// the config file, then [`register`](AdapterRegistry::register) custom ones.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty adapter registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Create a registry with every `dump` and `http` adapter from the config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut registry = Self::new();

        for (name, cfg) in &config.adapters.dump {
            registry.register(Arc::new(DumpAdapter::new(name.clone(), cfg.clone())?));
        }
        for (name, cfg) in &config.adapters.http {
            registry.register(Arc::new(HttpAdapter::new(name.clone(), cfg.clone())?));
        }

        Ok(registry)
    }

    /// Register an adapter, replacing any previous one with the same source id.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters
            .retain(|existing| existing.source_id() != adapter.source_id());
        self.adapters.push(adapter);
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.source_id() == source_id)
            .cloned()
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl SourceAdapter for Named {
        fn source_id(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        async fn authenticate(&self, _credentials: &str) -> Result<(), FetchError> {
            Ok(())
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<FetchedItem>, FetchError> {
            Ok(vec![])
        }
    }

    #[test]
    fn register_replaces_same_source_id() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(Named("a", "first")));
        registry.register(Arc::new(Named("b", "other")));
        registry.register(Arc::new(Named("a", "second")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a").unwrap().description(), "second");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn oversized_counters_are_clamped() {
        let record: ItemRecord = serde_json::from_str(
            r#"{"id":"1","author":"a","text":"flood","published_at":"2024-09-02T00:00:00Z","likes":18446744073709551615,"views":7}"#,
        )
        .unwrap();
        let item = record.into_item(Utc::now());
        assert_eq!(item.content, "flood");
        assert_eq!(item.engagement.likes, Engagement::MAX_COUNT);
        assert_eq!(item.engagement.views, 7);
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let mut creds = Credentials::new();
        creds.insert("reddit", "s3cr3t");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("reddit"));
        assert!(!debug.contains("s3cr3t"));
        assert_eq!(creds.get("reddit"), Some("s3cr3t"));
    }
}
