use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the raw-content store.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("./data/raw")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-source result cap handed to `fetch`.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_results: default_max_results(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_max_results() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}

/// Adapter instances keyed by name. The name is the source id projects refer to.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdaptersConfig {
    #[serde(default)]
    pub dump: BTreeMap<String, DumpAdapterConfig>,
    #[serde(default)]
    pub http: BTreeMap<String, HttpAdapterConfig>,
}

impl AdaptersConfig {
    pub fn source_ids(&self) -> Vec<String> {
        self.dump.keys().chain(self.http.keys()).cloned().collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DumpAdapterConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.jsonl".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpAdapterConfig {
    pub base_url: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    /// Environment variable the CLI reads the bearer token from.
    #[serde(default)]
    pub credentials_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_path() -> String {
    "/search".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.collection.batch_size == 0 {
        anyhow::bail!("collection.batch_size must be > 0");
    }
    if config.collection.max_results == 0 {
        anyhow::bail!("collection.max_results must be > 0");
    }
    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }

    for name in config.adapters.http.keys() {
        if config.adapters.dump.contains_key(name) {
            anyhow::bail!(
                "adapter name '{}' is used by both a dump and an http adapter",
                name
            );
        }
    }

    for (name, http) in &config.adapters.http {
        if !(http.base_url.starts_with("http://") || http.base_url.starts_with("https://")) {
            anyhow::bail!(
                "adapters.http.{}.base_url must start with http:// or https://",
                name
            );
        }
        if http.timeout_secs == 0 {
            anyhow::bail!("adapters.http.{}.timeout_secs must be > 0", name);
        }
    }

    Ok(())
}
