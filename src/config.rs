//! Optional TOML configuration.
//!
//! Every key is optional; command-line flags override file values.
//!
//! ```toml
//! [index]
//! dir = "~/.jirafts/work"
//!
//! [sync]
//! url = "https://jira.example.com"
//! auth = "~/.jirafts/token"
//! projects = ["OPS", "WEB"]
//! concurrency = 8
//! page_size = 50
//! language = "en"
//!
//! [search]
//! limit = 10
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::fetcher::{DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE};
use crate::index::{is_supported_language, DEFAULT_LANGUAGE, INDEX_DIR_NAME};
use crate::search::DEFAULT_LIMIT;
use crate::store::DB_FILE_NAME;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

impl IndexConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join(DB_FILE_NAME)
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_DIR_NAME)
    }
}

/// `~/.jirafts/default_index`
pub fn default_index_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".jirafts")
        .join("default_index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default)]
    pub url: Option<String>,
    /// Credentials, or a path to a file holding them.
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth: None,
            projects: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}
fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.index.dir = expand_home(&config.index.dir);
    if let Some(auth) = config.sync.auth.take() {
        config.sync.auth = Some(expand_home(Path::new(&auth)).to_string_lossy().into_owned());
    }

    validate(&config)?;
    Ok(config)
}

/// Check the value ranges of a (possibly CLI-overridden) configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.sync.concurrency == 0 {
        anyhow::bail!("sync.concurrency must be >= 1");
    }
    if config.sync.page_size == 0 {
        anyhow::bail!("sync.page_size must be >= 1");
    }
    if config.search.limit == 0 {
        anyhow::bail!("search.limit must be >= 1");
    }
    if !is_supported_language(&config.sync.language) {
        anyhow::bail!(
            "Unknown index language: '{}'. Use an ISO code such as en, de, fr or ru.",
            config.sync.language
        );
    }
    Ok(())
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
