//! Best-effort local cache of the last authoritative snapshot.
//!
//! Not a source of truth: the remote store is. The cache exists so an
//! embedder can paint the previous session's records before the first load
//! answers. Reads and writes never fail the caller; any IO or parse problem
//! degrades to "no cache".

use crate::model::Expense;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage key, kept stable across versions so upgrades reuse the cache.
const CACHE_KEY: &str = "zenith-expenses-v1";
const APP_DIR: &str = "zenith";

#[derive(Debug, Clone)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    /// A cache file named by the storage key inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{CACHE_KEY}.json")),
        }
    }

    /// The cache in the platform's per-user data directory, or `None` on
    /// platforms without one.
    pub fn in_default_dir() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join(APP_DIR)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached records, returning an empty list when the cache is
    /// missing, unreadable or malformed.
    pub async fn load(&self) -> Vec<Expense> {
        match self.try_load().await {
            Ok(expenses) => expenses,
            Err(e) => {
                debug!("expense cache unavailable: {e:#}");
                Vec::new()
            }
        }
    }

    /// Writes `expenses` to the cache, logging and swallowing any failure.
    pub async fn save(&self, expenses: &[Expense]) {
        if let Err(e) = self.try_save(expenses).await {
            warn!("failed to write expense cache: {e:#}");
        }
    }

    async fn try_load(&self) -> anyhow::Result<Vec<Expense>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    async fn try_save(&self, expenses: &[Expense]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let json = serde_json::to_vec(expenses).context("unable to serialize expense cache")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("unable to write {}", self.path.display()))
    }
}
