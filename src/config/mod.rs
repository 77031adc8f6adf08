//! Configuration for LooFinder.
//!
//! Loaded from `~/.loofinder/config.json` when present, then overridden by
//! `LOOFINDER_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LooError, Result};

/// Default capacity of the recent-entries index.
pub const DEFAULT_MAX_ENTRIES: usize = 20;
/// Default number of entries returned by the most-viewed query.
pub const DEFAULT_MOST_VIEWED_LIMIT: usize = 10;
/// Default durable key holding the serialized index.
pub const DEFAULT_STORAGE_KEY: &str = "recent_toilets";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Recent-entries cache settings.
    pub recent: RecentConfig,
    /// Durable storage settings.
    pub storage: StorageConfig,
}

/// Settings for the recent-entries cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecentConfig {
    /// Maximum number of entries kept before least-recently-viewed eviction.
    pub max_entries: usize,
    /// Number of entries returned by the most-viewed query.
    pub most_viewed_limit: usize,
    /// Key under which the whole index is persisted.
    pub storage_key: String,
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            most_viewed_limit: DEFAULT_MOST_VIEWED_LIMIT,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl RecentConfig {
    /// Copy of this config with zero limits raised to 1.
    pub fn normalized(mut self) -> Self {
        self.max_entries = self.max_entries.max(1);
        self.most_viewed_limit = self.most_viewed_limit.max(1);
        if self.storage_key.trim().is_empty() {
            self.storage_key = DEFAULT_STORAGE_KEY.to_string();
        }
        self
    }
}

/// Settings for the file-backed durable store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for stored records. Defaults to `~/.loofinder/store`.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Base directory for LooFinder state (`~/.loofinder`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".loofinder")
    }

    /// Path of the config file.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Directory the file store writes to.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .unwrap_or_else(|| Self::dir().join("store"))
    }

    /// Load from the default path and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&Self::path())?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default().normalized());
        }
        let data = std::fs::read_to_string(path).map_err(|e| {
            LooError::Config(format!("Failed to read config at {:?}: {}", path, e))
        })?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|e| LooError::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config.normalized())
    }

    /// Apply `LOOFINDER_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LOOFINDER_RECENT_MAX_ENTRIES") {
            self.recent.max_entries = parse_usize("LOOFINDER_RECENT_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = lookup("LOOFINDER_RECENT_MOST_VIEWED_LIMIT") {
            self.recent.most_viewed_limit =
                parse_usize("LOOFINDER_RECENT_MOST_VIEWED_LIMIT", &value)?;
        }
        if let Some(value) = lookup("LOOFINDER_RECENT_STORAGE_KEY") {
            self.recent.storage_key = value;
        }
        if let Some(value) = lookup("LOOFINDER_STORAGE_DIR") {
            if !value.trim().is_empty() {
                self.storage.dir = Some(PathBuf::from(value));
            }
        }
        self.recent = self.recent.clone().normalized();
        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.recent = self.recent.normalized();
        self
    }
}

fn parse_usize(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| LooError::Config(format!("{name} must be a non-negative integer, got '{value}'")))
}
