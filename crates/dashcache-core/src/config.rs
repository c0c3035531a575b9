//! Application configuration management.
//!
//! Configuration is read from `~/.config/dashcache/config.json` when present,
//! then overridden by environment variables:
//!
//! - `WORD_API_URL`: word-of-the-day sheet endpoint
//! - `QUOTATION_API_URL`: quotations sheet endpoint
//! - `TODOIST_KEY`: task service API token
//! - `DASHCACHE_DB`: path of the SQLite store
//! - `DASHCACHE_TIMEOUT_SECS`: HTTP request timeout

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "dashcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Store file name inside the cache directory
const DATABASE_FILE: &str = "homepage.db";

/// HTTP request timeout in seconds.
/// Sheet endpoints are slow to cold-start, so this is generous.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub word_api_url: Option<String>,
    pub quotation_api_url: Option<String>,
    pub todoist_token: Option<String>,
    pub database_path: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from a key lookup (the process environment in practice).
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("WORD_API_URL") {
            self.word_api_url = Some(url);
        }
        if let Some(url) = get("QUOTATION_API_URL") {
            self.quotation_api_url = Some(url);
        }
        if let Some(token) = get("TODOIST_KEY") {
            self.todoist_token = Some(token);
        }
        if let Some(path) = get("DASHCACHE_DB") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = get("DASHCACHE_TIMEOUT_SECS") {
            match secs.trim().parse() {
                Ok(secs) => self.request_timeout_secs = Some(secs),
                Err(_) => warn!(value = %secs, "Ignoring invalid DASHCACHE_TIMEOUT_SECS"),
            }
        }
    }

    /// Location of the SQLite store.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.database_path {
            return Ok(path.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(DATABASE_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}
