//! Engine configuration.
//!
//! Every component receives its settings from an `EngineConfig` passed to its
//! constructor. The configuration can be persisted as JSON at
//! `~/.config/photobingo/config.json`; missing fields fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
const APP_NAME: &str = "photobingo";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the remote data service
    pub base_url: String,
    /// HTTP request timeout
    pub request_timeout_secs: u64,

    /// Participants fetched per batch
    pub batch_size: usize,
    /// In-flight fetches allowed across the whole loader
    pub concurrency_limit: usize,
    /// Pause between consecutive batches
    pub batch_pause_ms: u64,
    /// Attempts per participant fetch (first try included)
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_ceiling_ms: u64,
    /// Neighbors preloaded on each side of the selected participant
    pub preload_distance: usize,

    pub stats_ttl_secs: u64,
    pub stats_max_entries: usize,

    pub asset_max_entries: usize,
    pub asset_max_bytes: u64,
    /// Cleanup evicts until usage is at or below this fraction of the budget
    pub asset_target_fraction: f64,
    pub asset_cleanup_debounce_ms: u64,

    /// Periodic refresh interval; `None` disables the timer
    pub auto_refresh_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout_secs: 30,

            batch_size: 5,
            concurrency_limit: 3,
            batch_pause_ms: 100,
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_ceiling_ms: 10_000,
            preload_distance: 2,

            stats_ttl_secs: 30,
            stats_max_entries: 50,

            asset_max_entries: 100,
            asset_max_bytes: 50 * 1024 * 1024,
            asset_target_fraction: 0.8,
            asset_cleanup_debounce_ms: 1000,

            auto_refresh_secs: None,
        }
    }
}

impl EngineConfig {
    /// Load the config from the default location, or defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Reject settings that would stall the loader or disable the caches.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.concurrency_limit == 0 {
            anyhow::bail!("concurrency_limit must be at least 1");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.asset_max_entries == 0 || self.asset_max_bytes == 0 {
            anyhow::bail!("asset cache budget must be non-zero");
        }
        if !(self.asset_target_fraction > 0.0 && self.asset_target_fraction <= 1.0) {
            anyhow::bail!("asset_target_fraction must be in (0, 1]");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }

    pub fn asset_cleanup_debounce(&self) -> Duration {
        Duration::from_millis(self.asset_cleanup_debounce_ms)
    }

    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}
