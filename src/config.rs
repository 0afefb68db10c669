//! Engine configuration.
//!
//! This module defines the scheduling, TTL, and cache-budget configuration,
//! along with a partial patch type for runtime reconfiguration and optional
//! persistence to disk.
//!
//! Configuration is stored at `~/.config/holdsync/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::market::MarketHours;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "holdsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// How often the foreground timer re-evaluates whether a refresh is due.
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Total fetch attempts per refresh cycle before giving up.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retry attempts; grows linearly per attempt.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Collections are refreshed frequently in the foreground, so their
/// entries go stale quickly.
const DEFAULT_COLLECTION_TTL: Duration = Duration::from_secs(5 * 60);

/// Chart data is expensive to regenerate and changes slowly.
const DEFAULT_CHART_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Live prices are only trusted for a very short window.
const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(30);

/// Bookkeeping entries (last-update markers) must survive restarts.
const DEFAULT_META_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Serialized cache size ceiling before chart pruning kicks in.
const DEFAULT_MAX_CACHE_BYTES: u64 = 10 * 1024 * 1024;

/// Chart entries older than this are pruning candidates when over budget.
const DEFAULT_CHART_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Per-tier time-to-live values for cache entries. These are configuration
/// constants rather than per-call-site literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    pub collection: Duration,
    pub chart: Duration,
    pub price: Duration,
    pub meta: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION_TTL,
            chart: DEFAULT_CHART_TTL,
            price: DEFAULT_PRICE_TTL,
            meta: DEFAULT_META_TTL,
        }
    }
}

/// Full engine configuration: scheduling cadence, retry policy, TTL tiers,
/// cache budget, and market hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub update_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub ttl: TtlConfig,
    pub max_cache_bytes: u64,
    pub chart_retention: Duration,
    pub market_hours: MarketHours,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            ttl: TtlConfig::default(),
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            chart_retention: DEFAULT_CHART_RETENTION,
            market_hours: MarketHours::default(),
        }
    }
}

impl SyncConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

/// Partial configuration: every field optional, merged over the current
/// configuration with `apply`. Unset fields keep their existing values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfigPatch {
    pub update_interval: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub ttl: Option<TtlConfig>,
    pub max_cache_bytes: Option<u64>,
    pub chart_retention: Option<Duration>,
    pub market_hours: Option<MarketHours>,
}

impl SyncConfigPatch {
    pub fn apply(&self, config: &mut SyncConfig) {
        if let Some(v) = self.update_interval {
            config.update_interval = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.retry_delay {
            config.retry_delay = v;
        }
        if let Some(v) = self.ttl {
            config.ttl = v;
        }
        if let Some(v) = self.max_cache_bytes {
            config.max_cache_bytes = v;
        }
        if let Some(v) = self.chart_retention {
            config.chart_retention = v;
        }
        if let Some(v) = self.market_hours {
            config.market_hours = v;
        }
    }
}
