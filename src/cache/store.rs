//! Namespaced TTL cache over a persisted key-value medium.
//!
//! Every entry is wrapped in a `CacheEntry` envelope carrying its write
//! time and expiry. Reads treat expired entries as misses and delete them
//! on the spot, so correctness never depends on a background sweep;
//! `optimize_memory` additionally bounds storage growth by dropping
//! expired/corrupt entries and pruning old chart data when over budget.
//!
//! Storage failures never propagate: a failed read degrades to a miss, a
//! failed write to a no-op, both logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::models::{NormalizedAsset, PricePoint, PriceUpdate};

use super::storage::Storage;

// ============================================================================
// Constants
// ============================================================================

/// Fixed prefix for every key this engine owns in the storage medium.
const KEY_PREFIX: &str = "holdsync_";

/// The single key under which the whole asset collection is cached.
const COLLECTION_KEY: &str = "all";

/// Meta key holding the timestamp of the last successful full refresh.
const LAST_UPDATE_KEY: &str = "last_update";

// ============================================================================
// Cache entry envelope
// ============================================================================

/// Wrapper persisted around every cached value.
///
/// An entry is valid iff `now < expires_at`; expired entries read as
/// misses and are physically removed on first touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = now
            .checked_add_signed(chrono_duration(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            data,
            timestamp: now,
            expires_at,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Saturating std-to-chrono duration conversion; oversized TTLs clamp to
/// the far future instead of failing.
fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

// ============================================================================
// Namespaces
// ============================================================================

/// Logical key groups inside the shared prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// The full asset collection, one entry.
    Collection,
    /// Individual assets keyed by id.
    Asset,
    /// Price time series keyed by `<symbol>_<timeframe>`.
    Chart,
    /// Live price quotes keyed by symbol.
    Price,
    /// Engine bookkeeping (last-update marker).
    Meta,
}

impl Namespace {
    fn prefix(&self) -> &'static str {
        match self {
            Namespace::Collection => "assets",
            Namespace::Asset => "asset",
            Namespace::Chart => "chart",
            Namespace::Price => "price",
            Namespace::Meta => "meta",
        }
    }

    /// Full storage key for a logical key in this namespace,
    /// e.g. `holdsync_asset_42`.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}_{}", KEY_PREFIX, self.prefix(), key)
    }

    /// Whether a storage key belongs to this namespace.
    fn owns(&self, storage_key: &str) -> bool {
        storage_key.starts_with(&format!("{}{}_", KEY_PREFIX, self.prefix()))
    }
}

/// Result of one `optimize_memory` pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Entries removed because they were expired or unparseable.
    pub removed_expired: usize,
    /// Chart entries pruned to get back under the size budget.
    pub pruned_chart: usize,
    /// Serialized size of the surviving entries.
    pub total_bytes: u64,
}

// ============================================================================
// Cache store
// ============================================================================

/// Namespaced TTL cache. Cheap to clone; the storage backend is shared.
#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<dyn Storage>,
    ttl_collection: Duration,
    ttl_chart: Duration,
    ttl_price: Duration,
    ttl_meta: Duration,
    max_cache_bytes: u64,
    chart_retention: Duration,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn Storage>, config: &SyncConfig) -> Self {
        Self {
            storage,
            ttl_collection: config.ttl.collection,
            ttl_chart: config.ttl.chart,
            ttl_price: config.ttl.price,
            ttl_meta: config.ttl.meta,
            max_cache_bytes: config.max_cache_bytes,
            chart_retention: config.chart_retention,
        }
    }

    // =========================================================================
    // Generic namespaced access
    // =========================================================================

    /// Write an entry, unconditionally replacing any prior value at the key.
    /// Storage failures degrade to a logged no-op.
    pub async fn set<T: Serialize>(&self, ns: Namespace, key: &str, value: &T, ttl: Duration) {
        self.set_at(ns, key, value, ttl, Utc::now()).await
    }

    pub async fn set_at<T: Serialize>(
        &self,
        ns: Namespace,
        key: &str,
        value: &T,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry::new(value, now, ttl);
        let contents = match serde_json::to_string(&entry) {
            Ok(c) => c,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(&ns.storage_key(key), &contents).await {
            warn!(key, error = %e, "Failed to write cache entry");
        }
    }

    /// Read an entry. Misses, expired entries, corrupt entries, and storage
    /// failures all return `None`; expired and corrupt entries are removed
    /// on the way out (lazy eviction).
    pub async fn get<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> Option<T> {
        self.get_at(ns, key, Utc::now()).await
    }

    pub async fn get_at<T: DeserializeOwned>(
        &self,
        ns: Namespace,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let storage_key = ns.storage_key(key);
        let contents = match self.storage.get_item(&storage_key).await {
            Ok(Some(c)) => c,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry<T>>(&contents) {
            Ok(entry) if entry.is_valid(now) => Some(entry.data),
            Ok(_) => {
                debug!(key = %storage_key, "Cache entry expired, evicting");
                self.delete_quietly(&storage_key).await;
                None
            }
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Corrupt cache entry, evicting");
                self.delete_quietly(&storage_key).await;
                None
            }
        }
    }

    /// Explicit invalidation of one key.
    pub async fn remove(&self, ns: Namespace, key: &str) {
        self.delete_quietly(&ns.storage_key(key)).await;
    }

    /// Explicit invalidation of a whole namespace.
    pub async fn remove_namespace(&self, ns: Namespace) {
        let keys = match self.storage.get_all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                return;
            }
        };
        let owned: Vec<String> = keys.into_iter().filter(|k| ns.owns(k)).collect();
        if let Err(e) = self.storage.multi_remove(&owned).await {
            warn!(error = %e, "Failed to remove namespace entries");
        }
    }

    /// Drop every entry this engine owns.
    pub async fn clear(&self) {
        let keys = match self.storage.get_all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                return;
            }
        };
        let owned: Vec<String> = keys
            .into_iter()
            .filter(|k| k.starts_with(KEY_PREFIX))
            .collect();
        if let Err(e) = self.storage.multi_remove(&owned).await {
            warn!(error = %e, "Failed to clear cache");
        }
        info!("Cache cleared");
    }

    async fn delete_quietly(&self, storage_key: &str) {
        if let Err(e) = self.storage.remove_item(storage_key).await {
            warn!(key = %storage_key, error = %e, "Failed to remove cache entry");
        }
    }

    // =========================================================================
    // Asset collection (write-through)
    // =========================================================================

    /// Cache the full collection and, write-through, each asset under its
    /// own id so targeted reads don't have to load the whole collection.
    pub async fn cache_assets(&self, assets: &[NormalizedAsset]) {
        self.cache_assets_at(assets, Utc::now()).await
    }

    pub async fn cache_assets_at(&self, assets: &[NormalizedAsset], now: DateTime<Utc>) {
        self.set_at(
            Namespace::Collection,
            COLLECTION_KEY,
            &assets,
            self.ttl_collection,
            now,
        )
        .await;
        for asset in assets {
            self.set_at(Namespace::Asset, &asset.id, asset, self.ttl_collection, now)
                .await;
        }
        debug!(count = assets.len(), "Asset collection cached");
    }

    pub async fn cached_assets(&self) -> Option<Vec<NormalizedAsset>> {
        self.get(Namespace::Collection, COLLECTION_KEY).await
    }

    /// One asset by id, preferring the per-id entry and falling back to a
    /// scan of the collection entry when the per-id write didn't survive.
    pub async fn cached_asset(&self, id: &str) -> Option<NormalizedAsset> {
        if let Some(asset) = self.get::<NormalizedAsset>(Namespace::Asset, id).await {
            return Some(asset);
        }
        self.cached_assets()
            .await
            .and_then(|assets| assets.into_iter().find(|a| a.id == id))
    }

    /// Remove one holding everywhere it is cached.
    pub async fn remove_asset(&self, id: &str) {
        self.remove(Namespace::Asset, id).await;
        if let Some(mut assets) = self.cached_assets().await {
            assets.retain(|a| a.id != id);
            self.set(
                Namespace::Collection,
                COLLECTION_KEY,
                &assets,
                self.ttl_collection,
            )
            .await;
        }
    }

    // =========================================================================
    // Prices and time series
    // =========================================================================

    pub async fn cache_price(&self, update: &PriceUpdate) {
        self.set(Namespace::Price, &update.symbol, update, self.ttl_price)
            .await;
    }

    pub async fn price(&self, symbol: &str) -> Option<PriceUpdate> {
        self.get(Namespace::Price, symbol).await
    }

    pub async fn cache_chart(&self, symbol: &str, timeframe: &str, points: &[PricePoint]) {
        let key = format!("{}_{}", symbol, timeframe);
        self.set(Namespace::Chart, &key, &points, self.ttl_chart).await;
    }

    pub async fn chart(&self, symbol: &str, timeframe: &str) -> Option<Vec<PricePoint>> {
        let key = format!("{}_{}", symbol, timeframe);
        self.get(Namespace::Chart, &key).await
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    /// Persist the last successful full-refresh timestamp; survives
    /// process restarts alongside the data it describes.
    pub async fn set_last_update(&self, at: DateTime<Utc>) {
        self.set(Namespace::Meta, LAST_UPDATE_KEY, &at, self.ttl_meta)
            .await;
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.get(Namespace::Meta, LAST_UPDATE_KEY).await
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Bound storage growth: drop expired and corrupt entries, then, if the
    /// serialized cache still exceeds the size budget, prune chart entries
    /// older than the retention window, oldest first, until under budget.
    pub async fn optimize_memory(&self) -> MaintenanceReport {
        self.optimize_memory_at(Utc::now()).await
    }

    pub async fn optimize_memory_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        let keys = match self.storage.get_all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys for maintenance");
                return report;
            }
        };

        let mut dead: Vec<String> = Vec::new();
        // Surviving entries: (storage key, write time, serialized size).
        let mut live: Vec<(String, DateTime<Utc>, u64)> = Vec::new();

        for key in keys.into_iter().filter(|k| k.starts_with(KEY_PREFIX)) {
            let contents = match self.storage.get_item(&key).await {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache read failed during maintenance");
                    continue;
                }
            };
            match serde_json::from_str::<CacheEntry<serde_json::Value>>(&contents) {
                Ok(entry) if entry.is_valid(now) => {
                    live.push((key, entry.timestamp, contents.len() as u64));
                }
                // Unparseable entries count as expired and go the same way.
                _ => dead.push(key),
            }
        }

        report.removed_expired = dead.len();
        if !dead.is_empty() {
            if let Err(e) = self.storage.multi_remove(&dead).await {
                warn!(error = %e, "Failed to remove expired cache entries");
            }
        }

        let mut total: u64 = live.iter().map(|(_, _, len)| len).sum();
        if total > self.max_cache_bytes {
            let cutoff = now
                .checked_sub_signed(chrono_duration(self.chart_retention))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let mut candidates: Vec<&(String, DateTime<Utc>, u64)> = live
                .iter()
                .filter(|(key, written, _)| Namespace::Chart.owns(key) && *written < cutoff)
                .collect();
            candidates.sort_by_key(|(_, written, _)| *written);

            for (key, _, len) in candidates {
                if total <= self.max_cache_bytes {
                    break;
                }
                self.delete_quietly(key).await;
                total = total.saturating_sub(*len);
                report.pruned_chart += 1;
            }
        }

        report.total_bytes = total;
        info!(
            removed = report.removed_expired,
            pruned = report.pruned_chart,
            bytes = report.total_bytes,
            "Cache maintenance complete"
        );
        report
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::{MemoryStorage, StorageError};
    use crate::models::{AssetDetails, AssetKind};
    use async_trait::async_trait;

    fn now() -> DateTime<Utc> {
        static NOW: std::sync::OnceLock<DateTime<Utc>> = std::sync::OnceLock::new();
        *NOW.get_or_init(Utc::now)
    }

    fn store() -> (CacheStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = CacheStore::new(storage.clone(), &SyncConfig::default());
        (store, storage)
    }

    fn sample_asset(id: &str) -> NormalizedAsset {
        NormalizedAsset {
            id: id.to_string(),
            name: format!("Asset {}", id),
            kind: AssetKind::Stock,
            total_value: 100.0,
            total_gain_loss: 10.0,
            total_gain_loss_percent: 11.1,
            details: AssetDetails::Tradable {
                symbol: format!("SYM{}", id),
                currency: "INR".to_string(),
                quantity: 1.0,
                average_purchase_price: 90.0,
                current_price: 100.0,
                daily_change: 1.0,
                daily_change_percent: 1.0,
            },
            last_updated: now(),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[tokio::test]
    async fn test_set_then_get_returns_value() {
        let (store, _) = store();
        store
            .set_at(Namespace::Price, "TCS", &42.5_f64, Duration::from_secs(30), now())
            .await;
        let got: Option<f64> = store.get_at(Namespace::Price, "TCS", now()).await;
        assert_eq!(got, Some(42.5));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_evicted() {
        let (store, storage) = store();
        store
            .set_at(Namespace::Price, "TCS", &42.5_f64, Duration::from_secs(30), now())
            .await;

        let later = now() + chrono::Duration::seconds(31);
        let got: Option<f64> = store.get_at(Namespace::Price, "TCS", later).await;
        assert_eq!(got, None);

        // Lazy eviction removed the key from the medium as well.
        let keys = storage.get_all_keys().await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_entry_valid_until_exact_expiry() {
        let (store, _) = store();
        store
            .set_at(Namespace::Price, "TCS", &1.0_f64, Duration::from_secs(30), now())
            .await;

        let just_before = now() + chrono::Duration::seconds(29);
        assert_eq!(
            store.get_at::<f64>(Namespace::Price, "TCS", just_before).await,
            Some(1.0)
        );
        // now == expires_at reads as expired.
        let at_expiry = now() + chrono::Duration::seconds(30);
        assert_eq!(store.get_at::<f64>(Namespace::Price, "TCS", at_expiry).await, None);
    }

    #[tokio::test]
    async fn test_set_overwrites_unconditionally() {
        let (store, _) = store();
        store
            .set_at(Namespace::Asset, "1", &"old", Duration::from_secs(300), now())
            .await;
        store
            .set_at(Namespace::Asset, "1", &"new", Duration::from_secs(300), now())
            .await;
        let got: Option<String> = store.get_at(Namespace::Asset, "1", now()).await;
        assert_eq!(got, Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss_and_evicted() {
        let (store, storage) = store();
        storage
            .set_item(&Namespace::Asset.storage_key("1"), "not json at all")
            .await
            .unwrap();

        let got: Option<String> = store.get_at(Namespace::Asset, "1", now()).await;
        assert_eq!(got, None);
        assert!(storage.get_all_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_through_creates_per_id_entries() {
        let (store, storage) = store();
        let assets = vec![sample_asset("1"), sample_asset("2")];
        store.cache_assets_at(&assets, now()).await;

        let mut keys = storage.get_all_keys().await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "holdsync_asset_1".to_string(),
                "holdsync_asset_2".to_string(),
                "holdsync_assets_all".to_string(),
            ]
        );

        let one = store.cached_asset("2").await.unwrap();
        assert_eq!(one.name, "Asset 2");
    }

    #[tokio::test]
    async fn test_cached_asset_falls_back_to_collection() {
        let (store, _) = store();
        let assets = vec![sample_asset("1")];
        store.cache_assets_at(&assets, now()).await;

        // Simulate a lost per-id write.
        store.remove(Namespace::Asset, "1").await;
        let one = store.cached_asset("1").await.unwrap();
        assert_eq!(one.id, "1");
    }

    #[tokio::test]
    async fn test_remove_asset_updates_collection() {
        let (store, _) = store();
        store
            .cache_assets_at(&[sample_asset("1"), sample_asset("2")], now())
            .await;
        store.remove_asset("1").await;

        assert_eq!(store.cached_asset("1").await, None);
        let remaining = store.cached_assets().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "2");
    }

    #[tokio::test]
    async fn test_clear_removes_only_owned_keys() {
        let (store, storage) = store();
        store.cache_assets_at(&[sample_asset("1")], now()).await;
        storage.set_item("other_app_key", "keep me").await.unwrap();

        store.clear().await;

        let keys = storage.get_all_keys().await.unwrap();
        assert_eq!(keys, vec!["other_app_key".to_string()]);
    }

    #[tokio::test]
    async fn test_last_update_round_trip() {
        let (store, _) = store();
        assert_eq!(store.last_update().await, None);
        store.set_last_update(now()).await;
        assert_eq!(store.last_update().await, Some(now()));
    }

    #[tokio::test]
    async fn test_optimize_memory_removes_expired_and_corrupt() {
        let (store, storage) = store();
        store
            .set_at(Namespace::Price, "OLD", &1.0_f64, Duration::from_secs(10), now())
            .await;
        store
            .set_at(Namespace::Asset, "live", &"ok", Duration::from_secs(600), now())
            .await;
        storage
            .set_item("holdsync_asset_corrupt", "garbage")
            .await
            .unwrap();

        let later = now() + chrono::Duration::seconds(60);
        let report = store.optimize_memory_at(later).await;

        assert_eq!(report.removed_expired, 2);
        assert_eq!(report.pruned_chart, 0);

        let mut keys = storage.get_all_keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["holdsync_asset_live".to_string()]);
    }

    #[tokio::test]
    async fn test_optimize_memory_prunes_old_charts_oldest_first() {
        let storage = Arc::new(MemoryStorage::new());
        let mut config = SyncConfig::default();
        config.max_cache_bytes = 600;
        let store = CacheStore::new(storage.clone(), &config);

        let big = vec![0.0_f64; 100]; // ~500 bytes serialized with envelope

        // Three chart entries written on different days, all older than the
        // retention window relative to `probe`.
        let probe = now() + chrono::Duration::days(30);
        let oldest = now();
        let middle = now() + chrono::Duration::days(1);
        let newest = now() + chrono::Duration::days(2);
        store
            .set_at(Namespace::Chart, "A_1d", &big, Duration::from_secs(86400 * 90), oldest)
            .await;
        store
            .set_at(Namespace::Chart, "B_1d", &big, Duration::from_secs(86400 * 90), middle)
            .await;
        store
            .set_at(Namespace::Chart, "C_1d", &big, Duration::from_secs(86400 * 90), newest)
            .await;

        let report = store.optimize_memory_at(probe).await;
        assert_eq!(report.pruned_chart, 2, "unexpected report {:?}", report);

        // Oldest entries go first; the newest chart fits the budget alone.
        let keys = storage.get_all_keys().await.unwrap();
        assert!(!keys.contains(&"holdsync_chart_A_1d".to_string()));
        assert!(!keys.contains(&"holdsync_chart_B_1d".to_string()));
        assert!(keys.contains(&"holdsync_chart_C_1d".to_string()));
    }

    #[tokio::test]
    async fn test_optimize_memory_spares_recent_charts() {
        let storage = Arc::new(MemoryStorage::new());
        let mut config = SyncConfig::default();
        config.max_cache_bytes = 100;
        let store = CacheStore::new(storage.clone(), &config);

        let big = vec![0.0_f64; 100];
        // Written just now: inside the retention window, so never pruned
        // even though the cache is over budget.
        store
            .set_at(Namespace::Chart, "A_1d", &big, Duration::from_secs(86400), now())
            .await;

        let report = store.optimize_memory_at(now()).await;
        assert_eq!(report.pruned_chart, 0);
        assert_eq!(storage.get_all_keys().await.unwrap().len(), 1);
    }

    // A storage backend that fails every operation, for degradation tests.
    struct FailingStorage;

    #[async_trait]
    impl Storage for FailingStorage {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }
        async fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }
        async fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }
        async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }
        async fn multi_remove(&self, _keys: &[String]) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failures_degrade_to_miss_and_noop() {
        let store = CacheStore::new(Arc::new(FailingStorage), &SyncConfig::default());

        // None of these may panic or propagate an error.
        store
            .set(Namespace::Asset, "1", &"value", Duration::from_secs(60))
            .await;
        assert_eq!(store.get::<String>(Namespace::Asset, "1").await, None);
        store.remove(Namespace::Asset, "1").await;
        store.clear().await;
        let report = store.optimize_memory().await;
        assert_eq!(report, MaintenanceReport::default());
    }
}
