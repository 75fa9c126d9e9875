//! Bounded cache for photo assets and memoized render artifacts.
//!
//! The cache is limited both by entry count and by an estimated byte budget.
//! When an insert pushes usage past either limit, a cleanup pass is scheduled
//! after a short debounce so that bursts of inserts trigger a single pass.
//! Cleanup evicts the lowest-scored entries until usage is back under the
//! target fraction of both limits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::dimensions::{decoded_size_estimate, image_dimensions, BYTES_PER_PIXEL};
use super::CacheEntry;
use crate::config::EngineConfig;

/// Score gained per recorded lookup
const ACCESS_WEIGHT: f64 = 1.0;

/// Score lost per second since the last lookup.
/// An entry idle for 10s ranks like one with a single fewer access.
const IDLE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPayload {
    /// Encoded image bytes, with dimensions when the header was readable
    Image {
        bytes: Vec<u8>,
        dimensions: Option<(u32, u32)>,
    },
    /// Output of an expensive render step, e.g. a board cell's markup
    Rendered(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub reference: String,
    pub payload: AssetPayload,
}

impl Asset {
    pub fn image(reference: impl Into<String>, bytes: Vec<u8>) -> Self {
        let dimensions = image_dimensions(&bytes);
        Self {
            reference: reference.into(),
            payload: AssetPayload::Image { bytes, dimensions },
        }
    }

    pub fn rendered(reference: impl Into<String>, output: String) -> Self {
        Self {
            reference: reference.into(),
            payload: AssetPayload::Rendered(output),
        }
    }

    /// Estimated resident size: decoded pixels for images, length for text.
    pub fn size_estimate(&self) -> u64 {
        match &self.payload {
            AssetPayload::Image {
                dimensions: Some((w, h)),
                ..
            } => u64::from(*w) * u64::from(*h) * BYTES_PER_PIXEL,
            AssetPayload::Image { bytes, .. } => decoded_size_estimate(bytes),
            AssetPayload::Rendered(output) => output.len() as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetCacheStats {
    pub entries: usize,
    pub resident_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl AssetCacheStats {
    /// Fraction of lookups served from the cache (0.0 with no lookups)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_entries: usize,
    max_bytes: u64,
    target_entries: usize,
    target_bytes: u64,
    debounce: Duration,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry<String, Arc<Asset>>>,
    resident_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    cleanup_task: Option<JoinHandle<()>>,
}

impl Inner {
    fn over_limit(&self, limits: &Limits) -> bool {
        self.entries.len() > limits.max_entries || self.resident_bytes > limits.max_bytes
    }

    fn within_target(&self, limits: &Limits) -> bool {
        self.entries.len() <= limits.target_entries && self.resident_bytes <= limits.target_bytes
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<String, Arc<Asset>>> {
        let entry = self.entries.remove(key)?;
        self.resident_bytes = self.resident_bytes.saturating_sub(entry.size_estimate);
        Some(entry)
    }

    /// Evict lowest-scored entries until usage is within target.
    fn cleanup(&mut self, limits: &Limits) -> usize {
        if self.within_target(limits) {
            return 0;
        }

        let now = Instant::now();
        let mut ranked: Vec<(f64, String)> = self
            .entries
            .values()
            .map(|entry| (score(entry, now), entry.key.clone()))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut evicted = 0;
        for (_, key) in ranked {
            if self.within_target(limits) {
                break;
            }
            if self.remove(&key).is_some() {
                evicted += 1;
            }
        }
        self.evictions += evicted as u64;
        evicted
    }
}

fn score<K, V>(entry: &CacheEntry<K, V>, now: Instant) -> f64 {
    let idle_secs = now.saturating_duration_since(entry.last_access).as_secs_f64();
    entry.access_count as f64 * ACCESS_WEIGHT - idle_secs * IDLE_WEIGHT
}

/// Shared, internally synchronized asset cache. Clone the `Arc` to share it
/// between the loader and the rendering layer.
pub struct AssetCache {
    inner: Arc<Mutex<Inner>>,
    limits: Limits,
}

impl AssetCache {
    pub fn new(config: &EngineConfig) -> Self {
        let fraction = config.asset_target_fraction.clamp(0.0, 1.0);
        let limits = Limits {
            max_entries: config.asset_max_entries,
            max_bytes: config.asset_max_bytes,
            target_entries: (config.asset_max_entries as f64 * fraction).floor() as usize,
            target_bytes: (config.asset_max_bytes as f64 * fraction).floor() as u64,
            debounce: config.asset_cleanup_debounce(),
        };
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            limits,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an asset, recording the access and a hit or miss.
    pub fn get(&self, key: &str) -> Option<Arc<Asset>> {
        let mut inner = self.lock();
        let asset = inner
            .entries
            .get_mut(key)
            .map(|entry| Arc::clone(entry.touch()));
        match asset {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        asset
    }

    /// Residency check that leaves access statistics untouched.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Insert or replace an asset. Exceeding either limit schedules cleanup.
    pub fn insert(&self, key: impl Into<String>, asset: Asset) -> Arc<Asset> {
        let key = key.into();
        let asset = Arc::new(asset);
        let size = asset.size_estimate();

        let over_limit = {
            let mut inner = self.lock();
            inner.remove(&key);
            inner
                .entries
                .insert(key.clone(), CacheEntry::new(key.clone(), Arc::clone(&asset), size));
            inner.resident_bytes += size;
            inner.over_limit(&self.limits)
        };

        debug!(key = %key, size, "Asset cached");
        if over_limit {
            self.schedule_cleanup();
        }
        asset
    }

    /// Return the memoized artifact for `key`, rendering it on first use.
    pub fn memoize_artifact<F>(&self, key: &str, render: F) -> Arc<Asset>
    where
        F: FnOnce() -> String,
    {
        if let Some(asset) = self.get(key) {
            return asset;
        }
        self.insert(key, Asset::rendered(key, render()))
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Run a cleanup pass now. Returns the number of evicted entries.
    pub fn cleanup(&self) -> usize {
        let evicted = self.lock().cleanup(&self.limits);
        if evicted > 0 {
            info!(evicted, "Asset cache cleanup");
        }
        evicted
    }

    /// Debounced cleanup: one pending pass at a time. Without a tokio
    /// runtime the pass runs inline.
    fn schedule_cleanup(&self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.cleanup();
                return;
            }
        };

        let mut inner = self.lock();
        if inner
            .cleanup_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            return;
        }

        let shared = Arc::clone(&self.inner);
        let limits = self.limits;
        inner.cleanup_task = Some(handle.spawn(async move {
            tokio::time::sleep(limits.debounce).await;
            let evicted = shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cleanup(&limits);
            debug!(evicted, "Debounced asset cache cleanup finished");
        }));
    }

    /// Drop every entry, cancel any pending cleanup and reset counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        if let Some(task) = inner.cleanup_task.take() {
            task.abort();
        }
        *inner = Inner::default();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_bytes(&self) -> u64 {
        self.lock().resident_bytes
    }

    pub fn stats(&self) -> AssetCacheStats {
        let inner = self.lock();
        AssetCacheStats {
            entries: inner.entries.len(),
            resident_bytes: inner.resident_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::png_header;

    fn cache(max_entries: usize, max_bytes: u64) -> AssetCache {
        AssetCache::new(&EngineConfig {
            asset_max_entries: max_entries,
            asset_max_bytes: max_bytes,
            asset_target_fraction: 0.8,
            asset_cleanup_debounce_ms: 500,
            ..Default::default()
        })
    }

    fn text(len: usize) -> Asset {
        Asset::rendered("r", "x".repeat(len))
    }

    #[test]
    fn test_image_size_uses_decoded_dimensions() {
        let asset = Asset::image("a.png", png_header(100, 50));
        assert_eq!(asset.size_estimate(), 100 * 50 * 4);
    }

    #[test]
    fn test_get_tracks_hits_and_misses() {
        let cache = cache(10, 1_000);
        cache.insert("a", text(10));

        assert!(cache.get("a").is_some());
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_replacing_entry_adjusts_resident_bytes() {
        let cache = cache(10, 1_000);
        cache.insert("a", text(100));
        cache.insert("a", text(40));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resident_bytes(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_enforces_entry_limit() {
        let cache = cache(10, 1_000_000);
        for i in 0..15 {
            cache.insert(format!("k{i}"), text(10));
        }
        assert_eq!(cache.len(), 15);

        cache.cleanup();
        assert!(cache.len() <= 10);
        assert_eq!(cache.len(), 8);
        assert_eq!(cache.stats().evictions, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_enforces_byte_budget() {
        let cache = cache(100, 1_000);
        for i in 0..6 {
            cache.insert(format!("k{i}"), text(300));
        }

        cache.cleanup();
        assert!(cache.resident_bytes() <= 800);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequently_used_entries_survive_eviction() {
        let cache = cache(4, 1_000_000);
        for i in 0..4 {
            cache.insert(format!("k{i}"), text(10));
        }
        for _ in 0..5 {
            cache.get("k0");
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.get("k3");
        cache.insert("k4", text(10));

        cache.cleanup();
        assert_eq!(cache.len(), 3);
        assert!(cache.contains("k0"));
        assert!(cache.contains("k3"));
        assert!(cache.contains("k4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_limit_insert_triggers_debounced_cleanup() {
        let cache = cache(5, 1_000_000);
        for i in 0..8 {
            cache.insert(format!("k{i}"), text(10));
        }
        // Nothing evicted until the debounce elapses
        assert_eq!(cache.len(), 8);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_cleanup_runs_inline_without_runtime() {
        let cache = cache(2, 1_000_000);
        for i in 0..3 {
            cache.insert(format!("k{i}"), text(10));
        }
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_memoize_artifact_renders_once() {
        let cache = cache(10, 1_000);
        let mut renders = 0;
        let first = cache.memoize_artifact("cell-3", || {
            renders += 1;
            "<td>3</td>".to_string()
        });
        let second = cache.memoize_artifact("cell-3", || {
            renders += 1;
            "<td>changed</td>".to_string()
        });

        assert_eq!(renders, 1);
        assert_eq!(first, second);
        assert_eq!(second.payload, AssetPayload::Rendered("<td>3</td>".to_string()));
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let cache = cache(1, 1_000);
        cache.insert("a", text(10));
        cache.insert("b", text(10));
        cache.get("a");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.resident_bytes(), 0);
        assert_eq!(cache.stats().hits, 0);
    }
}
