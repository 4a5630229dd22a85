//! Tiered Cache Module
//!
//! Facade that puts a [`MemoryTier`] in front of a [`BackingStore`].
//!
//! Reads check memory first and promote store hits. Writes go to the store
//! first and only then to memory, so a failed or interrupted write can cost
//! speed but never durability.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{Admission, CacheStats, MemoryTier, StatsRecorder};
use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::store::BackingStore;

// == Pressure ==
/// Memory tier occupancy relative to the high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    /// `current_size <= high_water`
    Nominal,
    /// `high_water < current_size <= capacity`; the next cleanup will evict
    Pressured,
}

// == Tiered Cache ==
/// Two-tier cache: bounded memory tier plus durable backing store.
///
/// Construct once at startup and share through an `Arc`.
pub struct TieredCache<V, S> {
    memory: MemoryTier<V>,
    store: S,
    stats: StatsRecorder,
    high_water: usize,
    low_water: usize,
    inline_cleanup: bool,
}

impl<V, S> TieredCache<V, S>
where
    V: Serialize + Send + Sync + 'static,
    S: BackingStore<V>,
{
    // == Constructor ==
    /// Creates a cache over `store` with a validated configuration.
    pub fn new(store: S, config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    /// Creates a cache with [`CacheConfig::default`].
    pub fn with_defaults(store: S) -> Self {
        Self::build(store, &CacheConfig::default())
    }

    fn build(store: S, config: &CacheConfig) -> Self {
        info!(
            capacity = config.capacity_bytes,
            high_water = config.high_water_bytes(),
            low_water = config.low_water_bytes(),
            recency = ?config.recency,
            inline_cleanup = config.inline_cleanup,
            "tiered cache created"
        );
        Self {
            memory: MemoryTier::new(config.capacity_bytes, config.recency),
            store,
            stats: StatsRecorder::new(),
            high_water: config.high_water_bytes(),
            low_water: config.low_water_bytes(),
            inline_cleanup: config.inline_cleanup,
        }
    }

    // == Get ==
    /// Returns the value for `key` from memory, or from the store on a memory miss.
    ///
    /// A store hit is promoted into memory on a best-effort basis: a `set` or
    /// `invalidate` of the same key during the store read wins over the value
    /// read. A key absent from both tiers is `Ok(None)`. Store errors are
    /// returned unchanged.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<V>>, S::Error> {
        if let Some(value) = self.memory.lookup(key) {
            self.stats.record_memory_hit();
            return Ok(Some(value));
        }

        let fence = self.memory.fence(key);
        let value = match self.store.read(key).await {
            Ok(Some(value)) => Arc::new(value),
            Ok(None) => {
                self.stats.record_miss();
                return Ok(None);
            }
            Err(e) => {
                self.stats.record_store_error();
                warn!(key, error = %e, "backing store read failed");
                return Err(e);
            }
        };

        self.stats.record_store_hit();
        let admission = fence.promote(value.clone());
        self.after_admission(key, admission);
        Ok(Some(value))
    }

    // == Set ==
    /// Writes `value` to the store, then offers it to memory.
    ///
    /// Succeeds once the store acknowledges the write. If the store write
    /// fails the memory tier is not touched. If memory refuses the value, any
    /// older cached value for `key` is dropped.
    pub async fn set(&self, key: &str, value: V) -> Result<(), S::Error> {
        if let Err(e) = self.store.write(key, &value).await {
            self.stats.record_store_error();
            warn!(key, error = %e, "backing store write failed");
            return Err(e);
        }

        let admission = self.memory.put(key, value);
        if !admission.is_admitted() {
            self.memory.remove(key);
        }
        self.after_admission(key, admission);
        Ok(())
    }

    // == Invalidate ==
    /// Drops the memory entry for `key`, leaving the store untouched.
    ///
    /// For callers that change the store out of band.
    pub fn invalidate(&self, key: &str) -> bool {
        self.memory.remove(key)
    }

    // == Cleanup ==
    /// Evicts oldest entries down to the low-water mark once the tier is
    /// above the high-water mark. Returns the number of entries evicted.
    pub fn cleanup(&self) -> usize {
        let evicted = self.memory.sweep(self.high_water, self.low_water);
        if evicted > 0 {
            self.stats.record_evictions(evicted);
            debug!(
                evicted,
                current_size = self.memory.current_size(),
                "memory tier cleanup"
            );
        }
        evicted
    }

    pub fn pressure(&self) -> Pressure {
        if self.memory.current_size() > self.high_water {
            Pressure::Pressured
        } else {
            Pressure::Nominal
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let (entries, current_size) = self.memory.gauges();
        self.stats
            .snapshot(entries, current_size, self.memory.capacity())
    }

    pub fn memory(&self) -> &MemoryTier<V> {
        &self.memory
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Byte size above which cleanup evicts.
    pub fn high_water_bytes(&self) -> usize {
        self.high_water
    }

    /// Byte size cleanup evicts down to.
    pub fn low_water_bytes(&self) -> usize {
        self.low_water
    }

    fn after_admission(&self, key: &str, admission: Admission) {
        if admission.is_admitted() {
            self.stats.record_admission();
            if self.inline_cleanup {
                self.cleanup();
            }
        } else {
            self.stats.record_refusal();
            debug!(key, ?admission, "memory tier admission refused");
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use crate::config::RecencyPolicy;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    /// A string of `n` characters serializes to `n + 2` bytes.
    fn sized(n: usize) -> String {
        "x".repeat(n - 2)
    }

    fn config(capacity: usize) -> CacheConfig {
        CacheConfig {
            capacity_bytes: capacity,
            inline_cleanup: false,
            ..CacheConfig::default()
        }
    }

    fn cache(capacity: usize) -> TieredCache<String, MemoryStore<String>> {
        TieredCache::new(MemoryStore::new(), &config(capacity)).unwrap()
    }

    /// Store whose reads capture the current value, then wait for a permit
    /// before returning it.
    struct GatedStore {
        inner: MemoryStore<String>,
        gate: Semaphore,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl BackingStore<String> for GatedStore {
        type Error = StoreError;

        async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
            let value = self.inner.read(key).await?;
            let _permit = self.gate.acquire().await.unwrap();
            Ok(value)
        }

        async fn write(&self, key: &str, value: &String) -> Result<(), StoreError> {
            self.inner.write(key, value).await
        }
    }

    fn gated_cache(capacity: usize) -> TieredCache<String, GatedStore> {
        TieredCache::new(GatedStore::new(), &config(capacity)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let bad = CacheConfig {
            low_water: 0.9,
            ..CacheConfig::default()
        };
        let result = TieredCache::<String, _>::new(MemoryStore::<String>::new(), &bad);
        assert!(matches!(result, Err(ConfigError::InvalidWatermarks { .. })));
    }

    #[test]
    fn test_with_defaults() {
        let cache = TieredCache::<String, _>::with_defaults(MemoryStore::<String>::new());
        assert_eq!(cache.memory().capacity(), 50 * 1024 * 1024);
        assert_eq!(cache.memory().policy(), RecencyPolicy::Write);
        assert_eq!(cache.high_water_bytes(), CacheConfig::default().high_water_bytes());
    }

    #[tokio::test]
    async fn test_set_then_get_from_memory() {
        let cache = cache(100);

        cache.set("page", sized(10)).await.unwrap();
        let value = cache.get("page").await.unwrap();

        assert_eq!(value.as_deref(), Some(&sized(10)));
        assert_eq!(cache.store().writes(), 1);
        assert_eq!(cache.store().reads(), 0);
        assert_eq!(cache.stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn test_get_miss_in_both_tiers() {
        let cache = cache(100);

        assert!(cache.get("missing").await.unwrap().is_none());
        assert_eq!(cache.stats().misses, 1);
        assert!(cache.memory().is_empty());
    }

    #[tokio::test]
    async fn test_read_through_promotion() {
        let cache = cache(100);
        cache.store().seed("page", sized(10));

        let first = cache.get("page").await.unwrap();
        assert_eq!(first.as_deref(), Some(&sized(10)));
        assert_eq!(cache.store().reads(), 1);
        assert!(cache.memory().contains("page"));

        let second = cache.get("page").await.unwrap();
        assert_eq!(second.as_deref(), Some(&sized(10)));
        assert_eq!(cache.store().reads(), 1);

        let stats = cache.stats();
        assert_eq!(stats.store_hits, 1);
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.admissions, 1);
    }

    #[tokio::test]
    async fn test_oversized_value_round_trips_through_store() {
        let cache = cache(50);

        cache.set("big", sized(80)).await.unwrap();
        assert!(!cache.memory().contains("big"));
        assert!(cache.store().contains("big"));

        let value = cache.get("big").await.unwrap();
        assert_eq!(value.as_deref(), Some(&sized(80)));
        assert_eq!(cache.store().reads(), 1);
        assert_eq!(cache.memory().current_size(), 0);
        assert_eq!(cache.stats().refusals, 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let cache = cache(100);
        cache.set("page", "v1".to_string()).await.unwrap();
        let before = cache.memory().audit();

        cache.store().set_available(false);
        let result = cache.set("page", "v2".to_string()).await;
        let fresh = cache.set("other", "v1".to_string()).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(fresh.is_err());
        assert_eq!(cache.memory().audit(), before);
        assert!(!cache.memory().contains("other"));
        assert_eq!(
            cache.memory().lookup("page").as_deref().map(String::as_str),
            Some("v1")
        );
        assert_eq!(cache.stats().store_errors, 2);
    }

    #[tokio::test]
    async fn test_failed_read_propagates() {
        let cache = cache(100);
        cache.store().seed("page", "v".to_string());
        cache.store().set_available(false);

        let result = cache.get("page").await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(cache.memory().is_empty());
    }

    #[tokio::test]
    async fn test_memory_hit_survives_store_outage() {
        let cache = cache(100);
        cache.set("page", "v".to_string()).await.unwrap();
        cache.store().set_available(false);

        assert!(cache.get("page").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refused_overwrite_never_serves_stale_value() {
        let cache = cache(50);
        cache.set("page", sized(10)).await.unwrap();

        // Too large for memory: the old 10-byte value must not survive
        cache.set("page", sized(60)).await.unwrap();

        assert!(!cache.memory().contains("page"));
        let value = cache.get("page").await.unwrap();
        assert_eq!(value.as_deref(), Some(&sized(60)));
    }

    #[tokio::test]
    async fn test_cleanup_evicts_oldest_to_low_water() {
        let cache = cache(90);
        cache.set("a", sized(30)).await.unwrap();
        cache.set("b", sized(30)).await.unwrap();
        cache.set("c", sized(30)).await.unwrap();
        assert_eq!(cache.pressure(), Pressure::Pressured);

        // high water 72, low water 45
        let evicted = cache.cleanup();

        assert_eq!(evicted, 2);
        assert!(!cache.memory().contains("a"));
        assert!(!cache.memory().contains("b"));
        assert!(cache.memory().contains("c"));
        assert_eq!(cache.pressure(), Pressure::Nominal);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test]
    async fn test_cleanup_below_high_water_is_noop() {
        let cache = cache(100);
        cache.set("a", sized(40)).await.unwrap();
        cache.set("b", sized(40)).await.unwrap();

        assert_eq!(cache.pressure(), Pressure::Nominal);
        assert_eq!(cache.cleanup(), 0);
        assert_eq!(cache.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_inline_cleanup_relieves_pressure() {
        let config = CacheConfig {
            capacity_bytes: 100,
            ..CacheConfig::default()
        };
        let cache = TieredCache::<String, _>::new(MemoryStore::<String>::new(), &config).unwrap();

        cache.set("a", sized(40)).await.unwrap();
        cache.set("b", sized(40)).await.unwrap();
        assert_eq!(cache.memory().len(), 2);

        // 90 bytes crosses the 80 byte high water; trimmed to <= 50
        cache.set("c", sized(10)).await.unwrap();

        assert!(!cache.memory().contains("a"));
        assert!(cache.memory().contains("b"));
        assert!(cache.memory().contains("c"));
        assert_eq!(cache.memory().current_size(), 50);
        assert!(cache.store().contains("a"));
    }

    #[tokio::test]
    async fn test_evicted_key_still_served_from_store() {
        let cache = cache(90);
        for key in ["a", "b", "c"] {
            cache.set(key, sized(30)).await.unwrap();
        }
        cache.cleanup();

        let value = cache.get("a").await.unwrap();
        assert_eq!(value.as_deref(), Some(&sized(30)));
        assert_eq!(cache.store().reads(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_store_read() {
        let cache = cache(100);
        cache.set("page", "v1".to_string()).await.unwrap();
        cache.store().seed("page", "v2".to_string());

        assert!(cache.invalidate("page"));
        let value = cache.get("page").await.unwrap();

        assert_eq!(value.as_deref().map(String::as_str), Some("v2"));
    }

    #[tokio::test]
    async fn test_accounting_matches_after_mixed_operations() {
        let cache = cache(200);
        for i in 0..40 {
            let key = format!("k{}", i % 7);
            cache.set(&key, sized(5 + i * 3)).await.unwrap();
            if i % 5 == 0 {
                cache.invalidate(&key);
            }
            let _ = cache.get(&format!("k{}", (i + 3) % 7)).await.unwrap();
            cache.cleanup();

            let audit = cache.memory().audit();
            assert!(audit.is_consistent(), "{audit:?}");
            assert!(audit.recorded_size <= 200);
        }
    }

    #[tokio::test]
    async fn test_promotion_survives_set_of_other_key() {
        let cache = gated_cache(100);
        cache.store().inner.seed("page", "v1".to_string());

        let (got, ()) = tokio::join!(cache.get("page"), async {
            cache.set("other", "x".to_string()).await.unwrap();
            cache.store().gate.add_permits(1);
        });

        assert_eq!(got.unwrap().as_deref().map(String::as_str), Some("v1"));
        assert!(cache.memory().contains("page"));
        assert!(cache.memory().contains("other"));
        assert_eq!(cache.stats().admissions, 2);
        assert_eq!(cache.memory().open_fences(), 0);
    }

    #[tokio::test]
    async fn test_promotion_refused_after_set_of_same_key() {
        let cache = gated_cache(100);
        cache.store().inner.seed("page", "old".to_string());

        let (got, ()) = tokio::join!(cache.get("page"), async {
            cache.set("page", "new".to_string()).await.unwrap();
            cache.store().gate.add_permits(1);
        });

        // The read started before the write, so it returns the old value
        // but must not overwrite the newer cached one
        assert_eq!(got.unwrap().as_deref().map(String::as_str), Some("old"));
        assert_eq!(
            cache.memory().lookup("page").as_deref().map(String::as_str),
            Some("new")
        );
        assert_eq!(cache.stats().refusals, 1);
    }

    #[tokio::test]
    async fn test_promotion_refused_after_invalidate_of_same_key() {
        let cache = gated_cache(100);
        cache.store().inner.seed("page", "old".to_string());

        let (got, ()) = tokio::join!(cache.get("page"), async {
            cache.invalidate("page");
            cache.store().gate.add_permits(1);
        });

        assert!(got.unwrap().is_some());
        assert!(!cache.memory().contains("page"));
    }

    #[tokio::test]
    async fn test_cancelled_read_closes_fence() {
        let cache = gated_cache(100);
        cache.store().inner.seed("page", "v1".to_string());

        let read = tokio::time::timeout(Duration::from_millis(10), cache.get("page")).await;
        assert!(read.is_err());
        assert_eq!(cache.memory().open_fences(), 0);

        cache.store().gate.add_permits(1);
        assert!(cache.get("page").await.unwrap().is_some());
        assert!(cache.memory().contains("page"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_reads_promote_under_steady_writes_elsewhere() {
        let cache = Arc::new(gated_cache(10_000));
        for i in 0..20 {
            cache.store().inner.seed(&format!("page{i}"), format!("body{i}"));
        }

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for n in 0..200u32 {
                    cache.set(&format!("other{}", n % 4), n.to_string()).await.unwrap();
                    cache.store().gate.add_permits(1);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        let mut readers = Vec::new();
        for i in 0..20 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                cache.get(&format!("page{i}")).await.unwrap()
            }));
        }
        for reader in readers {
            assert!(reader.await.unwrap().is_some());
        }
        writer.await.unwrap();

        let promoted = (0..20)
            .filter(|i| cache.memory().contains(&format!("page{i}")))
            .count();
        assert_eq!(promoted, 20);
        assert_eq!(cache.memory().open_fences(), 0);
    }

    #[tokio::test]
    async fn test_unmeasurable_overwrite_drops_cached_value() {
        type Grid = HashMap<(u8, u8), u8>;
        let cache = TieredCache::<Grid, _>::new(MemoryStore::<Grid>::new(), &config(100)).unwrap();

        // An empty map serializes; a map with tuple keys does not
        cache.set("grid", Grid::new()).await.unwrap();
        assert!(cache.memory().contains("grid"));

        let mut grid = Grid::new();
        grid.insert((1, 2), 3);
        cache.set("grid", grid.clone()).await.unwrap();

        assert!(!cache.memory().contains("grid"));
        assert!(cache.store().contains("grid"));
        let got = cache.get("grid").await.unwrap();
        assert_eq!(got.as_deref(), Some(&grid));
        assert_eq!(cache.stats().refusals, 2);
    }
}
