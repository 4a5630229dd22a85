//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, admissions, and evictions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads answered by the memory tier
    pub memory_hits: u64,
    /// Reads answered by the backing store
    pub store_hits: u64,
    /// Reads found in neither tier
    pub misses: u64,
    /// Values admitted to the memory tier
    pub admissions: u64,
    /// Values the memory tier declined to hold
    pub refusals: u64,
    /// Entries removed by cleanup sweeps
    pub evictions: u64,
    /// Backing store reads or writes that failed
    pub store_errors: u64,
    /// Current number of entries in the memory tier
    pub entries: usize,
    /// Current aggregate size of the memory tier in bytes
    pub current_size: usize,
    /// Memory tier budget in bytes
    pub capacity: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the memory tier hit rate.
    ///
    /// Returns memory_hits / (memory_hits + store_hits + misses), or 0.0 if no
    /// reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.memory_hits + self.store_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.memory_hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters updated from the request path.
///
/// Counters are recorded outside the memory tier lock, so a snapshot is
/// consistent per counter, not across counters.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    misses: AtomicU64,
    admissions: AtomicU64,
    refusals: AtomicU64,
    evictions: AtomicU64,
    store_errors: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission(&self) {
        self.admissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refusal(&self) {
        self.refusals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the counters into a [`CacheStats`], with tier gauges supplied by the caller.
    pub fn snapshot(&self, entries: usize, current_size: usize, capacity: usize) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            admissions: self.admissions.load(Ordering::Relaxed),
            refusals: self.refusals.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            entries,
            current_size,
            capacity,
        }
    }
}
