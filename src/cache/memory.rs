//! Memory Tier Module
//!
//! Bounded, process-local map with exact byte-size accounting and
//! oldest-first eviction.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::entry::measure_size;
use crate::cache::{CacheEntry, RecencyIndex};
use crate::config::RecencyPolicy;

// == Admission ==
/// Outcome of offering a value to the memory tier.
///
/// Every variant other than `Admitted` is a designed refusal, not an error:
/// the backing store remains the source of truth for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Value is now held by the memory tier
    Admitted,
    /// Value alone is larger than the tier's capacity
    TooLarge,
    /// Value does not fit in the space currently free
    InsufficientSpace,
    /// The key was written or removed since the promoting read began
    Superseded,
    /// Value could not be serialized to measure its size
    Unmeasurable,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }
}

// == Tier Audit ==
/// Bookkeeping totals read under a single lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierAudit {
    /// The running `current_size` counter
    pub recorded_size: usize,
    /// Sum of `size_bytes` over all entries
    pub actual_size: usize,
    /// Number of entries in the map
    pub entries: usize,
    /// Number of ticks in the recency index
    pub ticks: usize,
}

impl TierAudit {
    /// True when the size counter and the recency index agree with the map.
    pub fn is_consistent(&self) -> bool {
        self.recorded_size == self.actual_size && self.entries == self.ticks
    }
}

/// Per-key record of reads in flight against the backing store.
#[derive(Debug, Clone, Copy, Default)]
struct Fence {
    readers: usize,
    last_write: u64,
}

/// Everything the tier lock guards. Updated as one unit.
#[derive(Debug)]
struct TierState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    recency: RecencyIndex,
    current_size: usize,
    write_epoch: u64,
    fences: HashMap<String, Fence>,
}

impl<V> TierState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: RecencyIndex::new(),
            current_size: 0,
            write_epoch: 0,
            fences: HashMap::new(),
        }
    }

    /// Advances the epoch and stamps it on any open fence for `key`.
    fn note_write(&mut self, key: &str) {
        self.write_epoch += 1;
        if let Some(fence) = self.fences.get_mut(key) {
            fence.last_write = self.write_epoch;
        }
    }

    fn open_fence(&mut self, key: &str) -> u64 {
        self.fences.entry(key.to_string()).or_default().readers += 1;
        self.write_epoch
    }

    /// Drops one reader from the fence for `key`, pruning it when none remain.
    fn close_fence(&mut self, key: &str) -> Option<Fence> {
        let fence = self.fences.get_mut(key)?;
        let snapshot = *fence;
        fence.readers -= 1;
        if fence.readers == 0 {
            self.fences.remove(key);
        }
        Some(snapshot)
    }

    /// Drops the entry for `key`, releasing its size and tick.
    fn release(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(entry.last_used);
        self.current_size -= entry.size_bytes;
        Some(entry)
    }

    /// Inserts if the value fits in the free space. Any old entry must already be released.
    fn admit(&mut self, key: &str, value: Arc<V>, size: usize, capacity: usize) -> Admission {
        // current_size <= capacity always holds, so this cannot underflow
        if size > capacity - self.current_size {
            return Admission::InsufficientSpace;
        }
        let tick = self.recency.insert(key);
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, size, tick));
        self.current_size += size;
        Admission::Admitted
    }

    fn evict_until(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.current_size > target {
            let Some(key) = self.recency.pop_oldest() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.current_size -= entry.size_bytes;
                evicted += 1;
            }
        }
        evicted
    }
}

// == Memory Tier ==
/// Size-bounded in-memory cache tier.
///
/// A single `RwLock` guards the entries, the recency index, the size counter
/// and the open read fences. The lock is only ever held for in-memory work.
#[derive(Debug)]
pub struct MemoryTier<V> {
    state: RwLock<TierState<V>>,
    capacity: usize,
    policy: RecencyPolicy,
}

impl<V> MemoryTier<V> {
    // == Constructor ==
    /// Creates an empty tier with a byte budget and recency policy.
    pub fn new(capacity: usize, policy: RecencyPolicy) -> Self {
        Self {
            state: RwLock::new(TierState::new()),
            capacity,
            policy,
        }
    }

    // == Lookup ==
    /// Returns the cached value for `key`, if any.
    ///
    /// Under [`RecencyPolicy::Access`] a hit also refreshes the entry's tick,
    /// which requires the exclusive lock. Size is never affected.
    pub fn lookup(&self, key: &str) -> Option<Arc<V>> {
        match self.policy {
            RecencyPolicy::Write => self.state.read().entries.get(key).map(|e| e.value.clone()),
            RecencyPolicy::Access => {
                let mut guard = self.state.write();
                let state = &mut *guard;
                let entry = state.entries.get_mut(key)?;
                if let Some(tick) = state.recency.touch(entry.last_used) {
                    entry.last_used = tick;
                }
                Some(entry.value.clone())
            }
        }
    }

    // == Remove ==
    /// Deletes the entry for `key` if present. Returns whether one was removed.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.write();
        state.note_write(key);
        state.release(key).is_some()
    }

    // == Evict Until ==
    /// Removes entries oldest first until `current_size <= target` or the tier is empty.
    ///
    /// Returns the number of entries evicted.
    pub fn evict_until(&self, target: usize) -> usize {
        self.state.write().evict_until(target)
    }

    // == Sweep ==
    /// Evicts down to `low_water` if, and only if, `current_size > high_water`.
    ///
    /// The threshold check and the eviction share one lock acquisition.
    pub fn sweep(&self, high_water: usize, low_water: usize) -> usize {
        let mut state = self.state.write();
        if state.current_size <= high_water {
            return 0;
        }
        state.evict_until(low_water)
    }

    /// Number of `put`/`remove` calls so far.
    pub fn write_epoch(&self) -> u64 {
        self.state.read().write_epoch
    }

    // == Fence ==
    /// Opens a read fence on `key` before a backing store read.
    ///
    /// Writes to `key` while the fence is open make its promotion
    /// [`Admission::Superseded`]. Writes to other keys do not.
    pub fn fence(&self, key: &str) -> ReadFence<'_, V> {
        let observed_epoch = self.state.write().open_fence(key);
        ReadFence {
            tier: self,
            key: key.to_string(),
            observed_epoch,
            open: true,
        }
    }

    /// Number of keys with a read fence open.
    pub fn open_fences(&self) -> usize {
        self.state.read().fences.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.read().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Aggregate size of all entries in bytes.
    pub fn current_size(&self) -> usize {
        self.state.read().current_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> RecencyPolicy {
        self.policy
    }

    /// Entry count and size read together.
    pub fn gauges(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.entries.len(), state.current_size)
    }

    // == Audit ==
    /// Recomputes the true size and tick count for invariant checks.
    pub fn audit(&self) -> TierAudit {
        let state = self.state.read();
        TierAudit {
            recorded_size: state.current_size,
            actual_size: state.entries.values().map(|e| e.size_bytes).sum(),
            entries: state.entries.len(),
            ticks: state.recency.len(),
        }
    }
}

impl<V: Serialize> MemoryTier<V> {
    // == Put ==
    /// Offers a freshly written value to the tier.
    ///
    /// The value is measured before the lock is taken. An existing entry for
    /// `key` is released before the fit check, so a refused overwrite leaves
    /// no entry for the key unless the value was too large or unmeasurable.
    pub fn put(&self, key: &str, value: impl Into<Arc<V>>) -> Admission {
        let value = value.into();
        let size = match self.measure(key, &value) {
            Ok(size) => size,
            Err(refusal) => return refusal,
        };

        let mut state = self.state.write();
        state.note_write(key);
        state.release(key);
        let admission = state.admit(key, value, size, self.capacity);
        if !admission.is_admitted() {
            debug!(
                key,
                size,
                current_size = state.current_size,
                capacity = self.capacity,
                "memory tier refused overwrite"
            );
        }
        admission
    }

    fn measure(&self, key: &str, value: &V) -> Result<usize, Admission> {
        let size = measure_size(value).map_err(|e| {
            warn!(key, error = %e, "cannot measure value, skipping memory tier");
            Admission::Unmeasurable
        })?;
        if size > self.capacity {
            debug!(key, size, capacity = self.capacity, "value larger than memory tier");
            return Err(Admission::TooLarge);
        }
        Ok(size)
    }
}

// == Read Fence ==
/// Guard held across a backing store read of one key.
///
/// Consumed by [`promote`](ReadFence::promote); dropping it unused (store
/// miss, store error, cancelled read) just closes the fence.
#[must_use = "dropping a fence discards the read-through promotion"]
pub struct ReadFence<'a, V> {
    tier: &'a MemoryTier<V>,
    key: String,
    observed_epoch: u64,
    open: bool,
}

impl<V: Serialize> ReadFence<'_, V> {
    // == Promote ==
    /// Offers the value just read from the backing store.
    ///
    /// Refuses with [`Admission::Superseded`] if the key was put or removed
    /// since the fence opened, or if it is already cached, so a slow read can
    /// never overwrite a newer write. Otherwise the usual admission rules apply.
    pub fn promote(mut self, value: impl Into<Arc<V>>) -> Admission {
        let tier = self.tier;
        let value = value.into();
        let size = match tier.measure(&self.key, &value) {
            Ok(size) => size,
            Err(refusal) => return refusal,
        };

        let mut state = tier.state.write();
        self.open = false;
        let written = state
            .close_fence(&self.key)
            .is_some_and(|fence| fence.last_write > self.observed_epoch);
        if written || state.entries.contains_key(&self.key) {
            debug!(key = %self.key, "promotion superseded by concurrent write");
            return Admission::Superseded;
        }
        state.admit(&self.key, value, size, tier.capacity)
    }
}

impl<V> Drop for ReadFence<'_, V> {
    fn drop(&mut self) {
        if self.open {
            self.tier.state.write().close_fence(&self.key);
        }
    }
}
