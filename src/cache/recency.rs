//! Recency Index Module
//!
//! Orders memory tier keys by their `last_used` tick for eviction.

use std::collections::BTreeMap;

// == Recency Index ==
/// Tracks access order for oldest-first eviction.
///
/// Ticks come from a monotonic counter owned by the index, so two keys never
/// share a tick and eviction order is total:
/// - First entry = least recently used
/// - Last entry = most recently used
#[derive(Debug, Default)]
pub struct RecencyIndex {
    /// Keys ordered by tick
    order: BTreeMap<u64, String>,
    /// Next tick to hand out
    next_tick: u64,
}

impl RecencyIndex {
    // == Constructor ==
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Records `key` as the most recently used and returns its tick.
    ///
    /// Callers must [`remove`](Self::remove) any previous tick for the key first.
    pub fn insert(&mut self, key: &str) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, key.to_string());
        tick
    }

    // == Touch ==
    /// Moves the key at `tick` to the most recent position.
    ///
    /// Returns the new tick, or None if `tick` is not tracked.
    pub fn touch(&mut self, tick: u64) -> Option<u64> {
        let key = self.order.remove(&tick)?;
        let fresh = self.next_tick;
        self.next_tick += 1;
        self.order.insert(fresh, key);
        Some(fresh)
    }

    // == Remove ==
    /// Stops tracking `tick`. Returns the key that held it.
    pub fn remove(&mut self, tick: u64) -> Option<String> {
        self.order.remove(&tick)
    }

    // == Pop Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if the index is empty.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_first().map(|(_, key)| key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.order.first_key_value().map(|(_, key)| key.as_str())
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Checks if a key is being tracked.
    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.order.values().any(|k| k == key)
    }
}
