//! In-process backing store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::store::BackingStore;

// == Memory Store ==
/// HashMap-backed store with access counters.
///
/// Not durable. Can be switched offline to exercise store failure paths.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, V>>,
    reads: AtomicU64,
    writes: AtomicU64,
    available: AtomicBool,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Inserts directly, bypassing any cache and the write counter.
    pub fn seed(&self, key: impl Into<String>, value: V) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of `read` calls served, including failed ones.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `write` calls served, including failed ones.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// While unavailable every read and write fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> BackingStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Error = StoreError;

    async fn read(&self, key: &str) -> Result<Option<V>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &V) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.entries.write().insert(key.to_string(), value.clone());
        Ok(())
    }
}
