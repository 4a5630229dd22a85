//! Cache Entry Module
//!
//! Defines the memory tier entry and how values are measured.

use std::io;
use std::sync::Arc;

use serde::Serialize;

// == Cache Entry ==
/// A single memory tier entry with its size and recency metadata.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// The cached value, shared with callers
    pub value: Arc<V>,
    /// Serialized JSON length of `value` in bytes
    pub size_bytes: usize,
    /// Logical recency tick; larger is more recent
    pub last_used: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry from an already measured value.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `size_bytes` - Result of [`measure_size`] for `value`
    /// * `tick` - Recency tick assigned by the owning tier
    pub fn new(value: Arc<V>, size_bytes: usize, tick: u64) -> Self {
        Self {
            value,
            size_bytes,
            last_used: tick,
        }
    }
}

// == Size Measurement ==
/// Returns the serialized JSON length of `value` in bytes.
///
/// Streams into a counting sink, so no buffer the size of the value is built.
/// Fails for values serde_json cannot encode (e.g. maps with non-string keys).
pub fn measure_size<V: Serialize + ?Sized>(value: &V) -> serde_json::Result<usize> {
    let mut counter = ByteCounter::default();
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.0)
}

#[derive(Default)]
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
