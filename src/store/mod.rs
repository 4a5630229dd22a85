//! Backing Store Module
//!
//! The durable tier the cache fronts, plus two bundled implementations.
//!
//! # Stores
//! - [`MemoryStore`]: in-process map, for embedding and tests
//! - [`FileStore`]: one JSON file per key under a root directory

mod file;
mod memory;

use async_trait::async_trait;

pub use file::FileStore;
pub use memory::MemoryStore;

// == Backing Store ==
/// Durable key/value store consumed by [`TieredCache`](crate::cache::TieredCache).
///
/// Implementations are expected to be safe for concurrent use and to return
/// their own error type, which the cache hands back to callers unchanged.
#[async_trait]
pub trait BackingStore<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Error returned by `read` and `write`
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the value for `key`. A missing key is `Ok(None)`, not an error.
    async fn read(&self, key: &str) -> Result<Option<V>, Self::Error>;

    /// Durably stores `value` under `key`, replacing any previous value.
    async fn write(&self, key: &str, value: &V) -> Result<(), Self::Error>;
}
