//! Memory Cleanup Task
//!
//! Background task that periodically trims the memory tier.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::TieredCache;
use crate::store::BackingStore;

/// Spawns a background task that periodically runs [`TieredCache::cleanup`].
///
/// The task runs in an infinite loop, sleeping for `interval` between runs.
/// Each run holds the memory tier's exclusive lock for the whole sweep, so it
/// never interleaves with a concurrent put.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(TieredCache::new(store, &config)?);
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(30));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<V, S>(cache: Arc<TieredCache<V, S>>, interval: Duration) -> JoinHandle<()>
where
    V: Serialize + Send + Sync + 'static,
    S: BackingStore<V> + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting memory cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let evicted = cache.cleanup();

            if evicted > 0 {
                info!(
                    "Memory cleanup: evicted {} entries, {} bytes remain",
                    evicted,
                    cache.memory().current_size()
                );
            } else {
                debug!("Memory cleanup: tier below high-water mark");
            }
        }
    })
}
