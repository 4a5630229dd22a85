//! Tiered Cache - a two-tier build-output cache
//!
//! A bounded in-memory tier sits in front of a durable backing store. Reads
//! are served from memory when possible and promoted from the store when not;
//! writes are durable before they are fast.

pub mod cache;
pub mod config;
pub mod error;
pub mod store;
pub mod tasks;

pub use cache::{Admission, CacheStats, MemoryTier, Pressure, TieredCache};
pub use config::{CacheConfig, RecencyPolicy};
pub use error::{ConfigError, StoreError};
pub use store::{BackingStore, FileStore, MemoryStore};
pub use tasks::spawn_cleanup_task;
