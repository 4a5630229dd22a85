//! Cache Module
//!
//! Two-tier caching: a size-bounded memory tier in front of a durable backing store.

mod entry;
mod memory;
mod recency;
mod stats;
mod tiered;


// Re-export public types
pub use entry::{measure_size, CacheEntry};
pub use memory::{Admission, MemoryTier, ReadFence, TierAudit};
pub use recency::RecencyIndex;
pub use stats::{CacheStats, StatsRecorder};
pub use tiered::{Pressure, TieredCache};
