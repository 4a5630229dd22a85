//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment variables.
//! All values are static once a cache has been constructed from them.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

// == Defaults ==
/// Default memory tier budget: 50 MiB
pub const DEFAULT_CAPACITY_BYTES: usize = 50 * 1024 * 1024;
/// Default fraction of capacity above which cleanup starts
pub const DEFAULT_HIGH_WATER: f64 = 0.8;
/// Default fraction of capacity cleanup trims down to
pub const DEFAULT_LOW_WATER: f64 = 0.5;
/// Default interval for the background cleanup task
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 30;
/// Default root directory for the file store
pub const DEFAULT_STORE_DIR: &str = ".cache/pages";

// == Recency Policy ==
/// Which operations refresh an entry's `last_used` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecencyPolicy {
    /// Only writes and promotions refresh recency; lookups take a shared lock.
    #[default]
    Write,
    /// Lookups refresh recency too; lookups take the exclusive lock.
    Access,
}

impl FromStr for RecencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "write" => Ok(RecencyPolicy::Write),
            "access" | "read" => Ok(RecencyPolicy::Access),
            other => Err(format!("unknown recency policy: {other}")),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory tier budget in serialized bytes
    pub capacity_bytes: usize,
    /// Fraction of capacity that triggers cleanup
    pub high_water: f64,
    /// Fraction of capacity cleanup evicts down to
    pub low_water: f64,
    /// Recency bookkeeping used for eviction order
    pub recency: RecencyPolicy,
    /// Run cleanup at the end of every admitting `get`/`set`
    pub inline_cleanup: bool,
    /// Background cleanup task interval in seconds
    pub cleanup_interval_secs: u64,
    /// Root directory for [`FileStore`](crate::store::FileStore)
    pub store_dir: PathBuf,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY_BYTES` - Memory tier budget (default: 50 MiB)
    /// - `CACHE_HIGH_WATER` - Cleanup trigger fraction (default: 0.8)
    /// - `CACHE_LOW_WATER` - Cleanup target fraction (default: 0.5)
    /// - `CACHE_RECENCY` - `write` or `access` (default: write)
    /// - `CACHE_INLINE_CLEANUP` - `true`/`false` (default: true)
    /// - `CACHE_CLEANUP_INTERVAL` - Background cleanup frequency in seconds (default: 30)
    /// - `CACHE_DIR` - File store root (default: `.cache/pages`)
    ///
    /// Unset or unparsable variables fall back to their defaults. Call
    /// [`validate`](Self::validate) to reject inconsistent combinations.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity_bytes: parse_env("CACHE_CAPACITY_BYTES").unwrap_or(defaults.capacity_bytes),
            high_water: parse_env("CACHE_HIGH_WATER").unwrap_or(defaults.high_water),
            low_water: parse_env("CACHE_LOW_WATER").unwrap_or(defaults.low_water),
            recency: parse_env("CACHE_RECENCY").unwrap_or(defaults.recency),
            inline_cleanup: parse_env("CACHE_INLINE_CLEANUP").unwrap_or(defaults.inline_cleanup),
            cleanup_interval_secs: parse_env("CACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval_secs),
            store_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
        }
    }

    // == Validate ==
    /// Checks capacity and watermark consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity_bytes == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let (high, low) = (self.high_water, self.low_water);
        let ordered = low > 0.0 && low < high && high <= 1.0;
        if !ordered || high.is_nan() || low.is_nan() {
            return Err(ConfigError::InvalidWatermarks { high, low });
        }
        Ok(())
    }

    /// Byte threshold above which cleanup runs.
    pub fn high_water_bytes(&self) -> usize {
        (self.capacity_bytes as f64 * self.high_water) as usize
    }

    /// Byte target that cleanup evicts down to.
    pub fn low_water_bytes(&self) -> usize {
        (self.capacity_bytes as f64 * self.low_water) as usize
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            high_water: DEFAULT_HIGH_WATER,
            low_water: DEFAULT_LOW_WATER,
            recency: RecencyPolicy::default(),
            inline_cleanup: true,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
