//! Error types for the tiered cache
//!
//! Provides unified error handling using thiserror.
//!
//! Memory tier refusals are not errors and never appear here; see
//! [`Admission`](crate::cache::Admission).

use thiserror::Error;

// == Store Error Enum ==
/// Error type for the bundled backing stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure while reading or writing a cache file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store is temporarily unable to serve requests
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// == Config Error Enum ==
/// Rejected cache configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Memory tier capacity must be at least one byte
    #[error("Capacity must be greater than zero")]
    ZeroCapacity,

    /// Watermarks must satisfy 0 < low < high <= 1
    #[error("Invalid watermarks: high={high}, low={low} (need 0 < low < high <= 1)")]
    InvalidWatermarks { high: f64, low: f64 },
}

// == Result Type Alias ==
/// Convenience Result type for the bundled stores.
pub type Result<T> = std::result::Result<T, StoreError>;
