//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Memory cleanup: trims the memory tier once it crosses its high-water mark

mod cleanup;

pub use cleanup::spawn_cleanup_task;
