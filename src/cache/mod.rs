//! Versioned cache buckets for the site's static assets.
//!
//! This module provides the storage side of the offline cache:
//! - One named bucket per deployment version, created and deleted whole
//! - Entries keyed by request method + URL, overwritten by key
//! - A SQLite backend (on disk or in memory)

mod storage;
mod traits;

pub use storage::SqliteStore;
pub use traits::{CacheStore, CacheVersion, RequestKey, ResponseSource};
