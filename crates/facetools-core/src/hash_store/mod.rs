//! Content hashing and the persisted hash cache.
//!
//! This module provides:
//! - Streaming SHA-256 computation
//! - Atomic JSON persistence for the cache file
//! - [`HashStore`], the path → (size, mtime, hash) cache shared across requests

mod atomic;
mod hashing;
mod store;

pub use atomic::{read_json, write_json};
pub use hashing::{compute_sha256, hash_prefix, verify_sha256};
pub use store::{CacheEntry, FlushGuard, HashStore, HashStoreStats};
