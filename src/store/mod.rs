//! Dedup store: content hashes of persisted images plus aggregate counters
//!
//! The store is shared by every crawler and download worker. Two backends:
//! - `MemoryStore`: in-process (dashmap + atomics), for single-process runs
//! - `RedisStore`: a Redis set and two integer keys, for multi-process runs
//!
//! Membership test and add are separate operations, but `insert` reports
//! whether the hash was new, so a worker can use it as an atomic test-and-add.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ContentHash, CounterKind, Counters};

/// Errors from a dedup store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Shared content-hash set with aggregate counters
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Check whether a hash has already been recorded
    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError>;

    /// Record a hash, returning `true` if it was not present before
    async fn insert(&self, hash: &ContentHash) -> Result<bool, StoreError>;

    /// Number of recorded hashes
    async fn record_count(&self) -> Result<u64, StoreError>;

    /// Atomically increment a counter, returning the new value
    async fn increment(&self, counter: CounterKind) -> Result<u64, StoreError>;

    /// Read both counters
    async fn counters(&self) -> Result<Counters, StoreError>;

    /// Remove every hash and reset both counters to zero.
    ///
    /// Only the archive consumer calls this, between crawl sessions.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
