//! In-process dedup store

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashSet;

use super::{DedupStore, StoreError};
use crate::types::{ContentHash, CounterKind, Counters};

/// Dedup store living in the current process
#[derive(Debug, Default)]
pub struct MemoryStore {
    hashes: DashSet<ContentHash>,
    crawled_links: AtomicU64,
    saved_images: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, kind: CounterKind) -> &AtomicU64 {
        match kind {
            CounterKind::CrawledLinks => &self.crawled_links,
            CounterKind::SavedImages => &self.saved_images,
        }
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self.hashes.contains(hash))
    }

    async fn insert(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self.hashes.insert(*hash))
    }

    async fn record_count(&self) -> Result<u64, StoreError> {
        Ok(self.hashes.len() as u64)
    }

    async fn increment(&self, counter: CounterKind) -> Result<u64, StoreError> {
        Ok(self.counter(counter).fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn counters(&self) -> Result<Counters, StoreError> {
        Ok(Counters {
            crawled_links: self.crawled_links.load(Ordering::Relaxed),
            saved_images: self.saved_images.load(Ordering::Relaxed),
        })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.hashes.clear();
        self.crawled_links.store(0, Ordering::Relaxed);
        self.saved_images.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
