//! Redis-backed dedup store shared across processes

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use super::{DedupStore, StoreError};
use crate::types::{ContentHash, CounterKind, Counters};

/// Dedup store kept in Redis: one set of hex hashes and two integer keys
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    hashes_key: String,
    crawled_links_key: String,
    saved_images_key: String,
}

impl RedisStore {
    /// Connect to Redis and namespace every key under `key_prefix`
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Dedup store connected to {} (prefix '{}')", redis_url, key_prefix);

        Ok(Self {
            conn,
            hashes_key: format!("{}:image_hashes", key_prefix),
            crawled_links_key: format!("{}:{}", key_prefix, CounterKind::CrawledLinks.key_suffix()),
            saved_images_key: format!("{}:{}", key_prefix, CounterKind::SavedImages.key_suffix()),
        })
    }

    fn counter_key(&self, kind: CounterKind) -> &str {
        match kind {
            CounterKind::CrawledLinks => &self.crawled_links_key,
            CounterKind::SavedImages => &self.saved_images_key,
        }
    }
}

#[async_trait]
impl DedupStore for RedisStore {
    async fn contains(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let present: bool = conn.sismember(&self.hashes_key, hash.to_hex()).await?;
        Ok(present)
    }

    async fn insert(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(&self.hashes_key, hash.to_hex()).await?;
        Ok(added == 1)
    }

    async fn record_count(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.scard(&self.hashes_key).await?;
        Ok(count)
    }

    async fn increment(&self, counter: CounterKind) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let value: u64 = conn.incr(self.counter_key(counter), 1u64).await?;
        Ok(value)
    }

    async fn counters(&self) -> Result<Counters, StoreError> {
        let mut conn = self.conn.clone();
        let (crawled_links, saved_images): (Option<u64>, Option<u64>) = redis::pipe()
            .get(&self.crawled_links_key)
            .get(&self.saved_images_key)
            .query_async(&mut conn)
            .await?;

        Ok(Counters {
            crawled_links: crawled_links.unwrap_or(0),
            saved_images: saved_images.unwrap_or(0),
        })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(&self.hashes_key)
            .ignore()
            .set(&self.crawled_links_key, 0u64)
            .ignore()
            .set(&self.saved_images_key, 0u64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        info!("Dedup store cleared");
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
