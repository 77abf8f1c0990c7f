//! Opening the configured dedup store and task queue

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{BackendConfig, BackendKind};
use crate::queue::{MemoryQueue, RedisQueue, TaskQueue};
use crate::store::{DedupStore, MemoryStore, RedisStore};

/// Shared state used by crawlers and workers
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn DedupStore>,
    pub queue: Arc<dyn TaskQueue>,
}

impl Backends {
    /// Fresh in-process backends
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            queue: Arc::new(MemoryQueue::new()),
        }
    }

    /// Open the backends named by `config`
    pub async fn open(config: &BackendConfig) -> Result<Self> {
        let backends = match config.kind {
            BackendKind::Memory => Self::in_memory(),
            BackendKind::Redis => {
                let store = RedisStore::connect(&config.redis_url, &config.key_prefix)
                    .await
                    .with_context(|| format!("Failed to connect dedup store to {}", config.redis_url))?;
                let queue = RedisQueue::connect(&config.redis_url, &config.key_prefix)
                    .await
                    .with_context(|| format!("Failed to connect task queue to {}", config.redis_url))?;
                Self {
                    store: Arc::new(store),
                    queue: Arc::new(queue),
                }
            }
        };
        info!(
            "Using {} dedup store and {} task queue",
            backends.store.name(),
            backends.queue.name()
        );
        Ok(backends)
    }

    /// True when crawl and workers must share this process
    pub fn is_process_local(&self) -> bool {
        self.store.name() == "memory" && self.queue.name() == "memory"
    }
}
