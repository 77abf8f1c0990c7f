//! Task queue between crawl producers and download workers
//!
//! Multi-producer, multi-consumer job channel. Delivery is at-least-once at
//! best: a job popped by a worker that then dies is lost, never redelivered.
//! `purge` drops every not-yet-dispatched job; jobs already held by a worker
//! are unaffected.

mod memory;
mod redis_queue;

pub use self::memory::MemoryQueue;
pub use self::redis_queue::RedisQueue;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::DownloadJob;

/// Errors from a task queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Durable job channel for download jobs
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a job
    async fn push(&self, job: DownloadJob) -> Result<(), QueueError>;

    /// Dequeue a job, waiting up to `wait` for one to arrive
    async fn pop(&self, wait: Duration) -> Result<Option<DownloadJob>, QueueError>;

    /// Drop every pending job, returning how many were removed
    async fn purge(&self) -> Result<u64, QueueError>;

    /// Number of pending jobs
    async fn len(&self) -> Result<u64, QueueError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
