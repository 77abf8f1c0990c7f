//! In-process task queue

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{QueueError, TaskQueue};
use crate::types::DownloadJob;

/// FIFO job queue shared by tasks in the current process
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<DownloadJob>>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, job: DownloadJob) -> Result<(), QueueError> {
        self.jobs.lock().push_back(job);
        self.available.notify_one();
        Ok(())
    }

    async fn pop(&self, wait: Duration) -> Result<Option<DownloadJob>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(job) = self.jobs.lock().pop_front() {
                return Ok(Some(job));
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost
            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return Ok(self.jobs.lock().pop_front());
            }
        }
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        let mut jobs = self.jobs.lock();
        let removed = jobs.len() as u64;
        jobs.clear();
        Ok(removed)
    }

    async fn len(&self) -> Result<u64, QueueError> {
        Ok(self.jobs.lock().len() as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use url::Url;

    fn job(n: usize) -> DownloadJob {
        DownloadJob::new(
            Url::parse(&format!("https://example.com/{}.png", n)).unwrap(),
            "cat",
        )
    }

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let queue = MemoryQueue::new();
        queue.push(job(1)).await.unwrap();
        queue.push(job(2)).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);

        let wait = Duration::from_millis(10);
        assert_eq!(queue.pop(wait).await.unwrap(), Some(job(1)));
        assert_eq!(queue.pop(wait).await.unwrap(), Some(job(2)));
        assert_eq!(queue.pop(wait).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(job(7)).await.unwrap();

        assert_eq!(consumer.await.unwrap(), Some(job(7)));
    }

    #[tokio::test]
    async fn test_purge_removes_pending() {
        let queue = MemoryQueue::new();
        for n in 0..5 {
            queue.push(job(n)).await.unwrap();
        }
        assert_eq!(queue.purge().await.unwrap(), 5);
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(queue.purge().await.unwrap(), 0);
    }
}
