//! Redis list-backed task queue for multi-process deployments

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{QueueError, TaskQueue};
use crate::types::DownloadJob;

/// Jobs are LPUSHed as JSON and BRPOPed, giving FIFO order across processes.
///
/// Redis runs the commands of one connection in order, so a BRPOP blocks
/// everything queued behind it on that connection. Pushes and bookkeeping
/// share one multiplexed connection; every concurrent pop gets a connection
/// of its own from a small idle pool.
pub struct RedisQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    idle: Mutex<Vec<MultiplexedConnection>>,
    key: String,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let key = format!("{}:download_queue", key_prefix);
        info!("Task queue connected to {} (key '{}')", redis_url, key);
        Ok(Self {
            client,
            conn,
            idle: Mutex::new(Vec::new()),
            key,
        })
    }

    /// A connection nobody else is blocking on
    async fn blocking_connection(&self) -> Result<MultiplexedConnection, QueueError> {
        let reused = self.idle.lock().pop();
        match reused {
            Some(conn) => Ok(conn),
            None => {
                debug!("Opening a new blocking connection for '{}'", self.key);
                Ok(self.client.get_multiplexed_async_connection().await?)
            }
        }
    }

    /// Number of connections waiting to be reused
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn push(&self, job: DownloadJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(&self.key, payload).await?;
        Ok(())
    }

    async fn pop(&self, wait: Duration) -> Result<Option<DownloadJob>, QueueError> {
        let mut conn = self.blocking_connection().await?;
        // BRPOP treats 0 as "block forever"
        let timeout = wait.as_secs_f64().max(0.01);
        let popped: Option<(String, String)> = conn.brpop(&self.key, timeout).await?;
        // Only returned once the reply is in; a cancelled pop drops its connection
        self.idle.lock().push(conn);
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let (pending,): (u64,) = redis::pipe()
            .atomic()
            .llen(&self.key)
            .del(&self.key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(pending)
    }

    async fn len(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let pending: u64 = conn.llen(&self.key).await?;
        Ok(pending)
    }

    fn name(&self) -> &str {
        "redis"
    }
}
