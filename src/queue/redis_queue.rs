//! Redis-backed queue
//!
//! Jobs are pushed onto the left of a list and popped from the right, giving
//! FIFO order across any number of producer and worker processes. Results
//! go to a second list that the queue only ever appends to.

use crate::config::QueueConfig;
use crate::queue::{HarvestResult, Job, JobQueue, QueueResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, AsyncConnectionConfig};
use std::time::Duration;

/// Smallest BRPOP timeout; zero would block forever
const MIN_BLOCK_SECS: f64 = 0.01;

/// Extra time the client waits for a BRPOP reply beyond the block itself
const BLOCK_RESPONSE_MARGIN: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    jobs_key: String,
    results_key: String,
}

impl RedisQueue {
    /// Creates a queue client; no connection is made until first use
    pub fn new(
        redis_url: &str,
        jobs_key: impl Into<String>,
        results_key: impl Into<String>,
    ) -> QueueResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            jobs_key: jobs_key.into(),
            results_key: results_key.into(),
        })
    }

    pub fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        Self::new(&config.redis_url, &config.jobs_key, &config.results_key)
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Connection for BRPOP; the default response timeout is shorter than
    /// any useful block, so it must outlast the requested wait
    async fn blocking_connection(&self, block: Duration) -> QueueResult<MultiplexedConnection> {
        let config = AsyncConnectionConfig::new()
            .set_response_timeout(Some(block + BLOCK_RESPONSE_MARGIN));
        Ok(self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await?)
    }

    /// Most recent results, newest first
    pub async fn recent_results(&self, limit: usize) -> QueueResult<Vec<HarvestResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut con = self.connection().await?;
        let raw: Vec<String> = con
            .lrange(&self.results_key, 0, limit as isize - 1)
            .await?;

        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<()> {
        let payload = serde_json::to_string(job)?;
        let mut con = self.connection().await?;
        con.lpush::<_, _, ()>(&self.jobs_key, payload).await?;
        tracing::debug!("Enqueued job for {}", job.target_url);
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<Job>> {
        let mut con = self.blocking_connection(timeout).await?;
        let popped: Option<(String, String)> = con
            .brpop(&self.jobs_key, timeout.as_secs_f64().max(MIN_BLOCK_SECS))
            .await?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn publish_result(&self, result: &HarvestResult) -> QueueResult<()> {
        let payload = serde_json::to_string(result)?;
        let mut con = self.connection().await?;
        con.lpush::<_, _, ()>(&self.results_key, payload).await?;
        Ok(())
    }

    async fn size(&self) -> QueueResult<usize> {
        let mut con = self.connection().await?;
        Ok(con.llen(&self.jobs_key).await?)
    }

    async fn clear(&self) -> QueueResult<()> {
        let mut con = self.connection().await?;
        con.del::<_, ()>(&self.jobs_key).await?;
        tracing::info!("Queue '{}' cleared", self.jobs_key);
        Ok(())
    }
}
