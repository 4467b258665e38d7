//! Job queue
//!
//! Jobs and results travel as JSON documents so that producers and workers
//! may run in different processes. Delivery is at-least-once: a worker that
//! dies mid-job loses that job, and a job may be harvested twice if it is
//! enqueued twice. Storage upserts make the second harvest harmless.

mod memory;
mod redis_queue;

pub use self::memory::MemoryQueue;
pub use self::redis_queue::RedisQueue;

use crate::HarvestError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed queue payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Queue is full ({0} jobs)")]
    Full(usize),

    #[error("Queue state is unavailable: {0}")]
    Unavailable(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

fn default_category() -> String {
    "unknown".to_string()
}

fn default_page_limit() -> u32 {
    1
}

/// A unit of harvesting work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "url")]
    pub target_url: String,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(rename = "max_pages", default = "default_page_limit")]
    pub page_limit: u32,

    #[serde(default)]
    pub use_proxy: bool,
}

impl Job {
    pub fn new(
        target_url: impl Into<String>,
        category: impl Into<String>,
        page_limit: u32,
        use_proxy: bool,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            category: category.into(),
            page_limit,
            use_proxy,
        }
    }

    /// Checks that the job can be harvested
    pub fn validate(&self) -> crate::Result<()> {
        let parsed = url::Url::parse(&self.target_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HarvestError::InvalidJob(format!(
                "target URL must be http(s): {}",
                self.target_url
            )));
        }

        if self.category.trim().is_empty() {
            return Err(HarvestError::InvalidJob(
                "category must not be empty".to_string(),
            ));
        }

        if self.page_limit == 0 {
            return Err(HarvestError::InvalidJob(
                "page limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Final status of a harvested job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestStatus {
    /// At least one record was harvested
    Completed,

    /// No records were harvested
    Failed,
}

impl HarvestStatus {
    pub fn from_record_count(count: usize) -> Self {
        if count > 0 {
            Self::Completed
        } else {
            Self::Failed
        }
    }
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one job, published on the results channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestResult {
    pub job: Job,

    #[serde(rename = "products_found")]
    pub records_found: usize,

    pub status: HarvestStatus,

    #[serde(rename = "timestamp", with = "chrono::serde::ts_seconds")]
    pub finished_at: DateTime<Utc>,
}

impl HarvestResult {
    pub fn new(job: Job, records_found: usize) -> Self {
        Self {
            job,
            records_found,
            status: HarvestStatus::from_record_count(records_found),
            finished_at: Utc::now(),
        }
    }
}

/// Durable FIFO of jobs plus a results channel
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Appends a job to the tail of the queue
    async fn enqueue(&self, job: &Job) -> QueueResult<()>;

    /// Waits up to `timeout` for the job at the head of the queue
    ///
    /// Returns `Ok(None)` when the wait times out.
    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<Job>>;

    /// Publishes the outcome of a job
    async fn publish_result(&self, result: &HarvestResult) -> QueueResult<()>;

    /// Number of jobs waiting
    async fn size(&self) -> QueueResult<usize>;

    /// Drops every waiting job
    async fn clear(&self) -> QueueResult<()>;
}
