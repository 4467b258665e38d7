//! In-process queue backend

use crate::queue::{HarvestResult, Job, JobQueue, QueueError, QueueResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// FIFO queue held in memory
///
/// Suitable for single-process runs and tests. Jobs do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<Job>>,
    results: Mutex<Vec<HarvestResult>>,
    capacity: Option<usize>,
    available: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue that rejects jobs beyond `capacity`
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Results published so far, oldest first
    pub fn results(&self) -> Vec<HarvestResult> {
        match self.results.lock() {
            Ok(results) => results.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn jobs(&self) -> QueueResult<MutexGuard<'_, VecDeque<Job>>> {
        self.jobs
            .lock()
            .map_err(|_| QueueError::Unavailable("job list lock poisoned".to_string()))
    }

    fn pop(&self) -> QueueResult<Option<Job>> {
        Ok(self.jobs()?.pop_front())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<()> {
        {
            let mut jobs = self.jobs()?;
            if let Some(capacity) = self.capacity {
                if jobs.len() >= capacity {
                    return Err(QueueError::Full(capacity));
                }
            }
            jobs.push_back(job.clone());
        }

        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<Job>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(job) = self.pop()? {
                return Ok(Some(job));
            }

            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return self.pop();
            }
        }
    }

    async fn publish_result(&self, result: &HarvestResult) -> QueueResult<()> {
        self.results
            .lock()
            .map_err(|_| QueueError::Unavailable("result list lock poisoned".to_string()))?
            .push(result.clone());
        Ok(())
    }

    async fn size(&self) -> QueueResult<usize> {
        Ok(self.jobs()?.len())
    }

    async fn clear(&self) -> QueueResult<()> {
        self.jobs()?.clear();
        Ok(())
    }
}
