//! Queue worker
//!
//! A worker pulls jobs one at a time, runs each in its own task so that a
//! panic or error is contained to that job, and publishes a result for every
//! job it finishes. A result that cannot be published is reported on its
//! own; it does not count against the harvest. It only returns once shutdown
//! is requested.

use crate::harvest::{HarvestContext, HarvestSession, SessionReport};
use crate::queue::{HarvestStatus, Job, JobQueue};
use crate::HarvestError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timing for the worker loop
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Longest wait for a job before polling again
    pub dequeue_timeout: Duration,
    /// Pause after a failed job or an unreachable queue
    pub cooldown: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &crate::config::QueueConfig) -> Self {
        Self {
            dequeue_timeout: config.dequeue_timeout(),
            cooldown: config.cooldown(),
        }
    }
}

/// Counters reported when a worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_errored: u64,
}

pub struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    ctx: HarvestContext,
    settings: WorkerSettings,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn JobQueue>,
        ctx: HarvestContext,
        settings: WorkerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            ctx,
            settings,
            shutdown,
        }
    }

    /// Processes jobs until shutdown is requested
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        tracing::info!("Worker {} started", self.id);
        self.ctx.metrics.record_request("queue_worker_started", "system");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.queue.dequeue(self.settings.dequeue_timeout) => next,
            };

            let job = match next {
                Ok(Some(job)) => job,
                Ok(None) => {
                    tracing::debug!("Worker {}: no jobs in queue, waiting", self.id);
                    continue;
                }
                Err(e) => {
                    let err = HarvestError::from(e);
                    tracing::warn!("Worker {}: {}", self.id, err);
                    self.ctx.metrics.record_error(err.kind());
                    if !self.cool_down().await {
                        break;
                    }
                    continue;
                }
            };

            tracing::info!(
                "Worker {} processing job: {} ({})",
                self.id,
                job.category,
                job.target_url
            );

            match self.process(job.clone()).await {
                Ok(HarvestStatus::Completed) => stats.jobs_completed += 1,
                Ok(HarvestStatus::Failed) => stats.jobs_failed += 1,
                Err(err) => {
                    stats.jobs_errored += 1;
                    tracing::error!(
                        "Worker {} failed job for '{}': {}",
                        self.id,
                        job.category,
                        err
                    );
                    self.ctx.metrics.record_error(err.kind());
                    self.ctx
                        .alerts
                        .notify(
                            &format!("Harvest failed: {}", job.category),
                            &format!("Job for {} ended with an error: {}", job.target_url, err),
                        )
                        .await;
                    if !self.cool_down().await {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            "Worker {} stopped ({} completed, {} failed, {} errored)",
            self.id,
            stats.jobs_completed,
            stats.jobs_failed,
            stats.jobs_errored
        );
        stats
    }

    /// Runs one job in its own task and publishes the result
    async fn process(&self, job: Job) -> crate::Result<HarvestStatus> {
        let session = HarvestSession::new(self.ctx.clone(), self.shutdown.clone());
        let task_job = job.clone();
        let handle = tokio::spawn(async move { session.run(&task_job).await });

        let report: SessionReport = match handle.await {
            Ok(outcome) => outcome?,
            Err(join_err) if join_err.is_panic() => {
                return Err(HarvestError::WorkerTask("job panicked".to_string()))
            }
            Err(join_err) => return Err(HarvestError::WorkerTask(join_err.to_string())),
        };

        let result = report.to_result();
        if let Err(e) = self.queue.publish_result(&result).await {
            let err = HarvestError::from(e);
            tracing::warn!(
                "Worker {} could not publish the result for '{}': {}",
                self.id,
                job.category,
                err
            );
            self.ctx.metrics.record_error("result_publish_failed");
            self.ctx
                .alerts
                .notify(
                    &format!("Result not published: {}", job.category),
                    &format!(
                        "Harvest of {} finished with {} record(s) but its result was not published: {}",
                        job.target_url, result.records_found, err
                    ),
                )
                .await;
        }

        tracing::info!(
            "Worker {} finished '{}': {} record(s), status {}",
            self.id,
            job.category,
            result.records_found,
            result.status
        );

        if result.status == HarvestStatus::Failed && !report.is_aborted() {
            let err = HarvestError::SessionFailed {
                category: job.category.clone(),
            };
            tracing::warn!("{}", err);
            self.ctx
                .alerts
                .notify(
                    &format!("Harvest failed: {}", job.category),
                    &format!(
                        "{} ({} page(s) exhausted their retries)",
                        err,
                        report.failed_pages().len()
                    ),
                )
                .await;
        }

        Ok(result.status)
    }

    /// Waits out the cooldown; returns false if shutdown interrupted it
    async fn cool_down(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.settings.cooldown) => true,
        }
    }
}
