//! Polling workers: claim one job per tick, process it, record the outcome.
//!
//! Workers share no state besides the queue; the atomic claim is the only
//! coordination between them. A processing failure either re-queues the job
//! with exponential backoff or, once retries are exhausted, fails it
//! permanently. Store errors are logged and the worker continues on the next
//! tick.

mod processor;

pub use processor::{Processor, ProcessorError, WikipediaProcessor};

use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{Config, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL_MS};
use crate::core::job::Job;
use crate::core::types::{now_ms, WorkerId};
use crate::observer::{Action, Observer, Severity};
use crate::queue::Queue;
use crate::storage::StorageError;

/// Backoff before retry `retry_count + 1`:
/// `2^(retry_count+1) · base + uniform(0, base)` milliseconds.
pub fn backoff_delay_ms(retry_count: u32, base_delay_ms: u64) -> u64 {
    let exponential = 2u64
        .saturating_pow(retry_count.saturating_add(1))
        .saturating_mul(base_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..base_delay_ms.max(1));
    exponential.saturating_add(jitter)
}

/// A single polling worker agent.
pub struct Worker {
    id: WorkerId,
    queue: Arc<Queue>,
    observer: Arc<Observer>,
    processor: Arc<dyn Processor>,
    poll_interval: Duration,
    base_delay_ms: u64,
    max_retries: u32,
}

impl Worker {
    /// Create a worker with a fresh random id and default timings.
    pub fn new(queue: Arc<Queue>, observer: Arc<Observer>, processor: Arc<dyn Processor>) -> Self {
        Self {
            id: WorkerId::generate(),
            queue,
            observer,
            processor,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the polling interval between ticks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the backoff base delay.
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the maximum retry count before permanent failure.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// This worker's id.
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Run the polling loop forever.
    pub async fn run(self) {
        if let Err(e) = self
            .observer
            .log(
                Action::WorkerStart,
                Severity::Log,
                json!({ "workerId": self.id.as_str() }),
            )
            .await
        {
            tracing::warn!(worker_id = %self.id, error = %e, "Failed to record worker start");
        }
        tracing::info!(worker_id = %self.id, "Worker started");

        loop {
            if let Err(e) = self.tick().await {
                tracing::warn!(worker_id = %self.id, error = %e, "Worker tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Spawn the polling loop onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Claim and process at most one job. Returns true when a job was
    /// claimed.
    pub async fn tick(&self) -> Result<bool, StorageError> {
        let Some(job) = self.queue.claim().await? else {
            return Ok(false);
        };

        self.observer
            .log(
                Action::JobClaimed,
                Severity::Log,
                json!({
                    "jobId": job.id.as_str(),
                    "workerId": self.id.as_str(),
                    "retryCount": job.retry_count,
                }),
            )
            .await?;
        tracing::debug!(worker_id = %self.id, job_id = %job.id, "Claimed job");

        match self.processor.process(&job).await {
            Ok(body) => {
                self.queue.complete(&job.id, body).await?;
                self.observer
                    .log(
                        Action::JobCompleted,
                        Severity::Log,
                        json!({
                            "jobId": job.id.as_str(),
                            "workerId": self.id.as_str(),
                        }),
                    )
                    .await?;
                tracing::info!(worker_id = %self.id, job_id = %job.id, "Job completed");
            }
            Err(err) => self.handle_failure(&job, err).await?,
        }
        Ok(true)
    }

    /// Retry-or-fail. The decision compares the job's retry count at the
    /// time of the failure, before the increment `retry` applies.
    async fn handle_failure(&self, job: &Job, err: ProcessorError) -> Result<(), StorageError> {
        if job.retry_count >= self.max_retries {
            self.queue.fail(&job.id).await?;
            self.observer
                .log(
                    Action::JobFailed,
                    Severity::Error,
                    json!({
                        "jobId": job.id.as_str(),
                        "workerId": self.id.as_str(),
                        "error": err.to_string(),
                        "retryCount": job.retry_count,
                    }),
                )
                .await?;
            tracing::error!(worker_id = %self.id, job_id = %job.id, error = %err, "Job failed permanently");
        } else {
            let next_available_at = now_ms() + backoff_delay_ms(job.retry_count, self.base_delay_ms);
            self.queue.retry(&job.id, next_available_at).await?;
            self.observer
                .log(
                    Action::JobRetry,
                    Severity::Warning,
                    json!({
                        "jobId": job.id.as_str(),
                        "workerId": self.id.as_str(),
                        "error": err.to_string(),
                        "retryCount": job.retry_count + 1,
                        "nextAvailableAt": next_available_at,
                    }),
                )
                .await?;
            tracing::warn!(worker_id = %self.id, job_id = %job.id, error = %err, "Job scheduled for retry");
        }
        Ok(())
    }
}

/// Launch `count` independent workers against the same queue and observer.
pub fn spawn_workers(
    count: usize,
    queue: Arc<Queue>,
    observer: Arc<Observer>,
    processor: Arc<dyn Processor>,
    config: &Config,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            Worker::new(
                Arc::clone(&queue),
                Arc::clone(&observer),
                Arc::clone(&processor),
            )
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
            .with_base_delay_ms(config.base_delay_ms)
            .with_max_retries(config.max_retries)
            .spawn()
        })
        .collect()
}
