//! The job record and its lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::JobId;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the queue for a worker to claim it.
    Queued,
    /// Claimed by a worker; processing is in flight.
    Processing,
    /// Processing succeeded; `body` holds the result.
    Completed,
    /// Retries exhausted; resettable by resubmission.
    Failed,
}

impl JobStatus {
    /// Lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// A unit of research work, keyed by its canonical id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Canonical id derived from `name`; the deduplication key.
    pub id: JobId,
    /// Original request name as supplied.
    pub name: String,
    /// Wall-clock ms at creation or last reset.
    pub created_at: u64,
    /// Wall-clock ms at which the job becomes eligible for claim.
    pub available_at: u64,
    /// Number of retries applied so far.
    pub retry_count: u32,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Result payload; empty object until completion.
    pub body: Value,
}

impl Job {
    /// Create a fresh queued job, eligible immediately.
    pub fn new(name: impl Into<String>, now: u64) -> Self {
        let name = name.into();
        Self {
            id: JobId::from_name(&name),
            name,
            created_at: now,
            available_at: now,
            retry_count: 0,
            status: JobStatus::Queued,
            body: Value::Object(serde_json::Map::new()),
        }
    }

    /// Mark the job as claimed by a worker.
    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
    }

    /// Mark the job as completed with its result payload.
    pub fn mark_completed(&mut self, body: Value) {
        self.status = JobStatus::Completed;
        self.body = body;
    }

    /// Re-queue the job for another attempt at `next_available_at`.
    pub fn mark_requeued(&mut self, next_available_at: u64) {
        self.status = JobStatus::Queued;
        self.retry_count += 1;
        self.available_at = next_available_at;
    }

    /// Mark the job as permanently failed.
    pub fn mark_failed(&mut self) {
        self.status = JobStatus::Failed;
    }
}
