//! API response types.

use serde::Serialize;
use serde_json::Value;

use crate::core::job::{Job, JobStatus};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Submission/status view of a job, without the result payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummaryResponse {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub created_at: u64,
}

impl From<&Job> for JobSummaryResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            name: job.name.clone(),
            status: job.status,
            created_at: job.created_at,
        }
    }
}

/// Completed-job view including the research payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetailResponse {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub created_at: u64,
    pub body: Value,
}

impl From<&Job> for JobDetailResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            name: job.name.clone(),
            status: job.status,
            created_at: job.created_at,
            body: job.body.clone(),
        }
    }
}
