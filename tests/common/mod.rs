//! Common test utilities shared across integration tests.

use aviary::{Job, JobId, JobStatus, Queue};
use std::time::Duration;

/// Wait for a job to reach an expected status, polling the queue.
///
/// This is more reliable than fixed sleeps since worker timing can vary.
/// Polls every 10ms and times out after the specified duration.
///
/// # Panics
///
/// Panics if the timeout is reached before the job reaches the expected
/// status.
pub async fn wait_for_job_status(
    queue: &Queue,
    id: &JobId,
    expected: JobStatus,
    timeout: Duration,
) -> Job {
    let start = tokio::time::Instant::now();
    loop {
        if let Some(job) = queue.get(id).await.unwrap() {
            if job.status == expected {
                return job;
            }
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for job {} to reach {:?}",
                id, expected
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
