//! Immutable observer events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::types::now_ms;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine lifecycle record.
    Log,
    /// Degraded but recoverable (a retry, for instance).
    Warning,
    /// Permanent failure.
    Error,
}

/// Enumerated action kind of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    JobSubmitted,
    JobDuplicate,
    JobClaimed,
    JobCompleted,
    JobRetry,
    JobFailed,
    ApiRequest,
    WorkerStart,
}

impl Action {
    /// Kebab-case wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::JobSubmitted => "job-submitted",
            Action::JobDuplicate => "job-duplicate",
            Action::JobClaimed => "job-claimed",
            Action::JobCompleted => "job-completed",
            Action::JobRetry => "job-retry",
            Action::JobFailed => "job-failed",
            Action::ApiRequest => "api-request",
            Action::WorkerStart => "worker-start",
        }
    }
}

/// A single record in the append-only event log. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    /// Wall-clock ms when the event was recorded.
    pub timestamp: u64,
    pub severity: Severity,
    pub action: Action,
    /// Structured key-value bag; shape varies by action.
    pub body: Value,
}

impl Event {
    /// Allocate a fresh event stamped with the current time.
    pub fn new(action: Action, severity: Severity, body: Value) -> Self {
        Self::at(action, severity, body, now_ms())
    }

    /// Allocate a fresh event with an explicit timestamp.
    pub fn at(action: Action, severity: Severity, body: Value, timestamp: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            severity,
            action,
            body,
        }
    }

    /// The job id this event references, when its body carries one.
    pub fn job_id(&self) -> Option<&str> {
        self.body.get("jobId").and_then(Value::as_str)
    }
}
