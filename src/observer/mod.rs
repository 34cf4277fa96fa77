//! Append-only event log with derived metrics and passive alerting.
//!
//! Events are written once at key `pad(timestamp) || "-" || uuid` and never
//! mutated. Tracing and metrics are computed on read: tracing scans the whole
//! log, metrics bound their scan with a start key derived from the window.
//! After every `job-failed` write the failure rate over the default window is
//! re-evaluated and, above the threshold, an alert goes to the sink.

mod event;

pub use event::{Action, Event, Severity};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{
    DEFAULT_FAILURE_RATE_THRESHOLD, DEFAULT_METRICS_WINDOW_MS, DEFAULT_TIMESTAMP_PAD_LENGTH,
};
use crate::core::types::{now_ms, JobId};
use crate::storage::{ordered_key, StorageError, Store};

/// Table holding the event log.
const EVENTS_TABLE: &str = "events";

/// Destination for failure-rate alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert message.
    async fn alert(&self, message: &str);
}

/// Default sink: write the alert to standard output.
pub struct StdoutAlertSink;

#[async_trait]
impl AlertSink for StdoutAlertSink {
    async fn alert(&self, message: &str) {
        println!("{}", message);
    }
}

/// Metrics derived over a time window, computed on read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Count of `job-submitted` events in the window.
    pub submitted: u64,
    /// Count of `job-completed` events in the window.
    pub completed: u64,
    /// Count of `job-failed` events in the window.
    pub failed: u64,
    /// `failed / (completed + failed)`, or 0 when nothing terminated.
    pub failure_rate: f64,
    /// Mean claim-to-complete time over jobs with both events in the window;
    /// null when no such pair exists.
    pub avg_processing_time_ms: Option<f64>,
}

/// The event log and its derived views.
pub struct Observer {
    store: Arc<dyn Store>,
    pad_width: usize,
    default_window_ms: u64,
    failure_rate_threshold: f64,
    alert_sink: Arc<dyn AlertSink>,
}

impl Observer {
    /// Create an observer over the given store with default window,
    /// threshold, and stdout alerting.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            pad_width: DEFAULT_TIMESTAMP_PAD_LENGTH,
            default_window_ms: DEFAULT_METRICS_WINDOW_MS,
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
            alert_sink: Arc::new(StdoutAlertSink),
        }
    }

    /// Set the timestamp pad width used for event keys.
    pub fn with_pad_width(mut self, width: usize) -> Self {
        self.pad_width = width;
        self
    }

    /// Set the default metrics window.
    pub fn with_default_window_ms(mut self, window_ms: u64) -> Self {
        self.default_window_ms = window_ms;
        self
    }

    /// Set the failure-rate alert threshold.
    pub fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold;
        self
    }

    /// Set the alert sink.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = sink;
        self
    }

    /// The window used when a caller does not supply one.
    pub fn default_window_ms(&self) -> u64 {
        self.default_window_ms
    }

    /// Append an event to the log.
    ///
    /// A `job-failed` event additionally re-evaluates the failure rate over
    /// the default window and may emit an alert.
    pub async fn log(
        &self,
        action: Action,
        severity: Severity,
        body: Value,
    ) -> Result<Event, StorageError> {
        self.log_at(action, severity, body, now_ms()).await
    }

    /// [`Observer::log`] with an explicit timestamp.
    pub async fn log_at(
        &self,
        action: Action,
        severity: Severity,
        body: Value,
        now: u64,
    ) -> Result<Event, StorageError> {
        let event = Event::at(action, severity, body, now);
        let key = ordered_key(now, &event.id.to_string(), self.pad_width);
        self.store
            .put(EVENTS_TABLE, &key, encode(&event)?)
            .await?;

        if action == Action::JobFailed {
            self.evaluate_failure_rate(now).await?;
        }
        Ok(event)
    }

    /// All events referencing the given job id, in timestamp order.
    pub async fn trace(&self, job_id: &JobId) -> Result<Vec<Event>, StorageError> {
        let rows = self.store.scan(EVENTS_TABLE, "", None).await?;
        let mut events = Vec::new();
        for (_, bytes) in rows {
            let event = decode(&bytes)?;
            if event.job_id() == Some(job_id.as_str()) {
                events.push(event);
            }
        }
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// Metrics over `[now - window_ms, now)`.
    pub async fn metrics(&self, window_ms: u64) -> Result<MetricsSnapshot, StorageError> {
        self.metrics_at(window_ms, now_ms()).await
    }

    /// [`Observer::metrics`] with an explicit current timestamp.
    pub async fn metrics_at(
        &self,
        window_ms: u64,
        now: u64,
    ) -> Result<MetricsSnapshot, StorageError> {
        // Ordered keys let the scan start at the window boundary instead of
        // the beginning of the log.
        let start = now.saturating_sub(window_ms);
        let start_key = format!("{:0width$}", start, width = self.pad_width);
        let rows = self.store.scan(EVENTS_TABLE, &start_key, None).await?;

        let mut submitted = 0u64;
        let mut completed = 0u64;
        let mut failed = 0u64;
        let mut claimed_at: HashMap<String, u64> = HashMap::new();
        let mut completed_at: HashMap<String, u64> = HashMap::new();

        for (_, bytes) in rows {
            let event = decode(&bytes)?;
            match event.action {
                Action::JobSubmitted => submitted += 1,
                Action::JobClaimed => {
                    if let Some(job_id) = event.job_id() {
                        claimed_at.insert(job_id.to_string(), event.timestamp);
                    }
                }
                Action::JobCompleted => {
                    completed += 1;
                    if let Some(job_id) = event.job_id() {
                        completed_at.insert(job_id.to_string(), event.timestamp);
                    }
                }
                Action::JobFailed => failed += 1,
                _ => {}
            }
        }

        // Pair after the scan: only jobs with both events inside the window
        // contribute.
        let durations: Vec<u64> = completed_at
            .iter()
            .filter_map(|(job_id, complete_ts)| {
                claimed_at
                    .get(job_id)
                    .map(|claim_ts| complete_ts.saturating_sub(*claim_ts))
            })
            .collect();

        let terminated = completed + failed;
        let failure_rate = if terminated == 0 {
            0.0
        } else {
            failed as f64 / terminated as f64
        };
        let avg_processing_time_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64)
        };

        Ok(MetricsSnapshot {
            submitted,
            completed,
            failed,
            failure_rate,
            avg_processing_time_ms,
        })
    }

    async fn evaluate_failure_rate(&self, now: u64) -> Result<(), StorageError> {
        let metrics = self.metrics_at(self.default_window_ms, now).await?;
        if metrics.failure_rate > self.failure_rate_threshold {
            let message = format!(
                "ALERT: High failure rate detected: {:.1}% ({}/{} jobs failed)",
                metrics.failure_rate * 100.0,
                metrics.failed,
                metrics.completed + metrics.failed
            );
            self.alert_sink.alert(&message).await;
        }
        Ok(())
    }
}

fn encode(event: &Event) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(event).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Event, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
