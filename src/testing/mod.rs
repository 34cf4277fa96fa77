//! Testing utilities for users of the aviary library.
//!
//! - [`StaticProcessor`]: always succeeds with a fixed body
//! - [`FailingProcessor`]: always fails
//! - [`FlakyProcessor`]: fails N times, then succeeds
//! - [`RecordingAlertSink`]: captures alert messages for assertions

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

use crate::core::job::Job;
use crate::observer::AlertSink;
use crate::worker::{Processor, ProcessorError};

/// Processor that always succeeds with a fixed result body.
pub struct StaticProcessor {
    body: Value,
}

impl StaticProcessor {
    /// Succeed with `{"research": text}`.
    pub fn new(text: &str) -> Self {
        Self {
            body: json!({ "research": text }),
        }
    }

    /// Succeed with an arbitrary body.
    pub fn with_body(body: Value) -> Self {
        Self { body }
    }
}

#[async_trait]
impl Processor for StaticProcessor {
    async fn process(&self, _job: &Job) -> Result<Value, ProcessorError> {
        Ok(self.body.clone())
    }
}

/// Processor that always fails.
pub struct FailingProcessor;

#[async_trait]
impl Processor for FailingProcessor {
    async fn process(&self, job: &Job) -> Result<Value, ProcessorError> {
        Err(ProcessorError::Failed(format!(
            "simulated failure for '{}'",
            job.name
        )))
    }
}

/// Processor that fails a set number of times, then succeeds.
pub struct FlakyProcessor {
    remaining_failures: AtomicU32,
    body: Value,
}

impl FlakyProcessor {
    /// Fail `failures` times, then succeed with `{"research": text}`.
    pub fn new(failures: u32, text: &str) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            body: json!({ "research": text }),
        }
    }
}

#[async_trait]
impl Processor for FlakyProcessor {
    async fn process(&self, job: &Job) -> Result<Value, ProcessorError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProcessorError::Failed(format!(
                "simulated transient failure for '{}'",
                job.name
            )));
        }
        Ok(self.body.clone())
    }
}

/// Alert sink that records messages instead of printing them.
pub struct RecordingAlertSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlertSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Messages delivered so far.
    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

impl Default for RecordingAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn alert(&self, message: &str) {
        self.messages.lock().await.push(message.to_string());
    }
}
