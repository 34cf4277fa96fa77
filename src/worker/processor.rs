//! The external processor interface and its Wikipedia reference
//! implementation.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::job::Job;

/// Errors a processor can raise. All of them are retryable from the worker's
/// point of view; the worker decides retry-or-fail from the retry count.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Transport-level failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),

    /// No article exists for the subject.
    #[error("no article found for '{0}'")]
    NotFound(String),

    /// The upstream payload did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Generic processing failure.
    #[error("{0}")]
    Failed(String),
}

/// Turns a claimed job into a result body, or fails.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Process one job. The returned value becomes the job's `body` on
    /// completion.
    async fn process(&self, job: &Job) -> Result<Value, ProcessorError>;
}

const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Reference processor: fetches the introductory extract for the job's
/// subject from the Wikipedia extracts API and returns
/// `{"research": extract}`. A missing page or absent extract is a failure.
pub struct WikipediaProcessor {
    client: reqwest::Client,
    endpoint: String,
}

impl WikipediaProcessor {
    /// Create a processor against the live Wikipedia API.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: WIKIPEDIA_API_URL.to_string(),
        }
    }

    /// Point the processor at an alternative endpoint (for tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for WikipediaProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for WikipediaProcessor {
    async fn process(&self, job: &Job) -> Result<Value, ProcessorError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", job.name.as_str()),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProcessorError::Status(response.status()));
        }

        let payload: Value = response.json().await?;
        let page = payload
            .pointer("/query/pages/0")
            .ok_or_else(|| ProcessorError::Malformed("missing query.pages".to_string()))?;

        if page.get("missing").is_some() {
            return Err(ProcessorError::NotFound(job.name.clone()));
        }
        let extract = page
            .get("extract")
            .and_then(Value::as_str)
            .ok_or_else(|| ProcessorError::NotFound(job.name.clone()))?;

        Ok(json!({ "research": extract }))
    }
}
