//! API request handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::job::JobStatus;
use crate::core::types::JobId;
use crate::observer::{Action, MetricsSnapshot, Observer, Severity};
use crate::queue::Queue;

use super::errors::ApiError;
use super::responses::{HealthResponse, JobDetailResponse, JobSummaryResponse};

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub queue: Arc<Queue>,
    pub observer: Arc<Observer>,
}

/// Query parameters for the research lookup endpoint.
#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub name: Option<String>,
}

/// Query parameters for the metrics endpoint.
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub window: Option<u64>,
}

/// Mirror an admission request into the event log. Failures here must not
/// fail the request itself.
async fn record_request(
    state: &ApiState,
    method: &str,
    path: &str,
    query: Option<Value>,
    body: Option<Value>,
) {
    let mut payload = json!({ "method": method, "path": path });
    if let Some(query) = query {
        payload["query"] = query;
    }
    if let Some(body) = body {
        payload["body"] = body;
    }
    if let Err(e) = state
        .observer
        .log(Action::ApiRequest, Severity::Log, payload)
        .await
    {
        tracing::warn!(error = %e, "Failed to record api request");
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Submit a research request.
///
/// `201` with the job summary when freshly created or reset from failed,
/// `200` with the existing record when deduplicated, `400` on a missing or
/// non-string `name`.
pub async fn submit_bird(
    State(state): State<ApiState>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    record_request(&state, "POST", "/bird", None, Some(payload.clone())).await;

    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest("missing or non-string 'name'".to_string()))?;

    let outcome = state.queue.submit(name).await?;
    let job = &outcome.job;

    if outcome.is_duplicate {
        state
            .observer
            .log(
                Action::JobDuplicate,
                Severity::Log,
                json!({
                    "jobId": job.id.as_str(),
                    "name": name,
                    "currentStatus": job.status.as_str(),
                }),
            )
            .await?;
        Ok((StatusCode::OK, Json(JobSummaryResponse::from(job))).into_response())
    } else {
        state
            .observer
            .log(
                Action::JobSubmitted,
                Severity::Log,
                json!({
                    "jobId": job.id.as_str(),
                    "name": name,
                }),
            )
            .await?;
        Ok((StatusCode::CREATED, Json(JobSummaryResponse::from(job))).into_response())
    }
}

/// Fetch completed research by request name.
///
/// `200` only when the job exists and has completed; `404` otherwise; `400`
/// when `name` is missing.
pub async fn get_bird(
    State(state): State<ApiState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<JobDetailResponse>, ApiError> {
    record_request(
        &state,
        "GET",
        "/bird",
        Some(json!({ "name": query.name })),
        None,
    )
    .await;

    let name = query
        .name
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing 'name' query parameter".to_string()))?;

    let id = JobId::from_name(name);
    match state.queue.get(&id).await? {
        Some(job) if job.status == JobStatus::Completed => Ok(Json(JobDetailResponse::from(&job))),
        _ => Err(ApiError::NotFound(format!(
            "no completed research for '{}'",
            name
        ))),
    }
}

/// Metrics over a window (default: the observer's configured window).
pub async fn get_metrics(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<MetricsSnapshot>, ApiError> {
    record_request(
        &state,
        "GET",
        "/metrics",
        Some(json!({ "window": query.window })),
        None,
    )
    .await;

    let window_ms = query
        .window
        .unwrap_or_else(|| state.observer.default_window_ms());
    Ok(Json(state.observer.metrics(window_ms).await?))
}
