//! Admission API integration tests.

use aviary::api::{build_router, ApiState};
use aviary::storage::{InMemoryStore, Store};
use aviary::{Action, Event, JobId, JobStatus, Observer, Queue};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Test fixture holding the router plus direct handles on its components.
struct Fixture {
    router: axum::Router,
    queue: Arc<Queue>,
    observer: Arc<Observer>,
    observer_store: Arc<InMemoryStore>,
}

fn fixture() -> Fixture {
    let queue = Arc::new(Queue::new(Arc::new(InMemoryStore::new())));
    let observer_store = Arc::new(InMemoryStore::new());
    let observer = Arc::new(Observer::new(
        Arc::clone(&observer_store) as Arc<dyn Store>
    ));
    let router = build_router(ApiState {
        queue: Arc::clone(&queue),
        observer: Arc::clone(&observer),
    });
    Fixture {
        router,
        queue,
        observer,
        observer_store,
    }
}

fn submit_request(payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/bird")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Test: fresh submission returns 201 with the job summary and records a
/// job-submitted event.
#[tokio::test]
async fn test_submit_new_returns_201() {
    let fx = fixture();

    let response = fx
        .router
        .clone()
        .oneshot(submit_request(&json!({"name": "Brown Pelican"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["id"], "brown-pelican");
    assert_eq!(body["name"], "Brown Pelican");
    assert_eq!(body["status"], "queued");
    assert!(body["createdAt"].is_number());
    assert!(body.get("body").is_none(), "summary omits the payload");

    let events = fx.observer.trace(&JobId::new("brown-pelican")).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, Action::JobSubmitted);
    assert_eq!(events[0].body["name"], "Brown Pelican");
}

/// Test: resubmitting a live job returns 200 with the same record and leaves
/// exactly one record in the queue.
#[tokio::test]
async fn test_duplicate_submission_returns_200() {
    let fx = fixture();

    let first = fx
        .router
        .clone()
        .oneshot(submit_request(&json!({"name": "Brown Pelican"})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = read_json(first).await;

    let second = fx
        .router
        .clone()
        .oneshot(submit_request(&json!({"name": "Brown Pelican"})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = read_json(second).await;

    assert_eq!(second_body["id"], first_body["id"]);
    assert_eq!(second_body["createdAt"], first_body["createdAt"]);

    let events = fx.observer.trace(&JobId::new("brown-pelican")).await.unwrap();
    let duplicate = events
        .iter()
        .find(|e| e.action == Action::JobDuplicate)
        .expect("job-duplicate recorded");
    assert_eq!(duplicate.body["currentStatus"], "queued");

    let job = fx
        .queue
        .get(&JobId::new("brown-pelican"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);
}

/// Test: a missing or non-string name is rejected with 400.
#[tokio::test]
async fn test_submit_invalid_name_returns_400() {
    let fx = fixture();

    for payload in [json!({}), json!({"name": 42}), json!({"name": null})] {
        let response = fx
            .router
            .clone()
            .oneshot(submit_request(&payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert!(body["error"].is_string());
    }
}

/// Test: lookup without a name is a 400.
#[tokio::test]
async fn test_get_bird_without_name_returns_400() {
    let fx = fixture();

    let response = fx.router.clone().oneshot(get_request("/bird")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: lookup of unknown or not-yet-completed research is a 404.
#[tokio::test]
async fn test_get_bird_not_completed_returns_404() {
    let fx = fixture();

    let response = fx
        .router
        .clone()
        .oneshot(get_request("/bird?name=Dodo"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Queued but not completed is still a 404.
    fx.router
        .clone()
        .oneshot(submit_request(&json!({"name": "Dodo"})))
        .await
        .unwrap();
    let response = fx
        .router
        .clone()
        .oneshot(get_request("/bird?name=Dodo"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Test: claim-complete makes the research readable; a fresh claim finds
/// nothing.
#[tokio::test]
async fn test_completed_research_is_readable() {
    let fx = fixture();

    fx.router
        .clone()
        .oneshot(submit_request(&json!({"name": "Brown Pelican"})))
        .await
        .unwrap();

    let claimed = fx.queue.claim().await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Processing);
    fx.queue
        .complete(&claimed.id, json!({"research": "x"}))
        .await
        .unwrap()
        .unwrap();

    let response = fx
        .router
        .clone()
        .oneshot(get_request("/bird?name=Brown%20Pelican"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["id"], "brown-pelican");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["body"]["research"], "x");

    assert!(fx.queue.claim().await.unwrap().is_none());
}

/// Test: a failed job reads as 404 and resubmission resets it (201, fresh
/// record, immediately eligible).
#[tokio::test]
async fn test_failed_job_resets_on_resubmit() {
    let fx = fixture();

    fx.router
        .clone()
        .oneshot(submit_request(&json!({"name": "Albatross"})))
        .await
        .unwrap();
    let claimed = fx.queue.claim().await.unwrap().unwrap();
    fx.queue.fail(&claimed.id).await.unwrap().unwrap();

    let response = fx
        .router
        .clone()
        .oneshot(get_request("/bird?name=Albatross"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = fx
        .router
        .clone()
        .oneshot(submit_request(&json!({"name": "Albatross"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["status"], "queued");

    let job = fx.queue.get(&JobId::new("albatross")).await.unwrap().unwrap();
    assert_eq!(job.retry_count, 0);
    assert!(fx.queue.claim().await.unwrap().is_some());
}

/// Test: metrics endpoint returns the snapshot shape, with and without an
/// explicit window.
#[tokio::test]
async fn test_metrics_endpoint() {
    let fx = fixture();

    fx.router
        .clone()
        .oneshot(submit_request(&json!({"name": "Brown Pelican"})))
        .await
        .unwrap();

    let response = fx
        .router
        .clone()
        .oneshot(get_request("/metrics?window=60000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["submitted"], 1);
    assert_eq!(body["completed"], 0);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["failureRate"], 0.0);
    assert!(body["avgProcessingTimeMs"].is_null());

    // Default window.
    let response = fx
        .router
        .clone()
        .oneshot(get_request("/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test: every admission request is mirrored as an api-request event.
#[tokio::test]
async fn test_api_requests_are_mirrored_to_the_event_log() {
    let fx = fixture();

    fx.router
        .clone()
        .oneshot(submit_request(&json!({"name": "Brown Pelican"})))
        .await
        .unwrap();
    fx.router
        .clone()
        .oneshot(get_request("/bird?name=Brown%20Pelican"))
        .await
        .unwrap();
    fx.router
        .clone()
        .oneshot(get_request("/metrics"))
        .await
        .unwrap();

    let rows = fx.observer_store.scan("events", "", None).await.unwrap();
    let events: Vec<Event> = rows
        .iter()
        .map(|(_, bytes)| serde_json::from_slice(bytes).unwrap())
        .collect();

    let api_requests: Vec<&Event> = events
        .iter()
        .filter(|e| e.action == Action::ApiRequest)
        .collect();
    assert_eq!(api_requests.len(), 3);

    let post = api_requests
        .iter()
        .find(|e| e.body["method"] == "POST")
        .expect("POST mirrored");
    assert_eq!(post.body["path"], "/bird");
    assert_eq!(post.body["body"]["name"], "Brown Pelican");

    let lookup = api_requests
        .iter()
        .find(|e| e.body["path"] == "/bird" && e.body["method"] == "GET")
        .expect("GET mirrored");
    assert_eq!(lookup.body["query"]["name"], "Brown Pelican");
}
