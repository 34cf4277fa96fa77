//! Full submit -> claim -> process -> read lifecycle through real workers.

use aviary::api::{build_router, ApiState};
use aviary::storage::InMemoryStore;
use aviary::testing::{FailingProcessor, FlakyProcessor, StaticProcessor};
use aviary::{Action, JobId, JobStatus, Observer, Queue, Severity, Worker};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::common::wait_for_job_status;

struct Fixture {
    router: axum::Router,
    queue: Arc<Queue>,
    observer: Arc<Observer>,
}

fn fixture() -> Fixture {
    let queue = Arc::new(Queue::new(Arc::new(InMemoryStore::new())));
    let observer = Arc::new(Observer::new(Arc::new(InMemoryStore::new())));
    let router = build_router(ApiState {
        queue: Arc::clone(&queue),
        observer: Arc::clone(&observer),
    });
    Fixture {
        router,
        queue,
        observer,
    }
}

async fn submit(fx: &Fixture, name: &str) -> StatusCode {
    let request = Request::builder()
        .method("POST")
        .uri("/bird")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": name }).to_string()))
        .unwrap();
    fx.router.clone().oneshot(request).await.unwrap().status()
}

/// Test: a submitted job flows through a worker to completion and its trace
/// holds submitted, claimed, completed in timestamp order.
#[tokio::test]
async fn test_worker_completes_submitted_job() {
    let fx = fixture();
    let id = JobId::new("brown-pelican");

    assert_eq!(submit(&fx, "Brown Pelican").await, StatusCode::CREATED);

    let worker = Worker::new(
        Arc::clone(&fx.queue),
        Arc::clone(&fx.observer),
        Arc::new(StaticProcessor::new("large seabird of the pelican family")),
    )
    .with_poll_interval(Duration::from_millis(10));
    let handle = worker.spawn();

    let job = wait_for_job_status(&fx.queue, &id, JobStatus::Completed, Duration::from_secs(2)).await;
    handle.abort();

    assert_eq!(job.body["research"], "large seabird of the pelican family");

    // Readable through the admission surface now.
    let response = fx
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bird?name=Brown%20Pelican")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = fx.observer.trace(&id).await.unwrap();
    assert_eq!(events.len(), 3);
    for action in [Action::JobSubmitted, Action::JobClaimed, Action::JobCompleted] {
        assert!(
            events.iter().any(|e| e.action == action),
            "trace holds {:?}",
            action
        );
    }
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

/// Test: a transient failure retries with backoff and then completes.
#[tokio::test]
async fn test_flaky_job_retries_then_completes() {
    let fx = fixture();
    let id = JobId::new("osprey");

    assert_eq!(submit(&fx, "Osprey").await, StatusCode::CREATED);

    let worker = Worker::new(
        Arc::clone(&fx.queue),
        Arc::clone(&fx.observer),
        Arc::new(FlakyProcessor::new(1, "a fish hawk")),
    )
    .with_poll_interval(Duration::from_millis(10))
    .with_base_delay_ms(10);
    let handle = worker.spawn();

    let job = wait_for_job_status(&fx.queue, &id, JobStatus::Completed, Duration::from_secs(2)).await;
    handle.abort();

    assert_eq!(job.retry_count, 1);
    assert_eq!(job.body["research"], "a fish hawk");

    let events = fx.observer.trace(&id).await.unwrap();
    let retry = events
        .iter()
        .find(|e| e.action == Action::JobRetry)
        .expect("job-retry recorded");
    assert_eq!(retry.severity, Severity::Warning);
    assert_eq!(retry.body["retryCount"], 1);
    assert!(retry.body["nextAvailableAt"].is_number());
}

/// Test: exhausted retries end in a permanent failure, and resubmission
/// resets the record.
#[tokio::test]
async fn test_exhausted_retries_then_resubmit() {
    let fx = fixture();
    let id = JobId::new("dodo");

    assert_eq!(submit(&fx, "Dodo").await, StatusCode::CREATED);

    let worker = Worker::new(
        Arc::clone(&fx.queue),
        Arc::clone(&fx.observer),
        Arc::new(FailingProcessor),
    )
    .with_poll_interval(Duration::from_millis(10))
    .with_base_delay_ms(10)
    .with_max_retries(1);
    let handle = worker.spawn();

    let job = wait_for_job_status(&fx.queue, &id, JobStatus::Failed, Duration::from_secs(2)).await;
    handle.abort();

    // One retry, then permanent failure; the count never exceeds the bound.
    assert_eq!(job.retry_count, 1);

    let events = fx.observer.trace(&id).await.unwrap();
    let failed = events
        .iter()
        .find(|e| e.action == Action::JobFailed)
        .expect("job-failed recorded");
    assert_eq!(failed.severity, Severity::Error);

    // Not readable while failed.
    let response = fx
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/bird?name=Dodo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Resubmission resets the record to a fresh queued job.
    assert_eq!(submit(&fx, "Dodo").await, StatusCode::CREATED);
    let job = fx.queue.get(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retry_count, 0);
}

/// Test: retried work waits out its backoff while later submissions overtake
/// it.
#[tokio::test]
async fn test_retry_ordering_with_explicit_clock() {
    let queue = Queue::new(Arc::new(InMemoryStore::new()));

    queue.submit_at("A", 1_000).await.unwrap();
    let a = queue.claim_at(1_000).await.unwrap().unwrap();
    queue.retry(&a.id, 61_000).await.unwrap().unwrap();

    queue.submit_at("B", 2_000).await.unwrap();

    // B overtakes A while A waits out its backoff.
    let first = queue.claim_at(2_000).await.unwrap().unwrap();
    assert_eq!(first.id.as_str(), "b");
    assert!(queue.claim_at(2_000).await.unwrap().is_none());

    // Once the clock passes A's availability, A comes back with its
    // incremented retry count.
    let second = queue.claim_at(61_000).await.unwrap().unwrap();
    assert_eq!(second.id.as_str(), "a");
    assert_eq!(second.retry_count, 1);
}

/// Test: two workers over one queue never process the same job.
#[tokio::test]
async fn test_two_workers_split_the_queue() {
    let fx = fixture();

    for name in ["A", "B", "C", "D", "E", "F"] {
        assert_eq!(submit(&fx, name).await, StatusCode::CREATED);
    }

    let mut handles = Vec::new();
    for _ in 0..2 {
        let worker = Worker::new(
            Arc::clone(&fx.queue),
            Arc::clone(&fx.observer),
            Arc::new(StaticProcessor::new("done")),
        )
        .with_poll_interval(Duration::from_millis(5));
        handles.push(worker.spawn());
    }

    for name in ["a", "b", "c", "d", "e", "f"] {
        wait_for_job_status(
            &fx.queue,
            &JobId::new(name),
            JobStatus::Completed,
            Duration::from_secs(2),
        )
        .await;
    }
    for handle in handles {
        handle.abort();
    }

    // Exactly one claimed and one completed event per job.
    for name in ["a", "b", "c", "d", "e", "f"] {
        let events = fx.observer.trace(&JobId::new(name)).await.unwrap();
        let claims = events.iter().filter(|e| e.action == Action::JobClaimed).count();
        let completions = events
            .iter()
            .filter(|e| e.action == Action::JobCompleted)
            .count();
        assert_eq!(claims, 1, "job {} claimed once", name);
        assert_eq!(completions, 1, "job {} completed once", name);
    }
}
