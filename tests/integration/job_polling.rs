//! Integration tests for the job polling state machine against a mock
//! reporting API

use chrono::{TimeZone, Utc};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use usage_event_relay::fetcher::{FetcherError, JobPoller, ReportingHttpClient};
use usage_event_relay::relay::{ApiKey, TimeWindow};
use usage_event_relay::shutdown::ShutdownCoordinator;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn window() -> TimeWindow {
    TimeWindow::between(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn http_client(server: &MockServer, timeout: Duration) -> ReportingHttpClient {
    let client = Client::builder().timeout(timeout).build().unwrap();
    let url = Url::parse(&format!("{}/usage", server.uri())).unwrap();
    ReportingHttpClient::new(client, url, ApiKey::new("test-key"))
}

/// Serve `bodies` in order, repeating the last one
async fn mount_sequence(server: &MockServer, bodies: Vec<Value>) {
    let calls = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path("/usage"))
        .respond_with(move |_req: &Request| -> ResponseTemplate {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let body = bodies[n.min(bodies.len() - 1)].clone();
            ResponseTemplate::new(200).set_body_json(body)
        })
        .mount(server)
        .await;
}

fn query_param(req: &Request, name: &str) -> Option<String> {
    req.url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_single_completed_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usage"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobId": "job-1",
            "status": "COMPLETED",
            "total": 2,
            "data": [
                {"date": "2024-01-02T00:00:00.000", "user": "b"},
                {"date": "2024-01-01T00:00:00.000", "user": "a"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let http = http_client(&server, Duration::from_secs(5));
    let outcome = JobPoller::new(&http, 100, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.pages, 1);
    assert_eq!(outcome.requests, 1);
    assert_eq!(outcome.job_id.as_deref(), Some("job-1"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(query_param(&requests[0], "from").as_deref(), Some("2024-01-01T00:00:00.000"));
    assert_eq!(query_param(&requests[0], "to").as_deref(), Some("2024-01-31T00:00:00.000"));
    assert_eq!(query_param(&requests[0], "pageSize").as_deref(), Some("100"));
    assert!(query_param(&requests[0], "jobId").is_none());
    assert!(query_param(&requests[0], "pageToken").is_none());
}

#[tokio::test]
async fn test_pending_then_completed_without_data() {
    let server = MockServer::start().await;
    mount_sequence(
        &server,
        vec![
            json!({"jobId": "job-7", "status": "PENDING"}),
            json!({"jobId": "job-7", "status": "completed", "data": []}),
        ],
    )
    .await;

    let http = http_client(&server, Duration::from_secs(5));
    let outcome = JobPoller::new(&http, 50, Duration::from_millis(10), 10)
        .poll(&window())
        .await
        .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.pages, 0);
    assert_eq!(outcome.requests, 2);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(query_param(&requests[1], "jobId").as_deref(), Some("job-7"));
    // Same window on the re-issued call
    assert_eq!(query_param(&requests[0], "from"), query_param(&requests[1], "from"));
    assert_eq!(query_param(&requests[0], "to"), query_param(&requests[1], "to"));
}

#[tokio::test]
async fn test_follows_page_tokens_until_exhausted() {
    let server = MockServer::start().await;
    mount_sequence(
        &server,
        vec![
            json!({"jobId": "j", "status": "COMPLETED", "pageToken": "p2", "total": 3,
                   "data": [{"date": "2024-01-01"}]}),
            json!({"jobId": "j", "status": "COMPLETED", "pageToken": "p3", "total": 3,
                   "data": [{"date": "2024-01-02"}]}),
            json!({"jobId": "j", "status": "COMPLETED", "pageToken": null, "total": 3,
                   "data": [{"date": "2024-01-03"}]}),
        ],
    )
    .await;

    let http = http_client(&server, Duration::from_secs(5));
    let outcome = JobPoller::new(&http, 1, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.requests, 3);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3, "must stop exactly at COMPLETED without pageToken");
    assert_eq!(query_param(&requests[1], "pageToken").as_deref(), Some("p2"));
    assert_eq!(query_param(&requests[2], "pageToken").as_deref(), Some("p3"));
    assert_eq!(query_param(&requests[2], "jobId").as_deref(), Some("j"));
}

#[tokio::test]
async fn test_empty_page_token_means_exhausted() {
    let server = MockServer::start().await;
    mount_sequence(
        &server,
        vec![json!({"jobId": "j", "status": "COMPLETED", "pageToken": "", "data": [{"date": "2024-01-01"}]})],
    )
    .await;

    let http = http_client(&server, Duration::from_secs(5));
    let outcome = JobPoller::new(&http, 10, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap();
    assert_eq!(outcome.requests, 1);
}

async fn poll_with_status(status: u16) -> FetcherError {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
        .mount(&server)
        .await;

    let http = http_client(&server, Duration::from_secs(5));
    JobPoller::new(&http, 10, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_status_classification() {
    assert!(matches!(poll_with_status(400).await, FetcherError::BadRequest(ref b) if b == "nope"));
    assert!(matches!(poll_with_status(401).await, FetcherError::InvalidCredentials(401)));
    assert!(matches!(poll_with_status(403).await, FetcherError::InvalidCredentials(403)));
    assert!(matches!(
        poll_with_status(500).await,
        FetcherError::HttpError { status: 500, .. }
    ));
}

#[tokio::test]
async fn test_missing_job_id_is_fatal() {
    let server = MockServer::start().await;
    mount_sequence(&server, vec![json!({"status": "COMPLETED", "data": [{"date": "2024-01-01"}]})]).await;

    let http = http_client(&server, Duration::from_secs(5));
    let err = JobPoller::new(&http, 10, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::InvalidResponse(ref msg) if msg.contains("jobId")));
}

#[tokio::test]
async fn test_missing_status_is_fatal() {
    let server = MockServer::start().await;
    mount_sequence(&server, vec![json!({"jobId": "j"})]).await;

    let http = http_client(&server, Duration::from_secs(5));
    let err = JobPoller::new(&http, 10, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::InvalidResponse(ref msg) if msg.contains("status")));
}

#[tokio::test]
async fn test_undecodable_body_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let http = http_client(&server, Duration::from_secs(5));
    let err = JobPoller::new(&http, 10, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_timeout_returns_partial_records() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .respond_with(move |_req: &Request| -> ResponseTemplate {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(200).set_body_json(json!({
                    "jobId": "j", "status": "COMPLETED", "pageToken": "p2",
                    "data": [{"date": "2024-01-01"}, {"date": "2024-01-02"}]
                }))
            } else {
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"jobId": "j", "status": "COMPLETED"}))
            }
        })
        .mount(&server)
        .await;

    let http = http_client(&server, Duration::from_millis(300));
    let outcome = JobPoller::new(&http, 2, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.requests, 2);
    assert!(matches!(outcome.interruption, Some(FetcherError::NetworkError(_))));
}

#[tokio::test]
async fn test_poll_budget_is_enforced() {
    let server = MockServer::start().await;
    mount_sequence(&server, vec![json!({"jobId": "j", "status": "RUNNING"})]).await;

    let http = http_client(&server, Duration::from_secs(5));
    let err = JobPoller::new(&http, 10, Duration::ZERO, 3)
        .poll(&window())
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::PollLimitExceeded(3)));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_shutdown_cancels_before_next_request() {
    let server = MockServer::start().await;
    mount_sequence(&server, vec![json!({"jobId": "j", "status": "RUNNING"})]).await;

    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let http = http_client(&server, Duration::from_secs(5));
    let err = JobPoller::new(&http, 10, Duration::ZERO, 10)
        .with_shutdown(shutdown)
        .poll(&window())
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Cancelled));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_interrupts_poll_wait() {
    let server = MockServer::start().await;
    mount_sequence(&server, vec![json!({"jobId": "j", "status": "RUNNING"})]).await;

    let shutdown = ShutdownCoordinator::shared();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.request_shutdown();
    });

    let http = http_client(&server, Duration::from_secs(5));
    let err = JobPoller::new(&http, 10, Duration::from_secs(30), 10)
        .with_shutdown(shutdown)
        .poll(&window())
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Cancelled));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_integer_total_does_not_fail_the_query() {
    let server = MockServer::start().await;
    mount_sequence(
        &server,
        vec![
            json!({"jobId": "j", "status": "COMPLETED", "pageToken": "p2", "total": "2",
                   "data": [{"date": "2024-01-01"}]}),
            json!({"jobId": "j", "status": "COMPLETED", "total": 2.5,
                   "data": [{"date": "2024-01-02"}]}),
        ],
    )
    .await;

    let http = http_client(&server, Duration::from_secs(5));
    let outcome = JobPoller::new(&http, 1, Duration::ZERO, 10)
        .poll(&window())
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.pages, 2);
}
