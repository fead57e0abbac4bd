//! End-to-end relay runs against mock reporting and callback servers

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use usage_event_relay::batch::BatchError;
use usage_event_relay::delivery::DeliveryError;
use usage_event_relay::fetcher::{EndpointKind, FetcherError};
use usage_event_relay::relay::{RelayConfig, RelayError, RelayExecutor, RunStatus};
use usage_event_relay::resume::ResumeError;
use usage_event_relay::shutdown::ShutdownCoordinator;
use usage_event_relay::RunIdentifier;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const IDENTIFIER: &str = "relay-test";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
}

struct Harness {
    api: MockServer,
    callback: MockServer,
    dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self {
            api: MockServer::start().await,
            callback: MockServer::start().await,
            dir: TempDir::new().unwrap(),
        }
    }

    fn executor(&self, chunk_size: usize) -> RelayExecutor {
        self.executor_with_timeout(chunk_size, 5)
    }

    fn executor_with_timeout(&self, chunk_size: usize, timeout_secs: u64) -> RelayExecutor {
        let config = RelayConfig::builder(
            EndpointKind::Web,
            "test-key",
            RunIdentifier::parse(IDENTIFIER).unwrap(),
            format!("{}/events", self.callback.uri()),
        )
        .base_url(format!("{}/usage", self.api.uri()))
        .chunk_size(chunk_size)
        .page_size(100)
        .timeout_secs(timeout_secs)
        .poll_interval_ms(0)
        .checkpoint_dir(self.dir.path())
        .build()
        .unwrap();
        RelayExecutor::new(config).unwrap()
    }

    fn checkpoint_path(&self) -> std::path::PathBuf {
        self.dir.path().join(format!("{IDENTIFIER}.checkpoint"))
    }

    fn stored_checkpoint(&self) -> Option<String> {
        std::fs::read_to_string(self.checkpoint_path()).ok()
    }

    async fn serve_api(&self, bodies: Vec<Value>) {
        let calls = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .and(path("/usage"))
            .respond_with(move |_req: &Request| -> ResponseTemplate {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(bodies[n.min(bodies.len() - 1)].clone())
            })
            .mount(&self.api)
            .await;
    }

    /// Callback answering each POST with the next status, repeating the last
    async fn serve_callback(&self, statuses: Vec<u16>) {
        let calls = Arc::new(AtomicUsize::new(0));
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(move |_req: &Request| -> ResponseTemplate {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(statuses[n.min(statuses.len() - 1)])
            })
            .mount(&self.callback)
            .await;
    }

    async fn posted_chunks(&self) -> Vec<Value> {
        self.callback
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|req| req.body_json::<Value>().unwrap())
            .collect()
    }

    async fn api_requests(&self) -> Vec<Request> {
        self.api.received_requests().await.unwrap()
    }
}

fn query_param(req: &Request, name: &str) -> Option<String> {
    req.url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_two_records_chunk_size_one() {
    let h = Harness::start().await;
    h.serve_api(vec![json!({
        "jobId": "job-1",
        "status": "COMPLETED",
        "total": 2,
        "data": [
            {"date": "2024-01-02T00:00:00.000", "seq": 2},
            {"date": "2024-01-01T00:00:00.000", "seq": 1}
        ]
    })])
    .await;
    h.serve_callback(vec![200]).await;

    let report = h.executor(1).run_at(now()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.records_fetched, 2);
    assert_eq!(report.records_delivered, 2);
    assert_eq!(report.chunks_delivered, 2);

    let chunks = h.posted_chunks().await;
    assert_eq!(
        chunks,
        vec![
            json!([{"date": "2024-01-01T00:00:00.000", "seq": 1}]),
            json!([{"date": "2024-01-02T00:00:00.000", "seq": 2}]),
        ]
    );

    assert_eq!(h.stored_checkpoint().as_deref(), Some("2024-01-02T00:00:01.000"));
    assert_eq!(
        report.checkpoint.map(|cp| cp.to_string()).as_deref(),
        Some("2024-01-02T00:00:01.000")
    );
}

#[tokio::test]
async fn test_first_run_queries_thirty_days() {
    let h = Harness::start().await;
    h.serve_api(vec![json!({"jobId": "j", "status": "COMPLETED"})]).await;

    h.executor(10).run_at(now()).await.unwrap();

    let requests = h.api_requests().await;
    assert_eq!(query_param(&requests[0], "from").as_deref(), Some("2023-12-11T00:00:00.000"));
    assert_eq!(query_param(&requests[0], "to").as_deref(), Some("2024-01-10T00:00:00.000"));
    assert_eq!(query_param(&requests[0], "pageSize").as_deref(), Some("100"));
}

#[tokio::test]
async fn test_pending_then_empty_completion_leaves_checkpoint() {
    let h = Harness::start().await;
    h.serve_api(vec![
        json!({"jobId": "j", "status": "PENDING"}),
        json!({"jobId": "j", "status": "COMPLETED"}),
    ])
    .await;
    h.serve_callback(vec![200]).await;

    let report = h.executor(10).run_at(now()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.requests, 2);
    assert_eq!(report.records_delivered, 0);
    assert!(h.posted_chunks().await.is_empty());
    assert!(h.stored_checkpoint().is_none());
    assert!(report.checkpoint.is_none());
}

#[tokio::test]
async fn test_second_delivery_failure_keeps_first_checkpoint() {
    let h = Harness::start().await;
    h.serve_api(vec![json!({
        "jobId": "j",
        "status": "COMPLETED",
        "data": [
            {"date": "2024-01-01T00:00:00.000"},
            {"date": "2024-01-02T00:00:00.000"}
        ]
    })])
    .await;
    h.serve_callback(vec![200, 500]).await;

    let report = h.executor(1).run_at(now()).await.unwrap();

    assert!(!report.is_success());
    assert!(matches!(
        report.status,
        RunStatus::DeliveryFailed(DeliveryError::Rejected { status: 500, .. })
    ));
    assert_eq!(report.records_delivered, 1);
    assert_eq!(report.chunks_delivered, 1);
    assert_eq!(h.stored_checkpoint().as_deref(), Some("2024-01-01T00:00:01.000"));
}

#[tokio::test]
async fn test_failure_stops_later_chunks() {
    let h = Harness::start().await;
    h.serve_api(vec![json!({
        "jobId": "j",
        "status": "COMPLETED",
        "data": [
            {"date": "2024-01-01"}, {"date": "2024-01-02"}, {"date": "2024-01-03"}
        ]
    })])
    .await;
    h.serve_callback(vec![503]).await;

    let report = h.executor(1).run_at(now()).await.unwrap();

    assert_eq!(h.posted_chunks().await.len(), 1);
    assert_eq!(report.records_delivered, 0);
    assert!(h.stored_checkpoint().is_none());
}

#[tokio::test]
async fn test_resumes_from_stored_checkpoint() {
    let h = Harness::start().await;
    std::fs::write(h.checkpoint_path(), "2024-01-05T12:00:00.000\n").unwrap();
    h.serve_api(vec![json!({
        "jobId": "j",
        "status": "COMPLETED",
        "data": [{"date": "2024-01-06T00:00:00.500"}]
    })])
    .await;
    h.serve_callback(vec![200]).await;

    let report = h.executor(10).run_at(now()).await.unwrap();

    let requests = h.api_requests().await;
    assert_eq!(query_param(&requests[0], "from").as_deref(), Some("2024-01-05T12:00:00.000"));
    assert_eq!(report.records_delivered, 1);
    assert_eq!(h.stored_checkpoint().as_deref(), Some("2024-01-06T00:00:01.500"));
}

#[tokio::test]
async fn test_corrupt_checkpoint_aborts_before_fetch() {
    let h = Harness::start().await;
    std::fs::write(h.checkpoint_path(), "yesterday-ish").unwrap();
    h.serve_api(vec![json!({"jobId": "j", "status": "COMPLETED"})]).await;

    let err = h.executor(10).run_at(now()).await.unwrap_err();

    assert!(matches!(err, RelayError::Resume(ResumeError::Corrupt { .. })));
    assert!(h.api_requests().await.is_empty());
    assert_eq!(h.stored_checkpoint().as_deref(), Some("yesterday-ish"));
}

#[tokio::test]
async fn test_auth_failure_delivers_nothing() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.api)
        .await;
    h.serve_callback(vec![200]).await;

    let err = h.executor(10).run_at(now()).await.unwrap_err();

    assert!(matches!(err, RelayError::Fetcher(FetcherError::InvalidCredentials(401))));
    assert!(h.posted_chunks().await.is_empty());
    assert!(h.stored_checkpoint().is_none());
}

#[tokio::test]
async fn test_unparseable_date_delivers_nothing() {
    let h = Harness::start().await;
    h.serve_api(vec![json!({
        "jobId": "j",
        "status": "COMPLETED",
        "data": [{"date": "2024-01-01"}, {"date": "soon"}]
    })])
    .await;
    h.serve_callback(vec![200]).await;

    let err = h.executor(10).run_at(now()).await.unwrap_err();

    assert!(matches!(err, RelayError::Batch(BatchError::InvalidDate { index: 1, .. })));
    assert!(h.posted_chunks().await.is_empty());
}

#[tokio::test]
async fn test_shutdown_before_run_cancels_poll() {
    let h = Harness::start().await;
    h.serve_api(vec![json!({"jobId": "j", "status": "COMPLETED", "data": [{"date": "2024-01-01"}]})])
        .await;

    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let err = h
        .executor(10)
        .with_shutdown(shutdown)
        .run_at(now())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Fetcher(FetcherError::Cancelled)));
    assert!(h.stored_checkpoint().is_none());
}

#[tokio::test]
async fn test_multi_page_records_are_ordered_across_pages() {
    let h = Harness::start().await;
    h.serve_api(vec![
        json!({"jobId": "j", "status": "COMPLETED", "pageToken": "t2",
               "data": [{"date": "2024-01-03", "n": 3}, {"date": "2024-01-01", "n": 1}]}),
        json!({"jobId": "j", "status": "COMPLETED",
               "data": [{"date": "2024-01-02", "n": 2}]}),
    ])
    .await;
    h.serve_callback(vec![200]).await;

    let report = h.executor(10).run_at(now()).await.unwrap();

    assert_eq!(report.pages, 2);
    let chunks = h.posted_chunks().await;
    assert_eq!(chunks.len(), 1);
    let order: Vec<u64> = chunks[0]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["n"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(h.stored_checkpoint().as_deref(), Some("2024-01-03T00:00:01.000"));
}

#[tokio::test]
async fn test_interrupted_poll_delivers_partial_records() {
    let h = Harness::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path("/usage"))
        .respond_with(move |_req: &Request| -> ResponseTemplate {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(200).set_body_json(json!({
                    "jobId": "j",
                    "status": "COMPLETED",
                    "pageToken": "p2",
                    "data": [
                        {"date": "2024-01-03T00:00:00.000"},
                        {"date": "2024-01-02T00:00:00.000"}
                    ]
                }))
            } else {
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(4))
                    .set_body_json(json!({"jobId": "j", "status": "COMPLETED"}))
            }
        })
        .mount(&h.api)
        .await;
    h.serve_callback(vec![200]).await;

    let report = h.executor_with_timeout(10, 1).run_at(now()).await.unwrap();

    assert!(!report.is_success());
    assert!(matches!(report.status, RunStatus::Completed));
    assert!(matches!(report.poll_interruption, Some(FetcherError::NetworkError(_))));
    assert_eq!(report.requests, 2);
    assert_eq!(report.records_delivered, 2);
    assert_eq!(h.posted_chunks().await.len(), 1);
    assert_eq!(h.stored_checkpoint().as_deref(), Some("2024-01-03T00:00:01.000"));
}
