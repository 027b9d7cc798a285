//! Batch orchestration integration tests
//!
//! Bounded-concurrency runs over the mock service: partial failure as the
//! steady state, input-order preservation, the two-phase variant and the
//! on-disk report artifact.

use std::sync::Arc;
use std::time::Duration;

use ingest_lane::api::{MockTransport, Payload, Transport};
use ingest_lane::batch::{BatchConfig, BatchItem, BatchReport, BatchRunner, ItemStatus};
use ingest_lane::breaker::{CircuitBreaker, CircuitBreakerConfig};
use ingest_lane::cancel::CancellationToken;
use ingest_lane::client::{JobClient, JobClientConfig};
use ingest_lane::error::ErrorKind;
use ingest_lane::mock::{Endpoint, FailureConfig};
use ingest_lane::retry::RetryPolicy;

fn fast_client(transport: &Arc<MockTransport>) -> JobClient {
    JobClient::new(Arc::clone(transport) as Arc<dyn Transport>, "pat_batch")
        .with_config(JobClientConfig {
            poll_interval: Duration::from_millis(2),
            max_poll_attempts: 30,
        })
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            max_rate_limit_waits: 5,
            jitter: false,
        })
}

fn runner_with(transport: &Arc<MockTransport>, max_concurrency: usize) -> BatchRunner {
    BatchRunner::new(
        Arc::new(fast_client(transport)),
        BatchConfig {
            max_concurrency,
            submit_concurrency: None,
            poll_concurrency: None,
        },
    )
}

fn items(n: usize) -> Vec<BatchItem> {
    (0..n)
        .map(|i| BatchItem::from_url(format!("https://cdn.example.com/batch/{:03}.jpg", i)))
        .collect()
}

// === Partial failure ===

#[test]
fn test_partial_failure_is_not_fatal() {
    let transport = Arc::new(MockTransport::new());
    transport.service().reject_urls_containing("always-fails");
    let runner = runner_with(&transport, 4);
    let cancel = CancellationToken::new();

    // Items 3 and 7 are configured to always fail.
    let mut batch = items(10);
    batch[3] = BatchItem::from_url("https://cdn.example.com/always-fails/003.jpg");
    batch[7] = BatchItem::from_url("https://cdn.example.com/always-fails/007.jpg");

    let report = runner.run(&batch, &cancel);

    assert_eq!(report.total, 10);
    assert_eq!(report.succeeded, 8);
    assert_eq!(report.failed, 2);

    // The 8 successes are unaffected by the 2 failures, and item order is
    // preserved.
    for (index, item) in batch.iter().enumerate() {
        assert_eq!(report.items[index].input, item.input);
        let expected = if index == 3 || index == 7 {
            ItemStatus::Failure
        } else {
            ItemStatus::Success
        };
        assert_eq!(report.items[index].status, expected, "item {}", index);
    }
}

#[test]
fn test_failure_detail_distinguishes_retryable() {
    let transport = Arc::new(MockTransport::new());
    transport.service().reject_urls_containing("always-fails");
    let runner = runner_with(&transport, 2);
    let cancel = CancellationToken::new();

    let mut batch = items(3);
    batch[1] = BatchItem::from_url("https://cdn.example.com/always-fails/001.jpg");

    let report = runner.run(&batch, &cancel);

    // A 400-rejected input is permanent, not retryable.
    assert_eq!(report.retryable_inputs().len(), 0);
    assert_eq!(
        report.permanent_failure_inputs(),
        vec!["https://cdn.example.com/always-fails/001.jpg"]
    );
    assert_eq!(report.items[1].error_kind, Some(ErrorKind::InvalidRequest));
}

#[test]
fn test_duplicate_inputs_dedup_on_the_service() {
    let transport = Arc::new(MockTransport::new());
    let runner = runner_with(&transport, 4);
    let cancel = CancellationToken::new();

    // The same URL three times derives the same idempotency key, so the
    // batch counts three successes but the service created one job.
    let batch = vec![
        BatchItem::from_url("https://cdn.example.com/same.jpg"),
        BatchItem::from_url("https://cdn.example.com/same.jpg"),
        BatchItem::from_url("https://cdn.example.com/same.jpg"),
    ];

    let report = runner.run(&batch, &cancel);

    assert_eq!(report.succeeded, 3);
    assert_eq!(transport.service().job_count(), 1);
}

// === Two-phase variant ===

#[test]
fn test_two_phase_submits_everything_before_polling() {
    let transport = Arc::new(MockTransport::new());
    let runner = runner_with(&transport, 3);
    let cancel = CancellationToken::new();

    let report = runner.run_two_phase(&items(6), &cancel);

    assert_eq!(report.total, 6);
    assert_eq!(report.succeeded, 6);
    assert_eq!(transport.service().job_count(), 6);
}

#[test]
fn test_two_phase_records_submit_failures_per_item() {
    let transport = Arc::new(MockTransport::new());
    transport.service().reject_urls_containing("always-fails");
    let runner = runner_with(&transport, 3);
    let cancel = CancellationToken::new();

    let mut batch = items(4);
    batch[0] = BatchItem::from_url("https://cdn.example.com/always-fails/000.jpg");

    let report = runner.run_two_phase(&batch, &cancel);

    assert_eq!(report.failed, 1);
    assert_eq!(report.items[0].status, ItemStatus::Failure);
    assert!(report.items[0].job_id.is_none(), "never accepted, no job id");
    assert_eq!(report.items[1].status, ItemStatus::Success);
}

// === Breaker interaction ===

#[test]
fn test_open_circuit_marks_items_failed_without_hammering() {
    let transport = Arc::new(MockTransport::new());
    transport
        .service()
        .inject_failure(Endpoint::Ingest, FailureConfig::unavailable());
    let breaker = Arc::new(CircuitBreaker::with_config(
        "mock-service",
        CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        },
    ));
    let client = fast_client(&transport).with_circuit_breaker(breaker);
    let runner = BatchRunner::new(
        Arc::new(client),
        BatchConfig {
            max_concurrency: 1,
            submit_concurrency: None,
            poll_concurrency: None,
        },
    );
    let cancel = CancellationToken::new();

    let report = runner.run(&items(5), &cancel);

    // Every item fails, but an unhealthy target sees almost no traffic: the
    // first attempt trips the breaker and the rest short-circuit.
    assert_eq!(report.failed, 5);
    assert_eq!(transport.service().submission_count(), 1);
    let circuit_failures = report
        .items
        .iter()
        .filter(|i| i.error_kind == Some(ErrorKind::CircuitOpen))
        .count();
    assert!(circuit_failures >= 4);
    // Circuit-open items are retryable on a later pass.
    assert!(!report.retryable_inputs().is_empty());
}

// === Report artifact ===

#[test]
fn test_report_artifact_roundtrip() {
    let transport = Arc::new(MockTransport::new());
    transport.service().reject_urls_containing("always-fails");
    let runner = runner_with(&transport, 2);
    let cancel = CancellationToken::new();

    let mut batch = items(3);
    batch[2] = BatchItem::from_url("https://cdn.example.com/always-fails/002.jpg");

    let report = runner.run(&batch, &cancel);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch_report.json");
    report.write_to_file(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: BatchReport = serde_json::from_str(&text).unwrap();

    assert_eq!(parsed.run_id, report.run_id);
    assert_eq!(parsed.total, 3);
    assert_eq!(parsed.succeeded, 2);
    assert_eq!(parsed.items[2].error_kind, Some(ErrorKind::InvalidRequest));
    assert!(!parsed.run_id.is_empty());
}

#[test]
fn test_report_duration_covers_the_run() {
    let transport = Arc::new(MockTransport::new());
    let runner = runner_with(&transport, 2);
    let cancel = CancellationToken::new();

    let report = runner.run(&items(4), &cancel);

    // Each job needs 3 polls at 2ms intervals; the wall clock must reflect
    // actual elapsed time, not zero.
    assert!(report.duration_ms > 0);
}
