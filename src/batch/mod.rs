//! Batch orchestration
//!
//! Runs many job-client invocations under a bounded concurrency policy and
//! aggregates per-item outcomes into a [`BatchReport`]. One item's failure
//! never aborts the others: partial failure is the steady state for large
//! batches, and the report is what scopes the re-run.
//!
//! Concurrency here bounds in-flight *items*; the rate limiter injected into
//! the client independently bounds outbound request *rate*.

pub mod report;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::api::Payload;
use crate::cancel::CancellationToken;
use crate::client::JobClient;
use crate::error::ClientError;
use crate::job::{generate_run_id, JobHandle};

pub use report::{BatchReport, ItemOutcome, ItemStatus};

/// One unit of batch work
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Label carried into the report (file path, URL, ...)
    pub input: String,
    /// Payload to ingest
    pub payload: Payload,
}

impl BatchItem {
    /// Create an item with an explicit label
    pub fn new(input: impl Into<String>, payload: Payload) -> Self {
        Self {
            input: input.into(),
            payload,
        }
    }

    /// Create an item from a URL, labelled by the URL itself
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            input: url.clone(),
            payload: Payload::url(url),
        }
    }
}

/// Batch orchestration configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// In-flight items at any time (single-phase runs)
    pub max_concurrency: usize,
    /// Submission concurrency for two-phase runs (defaults to max_concurrency)
    pub submit_concurrency: Option<usize>,
    /// Polling concurrency for two-phase runs (defaults to max_concurrency)
    pub poll_concurrency: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            submit_concurrency: None,
            poll_concurrency: None,
        }
    }
}

/// Batch orchestrator over one job client
pub struct BatchRunner {
    client: Arc<JobClient>,
    config: BatchConfig,
}

impl BatchRunner {
    /// Create a runner with the given concurrency policy
    pub fn new(client: Arc<JobClient>, config: BatchConfig) -> Self {
        Self { client, config }
    }

    /// Process every item, submit-then-poll inside one bounded worker pool
    ///
    /// Completion order is unconstrained; the report preserves input order.
    pub fn run(&self, items: &[BatchItem], cancel: &CancellationToken) -> BatchReport {
        let started = Instant::now();
        let outcomes = self.for_each_bounded(items, self.config.max_concurrency, |item| {
            self.process_item(item, cancel)
        });
        BatchReport::from_outcomes(generate_run_id(), outcomes, started.elapsed())
    }

    /// Two-phase variant: submit everything, then poll everything
    ///
    /// Lets submission and polling concurrency be tuned independently: a
    /// burst of cheap submissions followed by a wide, slow polling phase.
    pub fn run_two_phase(&self, items: &[BatchItem], cancel: &CancellationToken) -> BatchReport {
        let started = Instant::now();

        let submit_workers = self
            .config
            .submit_concurrency
            .unwrap_or(self.config.max_concurrency);
        let submitted: Vec<Result<JobHandle, ClientError>> =
            self.for_each_bounded(items, submit_workers, |item| self.submit_item(item, cancel));

        let poll_workers = self
            .config
            .poll_concurrency
            .unwrap_or(self.config.max_concurrency);
        let indexed: Vec<(usize, &Result<JobHandle, ClientError>)> =
            submitted.iter().enumerate().collect();
        let outcomes = self.for_each_bounded(&indexed, poll_workers, |(index, handle)| {
            let item = &items[*index];
            match handle {
                Ok(handle) => match self.client.await_result(handle, cancel) {
                    Ok(result) => {
                        ItemOutcome::success(item.input.clone(), handle.job_id.clone(), result.result)
                    }
                    Err(error) => {
                        ItemOutcome::failure(item.input.clone(), Some(handle.job_id.clone()), &error)
                    }
                },
                Err(error) => ItemOutcome::failure(item.input.clone(), None, error),
            }
        });

        BatchReport::from_outcomes(generate_run_id(), outcomes, started.elapsed())
    }

    // === Internal helpers ===

    /// Map `work` over `items` with at most `workers` concurrent calls,
    /// returning results in input order
    fn for_each_bounded<'a, T, R, F>(&self, items: &'a [T], workers: usize, work: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&'a T) -> R + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let workers = workers.max(1).min(items.len());
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<R>>> = items.iter().map(|_| Mutex::new(None)).collect();

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= items.len() {
                        break;
                    }
                    let result = work(&items[index]);
                    *slots[index].lock().unwrap() = Some(result);
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap()
                    .expect("every slot is filled before the scope ends")
            })
            .collect()
    }

    fn process_item(&self, item: &BatchItem, cancel: &CancellationToken) -> ItemOutcome {
        let key = match JobClient::idempotency_key(&item.payload) {
            Ok(key) => key,
            Err(error) => return ItemOutcome::failure(item.input.clone(), None, &error),
        };

        let handle = match self.client.submit(&item.payload, &key, cancel) {
            Ok(handle) => handle,
            Err(error) => return ItemOutcome::failure(item.input.clone(), None, &error),
        };

        match self.client.await_result(&handle, cancel) {
            Ok(result) => ItemOutcome::success(item.input.clone(), handle.job_id, result.result),
            Err(error) => ItemOutcome::failure(item.input.clone(), Some(handle.job_id), &error),
        }
    }

    fn submit_item(
        &self,
        item: &BatchItem,
        cancel: &CancellationToken,
    ) -> Result<JobHandle, ClientError> {
        let key = JobClient::idempotency_key(&item.payload)?;
        self.client.submit(&item.payload, &key, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTransport;
    use crate::client::JobClientConfig;
    use crate::error::ErrorKind;
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    fn runner(max_concurrency: usize) -> (Arc<MockTransport>, BatchRunner) {
        let transport = Arc::new(MockTransport::new());
        let client = JobClient::new(
            Arc::clone(&transport) as Arc<dyn crate::api::Transport>,
            "pat_batch",
        )
        .with_config(JobClientConfig {
            poll_interval: Duration::from_millis(2),
            max_poll_attempts: 20,
        })
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            max_rate_limit_waits: 5,
            jitter: false,
        });
        let runner = BatchRunner::new(
            Arc::new(client),
            BatchConfig {
                max_concurrency,
                submit_concurrency: None,
                poll_concurrency: None,
            },
        );
        (transport, runner)
    }

    fn items(n: usize) -> Vec<BatchItem> {
        (0..n)
            .map(|i| BatchItem::from_url(format!("https://cdn.example.com/img-{:02}.jpg", i)))
            .collect()
    }

    #[test]
    fn test_all_items_succeed() {
        let (_, runner) = runner(4);
        let cancel = CancellationToken::new();

        let report = runner.run(&items(8), &cancel);

        assert_eq!(report.total, 8);
        assert_eq!(report.succeeded, 8);
        assert!(report.all_succeeded());
    }

    #[test]
    fn test_partial_failure_preserves_order() {
        let (transport, runner) = runner(3);
        transport.service().reject_urls_containing("always-fails");
        let cancel = CancellationToken::new();

        let mut batch = items(10);
        batch[2] = BatchItem::from_url("https://cdn.example.com/always-fails-a.jpg");
        batch[6] = BatchItem::from_url("https://cdn.example.com/always-fails-b.jpg");

        let report = runner.run(&batch, &cancel);

        assert_eq!(report.total, 10);
        assert_eq!(report.succeeded, 8);
        assert_eq!(report.failed, 2);

        // Input order is preserved in the report.
        for (index, item) in batch.iter().enumerate() {
            assert_eq!(report.items[index].input, item.input);
        }
        assert_eq!(report.items[2].status, ItemStatus::Failure);
        assert_eq!(report.items[2].error_kind, Some(ErrorKind::InvalidRequest));
        assert_eq!(report.items[6].status, ItemStatus::Failure);
    }

    #[test]
    fn test_single_worker_still_completes() {
        let (_, runner) = runner(1);
        let cancel = CancellationToken::new();

        let report = runner.run(&items(4), &cancel);
        assert_eq!(report.succeeded, 4);
    }

    #[test]
    fn test_two_phase_matches_single_phase() {
        let (transport, runner) = runner(4);
        transport.service().reject_urls_containing("always-fails");
        let cancel = CancellationToken::new();

        let mut batch = items(6);
        batch[1] = BatchItem::from_url("https://cdn.example.com/always-fails.jpg");

        let report = runner.run_two_phase(&batch, &cancel);

        assert_eq!(report.total, 6);
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, 1);
        assert_eq!(report.items[1].status, ItemStatus::Failure);
        // Submissions all landed before any polling: 6 distinct jobs.
        assert_eq!(transport.service().job_count(), 5);
    }

    #[test]
    fn test_empty_batch() {
        let (_, runner) = runner(4);
        let cancel = CancellationToken::new();

        let report = runner.run(&[], &cancel);
        assert_eq!(report.total, 0);
        assert!(report.all_succeeded());
    }

    #[test]
    fn test_cancelled_batch_marks_items_cancelled() {
        let (_, runner) = runner(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = runner.run(&items(3), &cancel);

        assert_eq!(report.failed, 3);
        for item in &report.items {
            assert_eq!(item.error_kind, Some(ErrorKind::Cancelled));
        }
    }
}
