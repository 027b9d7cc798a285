//! Mock extraction service
//!
//! In-process stand-in for the hosted API, used by unit and integration
//! tests. Handles ingest and job-status requests against shared state, with
//! idempotency-key deduplication, scripted per-poll state walks and
//! configurable failure injection.

use std::sync::Mutex;

use serde_json::{json, Value};

use crate::api::{ApiRequest, ApiResponse, Method};

use super::failure::{Endpoint, FailureConfig, FailureInjector};
use super::state::{MockJob, MockJobState, MockServiceState};

/// Configurable mock of the extraction service
pub struct MockService {
    /// Mutable state (jobs, idempotency index)
    state: Mutex<MockServiceState>,
    /// Failure injector
    failures: Mutex<FailureInjector>,
    /// Wire spelling used for terminal success ("succeeded" by default)
    success_spelling: Mutex<String>,
    /// Ingest rejects image URLs containing this substring with a 400
    reject_url_substring: Mutex<Option<String>>,
}

impl MockService {
    /// Create a new mock service
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockServiceState::new()),
            failures: Mutex::new(FailureInjector::new()),
            success_spelling: Mutex::new("succeeded".to_string()),
            reject_url_substring: Mutex::new(None),
        }
    }

    // === Public API for test configuration ===

    /// Set the wire spelling used for terminal success
    ///
    /// The real service answers with either `succeeded` or `completed`
    /// depending on the endpoint generation; tests use this to verify the
    /// client normalizes both.
    pub fn set_success_spelling(&self, spelling: &str) {
        let mut current = self.success_spelling.lock().unwrap();
        *current = spelling.to_string();
    }

    /// Reject ingests whose image URL contains `substring` with a 400
    ///
    /// Lets tests mark individual batch items as permanently failing while
    /// the rest of the batch proceeds.
    pub fn reject_urls_containing(&self, substring: &str) {
        let mut reject = self.reject_url_substring.lock().unwrap();
        *reject = Some(substring.to_string());
    }

    /// Inject a failure configuration for an endpoint
    pub fn inject_failure(&self, endpoint: Endpoint, config: FailureConfig) {
        let mut failures = self.failures.lock().unwrap();
        failures.inject(endpoint, config);
    }

    /// Clear all failure injections
    pub fn clear_failures(&self) {
        let mut failures = self.failures.lock().unwrap();
        failures.clear();
    }

    /// Replace the remaining state walk for a job
    pub fn set_job_progression(&self, job_id: &str, states: Vec<MockJobState>) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.get_job_mut(job_id) {
            job.remaining = states;
        }
    }

    /// Hold a job in its current state (it will never advance)
    pub fn hold_job(&self, job_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.get_job_mut(job_id) {
            job.held = true;
        }
    }

    /// Release a held job
    pub fn release_job(&self, job_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.get_job_mut(job_id) {
            job.held = false;
        }
    }

    /// Drive a job straight to FAILED with the given error
    pub fn fail_job(&self, job_id: &str, error: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.get_job_mut(job_id) {
            job.remaining.clear();
            job.error = Some(error.to_string());
            job.transition(MockJobState::Failed);
        }
    }

    /// Drive a job straight to CANCELLED
    pub fn cancel_job(&self, job_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.get_job_mut(job_id) {
            job.remaining.clear();
            job.transition(MockJobState::Cancelled);
        }
    }

    /// Set the extraction result a job will return on success
    pub fn set_job_result(&self, job_id: &str, result: Value) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.get_job_mut(job_id) {
            job.result = result;
        }
    }

    /// Return a raw status string for a job instead of its real state
    ///
    /// Used to simulate novel status vocabulary the client has never seen.
    pub fn override_status(&self, job_id: &str, raw: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.get_job_mut(job_id) {
            job.status_override = Some(raw.to_string());
        }
    }

    // === Accessors for test assertions ===

    /// Current state of a job
    pub fn job_state(&self, job_id: &str) -> Option<MockJobState> {
        let state = self.state.lock().unwrap();
        state.get_job(job_id).map(|j| j.state)
    }

    /// Number of distinct jobs created
    pub fn job_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.jobs.len()
    }

    /// Total ingest requests observed (dedup hits included)
    pub fn submission_count(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.total_submissions
    }

    /// Number of status polls a job has seen
    pub fn polls_seen(&self, job_id: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.get_job(job_id).map(|j| j.polls_seen).unwrap_or(0)
    }

    /// Job id created under an idempotency key
    pub fn job_id_for_key(&self, key: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.job_id_for_key(key).cloned()
    }

    // === Request handling ===

    /// Handle an API request (in-process transport mode)
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        match self.route(request) {
            Some(Route::Ingest(pattern_id)) => {
                self.state.lock().unwrap().total_submissions += 1;
                if let Some(failure) = self.check_failure(Endpoint::Ingest) {
                    return Self::failure_response(&failure);
                }
                self.handle_ingest(&pattern_id, request)
            }
            Some(Route::JobStatus(job_id)) => {
                if let Some(failure) = self.check_failure(Endpoint::JobStatus) {
                    return Self::failure_response(&failure);
                }
                self.handle_status(&job_id)
            }
            None => ApiResponse::error(404, "unknown endpoint"),
        }
    }

    // === Internal helpers ===

    fn route(&self, request: &ApiRequest) -> Option<Route> {
        match request.method {
            Method::Post => {
                let rest = request.path.strip_prefix("/patterns/")?;
                let pattern_id = rest.strip_suffix("/ingest")?;
                if pattern_id.is_empty() {
                    return None;
                }
                Some(Route::Ingest(pattern_id.to_string()))
            }
            Method::Get => {
                let job_id = request.path.strip_prefix("/jobs/")?;
                if job_id.is_empty() {
                    return None;
                }
                Some(Route::JobStatus(job_id.to_string()))
            }
        }
    }

    fn check_failure(&self, endpoint: Endpoint) -> Option<FailureConfig> {
        let mut failures = self.failures.lock().unwrap();
        failures.check(endpoint)
    }

    fn failure_response(failure: &FailureConfig) -> ApiResponse {
        let mut response = ApiResponse::error(failure.status, failure.message.clone());
        if let Some(seconds) = failure.retry_after_seconds {
            response = response.with_retry_after(seconds);
        }
        response
    }

    fn handle_ingest(&self, pattern_id: &str, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state.lock().unwrap();

        let body = match &request.body {
            Some(body) => body,
            None => return ApiResponse::error(400, "missing request body"),
        };

        let has_payload = body.get("image_url").map(|v| v.is_string()).unwrap_or(false)
            || body.get("image").map(|v| v.is_object()).unwrap_or(false);
        if !has_payload {
            return ApiResponse::error(400, "missing image payload");
        }

        if let Some(substring) = self.reject_url_substring.lock().unwrap().as_deref() {
            if let Some(url) = body.get("image_url").and_then(|v| v.as_str()) {
                if url.contains(substring) {
                    return ApiResponse::error(400, "unprocessable image");
                }
            }
        }

        // Idempotency: replaying a key returns the existing job, never a new one.
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = state.job_id_for_key(key).cloned() {
                return ApiResponse::success(json!({"data": {"job_id": existing}}));
            }
        }

        let job_id = state.next_id("job");
        let job = MockJob::new(
            job_id.clone(),
            request.idempotency_key.clone(),
            pattern_id.to_string(),
        );
        state.jobs.insert(job_id.clone(), job);
        if let Some(key) = &request.idempotency_key {
            state.jobs_by_key.insert(key.clone(), job_id.clone());
        }

        ApiResponse::success(json!({"data": {"job_id": job_id}}))
    }

    fn handle_status(&self, job_id: &str) -> ApiResponse {
        let spelling = self.success_spelling.lock().unwrap().clone();
        let mut state = self.state.lock().unwrap();

        let job = match state.get_job_mut(job_id) {
            Some(job) => job,
            None => return ApiResponse::error(404, "job not found"),
        };

        job.polls_seen += 1;

        let status = match &job.status_override {
            Some(raw) => raw.clone(),
            None => job.state.wire_status(&spelling),
        };

        let mut data = json!({
            "job_id": job.job_id,
            "status": status,
        });
        if job.state == MockJobState::Succeeded {
            data["manifest"] = job.result.clone();
        }
        if let Some(error) = &job.error {
            data["error"] = json!(error);
        }

        // Each observed poll moves the job one step along its walk.
        if job.status_override.is_none() {
            job.advance();
        }

        ApiResponse::success(json!({"data": data}))
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

enum Route {
    Ingest(String),
    JobStatus(String),
}
