//! Mock extraction-service state
//!
//! Jobs keyed by id, with an idempotency-key index so replayed submissions
//! land on the existing job instead of creating duplicate work.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Job state inside the mock service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockJobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl MockJobState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MockJobState::Succeeded | MockJobState::Failed | MockJobState::Cancelled
        )
    }

    /// Wire spelling for this state
    ///
    /// The real service is inconsistent about its success spelling, so the
    /// mock takes it as a parameter to let tests exercise both.
    pub fn wire_status(&self, success_spelling: &str) -> String {
        match self {
            MockJobState::Queued => "queued".to_string(),
            MockJobState::Running => "running".to_string(),
            MockJobState::Succeeded => success_spelling.to_string(),
            MockJobState::Failed => "failed".to_string(),
            MockJobState::Cancelled => "cancelled".to_string(),
        }
    }
}

/// One job tracked by the mock service
#[derive(Debug, Clone)]
pub struct MockJob {
    /// Service-assigned job identifier
    pub job_id: String,
    /// Idempotency key the job was created under, if any
    pub idempotency_key: Option<String>,
    /// Pattern the image was ingested against
    pub pattern_id: String,
    /// Current state
    pub state: MockJobState,
    /// State history for debugging
    pub state_history: Vec<(MockJobState, DateTime<Utc>)>,
    /// States still to walk through, one per status poll
    pub remaining: Vec<MockJobState>,
    /// Held jobs never advance (for timeout tests)
    pub held: bool,
    /// Raw status string returned instead of the real state, when set
    pub status_override: Option<String>,
    /// Extraction result returned on success
    pub result: Value,
    /// Error message returned on failure
    pub error: Option<String>,
    /// Number of status polls observed
    pub polls_seen: u32,
    /// Job creation time
    pub created_at: DateTime<Utc>,
    /// Last state change time
    pub updated_at: DateTime<Utc>,
}

impl MockJob {
    /// Create a new queued job with the default queued → running → succeeded walk
    pub fn new(job_id: String, idempotency_key: Option<String>, pattern_id: String) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            idempotency_key,
            pattern_id,
            state: MockJobState::Queued,
            state_history: vec![(MockJobState::Queued, now)],
            remaining: vec![MockJobState::Running, MockJobState::Succeeded],
            held: false,
            status_override: None,
            result: Value::Null,
            error: None,
            polls_seen: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: MockJobState) {
        let now = Utc::now();
        self.state = new_state;
        self.state_history.push((new_state, now));
        self.updated_at = now;
    }

    /// Advance one step along the remaining walk, unless held or terminal
    pub fn advance(&mut self) {
        if self.held || self.state.is_terminal() || self.remaining.is_empty() {
            return;
        }
        let next = self.remaining.remove(0);
        self.transition(next);
    }
}

/// Mock service state container
#[derive(Debug, Default)]
pub struct MockServiceState {
    /// Jobs by job_id
    pub jobs: HashMap<String, MockJob>,
    /// Idempotency key → job_id index
    pub jobs_by_key: HashMap<String, String>,
    /// Total ingest requests observed (dedup hits included)
    pub total_submissions: u64,
    /// Counter for generating unique IDs
    id_counter: u64,
}

impl MockServiceState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a unique ID
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.id_counter += 1;
        format!("{}-{:08x}", prefix, self.id_counter)
    }

    /// Get a job by ID
    pub fn get_job(&self, job_id: &str) -> Option<&MockJob> {
        self.jobs.get(job_id)
    }

    /// Get a mutable job by ID
    pub fn get_job_mut(&mut self, job_id: &str) -> Option<&mut MockJob> {
        self.jobs.get_mut(job_id)
    }

    /// Look up the job created under an idempotency key
    pub fn job_id_for_key(&self, key: &str) -> Option<&String> {
        self.jobs_by_key.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminal() {
        assert!(!MockJobState::Queued.is_terminal());
        assert!(!MockJobState::Running.is_terminal());
        assert!(MockJobState::Succeeded.is_terminal());
        assert!(MockJobState::Failed.is_terminal());
        assert!(MockJobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_wire_status_spelling() {
        assert_eq!(MockJobState::Queued.wire_status("succeeded"), "queued");
        assert_eq!(
            MockJobState::Succeeded.wire_status("succeeded"),
            "succeeded"
        );
        assert_eq!(
            MockJobState::Succeeded.wire_status("completed"),
            "completed"
        );
        assert_eq!(MockJobState::Failed.wire_status("completed"), "failed");
    }

    #[test]
    fn test_default_walk() {
        let mut job = MockJob::new("job-1".to_string(), None, "pat_x".to_string());
        assert_eq!(job.state, MockJobState::Queued);

        job.advance();
        assert_eq!(job.state, MockJobState::Running);

        job.advance();
        assert_eq!(job.state, MockJobState::Succeeded);
        assert_eq!(job.state_history.len(), 3);

        // Terminal: further advances are no-ops
        job.advance();
        assert_eq!(job.state, MockJobState::Succeeded);
    }

    #[test]
    fn test_held_job_does_not_advance() {
        let mut job = MockJob::new("job-1".to_string(), None, "pat_x".to_string());
        job.held = true;

        job.advance();
        job.advance();
        assert_eq!(job.state, MockJobState::Queued);
    }

    #[test]
    fn test_id_generation() {
        let mut state = MockServiceState::new();
        let a = state.next_id("job");
        let b = state.next_id("job");
        assert_ne!(a, b);
        assert!(a.starts_with("job-"));
    }

    #[test]
    fn test_key_index() {
        let mut state = MockServiceState::new();
        let id = state.next_id("job");
        let job = MockJob::new(id.clone(), Some("key-1".to_string()), "pat_x".to_string());
        state.jobs.insert(id.clone(), job);
        state.jobs_by_key.insert("key-1".to_string(), id.clone());

        assert_eq!(state.job_id_for_key("key-1"), Some(&id));
        assert!(state.job_id_for_key("key-2").is_none());
    }
}
