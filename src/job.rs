//! Job lifecycle model and idempotency keys
//!
//! A job moves `Submitting → Queued → Running` and ends in exactly one of
//! `Succeeded`, `Failed`, `TimedOut` or `Cancelled`. The service's status
//! vocabulary is inconsistent (both `succeeded` and `completed` mean terminal
//! success), so everything read off the wire goes through
//! [`normalize_status`] before the client acts on it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ClientError;

/// Client-side job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Submission in flight; no job_id yet
    Submitting,
    /// Accepted by the service, waiting to run
    Queued,
    /// Actively processing
    Running,
    /// Terminal: extraction succeeded
    Succeeded,
    /// Terminal: the service reported failure
    Failed,
    /// Terminal: the poll budget or deadline ran out first
    TimedOut,
    /// Terminal: aborted
    Cancelled,
}

impl JobState {
    /// Returns true if no further transition occurs from this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }
}

/// Wire status after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedStatus {
    /// Terminal success (`succeeded` or `completed` on the wire)
    Succeeded,
    /// Terminal failure
    Failed,
    /// Terminal cancellation
    Cancelled,
    /// Known non-terminal state
    Pending,
    /// Vocabulary we have never seen; treated as still running
    Unknown,
}

/// Normalize a raw wire status
///
/// Both success spellings map to `Succeeded` without preferring either.
/// Unrecognized values are `Unknown`: the caller keeps polling (bounded by
/// its attempt cap) rather than guessing terminal-ness.
pub fn normalize_status(raw: &str) -> NormalizedStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "succeeded" | "completed" => NormalizedStatus::Succeeded,
        "failed" | "error" => NormalizedStatus::Failed,
        "cancelled" | "canceled" => NormalizedStatus::Cancelled,
        "queued" | "pending" | "accepted" | "running" | "processing" | "in_progress" => {
            NormalizedStatus::Pending
        }
        _ => NormalizedStatus::Unknown,
    }
}

/// Handle for one submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Service-assigned job identifier
    pub job_id: String,
    /// Idempotency key the submission was made under
    pub idempotency_key: String,
    /// Submission attempts made before the service accepted the job
    pub attempt_count: u32,
}

/// Result of a succeeded job
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Service-assigned job identifier
    pub job_id: String,
    /// Opaque extraction payload
    pub result: Value,
}

/// Pull the extraction payload out of a terminal status body
///
/// Succeeded jobs carry it under `manifest`, with `result` as the older
/// field name; both are accepted.
pub fn extract_result(data: &Value) -> Value {
    match data.get("manifest") {
        Some(manifest) if !manifest.is_null() => manifest.clone(),
        _ => data.get("result").cloned().unwrap_or(Value::Null),
    }
}

/// Derive the idempotency key for an ingest body
///
/// SHA-256 hex digest of the RFC 8785 (JCS) canonical form, so the same
/// logical submission always carries the same key across retries and across
/// processes.
pub fn idempotency_key_for(body: &Value) -> Result<String, ClientError> {
    let jcs_bytes = serde_json_canonicalizer::to_vec(body)
        .map_err(|e| ClientError::InvalidRequest(format!("cannot canonicalize payload: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&jcs_bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Generate a random idempotency key
///
/// For callers that want a fresh logical submission even for an identical
/// payload. The key must still be reused across retries of that submission.
pub fn random_idempotency_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a new run_id (sortable, filesystem-safe)
pub fn generate_run_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Submitting.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_normalize_both_success_spellings() {
        assert_eq!(normalize_status("succeeded"), NormalizedStatus::Succeeded);
        assert_eq!(normalize_status("completed"), NormalizedStatus::Succeeded);
        assert_eq!(normalize_status("COMPLETED"), NormalizedStatus::Succeeded);
        assert_eq!(normalize_status(" Succeeded "), NormalizedStatus::Succeeded);
    }

    #[test]
    fn test_normalize_failure_family() {
        assert_eq!(normalize_status("failed"), NormalizedStatus::Failed);
        assert_eq!(normalize_status("error"), NormalizedStatus::Failed);
        assert_eq!(normalize_status("cancelled"), NormalizedStatus::Cancelled);
        assert_eq!(normalize_status("canceled"), NormalizedStatus::Cancelled);
    }

    #[test]
    fn test_normalize_pending_family() {
        for raw in ["queued", "pending", "running", "processing", "in_progress"] {
            assert_eq!(normalize_status(raw), NormalizedStatus::Pending, "{}", raw);
        }
    }

    #[test]
    fn test_normalize_unknown_is_not_terminal() {
        assert_eq!(normalize_status("archived"), NormalizedStatus::Unknown);
        assert_eq!(normalize_status(""), NormalizedStatus::Unknown);
        assert_eq!(normalize_status("done"), NormalizedStatus::Unknown);
    }

    #[test]
    fn test_extract_result_prefers_manifest() {
        let data = json!({"manifest": {"a": 1}, "result": {"b": 2}});
        assert_eq!(extract_result(&data), json!({"a": 1}));
    }

    #[test]
    fn test_extract_result_falls_back() {
        let data = json!({"result": {"b": 2}});
        assert_eq!(extract_result(&data), json!({"b": 2}));

        let data = json!({"manifest": null, "result": {"b": 2}});
        assert_eq!(extract_result(&data), json!({"b": 2}));

        assert_eq!(extract_result(&json!({})), Value::Null);
    }

    #[test]
    fn test_idempotency_key_deterministic() {
        let body = json!({"image_url": "https://cdn.example.com/a.jpg"});
        let key1 = idempotency_key_for(&body).unwrap();
        let key2 = idempotency_key_for(&body).unwrap();

        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64); // SHA-256 hex is 64 chars
    }

    #[test]
    fn test_idempotency_key_ignores_key_order() {
        let a = json!({"image": {"data": "aGk=", "media_type": "image/png"}});
        let b = json!({"image": {"media_type": "image/png", "data": "aGk="}});
        assert_eq!(
            idempotency_key_for(&a).unwrap(),
            idempotency_key_for(&b).unwrap()
        );
    }

    #[test]
    fn test_idempotency_key_changes_with_payload() {
        let a = json!({"image_url": "https://cdn.example.com/a.jpg"});
        let b = json!({"image_url": "https://cdn.example.com/b.jpg"});
        assert_ne!(
            idempotency_key_for(&a).unwrap(),
            idempotency_key_for(&b).unwrap()
        );
    }

    #[test]
    fn test_random_keys_unique() {
        assert_ne!(random_idempotency_key(), random_idempotency_key());
    }

    #[test]
    fn test_run_id_format() {
        let id = generate_run_id();
        assert_eq!(id.len(), 26);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
