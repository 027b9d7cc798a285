//! Batch report
//!
//! Per-item outcomes in input order, aggregate counts and wall-clock
//! duration. The error kind recorded for each failed item is what lets a
//! caller re-run only the retryable subset.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, ErrorKind};

/// Schema version for batch_report.json
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for batch_report.json
pub const REPORT_SCHEMA_ID: &str = "ingest-lane/batch_report@1";

/// Outcome status for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Success,
    Failure,
}

/// Outcome of one batch item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Caller-supplied input label (file path, URL, ...)
    pub input: String,
    /// Success or failure
    pub status: ItemStatus,
    /// Job id, when submission was accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Error classification, for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Error message, for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Extraction payload, for successes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ItemOutcome {
    /// Successful item
    pub fn success(input: impl Into<String>, job_id: impl Into<String>, result: Value) -> Self {
        Self {
            input: input.into(),
            status: ItemStatus::Success,
            job_id: Some(job_id.into()),
            error_kind: None,
            detail: None,
            result: Some(result),
        }
    }

    /// Failed item
    pub fn failure(input: impl Into<String>, job_id: Option<String>, error: &ClientError) -> Self {
        Self {
            input: input.into(),
            status: ItemStatus::Failure,
            job_id,
            error_kind: Some(error.kind()),
            detail: Some(error.to_string()),
            result: None,
        }
    }

    /// Returns true if a re-run of this item could succeed
    pub fn is_retryable_failure(&self) -> bool {
        self.status == ItemStatus::Failure
            && self.error_kind.map(|k| k.is_retryable()).unwrap_or(false)
    }
}

/// Batch report (batch_report.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Schema version
    pub schema_version: u32,
    /// Schema identifier
    pub schema_id: String,
    /// Run identifier
    pub run_id: String,
    /// When the report was created
    pub created_at: DateTime<Utc>,
    /// Total items processed
    pub total: usize,
    /// Items that succeeded
    pub succeeded: usize,
    /// Items that failed
    pub failed: usize,
    /// Wall-clock duration of the batch in milliseconds
    pub duration_ms: u64,
    /// Human-readable summary
    pub human_summary: String,
    /// Per-item outcomes in input order
    pub items: Vec<ItemOutcome>,
}

impl BatchReport {
    /// Build a report from per-item outcomes
    pub fn from_outcomes(run_id: String, items: Vec<ItemOutcome>, duration: Duration) -> Self {
        let total = items.len();
        let succeeded = items
            .iter()
            .filter(|i| i.status == ItemStatus::Success)
            .count();
        let failed = total - succeeded;

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            schema_id: REPORT_SCHEMA_ID.to_string(),
            run_id,
            created_at: Utc::now(),
            total,
            succeeded,
            failed,
            duration_ms: duration.as_millis() as u64,
            human_summary: Self::generate_human_summary(total, succeeded, failed),
            items,
        }
    }

    fn generate_human_summary(total: usize, succeeded: usize, failed: usize) -> String {
        if total == 0 {
            "no items processed".to_string()
        } else if failed == 0 {
            format!("{} item(s) succeeded", succeeded)
        } else {
            format!("{} of {} item(s) failed", failed, total)
        }
    }

    /// Returns true if every item succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Inputs whose failures are worth re-running
    pub fn retryable_inputs(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.is_retryable_failure())
            .map(|i| i.input.as_str())
            .collect()
    }

    /// Inputs that will never succeed as submitted
    pub fn permanent_failure_inputs(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Failure && !i.is_retryable_failure())
            .map(|i| i.input.as_str())
            .collect()
    }

    /// Serialize to JSON (pretty printed)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }
}
