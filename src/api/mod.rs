//! Request/response envelope for the extraction API
//!
//! The remote service is an HTTP collaborator with two operations: ingest an
//! image against a pattern (returns a job id) and read job status. This
//! module defines the transport-agnostic envelope plus the response → error
//! classification used by the retry policy.

pub mod transport;

use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::ClientError;

pub use transport::{CurlConfig, CurlTransport, MockTransport, Transport, TransportError};

/// HTTP method for an API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One outbound API request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the API base URL (leading slash included)
    pub path: String,
    /// Idempotency-Key header value, if any
    pub idempotency_key: Option<String>,
    /// JSON body for POST requests
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Build a GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            idempotency_key: None,
            body: None,
        }
    }

    /// Build a POST request with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            idempotency_key: None,
            body: Some(body),
        }
    }

    /// Attach an Idempotency-Key header
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// One API response, already decoded to JSON
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed Retry-After header, seconds
    pub retry_after_seconds: Option<u64>,
    /// Decoded JSON body (empty object when the body was empty)
    pub body: Value,
}

impl ApiResponse {
    /// Build a success response (used by the mock service)
    pub fn success(body: Value) -> Self {
        Self {
            status: 200,
            retry_after_seconds: None,
            body,
        }
    }

    /// Build an error response with the service's error body shape
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            retry_after_seconds: None,
            body: json!({"error": {"message": message.into()}}),
        }
    }

    /// Attach a Retry-After hint
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error message from the body, or a placeholder
    pub fn error_message(&self) -> String {
        self.body
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("no error details")
            .to_string()
    }
}

/// Classify a response into the success payload or a typed error
///
/// Classification order follows the retry policy: 429 first (retry with
/// hint), other 4xx fail fast, 5xx and anything outside the known families
/// are transient.
pub fn classify_response(response: &ApiResponse) -> Result<Value, ClientError> {
    if response.is_success() {
        // The service wraps payloads in {"data": ...}; tolerate bare bodies.
        let data = response
            .body
            .get("data")
            .cloned()
            .unwrap_or_else(|| response.body.clone());
        return Ok(data);
    }

    match response.status {
        429 => Err(ClientError::RateLimited {
            retry_after_seconds: response.retry_after_seconds,
        }),
        400..=499 => Err(ClientError::InvalidRequest(response.error_message())),
        500..=599 => Err(ClientError::Transient(format!(
            "server error {}: {}",
            response.status,
            response.error_message()
        ))),
        other => Err(ClientError::Transient(format!(
            "unexpected status {}: {}",
            other,
            response.error_message()
        ))),
    }
}

/// Image payload for an ingest request: a public URL or inline bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Publicly reachable image URL
    Url(String),
    /// Inline image bytes, base64-encoded
    Inline { data: String, media_type: String },
}

impl Payload {
    /// Payload referencing a public URL
    pub fn url(url: impl Into<String>) -> Self {
        Payload::Url(url.into())
    }

    /// Payload carrying the image bytes inline
    pub fn inline(bytes: &[u8], media_type: impl Into<String>) -> Self {
        Payload::Inline {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.into(),
        }
    }

    /// Wire body for the ingest operation
    pub fn to_body(&self) -> Value {
        match self {
            Payload::Url(url) => json!({"image_url": url}),
            Payload::Inline { data, media_type } => json!({
                "image": {
                    "data": data,
                    "media_type": media_type,
                }
            }),
        }
    }

    /// Short label for logs and reports
    pub fn describe(&self) -> String {
        match self {
            Payload::Url(url) => url.clone(),
            Payload::Inline { data, media_type } => {
                format!("inline {} ({} b64 chars)", media_type, data.len())
            }
        }
    }
}

/// Path for the ingest operation
pub fn ingest_path(pattern_id: &str) -> String {
    format!("/patterns/{}/ingest", pattern_id)
}

/// Path for the job-status operation
pub fn job_path(job_id: &str) -> String {
    format!("/jobs/{}", job_id)
}
