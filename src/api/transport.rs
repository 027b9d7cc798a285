//! Transport layer for the extraction API
//!
//! Abstracts the HTTP round-trip for testability. Provides:
//! - Transport trait: interface for executing API requests
//! - MockTransport: in-process mock service for unit tests
//! - CurlTransport: production transport shelling out to `curl`

use std::io;
use std::process::{Command, Stdio};

use serde_json::{json, Value};

use crate::mock::MockService;

use super::{ApiRequest, ApiResponse};

/// Transport trait for API communication
pub trait Transport: Send + Sync {
    /// Execute an API request and return the decoded response
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timeout")]
    ConnectionTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("curl error: {0}")]
    Curl(String),
}

/// Mock transport for testing - connects directly to MockService in-process
pub struct MockTransport {
    service: MockService,
}

impl MockTransport {
    /// Create a new mock transport with a fresh mock service
    pub fn new() -> Self {
        Self {
            service: MockService::new(),
        }
    }

    /// Create a mock transport with a pre-configured service
    pub fn with_service(service: MockService) -> Self {
        Self { service }
    }

    /// Get a reference to the underlying mock service for test configuration
    pub fn service(&self) -> &MockService {
        &self.service
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        Ok(self.service.handle(request))
    }
}

/// Configuration for the curl-backed transport
#[derive(Debug, Clone)]
pub struct CurlConfig {
    /// API base URL (no trailing slash)
    pub base_url: String,
    /// Bearer token for the Authorization header
    pub api_key: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,
    /// Overall per-request timeout in seconds
    pub request_timeout_seconds: u64,
}

impl Default for CurlConfig {
    fn default() -> Self {
        Self {
            base_url: "https://img-go.com/api".to_string(),
            api_key: None,
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
        }
    }
}

/// Production transport shelling out to `curl`
///
/// One subprocess per request: headers are included in the output (`-i`) so
/// the response status and Retry-After hint can be recovered along with the
/// JSON body.
pub struct CurlTransport {
    config: CurlConfig,
}

impl CurlTransport {
    /// Create a new curl transport with the given configuration
    pub fn new(config: CurlConfig) -> Self {
        Self { config }
    }

    /// Build curl arguments for a request
    fn build_curl_args(&self, request: &ApiRequest) -> Vec<String> {
        let mut args = vec![
            "-sS".to_string(),
            "-i".to_string(),
            "--connect-timeout".to_string(),
            self.config.connect_timeout_seconds.to_string(),
            "--max-time".to_string(),
            self.config.request_timeout_seconds.to_string(),
            "-X".to_string(),
            request.method.as_str().to_string(),
            "-H".to_string(),
            "Accept: application/json".to_string(),
        ];

        if let Some(ref key) = self.config.api_key {
            args.push("-H".to_string());
            args.push(format!("Authorization: Bearer {}", key));
        }

        if let Some(ref idempotency_key) = request.idempotency_key {
            args.push("-H".to_string());
            args.push(format!("Idempotency-Key: {}", idempotency_key));
        }

        if request.body.is_some() {
            args.push("-H".to_string());
            args.push("Content-Type: application/json".to_string());
            args.push("--data-binary".to_string());
            args.push("@-".to_string());
        }

        args.push(format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            request.path
        ));

        args
    }
}

impl Transport for CurlTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let args = self.build_curl_args(request);

        let mut child = Command::new("curl")
            .args(&args)
            .stdin(if request.body.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Curl(format!("failed to spawn curl: {}", e)))?;

        if let Some(ref body) = request.body {
            let body_json = serde_json::to_string(body)?;
            if let Some(ref mut stdin) = child.stdin {
                use std::io::Write;
                stdin.write_all(body_json.as_bytes())?;
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| TransportError::Curl(format!("curl process error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(match output.status.code() {
                // curl 28: operation timed out
                Some(28) => TransportError::ConnectionTimeout,
                // curl 6/7: resolve / connect failure
                Some(6) | Some(7) => TransportError::ConnectionFailed(stderr.trim().to_string()),
                _ => TransportError::Curl(format!("curl exited {}: {}", output.status, stderr)),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        parse_http_response(&raw)
    }
}

/// Parse `curl -i` output: status line, headers, blank line, JSON body
///
/// curl emits one header block per intermediate response (redirects, 100
/// Continue), so blocks are consumed until the final one.
pub fn parse_http_response(raw: &str) -> Result<ApiResponse, TransportError> {
    let text = raw.replace("\r\n", "\n");
    let mut rest = text.as_str();

    let (headers, body) = loop {
        let (headers, body) = rest
            .split_once("\n\n")
            .ok_or_else(|| TransportError::Protocol("response has no header terminator".into()))?;
        if body.starts_with("HTTP/") {
            rest = body;
            continue;
        }
        break (headers, body);
    };

    let status_line = headers
        .lines()
        .next()
        .ok_or_else(|| TransportError::Protocol("empty response header block".into()))?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| {
            TransportError::Protocol(format!("malformed status line: {}", status_line))
        })?;

    let retry_after_seconds = headers.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("retry-after") {
            value.trim().parse::<u64>().ok()
        } else {
            None
        }
    });

    let trimmed = body.trim();
    let body: Value = if trimmed.is_empty() {
        json!({})
    } else {
        serde_json::from_str(trimmed)
            .map_err(|e| TransportError::Protocol(format!("invalid response JSON: {}", e)))?
    };

    Ok(ApiResponse {
        status,
        retry_after_seconds,
        body,
    })
}
