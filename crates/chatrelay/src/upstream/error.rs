use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use thiserror::Error;

/// Failure signal of the upstream completion client
///
/// Rate limiting is carried as its own variant so callers can apply a
/// retry policy without inspecting error messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// The provider rejected the request because of rate limiting
    #[error("Upstream rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// The provider answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, timeout or mid-stream transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// The provider's response could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Client misconfiguration (missing API key, bad URL)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UpstreamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited { .. })
    }

    /// Suggested wait before retrying, when the provider sent one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            UpstreamError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            UpstreamError::RateLimited { .. } => "rate_limited",
            UpstreamError::Status { .. } => "upstream_status",
            UpstreamError::Network(_) => "network",
            UpstreamError::Decode(_) => "decode",
            UpstreamError::Config(_) => "config",
        }
    }

    /// Classify a provider error code carried inside a response body
    pub(crate) fn from_api_error(code: Option<&serde_json::Value>, message: String) -> Self {
        let numeric = code.and_then(|c| {
            c.as_u64()
                .or_else(|| c.as_str().and_then(|s| s.parse::<u64>().ok()))
        });
        let textual = code.and_then(|c| c.as_str()).unwrap_or_default();

        if numeric == Some(429) || textual == "rate_limit_exceeded" {
            UpstreamError::RateLimited {
                retry_after: None,
                message,
            }
        } else {
            UpstreamError::Status {
                status: numeric
                    .and_then(|n| u16::try_from(n).ok())
                    .unwrap_or(502),
                body: message,
            }
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Network(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            UpstreamError::Network(format!("Failed to connect to upstream: {e}"))
        } else if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Network(format!("Request failed: {e}"))
        }
    }
}

/// Parse a `Retry-After` header given in delta-seconds
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
