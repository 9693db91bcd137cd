//! HTTP rendering of relay failures
//!
//! Failures that happen before the first fragment become a non-2xx JSON
//! response. Rate limiting keeps its own status (429) so clients can tell
//! it apart from every other upstream failure (502).

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::upstream::UpstreamError;

impl UpstreamError {
    /// HTTP status the relay answers with for this failure
    pub fn relay_status(&self) -> StatusCode {
        match self {
            UpstreamError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            UpstreamError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UpstreamError::Status { .. }
            | UpstreamError::Network(_)
            | UpstreamError::Decode(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        let status = self.relay_status();
        let mut response = create_error_response(status, self.category(), &self.to_string());

        if let Some(retry_after) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Create a JSON error response
pub(crate) fn create_error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
