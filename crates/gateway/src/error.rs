//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{ErrorKind, ServiceError, transport};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// A domain failure from a downstream service or the saga.
    Service(ServiceError),
    /// Malformed request from the client.
    BadRequest(String),
    /// Missing, malformed or rejected credentials.
    Unauthorized(String),
    /// The authentication service could not be consulted.
    AuthUnavailable,
    /// The rate limiter rejected the request.
    TooManyRequests,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => transport::to_http_status(err.kind()),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::AuthUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Service(err) => public_message(&err),
            ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) => msg,
            ApiError::AuthUnavailable => "Auth service unavailable".to_string(),
            ApiError::TooManyRequests => "too many requests".to_string(),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// Client-facing message for a domain error.
///
/// Only caller-correctable kinds expose the downstream message.
fn public_message(err: &ServiceError) -> String {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::InvalidInput | ErrorKind::AlreadyExists => {
            err.message().to_string()
        }
        ErrorKind::Unauthenticated => "Unauthorized".to_string(),
        ErrorKind::Forbidden => "Access denied".to_string(),
        ErrorKind::ServiceUnavailable => {
            tracing::warn!(error = %err, "downstream service unavailable");
            "Service unavailable".to_string()
        }
        ErrorKind::Timeout => {
            tracing::warn!(error = %err, "downstream call timed out");
            "Request timeout".to_string()
        }
        ErrorKind::Internal => {
            tracing::error!(error = %err, "internal server error");
            "Internal Server Error".to_string()
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}
