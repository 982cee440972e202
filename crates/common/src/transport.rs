//! Translation between transport failure codes and the domain taxonomy.
//!
//! Every HTTP status and every RPC code maps to exactly one [`ErrorKind`];
//! anything not listed explicitly falls through to `Internal`.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ServiceError};

/// Status codes of the RPC transport used between services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl RpcCode {
    /// Domain kind for a non-OK code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcCode::NotFound => ErrorKind::NotFound,
            RpcCode::InvalidArgument | RpcCode::FailedPrecondition => ErrorKind::InvalidInput,
            RpcCode::Unauthenticated => ErrorKind::Unauthenticated,
            RpcCode::PermissionDenied => ErrorKind::Forbidden,
            RpcCode::AlreadyExists => ErrorKind::AlreadyExists,
            RpcCode::Unavailable => ErrorKind::ServiceUnavailable,
            RpcCode::DeadlineExceeded => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }
}

/// Converts an RPC status into a domain error. `Ok` carries no error.
pub fn from_rpc_status(code: RpcCode, message: &str) -> Option<ServiceError> {
    match code {
        RpcCode::Ok => None,
        other => Some(ServiceError::new(other.kind(), message)),
    }
}

/// The RPC code a service reports for a domain error.
pub fn to_rpc_code(kind: ErrorKind) -> RpcCode {
    match kind {
        ErrorKind::NotFound => RpcCode::NotFound,
        ErrorKind::InvalidInput => RpcCode::InvalidArgument,
        ErrorKind::Unauthenticated => RpcCode::Unauthenticated,
        ErrorKind::Forbidden => RpcCode::PermissionDenied,
        ErrorKind::AlreadyExists => RpcCode::AlreadyExists,
        ErrorKind::ServiceUnavailable => RpcCode::Unavailable,
        ErrorKind::Timeout => RpcCode::DeadlineExceeded,
        ErrorKind::Internal => RpcCode::Internal,
    }
}

/// Converts a non-success HTTP response from a downstream service.
pub fn from_http_status(status: StatusCode, body: &str) -> ServiceError {
    let kind = match status {
        StatusCode::BAD_REQUEST => ErrorKind::InvalidInput,
        StatusCode::UNAUTHORIZED => ErrorKind::Unauthenticated,
        StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::AlreadyExists,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ErrorKind::ServiceUnavailable
        }
        StatusCode::REQUEST_TIMEOUT => ErrorKind::Timeout,
        _ => {
            return ServiceError::internal(format!(
                "downstream service error: status {}, body: {body}",
                status.as_u16()
            ));
        }
    };
    ServiceError::new(kind, body)
}

/// The HTTP status the gateway renders for a domain error.
pub fn to_http_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
