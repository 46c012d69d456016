//! Error types for rapidwire.

use http::StatusCode;
use thiserror::Error;

use crate::status::Status;

/// Main error type for all rapidwire operations.
#[derive(Debug, Error)]
pub enum RapidError {
    /// I/O error while reading or writing a body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Query string encoding error.
    #[error("query encode error: {0}")]
    QueryEncode(#[from] serde_urlencoded::ser::Error),

    /// Invalid request or response head.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// A `{name:regex}` path segment did not compile.
    #[error("invalid path pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Malformed envelope or message framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Typed error reported by the remote side.
    #[error("{} {}", .0.code().as_u16(), .0.message())]
    Status(Status),

    /// No handler bound to a route name.
    #[error("no handler registered for route {0}")]
    HandlerNotFound(String),

    /// The schema violates a build-time invariant.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Connection-level failure reported by a transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer went away before the exchange finished.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RapidError {
    /// The status a caller observes for this error.
    ///
    /// Typed errors keep their status; everything else is reported as an
    /// internal error carrying this error's message.
    pub fn status(&self) -> Status {
        match self {
            RapidError::Status(status) => status.clone(),
            other => Status::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }

    /// Whether re-issuing the same request can succeed.
    ///
    /// Everything that came back over the wire is retryable, typed statuses
    /// included. Requests that could not be built and configuration errors
    /// are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RapidError::Pattern(_)
                | RapidError::QueryEncode(_)
                | RapidError::HandlerNotFound(_)
                | RapidError::InvalidSchema(_)
        )
    }
}

impl From<Status> for RapidError {
    fn from(status: Status) -> Self {
        RapidError::Status(status)
    }
}

/// Result type alias using RapidError.
pub type Result<T> = std::result::Result<T, RapidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_passthrough() {
        let err = RapidError::Status(Status::new(StatusCode::CONFLICT, "taken"));
        let status = err.status();
        assert_eq!(status.code(), StatusCode::CONFLICT);
        assert_eq!(status.message(), "taken");
        assert_eq!(err.to_string(), "409 taken");
    }

    #[test]
    fn test_untyped_maps_to_internal() {
        let err = RapidError::Protocol("bad frame".to_string());
        assert_eq!(err.status().code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_retryable() {
        assert!(RapidError::ConnectionClosed.is_retryable());
        assert!(RapidError::Transport("reset".into()).is_retryable());
        assert!(RapidError::Status(Status::for_code(StatusCode::SERVICE_UNAVAILABLE)).is_retryable());
        assert!(RapidError::Status(Status::for_code(StatusCode::BAD_REQUEST)).is_retryable());
        assert!(RapidError::Status(Status::for_code(StatusCode::NOT_FOUND)).is_retryable());
        assert!(!RapidError::QueryEncode(serde::ser::Error::custom("top-level scalar")).is_retryable());
        assert!(!RapidError::HandlerNotFound("Index".into()).is_retryable());
    }
}
