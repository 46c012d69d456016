//! Status values and status/error translation.
//!
//! A [`Status`] is the single vocabulary used across the handler boundary for
//! both "success with a non-default status" and "failure". Before every
//! response is encoded, [`translate`] folds the route's status hint and the
//! handler's error into the final status line:
//!
//! | error          | hint            | result                                  |
//! |----------------|-----------------|-----------------------------------------|
//! | none           | none            | `201` for POST, else `200`              |
//! | none           | 2xx             | hint                                    |
//! | none           | non-2xx         | hint, with a canonical error            |
//! | `Status`       | any             | its code; error cleared when 2xx        |
//! | other          | none or 2xx     | `500` with a generic message            |
//! | other          | non-2xx         | hint, with a canonical error            |
//!
//! Untyped errors never reach the wire with their own message.

use std::fmt;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::error::RapidError;

/// A status code with a message and optional out-of-band headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Status {
    code: StatusCode,
    message: String,
    headers: HeaderMap,
}

impl Status {
    /// Create a status with an explicit message.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Create a status carrying the canonical reason phrase, e.g. "Not Found".
    pub fn for_code(code: StatusCode) -> Self {
        Self::new(code, code.canonical_reason().unwrap_or("Unknown Status"))
    }

    /// `400 Bad Request` with a decode or validation message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// `404 Not Found`.
    pub fn not_found() -> Self {
        Self::for_code(StatusCode::NOT_FOUND)
    }

    /// `500 Internal Server Error` with the generic message.
    pub fn internal() -> Self {
        Self::for_code(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Attach a header that is copied onto the response head.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[inline]
    pub fn code(&self) -> StatusCode {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// True for 2xx codes, which mean "success with this status".
    #[inline]
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// An error returned by a handler.
///
/// Any `std::error::Error` converts into a `HandlerError` with `?`. A
/// [`Status`] (or a [`RapidError::Status`]) is recognised and kept typed;
/// everything else is untyped and reported to the caller as an internal
/// error.
pub enum HandlerError {
    /// Status and message are used verbatim.
    Status(Status),
    /// Logged server-side, never echoed to the caller.
    Untyped(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Untyped error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Untyped(message.into().into())
    }

    /// The typed status, if any.
    pub fn as_status(&self) -> Option<&Status> {
        match self {
            HandlerError::Status(status) => Some(status),
            HandlerError::Untyped(_) => None,
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        let boxed = match boxed.downcast::<Status>() {
            Ok(status) => return HandlerError::Status(*status),
            Err(other) => other,
        };
        match boxed.downcast::<RapidError>() {
            Ok(rapid) => match *rapid {
                RapidError::Status(status) => HandlerError::Status(status),
                other => HandlerError::Untyped(Box::new(other)),
            },
            Err(other) => HandlerError::Untyped(other),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Status(status) => f.debug_tuple("Status").field(status).finish(),
            HandlerError::Untyped(err) => f.debug_tuple("Untyped").field(err).finish(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Status(status) => write!(f, "{} {}", status.code.as_u16(), status.message),
            HandlerError::Untyped(err) => err.fmt(f),
        }
    }
}

/// Result of [`translate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    /// Final status for the response line and envelope.
    pub code: StatusCode,
    /// Error to encode; `None` for every 2xx code.
    pub error: Option<Status>,
    /// Headers to copy onto the response head.
    pub headers: HeaderMap,
}

/// Fold a status hint and a handler error into the final status.
pub fn translate(method: &Method, hint: Option<StatusCode>, error: Option<HandlerError>) -> Translated {
    let status = match error {
        None => match hint {
            None if *method == Method::POST => return success(StatusCode::CREATED),
            None => return success(StatusCode::OK),
            Some(code) if code.is_success() => return success(code),
            Some(code) => Status::for_code(code),
        },
        Some(HandlerError::Status(status)) => status,
        Some(HandlerError::Untyped(err)) => {
            tracing::error!(error = %err, "handler returned an untyped error");
            match hint {
                Some(code) if !code.is_success() => Status::for_code(code),
                _ => Status::internal(),
            }
        }
    };

    let code = status.code;
    if code.is_success() {
        Translated {
            code,
            error: None,
            headers: status.headers,
        }
    } else {
        Translated {
            code,
            headers: status.headers.clone(),
            error: Some(status),
        }
    }
}

fn success(code: StatusCode) -> Translated {
    Translated {
        code,
        error: None,
        headers: HeaderMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("database exploded at row 7")]
    struct DbError;

    #[test]
    fn test_default_status_per_method() {
        assert_eq!(translate(&Method::POST, None, None).code, StatusCode::CREATED);
        assert_eq!(translate(&Method::GET, None, None).code, StatusCode::OK);
        assert_eq!(translate(&Method::DELETE, None, None).code, StatusCode::OK);
    }

    #[test]
    fn test_non_success_hint_synthesizes_error() {
        let t = translate(&Method::GET, Some(StatusCode::GONE), None);
        assert_eq!(t.code, StatusCode::GONE);
        assert_eq!(t.error.unwrap().message(), "Gone");
    }

    #[test]
    fn test_typed_success_clears_error() {
        let err = HandlerError::from(Status::for_code(StatusCode::ACCEPTED));
        let t = translate(&Method::POST, None, Some(err));
        assert_eq!(t.code, StatusCode::ACCEPTED);
        assert!(t.error.is_none());
    }

    #[test]
    fn test_typed_failure_verbatim() {
        let err = HandlerError::from(Status::new(StatusCode::FORBIDDEN, "not yours"));
        let t = translate(&Method::GET, Some(StatusCode::OK), Some(err));
        assert_eq!(t.code, StatusCode::FORBIDDEN);
        assert_eq!(t.error.unwrap().message(), "not yours");
    }

    #[test]
    fn test_untyped_is_generic_internal_error() {
        let t = translate(&Method::GET, None, Some(HandlerError::from(DbError)));
        assert_eq!(t.code, StatusCode::INTERNAL_SERVER_ERROR);
        let error = t.error.unwrap();
        assert_eq!(error.message(), "Internal Server Error");
        assert!(!error.message().contains("row 7"));
    }

    #[test]
    fn test_untyped_with_failure_hint_keeps_hint() {
        let t = translate(&Method::GET, Some(StatusCode::BAD_GATEWAY), Some(HandlerError::msg("upstream")));
        assert_eq!(t.code, StatusCode::BAD_GATEWAY);
        assert_eq!(t.error.unwrap().message(), "Bad Gateway");
    }

    #[test]
    fn test_translation_idempotent() {
        for (method, hint) in [
            (Method::GET, None),
            (Method::POST, None),
            (Method::PUT, Some(StatusCode::ACCEPTED)),
            (Method::POST, Some(StatusCode::NO_CONTENT)),
        ] {
            let first = translate(&method, hint, None);
            let second = translate(&method, Some(first.code), None);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_status_headers_survive_success() {
        let status = Status::for_code(StatusCode::CREATED).with_header(
            http::header::LOCATION,
            HeaderValue::from_static("/users/7"),
        );
        let t = translate(&Method::POST, None, Some(status.into()));
        assert!(t.error.is_none());
        assert_eq!(t.headers.get(http::header::LOCATION).unwrap(), "/users/7");
    }

    #[test]
    fn test_rapid_status_is_typed() {
        let err = HandlerError::from(RapidError::Status(Status::not_found()));
        assert_eq!(err.as_status().unwrap().code(), StatusCode::NOT_FOUND);

        let err = HandlerError::from(RapidError::ConnectionClosed);
        assert!(err.as_status().is_none());
    }
}
