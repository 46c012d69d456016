//! Before-request hooks.

use http::header::{HeaderValue, AUTHORIZATION};
use http::HeaderMap;

use crate::error::Result;

/// Mutates headers right before each attempt is sent.
///
/// Hooks run on every attempt, retries included, so they are the place
/// for short-lived credentials.
pub trait BeforeRequest: Send + Sync {
    fn before_request(&self, headers: &mut HeaderMap) -> Result<()>;
}

impl<F> BeforeRequest for F
where
    F: Fn(&mut HeaderMap) + Send + Sync,
{
    fn before_request(&self, headers: &mut HeaderMap) -> Result<()> {
        self(headers);
        Ok(())
    }
}

/// Sets `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerAuth {
    value: HeaderValue,
}

impl BearerAuth {
    pub fn new(token: &str) -> Result<Self> {
        let mut value = HeaderValue::try_from(format!("Bearer {token}")).map_err(http::Error::from)?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

impl BeforeRequest for BearerAuth {
    fn before_request(&self, headers: &mut HeaderMap) -> Result<()> {
        headers.insert(AUTHORIZATION, self.value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_auth() {
        let auth = BearerAuth::new("s3cret").unwrap();
        let mut headers = HeaderMap::new();
        auth.before_request(&mut headers).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer s3cret");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert!(!format!("{auth:?}").contains("s3cret"));
    }

    #[test]
    fn test_bearer_rejects_newline() {
        assert!(BearerAuth::new("a\nb").is_err());
    }

    #[test]
    fn test_closure_hook() {
        let hook = |headers: &mut HeaderMap| {
            headers.insert("x-request-id", HeaderValue::from_static("42"));
        };
        let mut headers = HeaderMap::new();
        hook.before_request(&mut headers).unwrap();
        assert_eq!(headers["x-request-id"], "42");
    }
}
