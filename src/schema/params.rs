//! Matched path parameters.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::status::Status;

/// Path parameters captured for one request, keyed by placeholder name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse a parameter as a signed integer.
    pub fn int(&self, key: &str) -> Result<i64, Status> {
        let value = self.require(key)?;
        value
            .parse()
            .map_err(|e| Status::bad_request(format!("parameter {key}: {e}")))
    }

    /// Parse a parameter as a float.
    pub fn float(&self, key: &str) -> Result<f64, Status> {
        let value = self.require(key)?;
        value
            .parse()
            .map_err(|e| Status::bad_request(format!("parameter {key}: {e}")))
    }

    fn require(&self, key: &str) -> Result<&str, Status> {
        self.get(key)
            .ok_or_else(|| Status::bad_request(format!("no such parameter {key}")))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Decode the parameters into a typed value.
    ///
    /// Values go through the form decoder, so `"1234"` fills an integer
    /// field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Status> {
        let form = serde_urlencoded::to_string(&self.0).map_err(|e| Status::bad_request(e.to_string()))?;
        serde_urlencoded::from_str(&form).map_err(|e| Status::bad_request(e.to_string()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
