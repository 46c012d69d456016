//! Payload kinds that carry their own codec.
//!
//! These bypass the protocol envelope: the bytes are written as-is and the
//! metadata travels in `Content-Type` and `Content-Disposition` headers.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use rapidwire::codec::{PayloadCodec, RawData};
//!
//! let bytes = Bytes::from_static(b"zero copy");
//! let raw = RawData::new(bytes.clone());
//! assert_eq!(raw.into_bytes().as_ptr(), bytes.as_ptr());
//! ```

use std::ops::Deref;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use http::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RapidError, Result};

const OCTET_STREAM: &str = "application/octet-stream";

/// A payload with its own wire representation.
pub trait PayloadCodec: Sized {
    /// Add content headers for this payload.
    fn write_headers(&self, headers: &mut HeaderMap) -> Result<()>;

    /// The body bytes. Zero-copy for `Bytes`-backed payloads.
    fn into_bytes(self) -> Bytes;

    /// Rebuild the payload from a received head and body.
    fn from_parts(headers: &HeaderMap, body: Bytes) -> Result<Self>;
}

/// Raw bytes sent as `application/octet-stream`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawData(Bytes);

impl RawData {
    #[inline]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    #[inline]
    pub fn from_static(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }
}

impl Deref for RawData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for RawData {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl From<Vec<u8>> for RawData {
    fn from(data: Vec<u8>) -> Self {
        Self(data.into())
    }
}

impl Serialize for RawData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serde_bytes::serialize(&self.0[..], serializer)
    }
}

impl<'de> Deserialize<'de> for RawData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let buf: serde_bytes::ByteBuf = serde_bytes::deserialize(deserializer)?;
        Ok(Self(buf.into_vec().into()))
    }
}

impl PayloadCodec for RawData {
    fn write_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
        Ok(())
    }

    #[inline]
    fn into_bytes(self) -> Bytes {
        self.0
    }

    fn from_parts(_headers: &HeaderMap, body: Bytes) -> Result<Self> {
        Ok(Self(body))
    }
}

macro_rules! file_payload {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            filename: String,
            content_type: String,
            data: Bytes,
        }

        impl $name {
            pub fn new(
                filename: impl Into<String>,
                content_type: impl Into<String>,
                data: impl Into<Bytes>,
            ) -> Self {
                Self {
                    filename: filename.into(),
                    content_type: content_type.into(),
                    data: data.into(),
                }
            }

            pub fn filename(&self) -> &str {
                &self.filename
            }

            pub fn content_type(&self) -> &str {
                &self.content_type
            }

            pub fn data(&self) -> &Bytes {
                &self.data
            }
        }

        impl PayloadCodec for $name {
            fn write_headers(&self, headers: &mut HeaderMap) -> Result<()> {
                write_file_headers(headers, &self.filename, &self.content_type)
            }

            fn into_bytes(self) -> Bytes {
                self.data
            }

            fn from_parts(headers: &HeaderMap, body: Bytes) -> Result<Self> {
                let (filename, content_type) = read_file_headers(headers);
                Ok(Self {
                    filename,
                    content_type,
                    data: body,
                })
            }
        }
    };
}

file_payload! {
    /// A file sent by the client as a request body.
    FileUpload
}

file_payload! {
    /// A file sent by the server as a response body.
    FileDownload
}

fn write_file_headers(headers: &mut HeaderMap, filename: &str, content_type: &str) -> Result<()> {
    let content_type = if content_type.is_empty() {
        OCTET_STREAM
    } else {
        content_type
    };
    headers.insert(CONTENT_TYPE, header_value(content_type)?);
    if !filename.is_empty() {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        headers.insert(
            CONTENT_DISPOSITION,
            header_value(&format!("attachment; filename=\"{escaped}\""))?,
        );
    }
    Ok(())
}

fn read_file_headers(headers: &HeaderMap) -> (String, String) {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(OCTET_STREAM)
        .to_string();
    let filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .unwrap_or_default();
    (filename, content_type)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| RapidError::Protocol(format!("invalid header value {value:?}: {e}")))
}

/// Extract `filename` from a `Content-Disposition` value.
fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (key, raw) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let raw = raw.trim();
        match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            Some(quoted) => {
                let mut out = String::with_capacity(quoted.len());
                let mut chars = quoted.chars();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => out.extend(chars.next()),
                        c => out.push(c),
                    }
                }
                Some(out)
            }
            None => Some(raw.to_string()),
        }
    })
}
