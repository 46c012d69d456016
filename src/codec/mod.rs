//! Codec module - wire encodings for envelopes and payloads.
//!
//! Two layers live here:
//!
//! - [`Protocol`] - the pluggable structured encoding shared by client and
//!   server. [`JsonProtocol`] is the default; [`MsgPackProtocol`] uses
//!   `rmp-serde`.
//! - Payload kinds with their own codec ([`RawData`], [`FileUpload`],
//!   [`FileDownload`]). These bypass the envelope and travel as raw bytes
//!   with content headers.
//!
//! Every scalar response is one [`Envelope`]. Streamed responses are a
//! sequence of envelopes, each framed by the protocol so that a reader can
//! split them again with a [`MessageBuffer`].
//!
//! # Example
//!
//! ```
//! use rapidwire::codec::{Envelope, JsonProtocol, Protocol};
//!
//! let protocol = JsonProtocol;
//! let bytes = protocol
//!     .encode_envelope(&Envelope::success(201, serde_json::json!({"id": 1})))
//!     .unwrap();
//! assert_eq!(&bytes[..], br#"{"status":201,"data":{"id":1}}"#);
//!
//! let envelope = protocol.decode_envelope(&bytes).unwrap();
//! assert_eq!(envelope.into_result().unwrap()["id"], 1);
//! ```

mod frame_buffer;
mod json;
mod msgpack;
mod raw;

use std::fmt;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RapidError, Result};
use crate::status::Status;

pub use frame_buffer::{MessageBuffer, DEFAULT_MAX_MESSAGE_SIZE};
pub use json::JsonProtocol;
pub use msgpack::MsgPackProtocol;
pub use raw::{FileDownload, FileUpload, PayloadCodec, RawData};

/// How streamed messages are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Each message is followed by the delimiter byte.
    Delimited(u8),
    /// Each message is preceded by its length as a 4-byte big-endian integer.
    LengthPrefixed,
}

impl Framing {
    /// Wrap one encoded message for a stream.
    pub fn frame(&self, message: &[u8]) -> Result<Bytes> {
        match *self {
            Framing::Delimited(delimiter) => {
                let mut buf = BytesMut::with_capacity(message.len() + 1);
                buf.extend_from_slice(message);
                buf.extend_from_slice(&[delimiter]);
                Ok(buf.freeze())
            }
            Framing::LengthPrefixed => {
                let len = u32::try_from(message.len()).map_err(|_| {
                    RapidError::Protocol(format!("message of {} bytes is too large to frame", message.len()))
                })?;
                let mut buf = BytesMut::with_capacity(message.len() + 4);
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(message);
                Ok(buf.freeze())
            }
        }
    }
}

/// The wire wrapper for one message.
///
/// Success is `{status, data?}`, failure is `{status, error}`; absent keys
/// are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Success envelope. A `null` payload is omitted.
    pub fn success(status: u16, data: Value) -> Self {
        Self {
            status,
            error: None,
            data: (!data.is_null()).then_some(data),
        }
    }

    /// Success envelope without a payload.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            error: None,
            data: None,
        }
    }

    /// Failure envelope carrying the status message.
    pub fn failure(status: &Status) -> Self {
        Self {
            status: status.code().as_u16(),
            error: Some(status.message().to_string()),
            data: None,
        }
    }

    /// Whether this envelope reports a failure.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !(200..300).contains(&self.status)
    }

    /// The payload on success, or the carried status as an error.
    ///
    /// A missing payload decodes as `Value::Null`.
    pub fn into_result(self) -> Result<Value> {
        if !self.is_failure() {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        let code = StatusCode::from_u16(self.status)
            .map_err(|_| RapidError::Protocol(format!("invalid status {} in envelope", self.status)))?;
        let status = match self.error {
            Some(message) => Status::new(code, message),
            None => Status::for_code(code),
        };
        Err(RapidError::Status(status))
    }
}

/// A structured wire encoding.
///
/// Implementations must be symmetric: anything `encode_*` produces,
/// `decode_*` accepts.
pub trait Protocol: Send + Sync + fmt::Debug {
    /// Value of the `Content-Type` header for envelopes and bodies.
    fn content_type(&self) -> &'static str;

    /// Encode a request body.
    fn encode_value(&self, value: &Value) -> Result<Bytes>;

    /// Decode a request body.
    fn decode_value(&self, bytes: &[u8]) -> Result<Value>;

    /// Encode one envelope, unframed.
    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes>;

    /// Decode one unframed envelope.
    fn decode_envelope(&self, bytes: &[u8]) -> Result<Envelope>;

    /// Message delimiting used for streamed envelopes.
    fn framing(&self) -> Framing;

    /// Encode one envelope framed for a stream.
    fn encode_stream_item(&self, envelope: &Envelope) -> Result<Bytes> {
        let message = self.encode_envelope(envelope)?;
        self.framing().frame(&message)
    }
}

/// Response payload handed to [`encode_response`].
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Data(Value),
    Raw(RawData),
    File(FileDownload),
}

/// Headers and body of an encoded response.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Encode a translated response.
///
/// An error always produces a failure envelope. Otherwise payloads with
/// their own codec are written as raw bytes with their content headers,
/// and everything else goes into a success envelope of `protocol`.
pub fn encode_response(
    protocol: &dyn Protocol,
    code: StatusCode,
    error: Option<&Status>,
    payload: Payload,
) -> Result<Encoded> {
    let mut headers = HeaderMap::new();
    let envelope = match (error, payload) {
        (Some(status), _) => Envelope::failure(status),
        (None, Payload::Raw(raw)) => return own_codec(raw, headers),
        (None, Payload::File(file)) => return own_codec(file, headers),
        (None, Payload::Data(value)) => Envelope::success(code.as_u16(), value),
        (None, Payload::Empty) => Envelope::empty(code.as_u16()),
    };
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(protocol.content_type()));
    Ok(Encoded {
        headers,
        body: protocol.encode_envelope(&envelope)?,
    })
}

fn own_codec<P: PayloadCodec>(payload: P, mut headers: HeaderMap) -> Result<Encoded> {
    payload.write_headers(&mut headers)?;
    Ok(Encoded {
        headers,
        body: payload.into_bytes(),
    })
}

/// Decode a scalar response body into its payload.
///
/// Non-2xx responses always become [`RapidError::Status`]. When the body is
/// not a failure envelope, the transport status and its reason phrase are
/// used.
pub fn decode_response(protocol: &dyn Protocol, code: StatusCode, body: &[u8]) -> Result<Value> {
    if code.is_success() {
        return protocol.decode_envelope(body)?.into_result();
    }
    match protocol.decode_envelope(body) {
        Ok(envelope) if envelope.is_failure() => envelope.into_result(),
        _ => Err(RapidError::Status(Status::for_code(code))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_omits_error() {
        let bytes = JsonProtocol
            .encode_envelope(&Envelope::success(201, json!({"ID": 1, "Name": "bob"})))
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"status": 201, "data": {"ID": 1, "Name": "bob"}}));
    }

    #[test]
    fn test_failure_envelope_omits_data() {
        let bytes = JsonProtocol
            .encode_envelope(&Envelope::failure(&Status::not_found()))
            .unwrap();
        assert_eq!(&bytes[..], br#"{"status":404,"error":"Not Found"}"#);
    }

    #[test]
    fn test_typed_error_round_trip() {
        for protocol in [&JsonProtocol as &dyn Protocol, &MsgPackProtocol] {
            let status = Status::new(StatusCode::CONFLICT, "name taken");
            let bytes = protocol.encode_envelope(&Envelope::failure(&status)).unwrap();
            let err = protocol.decode_envelope(&bytes).unwrap().into_result().unwrap_err();
            match err {
                RapidError::Status(got) => {
                    assert_eq!(got.code(), StatusCode::CONFLICT);
                    assert_eq!(got.message(), "name taken");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_primitives_pass_through() {
        let bytes = JsonProtocol.encode_envelope(&Envelope::success(200, json!(42))).unwrap();
        assert_eq!(&bytes[..], br#"{"status":200,"data":42}"#);
        let bytes = JsonProtocol.encode_envelope(&Envelope::success(200, json!("hi"))).unwrap();
        assert_eq!(&bytes[..], br#"{"status":200,"data":"hi"}"#);
    }

    #[test]
    fn test_encode_response_error_wins_over_payload() {
        let encoded = encode_response(
            &JsonProtocol,
            StatusCode::NOT_FOUND,
            Some(&Status::not_found()),
            Payload::Raw(RawData::from_static(b"ignored")),
        )
        .unwrap();
        assert_eq!(encoded.headers[CONTENT_TYPE], "application/json");
        assert_eq!(&encoded.body[..], br#"{"status":404,"error":"Not Found"}"#);
    }

    #[test]
    fn test_encode_response_file_bypasses_envelope() {
        let file = FileDownload::new("report.csv", "text/csv", Bytes::from_static(b"a,b\n"));
        let encoded = encode_response(&JsonProtocol, StatusCode::OK, None, Payload::File(file)).unwrap();
        assert_eq!(encoded.headers[CONTENT_TYPE], "text/csv");
        assert_eq!(
            encoded.headers[http::header::CONTENT_DISPOSITION],
            r#"attachment; filename="report.csv""#
        );
        assert_eq!(&encoded.body[..], b"a,b\n");
    }

    #[test]
    fn test_decode_response_falls_back_to_transport_status() {
        let err = decode_response(&JsonProtocol, StatusCode::BAD_GATEWAY, b"<html>oops</html>").unwrap_err();
        match err {
            RapidError::Status(status) => {
                assert_eq!(status.code(), StatusCode::BAD_GATEWAY);
                assert_eq!(status.message(), "Bad Gateway");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = decode_response(&JsonProtocol, StatusCode::OK, b"not json").unwrap_err();
        assert!(matches!(err, RapidError::Json(_)));
    }

    #[test]
    fn test_decode_response_success_envelope_on_error_status() {
        let err = decode_response(&JsonProtocol, StatusCode::BAD_GATEWAY, br#"{"status":200,"data":1}"#).unwrap_err();
        match err {
            RapidError::Status(status) => {
                assert_eq!(status.code(), StatusCode::BAD_GATEWAY);
                assert_eq!(status.message(), "Bad Gateway");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_envelope_without_data_is_null() {
        let value = Envelope::empty(204).into_result().unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_length_prefixed_frame() {
        let framed = Framing::LengthPrefixed.frame(b"abc").unwrap();
        assert_eq!(&framed[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
        let framed = Framing::Delimited(b'\n').frame(b"abc").unwrap();
        assert_eq!(&framed[..], b"abc\n");
    }
}
