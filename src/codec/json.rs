//! JSON protocol, the default structured encoding.
//!
//! Streamed envelopes are newline-delimited. `serde_json` never emits a raw
//! newline inside a compact document, so the delimiter is unambiguous.

use bytes::Bytes;
use serde_json::Value;

use super::{Envelope, Framing, Protocol};
use crate::error::Result;

/// JSON protocol using `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProtocol;

impl Protocol for JsonProtocol {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    #[inline]
    fn encode_value(&self, value: &Value) -> Result<Bytes> {
        Ok(serde_json::to_vec(value)?.into())
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    #[inline]
    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes> {
        Ok(serde_json::to_vec(envelope)?.into())
    }

    #[inline]
    fn decode_envelope(&self, bytes: &[u8]) -> Result<Envelope> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn framing(&self) -> Framing {
        Framing::Delimited(b'\n')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_body_is_null() {
        assert_eq!(JsonProtocol.decode_value(b"").unwrap(), Value::Null);
        assert_eq!(JsonProtocol.decode_value(b" \n").unwrap(), Value::Null);
    }

    #[test]
    fn test_value_round_trip() {
        let value = json!({"name": "alice", "tags": ["a", "b"], "age": 30});
        let bytes = JsonProtocol.encode_value(&value).unwrap();
        assert_eq!(JsonProtocol.decode_value(&bytes).unwrap(), value);
    }

    #[test]
    fn test_stream_item_is_newline_terminated() {
        let item = JsonProtocol
            .encode_stream_item(&Envelope::success(200, json!("line\nbreak")))
            .unwrap();
        assert_eq!(item.iter().filter(|b| **b == b'\n').count(), 1);
        assert!(item.ends_with(b"\n"));
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        assert!(JsonProtocol.decode_envelope(b"{\"status\":").is_err());
        assert!(JsonProtocol.decode_envelope(b"{\"error\":\"x\"}").is_err());
    }
}
