//! MsgPack protocol using `rmp-serde`.
//!
//! Always encodes with `to_vec_named`, never `to_vec`: envelopes and user
//! records must be maps keyed by field name so that clients in other
//! languages can read them without knowing field order.
//!
//! # Example
//!
//! ```
//! use rapidwire::codec::{Envelope, MsgPackProtocol, Protocol};
//!
//! let protocol = MsgPackProtocol;
//! let bytes = protocol
//!     .encode_envelope(&Envelope::success(200, serde_json::json!({"id": 42})))
//!     .unwrap();
//! let decoded = protocol.decode_envelope(&bytes).unwrap();
//! assert_eq!(decoded.status, 200);
//! assert_eq!(decoded.data.unwrap()["id"], 42);
//! ```

use bytes::Bytes;
use serde_json::Value;

use super::{Envelope, Framing, Protocol};
use crate::error::Result;

/// MessagePack protocol.
///
/// Streamed envelopes carry a 4-byte big-endian length prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackProtocol;

impl MsgPackProtocol {
    /// Encode any value to MsgPack bytes in struct-as-map format.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Protocol for MsgPackProtocol {
    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn encode_value(&self, value: &Value) -> Result<Bytes> {
        Ok(Self::encode(value)?.into())
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Self::decode(bytes)
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes> {
        Ok(Self::encode(envelope)?.into())
    }

    fn decode_envelope(&self, bytes: &[u8]) -> Result<Envelope> {
        Self::decode(bytes)
    }

    fn framing(&self) -> Framing {
        Framing::LengthPrefixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct User {
        id: u32,
        name: String,
        active: bool,
    }

    #[test]
    fn test_to_vec_named_produces_map_format() {
        let user = User {
            id: 1,
            name: "bob".to_string(),
            active: true,
        };
        let encoded = MsgPackProtocol::encode(&user).unwrap();

        // fixmap with 3 entries, not fixarray
        assert_eq!(encoded[0], 0x83);
        let value: Value = MsgPackProtocol::decode(&encoded).unwrap();
        assert_eq!(value, json!({"id": 1, "name": "bob", "active": true}));
    }

    #[test]
    fn test_envelope_is_map_keyed_by_field() {
        let bytes = MsgPackProtocol
            .encode_envelope(&Envelope::success(201, json!({"id": 1})))
            .unwrap();
        // status + data, error omitted
        assert_eq!(bytes[0], 0x82);

        let decoded = MsgPackProtocol.decode_envelope(&bytes).unwrap();
        assert_eq!(decoded, Envelope::success(201, json!({"id": 1})));
    }

    #[test]
    fn test_value_round_trip() {
        let value = json!({"nested": {"list": [1, 2, 3]}, "none": null, "f": 1.5});
        let bytes = MsgPackProtocol.encode_value(&value).unwrap();
        assert_eq!(MsgPackProtocol.decode_value(&bytes).unwrap(), value);
        assert_eq!(MsgPackProtocol.decode_value(&[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_binary_buffer() {
        let data = vec![0x00, 0x01, 0xFF, 0xFE];
        let encoded = MsgPackProtocol::encode(&serde_bytes::Bytes::new(&data)).unwrap();
        // bin8 marker
        assert_eq!(encoded[0], 0xC4);
        let decoded: serde_bytes::ByteBuf = MsgPackProtocol::decode(&encoded).unwrap();
        assert_eq!(decoded.into_vec(), data);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        assert!(MsgPackProtocol.decode_envelope(&[0xC1]).is_err());
    }
}
