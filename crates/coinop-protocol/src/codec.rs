//! Codec trait and implementations for serializing envelopes to frames.
//!
//! The protocol layer doesn't care how bytes are produced — anything
//! implementing [`Codec`] will do. [`JsonCodec`] is the default: readable
//! in logs and easy to poke at with a WebSocket client. A binary codec can
//! slot in later without touching any other layer.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts values to and from wire bytes.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Envelope;
    use crate::types::ClientId;

    #[test]
    fn test_json_codec_envelope_round_trip() {
        let codec = JsonCodec;
        let env = Envelope {
            sender: ClientId::new("aaaa"),
            recipient: None,
            payload: serde_json::json!({ "type": "hello" }),
        };

        let bytes = codec.encode(&env).unwrap();
        let back: Envelope = codec.decode(&bytes).unwrap();

        assert_eq!(env, back);
    }

    #[test]
    fn test_json_codec_garbage_returns_error() {
        let codec = JsonCodec;
        let result: Result<Envelope, _> = codec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
