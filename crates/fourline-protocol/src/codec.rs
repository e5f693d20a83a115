//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between Rust types and raw bytes. Connection handlers
//! only depend on the [`Codec`] trait, so the wire format can change
//! without touching them.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task. `decode` yields `DeserializeOwned` values so the
/// frame buffer can be dropped right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Browser clients speak JSON natively, so this is the only codec the
/// server ships. It sits behind the `json` feature (on by default).
///
/// ## Example
///
/// ```rust
/// use fourline_protocol::{ClientEnvelope, ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let envelope = ClientEnvelope {
///     seq: 1,
///     timestamp: 5000,
///     payload: ClientMessage::Heartbeat { client_time: 5000 },
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: ClientEnvelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientEnvelope, ClientMessage, ServerEnvelope, ServerMessage};

    #[test]
    fn test_json_codec_decodes_client_frame() {
        let raw = br#"{"seq":2,"timestamp":7,"payload":{"type":"Quit"}}"#;
        let env: ClientEnvelope = JsonCodec.decode(raw).unwrap();
        assert_eq!(env.seq, 2);
        assert_eq!(env.payload, ClientMessage::Quit);
    }

    #[test]
    fn test_json_codec_garbage_is_decode_error() {
        let res: Result<ClientEnvelope, _> = JsonCodec.decode(b"not json");
        assert!(matches!(res, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_encodes_server_frame() {
        let env = ServerEnvelope {
            seq: 1,
            timestamp: 0,
            payload: ServerMessage::QueueLeft,
        };
        let bytes = JsonCodec.encode(&env).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""type":"QueueLeft""#));
    }
}
