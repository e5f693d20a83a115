//! Error types for the protocol layer.
//!
//! Each Fourline crate defines its own error enum. A `ProtocolError` always
//! means the problem is in turning messages into bytes or back, never in
//! networking or game rules.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown `type` tag,
    /// missing fields, or values of the wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule (e.g. a handshake
    /// with an unsupported version).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
