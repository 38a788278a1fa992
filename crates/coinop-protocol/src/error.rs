//! Error types for the protocol layer.
//!
//! Each crate in Coinop defines its own error enum. A `ProtocolError` always
//! means the problem is in tagging, encoding, or decoding — not in
//! networking or lobby management.

use crate::registry::Tag;

/// Errors that can occur while encoding, decoding, or registering messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a message).
    ///
    /// Common causes: malformed JSON, missing required fields, wrong data
    /// types, or truncated frames.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload carried a type tag nobody registered.
    #[error("unknown message tag {0:?}")]
    UnknownTag(Tag),

    /// Two registrations claimed the same tag. Registration fails fast so
    /// the collision surfaces at startup, not at dispatch time.
    #[error("duplicate registration for tag {0:?}")]
    DuplicateTag(Tag),

    /// Registration was attempted after the registry already decoded a
    /// message. The tag table is fixed once traffic starts flowing.
    #[error("registry is sealed, cannot register tag {0:?}")]
    RegistrySealed(Tag),

    /// The message is structurally invalid at the protocol level — e.g. a
    /// payload that isn't a JSON object, or an envelope missing its tag.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
