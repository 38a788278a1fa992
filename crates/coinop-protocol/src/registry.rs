//! Runtime message registry and the dynamic dispatch envelope.
//!
//! The receiver of a frame doesn't statically know what the sender put in
//! it. Instead, every message type is registered under a string [`Tag`] at
//! startup, and [`Registry::decode`] turns a tagged payload back into the
//! concrete type as a [`Packet`] trait object. Consumers downcast with
//! [`packet_as`].
//!
//! The registry is write-once: registration fails fast on a duplicate tag,
//! and the first decode seals the table — registering after traffic has
//! started flowing is a programming error and is reported as one.
//!
//! ```text
//! bytes → Envelope { sender, recipient, payload } → Registry → Box<dyn Packet>
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{ClientId, GameKind};

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// A wire type tag.
///
/// Plain tags name a single message shape (`"join"`). Parametrized shapes
/// get one composite tag per supported game (`"client_update:tron"`), so a
/// statically-typed receiver still ends up with the right concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Builds the composite tag for a per-game message shape.
    pub fn scoped(base: &str, game: GameKind) -> Self {
        Self(format!("{base}:{}", game.wire_name()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The JSON field carrying the tag inside every payload object.
pub const TAG_FIELD: &str = "type";

// ---------------------------------------------------------------------------
// WireMessage / Packet
// ---------------------------------------------------------------------------

/// A registrable message shape.
///
/// Implemented by every concrete message struct. The associated
/// [`wire_tag`](WireMessage::wire_tag) is a function, not a constant, so
/// parametrized shapes can derive a composite tag from their type argument.
pub trait WireMessage:
    Serialize + DeserializeOwned + Any + fmt::Debug + Send + Sync + Sized + 'static
{
    /// The tag this shape registers and travels under.
    fn wire_tag() -> Tag;
}

/// Object-safe view of a decoded (or about-to-be-encoded) message.
///
/// This is what crosses the layer boundaries: the network layer hands the
/// delegate a `Box<dyn Packet>`, and views downcast to the shapes they
/// handle. The blanket impl below covers every [`WireMessage`], so message
/// structs never implement this by hand.
pub trait Packet: Any + fmt::Debug + Send + Sync {
    /// The tag this packet travels under.
    fn tag(&self) -> Tag;

    /// Upcast for downcasting. See [`packet_as`].
    fn as_any(&self) -> &dyn Any;

    /// Serializes the message and inlines its tag into the object.
    fn to_tagged_value(&self) -> Result<Value, ProtocolError>;
}

impl<T: WireMessage> Packet for T {
    fn tag(&self) -> Tag {
        T::wire_tag()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_tagged_value(&self) -> Result<Value, ProtocolError> {
        let mut value = serde_json::to_value(self).map_err(ProtocolError::Encode)?;
        let Some(object) = value.as_object_mut() else {
            return Err(ProtocolError::InvalidMessage(format!(
                "message {:?} must encode as a JSON object",
                T::wire_tag()
            )));
        };
        object.insert(TAG_FIELD.into(), Value::String(T::wire_tag().to_string()));
        Ok(value)
    }
}

/// Downcasts a packet to a concrete message shape.
///
/// Returns `None` when the packet is some other type — the usual pattern in
/// a message handler is a chain of `if let Some(msg) = packet_as::<Join>(p)`.
pub fn packet_as<T: WireMessage>(packet: &dyn Packet) -> Option<&T> {
    packet.as_any().downcast_ref::<T>()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type DecodeFn = fn(Value) -> Result<Box<dyn Packet>, ProtocolError>;

fn decode_into<T: WireMessage>(value: Value) -> Result<Box<dyn Packet>, ProtocolError> {
    let msg: T = serde_json::from_value(value).map_err(ProtocolError::Decode)?;
    Ok(Box::new(msg))
}

/// Maps wire tags to concrete message shapes.
///
/// Built once at startup (`&mut self` registration), then shared immutably
/// behind an `Arc` for the life of the process. The `sealed` flag closes the
/// registration window the moment the first frame is decoded.
pub struct Registry {
    decoders: HashMap<Tag, DecodeFn>,
    sealed: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Registers a message shape under its wire tag.
    ///
    /// # Errors
    /// - [`ProtocolError::DuplicateTag`] if the tag is already taken
    /// - [`ProtocolError::RegistrySealed`] after the first decode
    pub fn register<T: WireMessage>(&mut self) -> Result<(), ProtocolError> {
        let tag = T::wire_tag();
        if self.sealed.load(Ordering::Acquire) {
            return Err(ProtocolError::RegistrySealed(tag));
        }
        if self.decoders.contains_key(&tag) {
            return Err(ProtocolError::DuplicateTag(tag));
        }
        self.decoders.insert(tag, decode_into::<T>);
        Ok(())
    }

    /// Decodes a tagged payload object into its registered concrete type.
    ///
    /// Seals the registry as a side effect: after this, `register` fails.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidMessage`] if the payload has no string tag
    /// - [`ProtocolError::UnknownTag`] if nobody registered the tag
    /// - [`ProtocolError::Decode`] if the payload doesn't match the shape
    pub fn decode(&self, payload: &Value) -> Result<Box<dyn Packet>, ProtocolError> {
        self.sealed.store(true, Ordering::Release);

        let tag = payload
            .get(TAG_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage("payload has no string \"type\" tag".into())
            })?;

        let decode = self
            .decoders
            .get(&Tag::new(tag))
            .ok_or_else(|| ProtocolError::UnknownTag(Tag::new(tag)))?;

        decode(payload.clone())
    }

    /// Whether a tag has a registered decoder.
    pub fn is_registered(&self, tag: &Tag) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Whether the registration window has closed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tags", &self.decoders.len())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wire wrapper. Every frame on a connection is one envelope.
///
/// `sender`/`recipient` are the routing metadata the distributor needs to
/// relay frames between peers that aren't directly connected: a recipient of
/// `None` asks the distributor to fan the frame out to every other peer.
/// The `payload` is the tagged message object; it stays opaque to relays,
/// which never decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: ClientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ClientId>,
    pub payload: Value,
}

impl Envelope {
    /// Wraps a message for the wire.
    pub fn seal(
        sender: ClientId,
        recipient: Option<ClientId>,
        packet: &dyn Packet,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            sender,
            recipient,
            payload: packet.to_tagged_value()?,
        })
    }

    /// Decodes the payload through the registry.
    pub fn open(&self, registry: &Registry) -> Result<Box<dyn Packet>, ProtocolError> {
        registry.decode(&self.payload)
    }

    /// The payload's tag string, if present. Cheap peek used by the
    /// connection layer to fast-path heartbeats without a registry.
    pub fn tag(&self) -> Option<&str> {
        self.payload.get(TAG_FIELD).and_then(Value::as_str)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    impl WireMessage for Ping {
        fn wire_tag() -> Tag {
            Tag::new("ping")
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pong {
        n: u32,
    }

    impl WireMessage for Pong {
        fn wire_tag() -> Tag {
            Tag::new("pong")
        }
    }

    /// A second shape claiming Ping's tag, for collision tests.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Imposter {
        other: String,
    }

    impl WireMessage for Imposter {
        fn wire_tag() -> Tag {
            Tag::new("ping")
        }
    }

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register::<Ping>().unwrap();
        r.register::<Pong>().unwrap();
        r
    }

    #[test]
    fn test_tag_scoped_builds_composite() {
        assert_eq!(
            Tag::scoped("client_update", GameKind::Tron).as_str(),
            "client_update:tron"
        );
        assert_eq!(
            Tag::scoped("game_update", GameKind::Pong).as_str(),
            "game_update:pong"
        );
    }

    #[test]
    fn test_decode_encode_round_trip() {
        let r = registry();
        let msg = Ping { n: 42 };

        let value = msg.to_tagged_value().unwrap();
        let decoded = r.decode(&value).unwrap();

        assert_eq!(packet_as::<Ping>(decoded.as_ref()), Some(&msg));
    }

    #[test]
    fn test_decode_picks_concrete_type_by_tag() {
        let r = registry();
        let value = Pong { n: 7 }.to_tagged_value().unwrap();

        let decoded = r.decode(&value).unwrap();

        // Same field layout as Ping, but the tag selects Pong.
        assert!(packet_as::<Ping>(decoded.as_ref()).is_none());
        assert_eq!(packet_as::<Pong>(decoded.as_ref()), Some(&Pong { n: 7 }));
    }

    #[test]
    fn test_decode_unknown_tag_returns_error() {
        let r = registry();
        let value = serde_json::json!({ "type": "fly_to_moon", "speed": 9000 });

        let result = r.decode(&value);

        assert!(matches!(result, Err(ProtocolError::UnknownTag(t)) if t.as_str() == "fly_to_moon"));
    }

    #[test]
    fn test_decode_missing_tag_returns_error() {
        let r = registry();
        let value = serde_json::json!({ "n": 1 });

        assert!(matches!(r.decode(&value), Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_decode_malformed_payload_returns_error() {
        let r = registry();
        // Right tag, wrong field type.
        let value = serde_json::json!({ "type": "ping", "n": "not a number" });

        assert!(matches!(r.decode(&value), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_register_duplicate_tag_fails_fast() {
        let mut r = Registry::new();
        r.register::<Ping>().unwrap();

        let result = r.register::<Imposter>();

        assert!(matches!(result, Err(ProtocolError::DuplicateTag(t)) if t.as_str() == "ping"));
    }

    #[test]
    fn test_register_after_first_decode_is_rejected() {
        let mut r = Registry::new();
        r.register::<Ping>().unwrap();

        let value = Ping { n: 1 }.to_tagged_value().unwrap();
        r.decode(&value).unwrap();

        assert!(r.is_sealed());
        assert!(matches!(
            r.register::<Pong>(),
            Err(ProtocolError::RegistrySealed(_))
        ));
    }

    #[test]
    fn test_failed_decode_still_seals_registry() {
        let mut r = Registry::new();
        r.register::<Ping>().unwrap();

        let _ = r.decode(&serde_json::json!({ "type": "nope" }));

        assert!(r.is_sealed());
    }

    #[test]
    fn test_envelope_round_trip_preserves_routing() {
        let r = registry();
        let env = Envelope::seal(
            ClientId::new("aaaa"),
            Some(ClientId::new("bbbb")),
            &Ping { n: 3 },
        )
        .unwrap();

        let bytes = serde_json::to_vec(&env).unwrap();
        let back: Envelope = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(back.sender, ClientId::new("aaaa"));
        assert_eq!(back.recipient, Some(ClientId::new("bbbb")));
        assert_eq!(back.tag(), Some("ping"));
        let decoded = back.open(&r).unwrap();
        assert_eq!(packet_as::<Ping>(decoded.as_ref()), Some(&Ping { n: 3 }));
    }

    #[test]
    fn test_envelope_recipient_omitted_when_none() {
        let env = Envelope::seal(ClientId::new("aaaa"), None, &Ping { n: 0 }).unwrap();
        let json: Value = serde_json::to_value(&env).unwrap();

        assert!(json.get("recipient").is_none());
    }
}
