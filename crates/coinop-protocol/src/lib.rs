//! Wire protocol for Coinop.
//!
//! This crate defines the "language" the distributor and peers speak:
//!
//! - **Types** ([`ClientId`], [`Lobby`], [`Player`], [`GameKind`], …) —
//!   the data that travels inside payloads.
//! - **Registry** ([`Registry`], [`WireMessage`], [`Packet`]) — runtime tag
//!   registration and dynamic decode, so a receiver can dispatch messages
//!   without static knowledge of the sender's exact type.
//! - **Messages** ([`Hello`], [`Join`], [`LobbyInfo`], [`GameUpdate`], …) —
//!   every shape the hub exchanges.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how envelopes become frames.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing any of
//!   the above.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw frames) and the
//! lobby/view layers (behavior). It knows nothing about sockets, rosters,
//! or screens.
//!
//! ```text
//! Connection (frames) → Envelope → Registry → Box<dyn Packet> → Delegate
//! ```

mod codec;
mod error;
mod games;
mod messages;
mod registry;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use games::{
    GamePayload, Heading, PongClientState, PongGameState, TronClientState, TronGameState,
};
pub use messages::{
    tags, AckGameUpdate, ClientUpdate, Disconnect, EndGame, ErrorReply, GameUpdate, Heartbeat,
    HeartbeatReply, Hello, Ident, Join, JoinReply, Leave, LobbyEnd, LobbyInfo, StartGame,
};
pub use registry::{packet_as, Envelope, Packet, Registry, Tag, WireMessage, TAG_FIELD};
pub use types::{ClientId, GameKind, Lobby, LobbyId, Player};

/// Registers every fixed-shape message plus one composite registration per
/// supported game for the parametrized shapes. Called once at startup.
///
/// # Errors
/// Propagates [`ProtocolError::DuplicateTag`] — which would mean a bug in
/// this very function — so startup fails loudly instead of dispatching
/// ambiguously.
pub fn register_all(registry: &mut Registry) -> Result<(), ProtocolError> {
    registry.register::<Ident>()?;
    registry.register::<Hello>()?;
    registry.register::<Join>()?;
    registry.register::<JoinReply>()?;
    registry.register::<Leave>()?;
    registry.register::<LobbyInfo>()?;
    registry.register::<LobbyEnd>()?;
    registry.register::<StartGame>()?;
    registry.register::<EndGame>()?;
    registry.register::<Heartbeat>()?;
    registry.register::<HeartbeatReply>()?;
    registry.register::<AckGameUpdate>()?;
    registry.register::<Disconnect>()?;
    registry.register::<ErrorReply>()?;

    // One concrete registration per game for the parametrized shapes.
    registry.register::<ClientUpdate<TronClientState>>()?;
    registry.register::<GameUpdate<TronGameState, TronClientState>>()?;
    registry.register::<ClientUpdate<PongClientState>>()?;
    registry.register::<GameUpdate<PongGameState, PongClientState>>()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_succeeds_once() {
        let mut registry = Registry::new();
        register_all(&mut registry).expect("registration list has no collisions");
        assert_eq!(registry.len(), 18);
    }

    #[test]
    fn test_register_all_round_trips_every_fixed_shape() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();

        let samples: Vec<Box<dyn Packet>> = vec![
            Box::new(Hello {}),
            Box::new(Leave {
                client_id: ClientId::new("abcd"),
            }),
            Box::new(LobbyEnd {}),
            Box::new(StartGame {}),
            Box::new(EndGame {}),
            Box::new(Heartbeat {}),
            Box::new(HeartbeatReply {}),
            Box::new(AckGameUpdate {}),
            Box::new(Disconnect {
                client_id: ClientId::new("abcd"),
            }),
            Box::new(ErrorReply {
                message: "bad payload".into(),
            }),
        ];

        for packet in &samples {
            let value = packet.to_tagged_value().unwrap();
            let decoded = registry.decode(&value).unwrap();
            assert_eq!(decoded.tag(), packet.tag(), "tag survives the round trip");
        }
    }

    #[test]
    fn test_parametrized_shapes_decode_to_their_game() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();

        let update = ClientUpdate::<TronClientState> {
            state: TronClientState {
                x: 3,
                y: 4,
                heading: Heading::Right,
                alive: true,
            },
        };
        let value = update.to_tagged_value().unwrap();
        let decoded = registry.decode(&value).unwrap();

        let back = packet_as::<ClientUpdate<TronClientState>>(decoded.as_ref())
            .expect("decodes to the tron-scoped shape");
        assert_eq!(back, &update);
        // The pong-scoped shape is a different registered type entirely.
        assert!(packet_as::<ClientUpdate<PongClientState>>(decoded.as_ref()).is_none());
    }
}
