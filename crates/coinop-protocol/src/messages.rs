//! Every message shape the hub speaks, with its wire tag.
//!
//! The tag strings are the protocol's stable surface — renaming one is a
//! breaking wire change. Parametrized shapes ([`ClientUpdate`],
//! [`GameUpdate`]) register once per supported game under a composite tag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::games::GamePayload;
use crate::registry::{Tag, WireMessage};
use crate::types::{ClientId, Lobby, Player};

// ---------------------------------------------------------------------------
// Tag constants
// ---------------------------------------------------------------------------

/// Wire tag strings. The connection layer matches on the heartbeat tags
/// directly so liveness never depends on registry contents.
pub mod tags {
    pub const IDENT: &str = "ident";
    pub const HELLO: &str = "hello";
    pub const JOIN: &str = "join";
    pub const JOIN_REPLY: &str = "join_reply";
    pub const LEAVE: &str = "leave";
    pub const LOBBY_INFO: &str = "lobby_info";
    pub const LOBBY_END: &str = "lobby_end";
    pub const START_GAME: &str = "start_game";
    pub const END_GAME: &str = "end_game";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HEARTBEAT_REPLY: &str = "heartbeat_reply";
    pub const CLIENT_UPDATE: &str = "client_update";
    pub const GAME_UPDATE: &str = "game_update";
    pub const ACK_GAME_UPDATE: &str = "ack_game_update";
    pub const DISCONNECT: &str = "disconnect";
    pub const ERROR: &str = "error";
}

macro_rules! wire_tag {
    ($ty:ty, $tag:expr) => {
        impl WireMessage for $ty {
            fn wire_tag() -> Tag {
                Tag::new($tag)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Connection establishment
// ---------------------------------------------------------------------------

/// First frame in each direction on a fresh connection: who am I.
///
/// Exchanged before the connection joins the client registry, so both
/// sides know the peer's id, whether it's the distributor, and which port
/// it accepts inbound connections on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub id: ClientId,
    pub distributor: bool,
    pub port: u16,
}
wire_tag!(Ident, tags::IDENT);

// ---------------------------------------------------------------------------
// Discovery and matchmaking
// ---------------------------------------------------------------------------

/// Browsing peer → hosts: "anyone got an open lobby?"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hello {}
wire_tag!(Hello, tags::HELLO);

/// Requester → host: ask to join the host's lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    /// Join code; compared case-sensitively when the lobby is private.
    pub code: String,
    /// The player entry the requester proposes for itself.
    pub player: Player,
}
wire_tag!(Join, tags::JOIN);

/// Host → requester: the verdict on a [`Join`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReply {
    pub success: bool,
    /// Refusal reason; only set when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Current lobby snapshot; only set when `success` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lobby: Option<Lobby>,
}
wire_tag!(JoinReply, tags::JOIN_REPLY);

impl JoinReply {
    pub fn accepted(lobby: Lobby) -> Self {
        Self {
            success: true,
            reason: None,
            lobby: Some(lobby),
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            lobby: None,
        }
    }
}

/// Roster member → host: leaving the lobby voluntarily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leave {
    pub client_id: ClientId,
}
wire_tag!(Leave, tags::LEAVE);

/// Host → everyone: current state of a lobby.
///
/// Receivers replace their cached copy wholesale — two `LobbyInfo`s for the
/// same lobby id never merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub lobby: Lobby,
}
wire_tag!(LobbyInfo, tags::LOBBY_INFO);

/// Host → roster: the lobby is gone; go back to browsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LobbyEnd {}
wire_tag!(LobbyEnd, tags::LOBBY_END);

/// Host → roster: the game begins now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartGame {}
wire_tag!(StartGame, tags::START_GAME);

/// Host → roster: the game is over; everyone returns to browsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndGame {}
wire_tag!(EndGame, tags::END_GAME);

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Periodic keep-alive, emitted by both ends of every connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {}
wire_tag!(Heartbeat, tags::HEARTBEAT);

/// Immediate answer to a [`Heartbeat`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatReply {}
wire_tag!(HeartbeatReply, tags::HEARTBEAT_REPLY);

/// A peer is gone — sent explicitly on clean shutdown, synthesized locally
/// on socket failure or heartbeat timeout, and broadcast by the distributor
/// when one of its directly-connected peers dies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disconnect {
    pub client_id: ClientId,
}
wire_tag!(Disconnect, tags::DISCONNECT);

/// Protocol-level complaint sent back to a misbehaving sender. The
/// connection stays open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub message: String,
}
wire_tag!(ErrorReply, tags::ERROR);

// ---------------------------------------------------------------------------
// In-game state sync (parametrized per game)
// ---------------------------------------------------------------------------

/// Non-host player → host, every tick: this player's slice of game state.
///
/// Registered once per supported game under `client_update:<game>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ClientUpdate<S: GamePayload> {
    pub state: S,
}

impl<S: GamePayload> WireMessage for ClientUpdate<S> {
    fn wire_tag() -> Tag {
        Tag::scoped(tags::CLIENT_UPDATE, S::kind())
    }
}

/// Host → roster, every tick: the authoritative aggregate.
///
/// Carries the host's game state plus the latest known per-player state.
/// Each recipient answers with [`AckGameUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct GameUpdate<G: GamePayload, C: GamePayload> {
    pub game: G,
    pub players: HashMap<ClientId, C>,
}

impl<G: GamePayload, C: GamePayload> WireMessage for GameUpdate<G, C> {
    fn wire_tag() -> Tag {
        Tag::scoped(tags::GAME_UPDATE, G::kind())
    }
}

/// Recipient → host: a [`GameUpdate`] arrived. Missed acks count toward the
/// session's liveness threshold exactly like missed heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckGameUpdate {}
wire_tag!(AckGameUpdate, tags::ACK_GAME_UPDATE);

// =========================================================================
// Tests
// =========================================================================
