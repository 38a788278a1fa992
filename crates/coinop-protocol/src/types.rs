//! Core identity and matchmaking types for Coinop's wire format.
//!
//! Everything in this module travels on the wire inside message payloads:
//! client identities, players, and the lobby summary that hosts broadcast
//! to browsing peers.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::ops::RangeInclusive;

use rand::Rng;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a peer, assigned once per process start.
///
/// Newtype over a 16-character lowercase hex string (64 bits of
/// randomness), so ids are unguessable and collision-free in practice.
/// `#[serde(transparent)]` keeps the JSON representation a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wraps an existing id string. Used when an id arrives off the wire.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(random_hex())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a lobby. Same recipe as [`ClientId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(String);

impl LobbyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(random_hex())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 16 lowercase hex chars — 64 bits of entropy.
fn random_hex() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Game kinds
// ---------------------------------------------------------------------------

/// The games a lobby can be created for.
///
/// Serialized lowercase so composite registry tags read naturally
/// (`client_update:tron`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Tron,
    Pong,
}

impl GameKind {
    /// The lowercase name used in composite wire tags.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Tron => "tron",
            Self::Pong => "pong",
        }
    }

    /// Allowed lobby capacities for this game.
    pub fn capacity_range(&self) -> RangeInclusive<usize> {
        match self {
            Self::Tron => 2..=8,
            Self::Pong => 2..=2,
        }
    }

    /// Minimum roster size before a game can start.
    pub fn min_players(&self) -> usize {
        *self.capacity_range().start()
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tron => write!(f, "Tron"),
            Self::Pong => write!(f, "Pong"),
        }
    }
}

// ---------------------------------------------------------------------------
// Players and lobbies
// ---------------------------------------------------------------------------

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub client_id: ClientId,
    pub username: String,
    /// Whether this player owns the lobby.
    pub host: bool,
}

/// The matchmaking unit a host owns and broadcasts.
///
/// This is the *summary* that travels in `LobbyInfo` messages. The host-side
/// state machine that enforces mutation rules lives in `coinop-lobby`;
/// everyone else only ever holds read-only snapshots of this struct,
/// replaced wholesale on each `LobbyInfo` receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    pub id: LobbyId,
    pub name: String,
    pub private: bool,
    /// Join code, exactly 4 characters. Meaningful only when `private`.
    pub code: String,
    pub game: GameKind,
    pub capacity: usize,
    pub host_id: ClientId,
    /// Ordered player list. The host appears exactly once, flagged `host`.
    pub roster: Vec<Player>,
}

impl Lobby {
    /// Whether the roster has reached capacity.
    pub fn is_full(&self) -> bool {
        self.roster.len() >= self.capacity
    }

    /// Looks up a roster entry by client id.
    pub fn player(&self, id: &ClientId) -> Option<&Player> {
        self.roster.iter().find(|p| &p.client_id == id)
    }

    /// Case-sensitive exact comparison against the lobby's join code.
    ///
    /// Public lobbies match any code (the code is meaningless for them).
    pub fn code_matches(&self, code: &str) -> bool {
        !self.private || self.code == code
    }
}

// =========================================================================
// Tests
// =========================================================================
