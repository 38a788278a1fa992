//! Error types for the lobby layer.

use coinop_protocol::GameKind;

/// Errors that can occur while creating or driving a hosted lobby.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The requested capacity is outside what the game allows.
    #[error("capacity {requested} is invalid for {game} (allowed {min}-{max})")]
    InvalidCapacity {
        game: GameKind,
        requested: usize,
        min: usize,
        max: usize,
    },

    /// A lobby needs a non-empty name.
    #[error("lobby name must not be empty")]
    EmptyName,

    /// The lobby is in a phase that doesn't allow this operation.
    #[error("invalid lobby phase for this operation: {0}")]
    InvalidPhase(String),

    /// Starting requires the game's minimum player count.
    #[error("need at least {needed} players to start, have {have}")]
    NotEnoughPlayers { needed: usize, have: usize },
}

/// Why a join request was turned down.
///
/// Travels back to the requester as the reason string in
/// `JoinReply{success: false}` — never broadcast, never a teardown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinRefusal {
    #[error("lobby is full")]
    Full,

    #[error("lobby is not accepting players")]
    NotJoinable,

    #[error("wrong join code")]
    WrongCode,

    #[error("player is already in the lobby")]
    AlreadyJoined,
}
