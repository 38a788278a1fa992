//! Per-game payload shapes for the state-sync messages.
//!
//! The sync protocol is generic: `ClientUpdate<S>` and `GameUpdate<G, C>`
//! work for any state types, but the wire needs one concrete registration
//! per supported game. [`GamePayload`] is the capability that ties a state
//! shape to its [`GameKind`] so the composite tag can be derived.
//!
//! Only the *state* lives here. Simulation rules (how a Tron bike crashes,
//! how a Pong ball bounces) belong to the host's game code, not the
//! protocol.

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::GameKind;

/// A serializable state shape belonging to one game.
pub trait GamePayload:
    Serialize + DeserializeOwned + Any + fmt::Debug + Clone + Send + Sync + 'static
{
    /// Which game this shape is registered for.
    fn kind() -> GameKind;
}

// ---------------------------------------------------------------------------
// Tron
// ---------------------------------------------------------------------------

/// A travel direction on the Tron grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heading {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

/// One Tron player's slice of state: where they are and where they're going.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TronClientState {
    pub x: i32,
    pub y: i32,
    pub heading: Heading,
    pub alive: bool,
}

impl GamePayload for TronClientState {
    fn kind() -> GameKind {
        GameKind::Tron
    }
}

/// The host's authoritative Tron state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TronGameState {
    pub width: u16,
    pub height: u16,
    /// Monotonic simulation tick, so receivers can drop stale updates.
    pub tick: u64,
}

impl GamePayload for TronGameState {
    fn kind() -> GameKind {
        GameKind::Tron
    }
}

// ---------------------------------------------------------------------------
// Pong
// ---------------------------------------------------------------------------

/// One Pong player's slice of state: their paddle position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PongClientState {
    pub paddle_y: i32,
}

impl GamePayload for PongClientState {
    fn kind() -> GameKind {
        GameKind::Pong
    }
}

/// The host's authoritative Pong state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PongGameState {
    pub ball_x: i32,
    pub ball_y: i32,
    pub score_left: u32,
    pub score_right: u32,
    pub tick: u64,
}

impl GamePayload for PongGameState {
    fn kind() -> GameKind {
        GameKind::Pong
    }
}
