//! Terminal state machine for Coinop.
//!
//! Exactly one [`View`] is active at a time. The [`ViewManager`] owns it
//! and dispatches, in arrival order, whichever of {key press, inbound
//! message, render tick} becomes ready; a view switch runs `unload` on the
//! outgoing view and `init` on the incoming one before any further event
//! is delivered.
//!
//! Rendering and input stay external: views draw through the [`Screen`]
//! trait and receive crossterm key events; the binary supplies the real
//! terminal. The manager plugs into the network layer as its delegate via
//! [`NetBridge`], which makes the whole state machine testable with no
//! server attached.

mod context;
mod manager;
mod screen;
mod view;
pub mod views;

pub use context::{ViewCommand, ViewContext};
pub use manager::{HubHandle, LoopInput, ManagerHandle, NetBridge, ViewManager, RENDER_TICK_HZ};
pub use screen::{CursorStyle, NullScreen, Screen, TextStyle};
pub use view::{View, ViewEvent};
pub use views::{
    GameBoard, GameView, GamesListView, LobbyCreateView, LobbyView, PlayerControl, SplashView,
};
