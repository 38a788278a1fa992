//! Lobby lifecycle for Coinop.
//!
//! Three pieces, matching the three places lobby data lives:
//!
//! - [`HostedLobby`] — the authoritative, single-writer state machine the
//!   host drives (join validation, phase transitions).
//! - [`LobbyDirectory`] — the browse-side cache of `LobbyInfo` snapshots,
//!   replaced wholesale per receipt (last-writer-wins).
//! - [`SyncTracker`] / [`TickPacer`] — in-game update pacing and the
//!   missed-ack policy, scoped to a game session.

mod directory;
mod error;
mod lobby;
mod sync;

pub use directory::LobbyDirectory;
pub use error::{JoinRefusal, LobbyError};
pub use lobby::{HostedLobby, LobbyPhase};
pub use sync::{SyncTracker, TickPacer, DEFAULT_MAX_MISSED_ACKS, DEFAULT_SYNC_RATE_HZ};
