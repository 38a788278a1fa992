//! Host-side lobby state machine.
//!
//! A lobby has exactly one writer: the host's processing thread. Everyone
//! else sees read-only [`Lobby`] snapshots carried by `LobbyInfo`
//! broadcasts. [`HostedLobby`] is the writer's handle — all mutation and
//! all join validation goes through it.

use coinop_protocol::{ClientId, GameKind, Lobby, LobbyId, Player};
use rand::Rng;

use crate::{JoinRefusal, LobbyError};

// ---------------------------------------------------------------------------
// Phase machine
// ---------------------------------------------------------------------------

/// The lifecycle phase of a lobby, as seen by its host.
///
/// ```text
/// Open ⇄ Full → InGame → Ended
///   └────────────────────↗ (host leaves / LobbyEnd)
/// ```
///
/// A lobby is born Open, flips between Open and Full as the roster changes,
/// enters InGame on StartGame, and Ends on LobbyEnd or host disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyPhase {
    Open,
    Full,
    InGame,
    Ended,
}

impl LobbyPhase {
    /// Whether join requests can currently be accepted.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for LobbyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Full => write!(f, "Full"),
            Self::InGame => write!(f, "InGame"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// HostedLobby
// ---------------------------------------------------------------------------

/// The authoritative, single-writer lobby owned by its host.
#[derive(Debug)]
pub struct HostedLobby {
    lobby: Lobby,
    phase: LobbyPhase,
}

impl HostedLobby {
    /// Creates a lobby with the host as its first roster entry.
    ///
    /// Private lobbies get a generated 4-character join code.
    ///
    /// # Errors
    /// - [`LobbyError::EmptyName`] for a blank name
    /// - [`LobbyError::InvalidCapacity`] when outside the game's range
    pub fn create(
        name: impl Into<String>,
        private: bool,
        game: GameKind,
        capacity: usize,
        host: Player,
    ) -> Result<Self, LobbyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LobbyError::EmptyName);
        }

        let range = game.capacity_range();
        if !range.contains(&capacity) {
            return Err(LobbyError::InvalidCapacity {
                game,
                requested: capacity,
                min: *range.start(),
                max: *range.end(),
            });
        }

        let code = if private { generate_code() } else { String::new() };
        let host_id = host.client_id.clone();
        let lobby = Lobby {
            id: LobbyId::generate(),
            name,
            private,
            code,
            game,
            capacity,
            host_id,
            roster: vec![host],
        };

        tracing::info!(lobby_id = %lobby.id, game = %lobby.game, capacity, "lobby created");

        Ok(Self {
            lobby,
            phase: LobbyPhase::Open,
        })
    }

    /// The current snapshot — what `LobbyInfo` broadcasts carry.
    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn phase(&self) -> LobbyPhase {
        self.phase
    }

    /// Validates and applies a join request.
    ///
    /// Checks, in order: the lobby is accepting players, the code matches
    /// exactly (case-sensitive) when private, the requester isn't already
    /// in the roster, and capacity remains. On success the player is
    /// appended and the phase refreshed.
    ///
    /// # Errors
    /// The [`JoinRefusal`] becomes the reason in `JoinReply{success:false}`.
    pub fn try_join(&mut self, code: &str, player: Player) -> Result<&Lobby, JoinRefusal> {
        if !self.phase.is_joinable() {
            // A full lobby reads better as "full" than "not open".
            return Err(if self.lobby.is_full() {
                JoinRefusal::Full
            } else {
                JoinRefusal::NotJoinable
            });
        }
        if !self.lobby.code_matches(code) {
            return Err(JoinRefusal::WrongCode);
        }
        if self.lobby.player(&player.client_id).is_some() {
            return Err(JoinRefusal::AlreadyJoined);
        }
        if self.lobby.is_full() {
            return Err(JoinRefusal::Full);
        }

        tracing::info!(
            lobby_id = %self.lobby.id,
            player = %player.client_id,
            roster = self.lobby.roster.len() + 1,
            "player joined"
        );

        self.lobby.roster.push(player);
        self.refresh_phase();
        Ok(&self.lobby)
    }

    /// Removes a non-host roster member. Returns `true` if someone left.
    ///
    /// The host can't "leave" its own lobby — it ends it (see [`end`](Self::end)).
    pub fn remove_player(&mut self, id: &ClientId) -> bool {
        if id == &self.lobby.host_id {
            return false;
        }
        let before = self.lobby.roster.len();
        self.lobby.roster.retain(|p| &p.client_id != id);
        let removed = self.lobby.roster.len() < before;
        if removed {
            tracing::info!(lobby_id = %self.lobby.id, player = %id, "player left");
            self.refresh_phase();
        }
        removed
    }

    /// Whether the game can start right now.
    pub fn can_start(&self) -> bool {
        !matches!(self.phase, LobbyPhase::InGame | LobbyPhase::Ended)
            && self.lobby.roster.len() >= self.lobby.game.min_players()
    }

    /// Transitions to InGame.
    ///
    /// # Errors
    /// - [`LobbyError::InvalidPhase`] if already in-game or ended
    /// - [`LobbyError::NotEnoughPlayers`] below the game's minimum
    pub fn start(&mut self) -> Result<(), LobbyError> {
        if matches!(self.phase, LobbyPhase::InGame | LobbyPhase::Ended) {
            return Err(LobbyError::InvalidPhase(self.phase.to_string()));
        }
        let needed = self.lobby.game.min_players();
        let have = self.lobby.roster.len();
        if have < needed {
            return Err(LobbyError::NotEnoughPlayers { needed, have });
        }
        self.phase = LobbyPhase::InGame;
        tracing::info!(lobby_id = %self.lobby.id, players = have, "game started");
        Ok(())
    }

    /// Ends the lobby for good (LobbyEnd, EndGame, or host disconnect).
    pub fn end(&mut self) {
        self.phase = LobbyPhase::Ended;
        tracing::info!(lobby_id = %self.lobby.id, "lobby ended");
    }

    /// Roster members other than the host — the broadcast set for
    /// StartGame/LobbyEnd/GameUpdate traffic.
    pub fn guests(&self) -> impl Iterator<Item = &Player> {
        self.lobby.roster.iter().filter(|p| !p.host)
    }

    fn refresh_phase(&mut self) {
        // Only flips between the two waiting phases; InGame/Ended are
        // explicit transitions.
        if matches!(self.phase, LobbyPhase::Open | LobbyPhase::Full) {
            self.phase = if self.lobby.is_full() {
                LobbyPhase::Full
            } else {
                LobbyPhase::Open
            };
        }
    }
}

/// 4 characters from A-Z0-9, the join-code alphabet.
fn generate_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    (0..4)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, host: bool) -> Player {
        Player {
            client_id: ClientId::new(id),
            username: format!("user-{id}"),
            host,
        }
    }

    fn tron_lobby(capacity: usize) -> HostedLobby {
        HostedLobby::create("bob's game", false, GameKind::Tron, capacity, player("host", true))
            .expect("valid lobby")
    }

    fn private_lobby() -> HostedLobby {
        HostedLobby::create("secret", true, GameKind::Tron, 4, player("host", true))
            .expect("valid lobby")
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_starts_open_with_host_in_roster() {
        let hosted = tron_lobby(4);

        assert_eq!(hosted.phase(), LobbyPhase::Open);
        assert_eq!(hosted.lobby().roster.len(), 1);
        assert!(hosted.lobby().roster[0].host);
        assert_eq!(hosted.lobby().host_id, ClientId::new("host"));
    }

    #[test]
    fn test_create_public_lobby_has_empty_code() {
        assert_eq!(tron_lobby(4).lobby().code, "");
    }

    #[test]
    fn test_create_private_lobby_generates_4_char_code() {
        let hosted = private_lobby();
        let code = &hosted.lobby().code;
        assert_eq!(code.len(), 4);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let result = HostedLobby::create("  ", false, GameKind::Tron, 4, player("h", true));
        assert!(matches!(result, Err(LobbyError::EmptyName)));
    }

    #[test]
    fn test_create_rejects_capacity_outside_game_range() {
        let too_big = HostedLobby::create("x", false, GameKind::Tron, 9, player("h", true));
        assert!(matches!(too_big, Err(LobbyError::InvalidCapacity { .. })));

        let pong_of_three = HostedLobby::create("x", false, GameKind::Pong, 3, player("h", true));
        assert!(matches!(pong_of_three, Err(LobbyError::InvalidCapacity { .. })));

        assert!(HostedLobby::create("x", false, GameKind::Pong, 2, player("h", true)).is_ok());
    }

    // =====================================================================
    // try_join()
    // =====================================================================

    #[test]
    fn test_try_join_public_lobby_with_empty_code_succeeds() {
        let mut hosted = tron_lobby(4);

        let lobby = hosted.try_join("", player("b", false)).expect("should join");

        assert_eq!(lobby.roster.len(), 2);
        assert!(lobby.player(&ClientId::new("b")).is_some());
    }

    #[test]
    fn test_try_join_full_lobby_is_refused() {
        let mut hosted = tron_lobby(2);
        hosted.try_join("", player("b", false)).unwrap();
        assert_eq!(hosted.phase(), LobbyPhase::Full);

        let result = hosted.try_join("", player("c", false));

        assert_eq!(result.unwrap_err(), JoinRefusal::Full);
        assert_eq!(hosted.lobby().roster.len(), 2, "roster never exceeds capacity");
    }

    #[test]
    fn test_try_join_private_code_is_case_sensitive() {
        let mut hosted = private_lobby();
        let code = hosted.lobby().code.clone();

        let wrong = hosted.try_join(&code.to_lowercase(), player("b", false));
        assert_eq!(wrong.unwrap_err(), JoinRefusal::WrongCode);

        let right = hosted.try_join(&code, player("b", false));
        assert!(right.is_ok());
    }

    #[test]
    fn test_try_join_duplicate_player_is_refused() {
        let mut hosted = tron_lobby(4);
        hosted.try_join("", player("b", false)).unwrap();

        let again = hosted.try_join("", player("b", false));

        assert_eq!(again.unwrap_err(), JoinRefusal::AlreadyJoined);
        // The player appears exactly once.
        let count = hosted
            .lobby()
            .roster
            .iter()
            .filter(|p| p.client_id == ClientId::new("b"))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_try_join_in_game_lobby_is_refused() {
        let mut hosted = tron_lobby(4);
        hosted.try_join("", player("b", false)).unwrap();
        hosted.start().unwrap();

        let result = hosted.try_join("", player("c", false));

        assert_eq!(result.unwrap_err(), JoinRefusal::NotJoinable);
    }

    // =====================================================================
    // remove_player()
    // =====================================================================

    #[test]
    fn test_remove_player_reopens_full_lobby() {
        let mut hosted = tron_lobby(2);
        hosted.try_join("", player("b", false)).unwrap();
        assert_eq!(hosted.phase(), LobbyPhase::Full);

        assert!(hosted.remove_player(&ClientId::new("b")));

        assert_eq!(hosted.phase(), LobbyPhase::Open);
        assert_eq!(hosted.lobby().roster.len(), 1);
    }

    #[test]
    fn test_remove_player_refuses_host() {
        let mut hosted = tron_lobby(4);

        assert!(!hosted.remove_player(&ClientId::new("host")));
        assert_eq!(hosted.lobby().roster.len(), 1, "host stays in the roster");
    }

    #[test]
    fn test_remove_unknown_player_is_noop() {
        let mut hosted = tron_lobby(4);
        assert!(!hosted.remove_player(&ClientId::new("nobody")));
    }

    // =====================================================================
    // start() / finish_game() / end()
    // =====================================================================

    #[test]
    fn test_start_requires_min_players() {
        let mut hosted = tron_lobby(4);

        let alone = hosted.start();
        assert!(matches!(
            alone,
            Err(LobbyError::NotEnoughPlayers { needed: 2, have: 1 })
        ));

        hosted.try_join("", player("b", false)).unwrap();
        assert!(hosted.can_start());
        hosted.start().unwrap();
        assert_eq!(hosted.phase(), LobbyPhase::InGame);
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let mut hosted = tron_lobby(4);
        hosted.try_join("", player("b", false)).unwrap();
        hosted.start().unwrap();

        assert!(matches!(hosted.start(), Err(LobbyError::InvalidPhase(_))));
    }

    #[test]
    fn test_end_is_terminal() {
        let mut hosted = tron_lobby(4);
        hosted.end();

        assert_eq!(hosted.phase(), LobbyPhase::Ended);
        let result = hosted.try_join("", player("b", false));
        assert_eq!(result.unwrap_err(), JoinRefusal::NotJoinable);
    }

    #[test]
    fn test_guests_excludes_host() {
        let mut hosted = tron_lobby(4);
        hosted.try_join("", player("b", false)).unwrap();
        hosted.try_join("", player("c", false)).unwrap();

        let guests: Vec<_> = hosted.guests().map(|p| p.client_id.clone()).collect();

        assert_eq!(guests, vec![ClientId::new("b"), ClientId::new("c")]);
    }
}
