//! The in-game view: tick-paced state sync between host and guests.
//!
//! Guests send `ClientUpdate⟨S⟩` every pacer tick and acknowledge every
//! `GameUpdate`; the host folds the received states into its authoritative
//! `GameUpdate⟨G,C⟩`, broadcasts it to the roster, and drops peers that
//! miss too many consecutive acks — the same threshold policy the
//! connection layer applies to heartbeats, scoped to this session.
//!
//! Simulation rules live with the games, not here. The view only needs
//! the capabilities in [`GameBoard`] and [`PlayerControl`]: advance a
//! tick, take a keypress, draw.

use std::collections::HashMap;
use std::time::Instant;

use coinop_lobby::{SyncTracker, TickPacer, DEFAULT_SYNC_RATE_HZ};
use coinop_protocol::{
    packet_as, AckGameUpdate, ClientId, ClientUpdate, Disconnect, EndGame, GamePayload,
    GameUpdate, Heading, Leave, Lobby, LobbyEnd, Packet, PongClientState, PongGameState,
    TronClientState, TronGameState,
};
use crossterm::event::{KeyCode, KeyEvent};

use crate::context::ViewContext;
use crate::screen::{Screen, TextStyle};
use crate::view::{View, ViewEvent};
use crate::views::GamesListView;

/// What a per-player state shape must offer the view layer: keyboard
/// editing and a way to draw itself.
pub trait PlayerControl: GamePayload + Default {
    fn apply_key(&mut self, key: &KeyEvent);
    fn draw(&self, screen: &mut dyn Screen, label: &str, style: TextStyle);
}

/// What an authoritative game state must offer: a tick step and a board
/// to draw under the players.
pub trait GameBoard: GamePayload + Default {
    fn advance(&mut self);
    fn draw(&self, screen: &mut dyn Screen);
}

enum SessionRole {
    Host {
        guests: Vec<ClientId>,
        tracker: SyncTracker,
    },
    Guest {
        host_id: ClientId,
    },
}

pub struct GameView<G: GameBoard, C: PlayerControl> {
    role: SessionRole,
    self_id: ClientId,
    local: C,
    board: G,
    /// Latest known state per peer. On the host this is what guests sent;
    /// on guests it is the authoritative map from the last `GameUpdate`.
    peers: HashMap<ClientId, C>,
    pacer: TickPacer,
    status: Option<String>,
}

impl<G: GameBoard, C: PlayerControl> GameView<G, C> {
    pub fn new(lobby: Lobby, self_id: ClientId) -> Self {
        let role = if lobby.host_id == self_id {
            let guests: Vec<ClientId> = lobby
                .roster
                .iter()
                .filter(|p| !p.host)
                .map(|p| p.client_id.clone())
                .collect();
            let mut tracker = SyncTracker::default();
            for guest in &guests {
                tracker.track(guest.clone());
            }
            SessionRole::Host { guests, tracker }
        } else {
            SessionRole::Guest {
                host_id: lobby.host_id,
            }
        };
        Self {
            role,
            self_id,
            local: C::default(),
            board: G::default(),
            peers: HashMap::new(),
            pacer: TickPacer::with_rate(DEFAULT_SYNC_RATE_HZ),
            status: None,
        }
    }

    fn sync(&mut self, ctx: &mut ViewContext) {
        match &mut self.role {
            SessionRole::Guest { host_id } => {
                ctx.send_to(
                    host_id.clone(),
                    ClientUpdate {
                        state: self.local.clone(),
                    },
                );
            }
            SessionRole::Host { guests, tracker } => {
                self.board.advance();
                let mut players = self.peers.clone();
                players.insert(self.self_id.clone(), self.local.clone());
                for guest in guests.iter() {
                    ctx.send_to(
                        guest.clone(),
                        GameUpdate {
                            game: self.board.clone(),
                            players: players.clone(),
                        },
                    );
                }
                for lost in tracker.record_broadcast() {
                    guests.retain(|g| g != &lost);
                    self.peers.remove(&lost);
                    self.status = Some(format!("{lost} fell out of sync"));
                }
            }
        }
    }

    fn leave_or_end(&mut self, ctx: &mut ViewContext) {
        match &self.role {
            SessionRole::Host { guests, .. } => {
                for guest in guests {
                    ctx.send_to(guest.clone(), EndGame {});
                }
                // Browsers drop the cached lobby row too.
                ctx.broadcast(LobbyEnd {});
                ctx.set_view(GamesListView::new());
            }
            SessionRole::Guest { host_id } => {
                ctx.send_to(
                    host_id.clone(),
                    Leave {
                        client_id: self.self_id.clone(),
                    },
                );
                ctx.set_view(GamesListView::new());
            }
        }
    }
}

impl<G: GameBoard, C: PlayerControl> View for GameView<G, C> {
    fn process_event(&mut self, ctx: &mut ViewContext, event: &ViewEvent) {
        match event {
            ViewEvent::Tick => {
                if self.pacer.due(Instant::now()) {
                    self.sync(ctx);
                }
            }
            ViewEvent::Key(key) => {
                let ends_session = match (&self.role, key.code) {
                    (SessionRole::Host { .. }, KeyCode::Esc | KeyCode::Char('e')) => true,
                    (SessionRole::Guest { .. }, KeyCode::Esc) => true,
                    _ => false,
                };
                if ends_session {
                    self.leave_or_end(ctx);
                } else {
                    self.local.apply_key(key);
                }
            }
        }
    }

    fn process_message(
        &mut self,
        ctx: &mut ViewContext,
        from: &ClientId,
        packet: &dyn Packet,
    ) -> Option<Box<dyn Packet>> {
        match &mut self.role {
            SessionRole::Host { guests, tracker } => {
                let departed = if let Some(update) = packet_as::<ClientUpdate<C>>(packet) {
                    self.peers.insert(from.clone(), update.state.clone());
                    None
                } else if packet_as::<AckGameUpdate>(packet).is_some() {
                    tracker.record_ack(from);
                    None
                } else if let Some(leave) = packet_as::<Leave>(packet) {
                    Some(leave.client_id.clone())
                } else {
                    packet_as::<Disconnect>(packet).map(|gone| gone.client_id.clone())
                };
                if let Some(id) = departed {
                    guests.retain(|g| g != &id);
                    tracker.forget(&id);
                    self.peers.remove(&id);
                }
                None
            }
            SessionRole::Guest { host_id } => {
                if let Some(update) = packet_as::<GameUpdate<G, C>>(packet) {
                    self.board = update.game.clone();
                    self.peers = update.players.clone();
                    return Some(Box::new(AckGameUpdate {}));
                }
                if packet_as::<EndGame>(packet).is_some() && from == host_id {
                    ctx.set_view(GamesListView::new());
                    return None;
                }
                if let Some(gone) = packet_as::<Disconnect>(packet) {
                    if &gone.client_id == host_id {
                        ctx.set_view(GamesListView::new());
                    }
                }
                None
            }
        }
    }

    fn render(&self, screen: &mut dyn Screen) {
        let (_, height) = screen.size();
        self.board.draw(screen);
        for (id, state) in &self.peers {
            if id != &self.self_id {
                let label = id.as_str().get(..4).unwrap_or(id.as_str());
                state.draw(screen, label, TextStyle::Plain);
            }
        }
        self.local.draw(screen, "you", TextStyle::Accent);

        let hint = match self.role {
            SessionRole::Host { .. } => "[e] end game",
            SessionRole::Guest { .. } => "[esc] leave",
        };
        screen.draw_text(2, height.saturating_sub(1), hint, TextStyle::Accent);
        if let Some(status) = &self.status {
            screen.draw_text(2, height.saturating_sub(2), status, TextStyle::Error);
        }
    }
}

// ---------------------------------------------------------------------------
// Capability impls for the supported games
// ---------------------------------------------------------------------------

impl PlayerControl for TronClientState {
    fn apply_key(&mut self, key: &KeyEvent) {
        let heading = match key.code {
            KeyCode::Up => Heading::Up,
            KeyCode::Down => Heading::Down,
            KeyCode::Left => Heading::Left,
            KeyCode::Right => Heading::Right,
            _ => return,
        };
        self.heading = heading;
        match heading {
            Heading::Up => self.y -= 1,
            Heading::Down => self.y += 1,
            Heading::Left => self.x -= 1,
            Heading::Right => self.x += 1,
        }
    }

    fn draw(&self, screen: &mut dyn Screen, label: &str, style: TextStyle) {
        let glyph = match self.heading {
            Heading::Up => "▲",
            Heading::Down => "▼",
            Heading::Left => "◀",
            Heading::Right => "▶",
        };
        let x = self.x.max(0) as u16;
        let y = self.y.max(0) as u16;
        screen.draw_text(x, y, glyph, style);
        screen.draw_text(x + 1, y, label, style);
    }
}

impl GameBoard for TronGameState {
    fn advance(&mut self) {
        self.tick += 1;
    }

    fn draw(&self, screen: &mut dyn Screen) {
        let (width, height) = screen.size();
        let w = if self.width > 0 { self.width.min(width) } else { width };
        let h = if self.height > 0 {
            self.height.min(height)
        } else {
            height.saturating_sub(2)
        };
        screen.draw_box(0, 0, w, h);
    }
}

impl PlayerControl for PongClientState {
    fn apply_key(&mut self, key: &KeyEvent) {
        match key.code {
            KeyCode::Up => self.paddle_y = (self.paddle_y - 1).max(0),
            KeyCode::Down => self.paddle_y += 1,
            _ => {}
        }
    }

    fn draw(&self, screen: &mut dyn Screen, _label: &str, style: TextStyle) {
        let y = self.paddle_y.max(0) as u16;
        screen.draw_line(1, y, 1, y + 3);
        screen.draw_text(1, y, "┃", style);
    }
}

impl GameBoard for PongGameState {
    fn advance(&mut self) {
        self.tick += 1;
    }

    fn draw(&self, screen: &mut dyn Screen) {
        let (width, height) = screen.size();
        screen.draw_box(0, 0, width, height.saturating_sub(2));
        let score = format!("{} : {}", self.score_left, self.score_right);
        screen.draw_text(width / 2 - 2, 1, &score, TextStyle::Title);
        let x = self.ball_x.max(0) as u16;
        let y = self.ball_y.max(0) as u16;
        screen.draw_text(x, y, "●", TextStyle::Accent);
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use coinop_lobby::DEFAULT_MAX_MISSED_ACKS;
    use coinop_protocol::{GameKind, LobbyId, Player};
    use crossterm::event::KeyModifiers;

    use crate::context::ViewCommand;

    type TronView = GameView<TronGameState, TronClientState>;

    fn ctx_for(id: &str) -> ViewContext {
        ViewContext::new(ClientId::new(id), "tester")
    }

    fn player(id: &str, host: bool) -> Player {
        Player {
            client_id: ClientId::new(id),
            username: format!("user-{id}"),
            host,
        }
    }

    fn tron_lobby() -> Lobby {
        Lobby {
            id: LobbyId::new("l1"),
            name: "bob's game".into(),
            private: false,
            code: String::new(),
            game: GameKind::Tron,
            capacity: 4,
            host_id: ClientId::new("host"),
            roster: vec![player("host", true), player("b", false)],
        }
    }

    fn key(code: KeyCode) -> ViewEvent {
        ViewEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_host_folds_client_states_into_broadcast() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("host"));
        let mut ctx = ctx_for("host");

        let sent = TronClientState {
            x: 7,
            y: 3,
            heading: Heading::Left,
            alive: true,
        };
        view.process_message(
            &mut ctx,
            &ClientId::new("b"),
            &ClientUpdate {
                state: sent.clone(),
            },
        );

        view.sync(&mut ctx);

        let commands = ctx.take_commands();
        assert_eq!(commands.len(), 1, "one update per guest");
        match &commands[0] {
            ViewCommand::SendTo(to, packet) => {
                assert_eq!(to, &ClientId::new("b"));
                let update = packet_as::<GameUpdate<TronGameState, TronClientState>>(
                    packet.as_ref(),
                )
                .expect("a game update");
                assert_eq!(update.players.get(&ClientId::new("b")), Some(&sent));
                assert!(update.players.contains_key(&ClientId::new("host")));
                assert_eq!(update.game.tick, 1);
            }
            _ => panic!("expected a SendTo"),
        }
    }

    #[test]
    fn test_guest_acks_every_game_update() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("b"));
        let mut ctx = ctx_for("b");

        let reply = view.process_message(
            &mut ctx,
            &ClientId::new("host"),
            &GameUpdate::<TronGameState, TronClientState> {
                game: TronGameState {
                    width: 40,
                    height: 20,
                    tick: 9,
                },
                players: HashMap::new(),
            },
        );

        let reply = reply.expect("an ack");
        assert!(packet_as::<AckGameUpdate>(reply.as_ref()).is_some());
        assert_eq!(view.board.tick, 9, "authoritative state replaces local");
    }

    #[test]
    fn test_guest_sends_client_update_on_sync() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("b"));
        let mut ctx = ctx_for("b");
        view.process_event(&mut ctx, &key(KeyCode::Right));

        view.sync(&mut ctx);

        let commands = ctx.take_commands();
        match &commands[0] {
            ViewCommand::SendTo(to, packet) => {
                assert_eq!(to, &ClientId::new("host"));
                let update =
                    packet_as::<ClientUpdate<TronClientState>>(packet.as_ref()).expect("an update");
                assert_eq!(update.state.heading, Heading::Right);
                assert_eq!(update.state.x, 1);
            }
            _ => panic!("expected a SendTo"),
        }
    }

    #[test]
    fn test_host_drops_guest_after_consecutive_missed_acks() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("host"));
        let mut ctx = ctx_for("host");

        for _ in 0..=DEFAULT_MAX_MISSED_ACKS {
            view.sync(&mut ctx);
            ctx.take_commands();
        }

        match &view.role {
            SessionRole::Host { guests, .. } => assert!(guests.is_empty(), "guest dropped"),
            _ => unreachable!(),
        }
        assert!(view.status.is_some(), "the drop is surfaced on screen");

        // No further updates go to the lost peer.
        view.sync(&mut ctx);
        assert!(ctx.take_commands().is_empty());
    }

    #[test]
    fn test_ack_keeps_guest_in_session() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("host"));
        let mut ctx = ctx_for("host");

        for _ in 0..=DEFAULT_MAX_MISSED_ACKS {
            view.sync(&mut ctx);
            ctx.take_commands();
            view.process_message(&mut ctx, &ClientId::new("b"), &AckGameUpdate {});
        }

        match &view.role {
            SessionRole::Host { guests, .. } => assert_eq!(guests.len(), 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_host_end_game_notifies_roster_and_browses() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("host"));
        let mut ctx = ctx_for("host");

        view.process_event(&mut ctx, &key(KeyCode::Char('e')));

        let commands = ctx.take_commands();
        let mut ended = 0;
        let mut lobby_ends = 0;
        let mut switched = false;
        for command in &commands {
            match command {
                ViewCommand::SendTo(_, packet) => {
                    assert!(packet_as::<EndGame>(packet.as_ref()).is_some());
                    ended += 1;
                }
                ViewCommand::Broadcast(packet) => {
                    assert!(packet_as::<LobbyEnd>(packet.as_ref()).is_some());
                    lobby_ends += 1;
                }
                ViewCommand::SetView(_) => switched = true,
                _ => panic!("unexpected command"),
            }
        }
        assert_eq!((ended, lobby_ends), (1, 1));
        assert!(switched);
    }

    #[test]
    fn test_guest_end_game_returns_to_browse() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("b"));
        let mut ctx = ctx_for("b");

        view.process_message(&mut ctx, &ClientId::new("host"), &EndGame {});

        let commands = ctx.take_commands();
        assert!(matches!(commands[0], ViewCommand::SetView(_)));
    }

    #[test]
    fn test_guest_ignores_end_game_from_non_host() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("b"));
        let mut ctx = ctx_for("b");

        view.process_message(&mut ctx, &ClientId::new("stranger"), &EndGame {});

        assert!(ctx.take_commands().is_empty());
    }

    #[test]
    fn test_host_disconnect_ends_session_for_guest() {
        let mut view = TronView::new(tron_lobby(), ClientId::new("b"));
        let mut ctx = ctx_for("b");

        view.process_message(
            &mut ctx,
            &ClientId::new("relay"),
            &Disconnect {
                client_id: ClientId::new("host"),
            },
        );

        let commands = ctx.take_commands();
        assert!(matches!(commands[0], ViewCommand::SetView(_)));
    }

    #[test]
    fn test_pong_paddle_clamps_at_top() {
        let mut paddle = PongClientState::default();
        paddle.apply_key(&KeyEvent::new(KeyCode::Up, KeyModifiers::NONE));
        assert_eq!(paddle.paddle_y, 0);
        paddle.apply_key(&KeyEvent::new(KeyCode::Down, KeyModifiers::NONE));
        assert_eq!(paddle.paddle_y, 1);
    }
}
