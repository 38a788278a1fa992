//! The pre-game lobby view.
//!
//! Hosts own the authoritative [`HostedLobby`] and answer Join/Leave
//! traffic; guests hold a read-only snapshot, replaced wholesale on each
//! `LobbyInfo`. All roster mutation happens on the host's event loop —
//! the single-writer rule that makes last-writer-wins broadcasts safe.

use coinop_lobby::HostedLobby;
use coinop_protocol::{
    packet_as, ClientId, Disconnect, GameKind, Hello, Join, JoinReply, Leave, Lobby, LobbyEnd,
    LobbyInfo, Packet, PongClientState, PongGameState, StartGame, TronClientState, TronGameState,
};
use crossterm::event::KeyCode;

use crate::context::ViewContext;
use crate::screen::{Screen, TextStyle};
use crate::view::{View, ViewEvent};
use crate::views::{GameView, GamesListView};

enum Role {
    Host(HostedLobby),
    Guest(Lobby),
}

pub struct LobbyView {
    role: Role,
    error: Option<String>,
}

impl LobbyView {
    pub fn host(hosted: HostedLobby) -> Self {
        Self {
            role: Role::Host(hosted),
            error: None,
        }
    }

    pub fn guest(lobby: Lobby) -> Self {
        Self {
            role: Role::Guest(lobby),
            error: None,
        }
    }

    fn lobby(&self) -> &Lobby {
        match &self.role {
            Role::Host(hosted) => hosted.lobby(),
            Role::Guest(lobby) => lobby,
        }
    }

    fn enter_game(ctx: &mut ViewContext, lobby: &Lobby) {
        match lobby.game {
            GameKind::Tron => ctx.set_view(GameView::<TronGameState, TronClientState>::new(
                lobby.clone(),
                ctx.self_id().clone(),
            )),
            GameKind::Pong => ctx.set_view(GameView::<PongGameState, PongClientState>::new(
                lobby.clone(),
                ctx.self_id().clone(),
            )),
        }
    }

    fn host_message(
        hosted: &mut HostedLobby,
        ctx: &mut ViewContext,
        packet: &dyn Packet,
    ) -> Option<Box<dyn Packet>> {
        if packet_as::<Hello>(packet).is_some() {
            // Browsing peers only hear about lobbies still taking players.
            if hosted.phase().is_joinable() {
                return Some(Box::new(LobbyInfo {
                    lobby: hosted.lobby().clone(),
                }));
            }
            return None;
        }
        if let Some(join) = packet_as::<Join>(packet) {
            return Some(match hosted.try_join(&join.code, join.player.clone()) {
                Ok(lobby) => {
                    let accepted = JoinReply::accepted(lobby.clone());
                    ctx.broadcast(LobbyInfo {
                        lobby: lobby.clone(),
                    });
                    Box::new(accepted)
                }
                Err(refusal) => Box::new(JoinReply::refused(refusal.to_string())),
            });
        }
        if let Some(leave) = packet_as::<Leave>(packet) {
            if hosted.remove_player(&leave.client_id) {
                ctx.broadcast(LobbyInfo {
                    lobby: hosted.lobby().clone(),
                });
            }
            return None;
        }
        if let Some(gone) = packet_as::<Disconnect>(packet) {
            if hosted.remove_player(&gone.client_id) {
                ctx.broadcast(LobbyInfo {
                    lobby: hosted.lobby().clone(),
                });
            }
            return None;
        }
        None
    }

    fn guest_message(
        lobby: &mut Lobby,
        ctx: &mut ViewContext,
        from: &ClientId,
        packet: &dyn Packet,
    ) {
        if let Some(info) = packet_as::<LobbyInfo>(packet) {
            // Wholesale replacement, never a merge.
            if info.lobby.id == lobby.id {
                *lobby = info.lobby.clone();
            }
            return;
        }
        if packet_as::<LobbyEnd>(packet).is_some() && from == &lobby.host_id {
            ctx.set_view(GamesListView::new());
            return;
        }
        if packet_as::<StartGame>(packet).is_some() && from == &lobby.host_id {
            Self::enter_game(ctx, lobby);
            return;
        }
        if let Some(gone) = packet_as::<Disconnect>(packet) {
            if gone.client_id == lobby.host_id {
                ctx.set_view(GamesListView::new());
            }
        }
    }
}

impl View for LobbyView {
    fn init(&mut self, ctx: &mut ViewContext) {
        // Publishing is just the first broadcast; browsers cache it.
        if let Role::Host(hosted) = &self.role {
            ctx.broadcast(LobbyInfo {
                lobby: hosted.lobby().clone(),
            });
        }
    }

    fn process_event(&mut self, ctx: &mut ViewContext, event: &ViewEvent) {
        let ViewEvent::Key(key) = event else {
            return;
        };
        match &mut self.role {
            Role::Host(hosted) => match key.code {
                KeyCode::Char('s') => match hosted.start() {
                    Ok(()) => {
                        for guest in hosted.guests() {
                            ctx.send_to(guest.client_id.clone(), StartGame {});
                        }
                        let snapshot = hosted.lobby().clone();
                        Self::enter_game(ctx, &snapshot);
                    }
                    Err(e) => self.error = Some(e.to_string()),
                },
                KeyCode::Esc => {
                    hosted.end();
                    // One broadcast covers both audiences: guests return
                    // to browsing, browsers drop the cached row.
                    ctx.broadcast(LobbyEnd {});
                    ctx.set_view(GamesListView::new());
                }
                _ => {}
            },
            Role::Guest(lobby) => {
                if key.code == KeyCode::Esc {
                    ctx.send_to(
                        lobby.host_id.clone(),
                        Leave {
                            client_id: ctx.self_id().clone(),
                        },
                    );
                    ctx.set_view(GamesListView::new());
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
            Role::Host(hosted) => Self::host_message(hosted, ctx, packet),
            Role::Guest(lobby) => {
                Self::guest_message(lobby, ctx, from, packet);
                None
            }
        }
    }

    fn render(&self, screen: &mut dyn Screen) {
        let (_, height) = screen.size();
        let lobby = self.lobby();
        let hosting = matches!(self.role, Role::Host(_));

        screen.draw_text(2, 1, &format!("LOBBY - {}", lobby.name), TextStyle::Title);
        let hint = match &self.role {
            Role::Host(hosted) if hosted.can_start() => "[s] start  [esc] end lobby",
            Role::Host(_) => "waiting for players  [esc] end lobby",
            Role::Guest(_) => "[esc] leave",
        };
        screen.draw_text(2, 2, hint, TextStyle::Accent);

        let mut y = 4;
        if hosting && lobby.private {
            screen.draw_text(2, y, &format!("join code: {}", lobby.code), TextStyle::Accent);
            y += 2;
        }
        screen.draw_text(
            2,
            y,
            &format!(
                "{} — {}/{} players",
                lobby.game,
                lobby.roster.len(),
                lobby.capacity
            ),
            TextStyle::Plain,
        );
        for (i, player) in lobby.roster.iter().enumerate() {
            let marker = if player.host { "★" } else { " " };
            screen.draw_text(
                4,
                y + 2 + i as u16,
                &format!("{marker} {}", player.username),
                TextStyle::Plain,
            );
        }

        if let Some(error) = &self.error {
            screen.draw_text(2, height.saturating_sub(2), error, TextStyle::Error);
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
