//! The browse view: discover open lobbies and join one.
//!
//! Keeps the [`LobbyDirectory`] cache, replaced wholesale per `LobbyInfo`
//! receipt (last-writer-wins). Re-issues discovery on a fixed cadence —
//! Hello goes to every known non-distributor peer plus the relay fan-out,
//! so a freshly arrived lobby shows up within a couple of seconds.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use coinop_lobby::{LobbyDirectory, TickPacer};
use coinop_protocol::{
    packet_as, ClientId, Disconnect, Join, JoinReply, Lobby, LobbyEnd, LobbyInfo, Packet,
};
use crossterm::event::{KeyCode, KeyEvent};

use crate::context::ViewContext;
use crate::screen::{Screen, TextStyle};
use crate::view::{View, ViewEvent};
use crate::views::{LobbyCreateView, LobbyView};

/// How often the browse view re-runs discovery.
const REDISCOVER_EVERY: Duration = Duration::from_secs(2);

const JOIN_CODE_LEN: usize = 4;

/// An in-progress join-code entry for a private lobby.
struct CodePrompt {
    host: ClientId,
    input: String,
}

pub struct GamesListView {
    directory: LobbyDirectory,
    selected: usize,
    prompt: Option<CodePrompt>,
    error: Option<String>,
    rediscover: TickPacer,
    /// Heartbeat RTT per host, refreshed each tick for the ping column.
    pings: HashMap<ClientId, Duration>,
}

impl GamesListView {
    pub fn new() -> Self {
        Self {
            directory: LobbyDirectory::new(),
            selected: 0,
            prompt: None,
            error: None,
            rediscover: TickPacer::new(REDISCOVER_EVERY),
            pings: HashMap::new(),
        }
    }

    fn selected_lobby(&self) -> Option<Lobby> {
        self.directory.snapshot().into_iter().nth(self.selected)
    }

    fn request_join(&mut self, ctx: &mut ViewContext) {
        let Some(lobby) = self.selected_lobby() else {
            return;
        };
        if lobby.private {
            self.prompt = Some(CodePrompt {
                host: lobby.host_id,
                input: String::new(),
            });
        } else {
            self.send_join(ctx, lobby.host_id, String::new());
        }
    }

    fn send_join(&mut self, ctx: &mut ViewContext, host: ClientId, code: String) {
        self.error = None;
        ctx.send_to(
            host,
            Join {
                code,
                player: ctx.local_player(),
            },
        );
    }

    fn handle_prompt_key(&mut self, ctx: &mut ViewContext, key: &KeyEvent) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.prompt = None;
            }
            KeyCode::Backspace => {
                prompt.input.pop();
            }
            KeyCode::Enter => {
                if prompt.input.len() == JOIN_CODE_LEN {
                    if let Some(prompt) = self.prompt.take() {
                        self.send_join(ctx, prompt.host, prompt.input);
                    }
                } else {
                    self.error = Some(format!("join code is {JOIN_CODE_LEN} characters"));
                }
            }
            KeyCode::Char(c) if prompt.input.len() < JOIN_CODE_LEN => prompt.input.push(c),
            _ => {}
        }
    }

    fn refresh_pings(&mut self, ctx: &ViewContext) {
        let Some(server) = ctx.server() else {
            return;
        };
        self.pings.clear();
        for lobby in self.directory.snapshot() {
            if let Some(rtt) = server.get_client(&lobby.host_id).and_then(|c| c.rtt()) {
                self.pings.insert(lobby.host_id, rtt);
            }
        }
    }
}

impl Default for GamesListView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for GamesListView {
    fn init(&mut self, ctx: &mut ViewContext) {
        ctx.discover();
    }

    fn process_event(&mut self, ctx: &mut ViewContext, event: &ViewEvent) {
        match event {
            ViewEvent::Tick => {
                if self.rediscover.due(Instant::now()) {
                    ctx.discover();
                }
                self.refresh_pings(ctx);
            }
            ViewEvent::Key(key) => {
                if self.prompt.is_some() {
                    self.handle_prompt_key(ctx, key);
                    return;
                }
                let count = self.directory.len();
                match key.code {
                    KeyCode::Up => self.selected = self.selected.saturating_sub(1),
                    KeyCode::Down if count > 0 => {
                        self.selected = (self.selected + 1).min(count - 1);
                    }
                    KeyCode::Char('c') => ctx.set_view(LobbyCreateView::new()),
                    KeyCode::Char('j') | KeyCode::Enter => self.request_join(ctx),
                    KeyCode::Char('q') | KeyCode::Esc => ctx.quit(),
                    _ => {}
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
        if let Some(info) = packet_as::<LobbyInfo>(packet) {
            self.directory.upsert(info.lobby.clone());
        } else if packet_as::<LobbyEnd>(packet).is_some() {
            // The host folded its lobby; it just disappears from the list.
            self.directory.remove_hosted_by(from);
        } else if let Some(gone) = packet_as::<Disconnect>(packet) {
            self.directory.remove_hosted_by(&gone.client_id);
            self.pings.remove(&gone.client_id);
        } else if let Some(reply) = packet_as::<JoinReply>(packet) {
            if let Some(lobby) = reply.lobby.as_ref().filter(|_| reply.success) {
                ctx.set_view(LobbyView::guest(lobby.clone()));
            } else {
                let reason = reply.reason.clone().unwrap_or_else(|| "join refused".into());
                self.error = Some(reason);
            }
        }
        None
    }

    fn render(&self, screen: &mut dyn Screen) {
        let (width, height) = screen.size();
        screen.draw_text(2, 1, "OPEN GAMES", TextStyle::Title);
        screen.draw_text(
            2,
            2,
            "[↑/↓] select  [j] join  [c] create  [q] quit",
            TextStyle::Accent,
        );
        screen.draw_line(2, 3, width.saturating_sub(3), 3);

        let lobbies = self.directory.snapshot();
        if lobbies.is_empty() {
            screen.draw_text(4, 5, "no open lobbies yet", TextStyle::Plain);
        }
        for (i, lobby) in lobbies.iter().enumerate() {
            let style = if i == self.selected {
                TextStyle::Selected
            } else {
                TextStyle::Plain
            };
            let ping = match self.pings.get(&lobby.host_id) {
                Some(rtt) => format!("{}ms", rtt.as_millis()),
                None => "--".into(),
            };
            let lock = if lobby.private { "*" } else { " " };
            let line = format!(
                "{lock} {:<24} {:<6} {}/{}  {ping}",
                lobby.name,
                lobby.game.to_string(),
                lobby.roster.len(),
                lobby.capacity,
            );
            screen.draw_text(4, 5 + i as u16, &line, style);
        }

        if let Some(prompt) = &self.prompt {
            let y = height.saturating_sub(6);
            screen.draw_box(4, y, 24, 3);
            let entered = format!("join code: {:<4}", prompt.input);
            screen.draw_text(6, y + 1, &entered, TextStyle::Accent);
        }
        if let Some(error) = &self.error {
            screen.draw_text(4, height.saturating_sub(2), error, TextStyle::Error);
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use coinop_protocol::{GameKind, LobbyId, Player};
    use crossterm::event::KeyModifiers;

    use crate::context::ViewCommand;

    fn ctx() -> ViewContext {
        ViewContext::new(ClientId::new("me"), "tester")
    }

    fn key(code: KeyCode) -> ViewEvent {
        ViewEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn lobby(id: &str, host: &str, name: &str, private: bool, code: &str) -> Lobby {
        Lobby {
            id: LobbyId::new(id),
            name: name.into(),
            private,
            code: code.into(),
            game: GameKind::Tron,
            capacity: 4,
            host_id: ClientId::new(host),
            roster: vec![Player {
                client_id: ClientId::new(host),
                username: "host".into(),
                host: true,
            }],
        }
    }

    fn deliver(view: &mut GamesListView, ctx: &mut ViewContext, from: &str, packet: &dyn Packet) {
        let reply = view.process_message(ctx, &ClientId::new(from), packet);
        assert!(reply.is_none(), "browse view never replies directly");
    }

    #[test]
    fn test_lobby_info_cache_is_last_writer_wins() {
        let mut view = GamesListView::new();
        let mut ctx = ctx();

        deliver(&mut view, &mut ctx, "h1", &LobbyInfo {
            lobby: lobby("l1", "h1", "first", false, ""),
        });
        let mut second = lobby("l1", "h1", "renamed", false, "");
        second.roster.push(Player {
            client_id: ClientId::new("p2"),
            username: "joan".into(),
            host: false,
        });
        deliver(&mut view, &mut ctx, "h1", &LobbyInfo {
            lobby: second.clone(),
        });

        assert_eq!(view.directory.snapshot(), vec![second]);
    }

    #[test]
    fn test_lobby_end_removes_that_hosts_lobbies() {
        let mut view = GamesListView::new();
        let mut ctx = ctx();
        deliver(&mut view, &mut ctx, "h1", &LobbyInfo {
            lobby: lobby("l1", "h1", "a", false, ""),
        });
        deliver(&mut view, &mut ctx, "h2", &LobbyInfo {
            lobby: lobby("l2", "h2", "b", false, ""),
        });

        deliver(&mut view, &mut ctx, "h1", &LobbyEnd {});

        let remaining = view.directory.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].host_id, ClientId::new("h2"));
    }

    #[test]
    fn test_host_disconnect_silently_drops_its_lobby() {
        let mut view = GamesListView::new();
        let mut ctx = ctx();
        deliver(&mut view, &mut ctx, "h1", &LobbyInfo {
            lobby: lobby("l1", "h1", "a", false, ""),
        });

        deliver(&mut view, &mut ctx, "relay", &Disconnect {
            client_id: ClientId::new("h1"),
        });

        assert!(view.directory.is_empty());
        assert!(view.error.is_none(), "no error surfaces, the row just goes");
    }

    #[test]
    fn test_public_join_sends_empty_code() {
        let mut view = GamesListView::new();
        let mut ctx = ctx();
        deliver(&mut view, &mut ctx, "h1", &LobbyInfo {
            lobby: lobby("l1", "h1", "a", false, ""),
        });

        view.process_event(&mut ctx, &key(KeyCode::Char('j')));

        let commands = ctx.take_commands();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            ViewCommand::SendTo(to, packet) => {
                assert_eq!(to, &ClientId::new("h1"));
                let join = packet_as::<Join>(packet.as_ref()).expect("a join request");
                assert_eq!(join.code, "");
                assert_eq!(join.player.client_id, ClientId::new("me"));
            }
            _ => panic!("expected a SendTo command"),
        }
    }

    #[test]
    fn test_private_join_prompts_then_sends_full_code() {
        let mut view = GamesListView::new();
        let mut ctx = ctx();
        deliver(&mut view, &mut ctx, "h1", &LobbyInfo {
            lobby: lobby("l1", "h1", "secret", true, "A1B2"),
        });

        view.process_event(&mut ctx, &key(KeyCode::Char('j')));
        assert!(ctx.take_commands().is_empty(), "prompt first, no send yet");

        // A short code is rejected inline.
        for c in "A1".chars() {
            view.process_event(&mut ctx, &key(KeyCode::Char(c)));
        }
        view.process_event(&mut ctx, &key(KeyCode::Enter));
        assert!(view.error.is_some());
        assert!(ctx.take_commands().is_empty());

        for c in "B2".chars() {
            view.process_event(&mut ctx, &key(KeyCode::Char(c)));
        }
        view.process_event(&mut ctx, &key(KeyCode::Enter));

        let commands = ctx.take_commands();
        match &commands[0] {
            ViewCommand::SendTo(_, packet) => {
                let join = packet_as::<Join>(packet.as_ref()).expect("a join request");
                assert_eq!(join.code, "A1B2");
            }
            _ => panic!("expected a SendTo command"),
        }
    }

    #[test]
    fn test_join_reply_failure_sets_inline_error() {
        let mut view = GamesListView::new();
        let mut ctx = ctx();

        deliver(&mut view, &mut ctx, "h1", &JoinReply::refused("lobby is full"));

        assert_eq!(view.error.as_deref(), Some("lobby is full"));
        assert!(ctx.take_commands().is_empty(), "stays on the browse view");
    }

    #[test]
    fn test_join_reply_success_switches_to_lobby_view() {
        let mut view = GamesListView::new();
        let mut ctx = ctx();

        deliver(
            &mut view,
            &mut ctx,
            "h1",
            &JoinReply::accepted(lobby("l1", "h1", "a", false, "")),
        );

        let commands = ctx.take_commands();
        assert!(matches!(commands[0], ViewCommand::SetView(_)));
    }
}
