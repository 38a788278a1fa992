//! The four-row lobby creation form: name, privacy, game type, capacity.

use coinop_lobby::HostedLobby;
use coinop_protocol::{GameKind, Player};
use crossterm::event::{KeyCode, KeyEvent};

use crate::context::ViewContext;
use crate::screen::{CursorStyle, Screen, TextStyle};
use crate::view::{View, ViewEvent};
use crate::views::{GamesListView, LobbyView};

const ROW_NAME: usize = 0;
const ROW_PRIVATE: usize = 1;
const ROW_GAME: usize = 2;
const ROW_CAPACITY: usize = 3;
const ROW_COUNT: usize = 4;

pub struct LobbyCreateView {
    row: usize,
    name: String,
    private: bool,
    game: GameKind,
    capacity_idx: usize,
    error: Option<String>,
}

impl LobbyCreateView {
    pub fn new() -> Self {
        Self {
            row: ROW_NAME,
            name: String::new(),
            private: false,
            game: GameKind::Tron,
            capacity_idx: 0,
            error: None,
        }
    }

    fn capacities(&self) -> Vec<usize> {
        self.game.capacity_range().collect()
    }

    fn capacity(&self) -> usize {
        let options = self.capacities();
        options[self.capacity_idx.min(options.len() - 1)]
    }

    fn cycle(&mut self, step: isize) {
        match self.row {
            ROW_PRIVATE => self.private = !self.private,
            ROW_GAME => {
                self.game = match self.game {
                    GameKind::Tron => GameKind::Pong,
                    GameKind::Pong => GameKind::Tron,
                };
                // The old index may not exist for the new game.
                self.capacity_idx = 0;
            }
            ROW_CAPACITY => {
                let count = self.capacities().len() as isize;
                self.capacity_idx = (self.capacity_idx as isize + step).rem_euclid(count) as usize;
            }
            _ => {}
        }
    }

    fn publish(&mut self, ctx: &mut ViewContext) {
        let host = Player {
            client_id: ctx.self_id().clone(),
            username: ctx.username().to_string(),
            host: true,
        };
        match HostedLobby::create(
            self.name.trim(),
            self.private,
            self.game,
            self.capacity(),
            host,
        ) {
            Ok(hosted) => ctx.set_view(LobbyView::host(hosted)),
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    fn handle_key(&mut self, ctx: &mut ViewContext, key: &KeyEvent) {
        // The name row captures printable keys, so 'p'/'c' are commands
        // only while another row is selected.
        if self.row == ROW_NAME {
            match key.code {
                KeyCode::Char(c) => {
                    self.name.push(c);
                    return;
                }
                KeyCode::Backspace => {
                    self.name.pop();
                    return;
                }
                _ => {}
            }
        }
        match key.code {
            KeyCode::Up => self.row = self.row.saturating_sub(1),
            KeyCode::Down => self.row = (self.row + 1).min(ROW_COUNT - 1),
            KeyCode::Left => self.cycle(-1),
            KeyCode::Right => self.cycle(1),
            KeyCode::Char('p') => self.publish(ctx),
            KeyCode::Char('c') | KeyCode::Esc => ctx.set_view(GamesListView::new()),
            _ => {}
        }
    }
}

impl Default for LobbyCreateView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for LobbyCreateView {
    fn process_event(&mut self, ctx: &mut ViewContext, event: &ViewEvent) {
        if let ViewEvent::Key(key) = event {
            self.handle_key(ctx, key);
        }
    }

    fn render(&self, screen: &mut dyn Screen) {
        let (_, height) = screen.size();
        screen.draw_text(2, 1, "CREATE LOBBY", TextStyle::Title);
        screen.draw_text(
            2,
            2,
            "[↑/↓] field  [←/→] change  [p] publish  [c] cancel",
            TextStyle::Accent,
        );

        let rows = [
            format!("NAME      {}", self.name),
            format!("PRIVATE?  {}", if self.private { "yes" } else { "no" }),
            format!("GAME      {}", self.game),
            format!("CAPACITY  {}", self.capacity()),
        ];
        for (i, row) in rows.iter().enumerate() {
            let style = if i == self.row {
                TextStyle::Selected
            } else {
                TextStyle::Plain
            };
            screen.draw_text(4, 4 + i as u16 * 2, row, style);
        }

        screen.set_cursor_style(if self.row == ROW_NAME {
            CursorStyle::Bar
        } else {
            CursorStyle::Hidden
        });

        if let Some(error) = &self.error {
            screen.draw_text(4, height.saturating_sub(2), error, TextStyle::Error);
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
