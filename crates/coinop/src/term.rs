//! Crossterm-backed [`Screen`] and the keyboard pump — the only module in
//! the workspace that touches a real terminal.
//!
//! Draw failures are swallowed: a frame that can't be written is just a
//! dropped frame, the next tick redraws everything anyway.

use std::io::{Stdout, Write};
use std::time::Duration;

use coinop_view::{CursorStyle, ManagerHandle, Screen, TextStyle};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::{cursor, execute, queue, terminal};

/// Raw-mode + alternate-screen bracket for the life of the UI.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(
            std::io::stdout(),
            terminal::EnterAlternateScreen,
            cursor::Hide
        )?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(
            std::io::stdout(),
            cursor::Show,
            terminal::LeaveAlternateScreen
        );
        let _ = terminal::disable_raw_mode();
    }
}

pub struct TerminalScreen {
    out: Stdout,
}

impl TerminalScreen {
    pub fn new() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl Default for TerminalScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for TerminalScreen {
    fn size(&self) -> (u16, u16) {
        terminal::size().unwrap_or((80, 24))
    }

    fn clear(&mut self) {
        let _ = queue!(self.out, terminal::Clear(terminal::ClearType::All));
    }

    fn draw_text(&mut self, x: u16, y: u16, text: &str, style: TextStyle) {
        let _ = queue!(self.out, cursor::MoveTo(x, y));
        let _ = match style {
            TextStyle::Plain => queue!(self.out, Print(text)),
            TextStyle::Title => queue!(
                self.out,
                SetAttribute(Attribute::Bold),
                SetForegroundColor(Color::Cyan),
                Print(text),
                SetAttribute(Attribute::Reset),
                ResetColor
            ),
            TextStyle::Selected => queue!(
                self.out,
                SetAttribute(Attribute::Reverse),
                Print(text),
                SetAttribute(Attribute::Reset)
            ),
            TextStyle::Accent => queue!(
                self.out,
                SetForegroundColor(Color::Yellow),
                Print(text),
                ResetColor
            ),
            TextStyle::Error => queue!(
                self.out,
                SetForegroundColor(Color::Red),
                Print(text),
                ResetColor
            ),
        };
    }

    fn draw_box(&mut self, x: u16, y: u16, width: u16, height: u16) {
        if width < 2 || height < 2 {
            return;
        }
        let inner = (width - 2) as usize;
        let top = format!("┌{}┐", "─".repeat(inner));
        let bottom = format!("└{}┘", "─".repeat(inner));
        let _ = queue!(self.out, cursor::MoveTo(x, y), Print(&top));
        for row in 1..height - 1 {
            let _ = queue!(
                self.out,
                cursor::MoveTo(x, y + row),
                Print("│"),
                cursor::MoveTo(x + width - 1, y + row),
                Print("│")
            );
        }
        let _ = queue!(self.out, cursor::MoveTo(x, y + height - 1), Print(&bottom));
    }

    fn draw_line(&mut self, x1: u16, y1: u16, x2: u16, y2: u16) {
        if y1 == y2 {
            let (from, to) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
            let line = "─".repeat((to - from + 1) as usize);
            let _ = queue!(self.out, cursor::MoveTo(from, y1), Print(&line));
        } else if x1 == x2 {
            let (from, to) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
            for y in from..=to {
                let _ = queue!(self.out, cursor::MoveTo(x1, y), Print("│"));
            }
        }
    }

    fn clear_region(&mut self, x: u16, y: u16, width: u16, height: u16) {
        let blank = " ".repeat(width as usize);
        for row in 0..height {
            let _ = queue!(self.out, cursor::MoveTo(x, y + row), Print(&blank));
        }
    }

    fn set_cursor_style(&mut self, style: CursorStyle) {
        let _ = match style {
            CursorStyle::Hidden => queue!(self.out, cursor::Hide),
            CursorStyle::Block => queue!(
                self.out,
                cursor::Show,
                cursor::SetCursorStyle::SteadyBlock
            ),
            CursorStyle::Bar => {
                queue!(self.out, cursor::Show, cursor::SetCursorStyle::SteadyBar)
            }
        };
    }

    fn present(&mut self) {
        let _ = self.out.flush();
    }
}

/// Forwards key presses into the manager loop from a dedicated thread
/// (crossterm's poll/read are blocking calls).
pub fn spawn_input_pump(handle: ManagerHandle) {
    std::thread::spawn(move || loop {
        match event::poll(Duration::from_millis(50)) {
            Ok(true) => {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press && !handle.key(key) {
                        break;
                    }
                }
            }
            Ok(false) => {
                if handle.is_closed() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}
