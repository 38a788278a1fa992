//! Title screen. Any key proceeds to the games list.

use crate::context::ViewContext;
use crate::screen::{Screen, TextStyle};
use crate::view::{View, ViewEvent};
use crate::views::GamesListView;

const TITLE: &[&str] = &[
    r"  _____ _____ _____ _   _ _____ _____  ",
    r" /  __ \  _  |_   _| \ | |  _  |  _  \ ",
    r" |  /  \/ | | | | | |  \| | | | | |_| / ",
    r" |  \__/\ |_| |_| |_| |\  | \_/ | ___/ ",
    r"  \____/\___/|_____|_| \_|\___/|_|     ",
];

pub struct SplashView;

impl View for SplashView {
    fn process_event(&mut self, ctx: &mut ViewContext, event: &ViewEvent) {
        if let ViewEvent::Key(_) = event {
            ctx.set_view(GamesListView::new());
        }
    }

    fn render(&self, screen: &mut dyn Screen) {
        let (width, height) = screen.size();
        let top = (height / 2).saturating_sub(TITLE.len() as u16 / 2 + 1);
        for (i, line) in TITLE.iter().enumerate() {
            let x = (width / 2).saturating_sub(line.len() as u16 / 2);
            screen.draw_text(x, top + i as u16, line, TextStyle::Title);
        }
        let prompt = "press any key";
        let x = (width / 2).saturating_sub(prompt.len() as u16 / 2);
        screen.draw_text(x, top + TITLE.len() as u16 + 2, prompt, TextStyle::Accent);
    }
}
