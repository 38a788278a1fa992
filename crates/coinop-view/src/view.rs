//! The view capability set and the events views receive.

use coinop_protocol::{ClientId, Packet};
use crossterm::event::KeyEvent;

use crate::context::ViewContext;
use crate::screen::Screen;

/// A non-message input delivered to the active view.
#[derive(Debug, Clone)]
pub enum ViewEvent {
    Key(KeyEvent),
    /// The render/update tick.
    Tick,
}

/// One mode of the terminal state machine (splash, browse, create,
/// in-lobby, in-game).
///
/// Exactly one view is active at a time, and only it receives events,
/// messages, and render calls. `init` runs before the first dispatch and
/// `unload` after the last; `ViewManager` guarantees that a replaced view
/// never observes an event meant for its successor.
pub trait View: Send {
    /// Called once when the view becomes active, before any dispatch.
    fn init(&mut self, _ctx: &mut ViewContext) {}

    /// Handles one key press or tick.
    fn process_event(&mut self, ctx: &mut ViewContext, event: &ViewEvent);

    /// Handles one inbound message. The return value, if any, travels back
    /// to `from` as the reply.
    fn process_message(
        &mut self,
        _ctx: &mut ViewContext,
        _from: &ClientId,
        _packet: &dyn Packet,
    ) -> Option<Box<dyn Packet>> {
        None
    }

    fn render(&self, screen: &mut dyn Screen);

    /// Called once when the view is replaced.
    fn unload(&mut self) {}
}
