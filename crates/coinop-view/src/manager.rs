//! The single-threaded view state machine.
//!
//! One [`ViewManager`] owns the active view, the [`ViewContext`], and the
//! screen. Everything that can happen — a key press, a render tick, an
//! inbound message, a peer death — arrives as a [`LoopInput`] on one mpsc
//! channel and is dispatched in arrival order by the one thread that may
//! mutate view state. [`NetBridge`] adapts the network layer's delegate
//! contract onto that channel, carrying replies back on a oneshot.
//!
//! `set_view` runs `unload` on the outgoing view and `init` on the
//! incoming one before any further input is dispatched, so no handler ever
//! observes an event meant for a different view.

use std::sync::Arc;

use coinop_net::{Client, Delegate, HubServer};
use coinop_protocol::{ClientId, Disconnect, Hello, Packet};
use crossterm::event::KeyEvent;
use tokio::sync::{mpsc, oneshot};

use crate::context::{ViewCommand, ViewContext};
use crate::screen::Screen;
use crate::view::{View, ViewEvent};

/// Render/update cadence the tick pump should drive the loop at.
pub const RENDER_TICK_HZ: u32 = 30;

/// One unit of work for the view loop.
pub enum LoopInput {
    Key(KeyEvent),
    Tick,
    Message {
        from: ClientId,
        packet: Box<dyn Packet>,
        /// Present when the sender's dispatch path waits on the reply
        /// (the network delegate); absent for locally injected messages.
        reply: Option<oneshot::Sender<Option<Box<dyn Packet>>>>,
    },
    /// A peer vanished; surfaced to the active view as a synthetic
    /// `Disconnect` message.
    Disconnected(ClientId),
    Quit,
}

/// Cloneable sender half for the input pumps (keyboard thread, tick task).
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<LoopInput>,
}

impl ManagerHandle {
    /// Returns `false` once the loop is gone.
    pub fn key(&self, key: KeyEvent) -> bool {
        self.tx.send(LoopInput::Key(key)).is_ok()
    }

    pub fn tick(&self) -> bool {
        self.tx.send(LoopInput::Tick).is_ok()
    }

    pub fn quit(&self) {
        let _ = self.tx.send(LoopInput::Quit);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Implements the server's delegate by forwarding inbound traffic into the
/// manager's event loop.
pub struct NetBridge {
    tx: mpsc::UnboundedSender<LoopInput>,
}

impl Delegate for NetBridge {
    async fn process_message(
        &self,
        from: Arc<Client>,
        packet: Box<dyn Packet>,
    ) -> Option<Box<dyn Packet>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let delivered = self.tx.send(LoopInput::Message {
            from: from.id.clone(),
            packet,
            reply: Some(reply_tx),
        });
        if delivered.is_err() {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    async fn client_disconnected(&self, id: ClientId) {
        let _ = self.tx.send(LoopInput::Disconnected(id));
    }
}

/// The server type the views talk to: a host-mode hub whose delegate is
/// the manager loop.
pub type HubHandle = Arc<HubServer<NetBridge>>;

pub struct ViewManager {
    active: Box<dyn View>,
    ctx: ViewContext,
    screen: Box<dyn Screen>,
    tx: mpsc::UnboundedSender<LoopInput>,
    rx: mpsc::UnboundedReceiver<LoopInput>,
    quit: bool,
}

impl ViewManager {
    pub fn new(initial: Box<dyn View>, ctx: ViewContext, screen: Box<dyn Screen>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            active: initial,
            ctx,
            screen,
            tx,
            rx,
            quit: false,
        }
    }

    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            tx: self.tx.clone(),
        }
    }

    /// The delegate to hand `HubServer::host`.
    pub fn bridge(&self) -> NetBridge {
        NetBridge {
            tx: self.tx.clone(),
        }
    }

    pub fn attach_server(&mut self, server: HubHandle) {
        self.ctx.attach_server(server);
    }

    /// Whether a Quit has been processed.
    pub fn finished(&self) -> bool {
        self.quit
    }

    /// Initializes the first view and renders the first frame.
    pub fn start(&mut self) {
        self.active.init(&mut self.ctx);
        self.apply_commands();
        self.render();
    }

    /// Runs the event loop until Quit.
    pub async fn run(mut self) {
        self.start();
        while let Some(input) = self.rx.recv().await {
            self.dispatch(input);
            if self.quit {
                break;
            }
        }
        self.active.unload();
    }

    /// Feeds one input through the active view, applies the commands it
    /// queued, and renders. This is the whole state machine; `run` is just
    /// this in a loop.
    pub fn dispatch(&mut self, input: LoopInput) {
        match input {
            LoopInput::Key(key) => {
                self.active
                    .process_event(&mut self.ctx, &ViewEvent::Key(key));
            }
            LoopInput::Tick => {
                self.active.process_event(&mut self.ctx, &ViewEvent::Tick);
            }
            LoopInput::Message {
                from,
                packet,
                reply,
            } => {
                let outcome = self
                    .active
                    .process_message(&mut self.ctx, &from, packet.as_ref());
                match reply {
                    Some(reply) => {
                        let _ = reply.send(outcome);
                    }
                    None => {
                        if let Some(packet) = outcome {
                            self.ctx.push(ViewCommand::SendTo(from, packet));
                        }
                    }
                }
            }
            LoopInput::Disconnected(id) => {
                let synthetic = Disconnect {
                    client_id: id.clone(),
                };
                let _ = self.active.process_message(&mut self.ctx, &id, &synthetic);
            }
            LoopInput::Quit => self.quit = true,
        }
        self.apply_commands();
        self.render();
    }

    /// Drains the context's command queue, including commands queued by
    /// the handlers the drain itself runs (a fresh view's `init`).
    fn apply_commands(&mut self) {
        loop {
            let batch = self.ctx.take_commands();
            if batch.is_empty() {
                break;
            }
            for command in batch {
                self.apply(command);
            }
        }
    }

    fn apply(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::SetView(next) => self.switch_to(next),
            ViewCommand::SendTo(to, packet) => self.send_to(to, packet),
            ViewCommand::Broadcast(packet) => self.broadcast(packet),
            ViewCommand::Discover => self.discover(),
            ViewCommand::Quit => self.quit = true,
        }
    }

    /// Unload on the way out, init on the way in, strictly in that order.
    fn switch_to(&mut self, mut next: Box<dyn View>) {
        self.active.unload();
        next.init(&mut self.ctx);
        self.active = next;
    }

    fn send_to(&self, to: ClientId, packet: Box<dyn Packet>) {
        let Some(server) = self.ctx.server() else {
            tracing::debug!(%to, "send dropped, no server attached");
            return;
        };
        let Some(client) = server.get_client(&to) else {
            tracing::debug!(%to, "send dropped, unknown client");
            return;
        };
        // Fire-and-forget on a detached task so a slow peer never stalls
        // the event loop.
        tokio::spawn(async move {
            if let Err(e) = client.send(packet.as_ref()).await {
                tracing::debug!(to = %client.id, error = %e, "send failed");
            }
        });
    }

    fn broadcast(&self, packet: Box<dyn Packet>) {
        let Some(server) = self.ctx.server() else {
            tracing::debug!("broadcast dropped, no server attached");
            return;
        };
        let packet: Arc<dyn Packet> = Arc::from(packet);
        for peer in server.peers() {
            let packet = Arc::clone(&packet);
            tokio::spawn(async move {
                if let Err(e) = peer.send(packet.as_ref()).await {
                    tracing::debug!(to = %peer.id, error = %e, "broadcast send failed");
                }
            });
        }
    }

    /// Hello to every known non-distributor client, plus an untargeted
    /// Hello the distributor fans out — the bootstrap for a peer that
    /// doesn't know anyone yet.
    fn discover(&self) {
        let Some(server) = self.ctx.server() else {
            return;
        };
        for peer in server.peers() {
            tokio::spawn(async move {
                let _ = peer.send(&Hello {}).await;
            });
        }
        if let Some(relay) = server.distributor() {
            tokio::spawn(async move {
                let _ = relay.publish(&Hello {}).await;
            });
        }
    }

    fn render(&mut self) {
        self.screen.clear();
        self.active.render(self.screen.as_mut());
        self.screen.present();
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use coinop_protocol::{packet_as, LobbyEnd};
    use crossterm::event::{KeyCode, KeyModifiers};

    use crate::screen::NullScreen;

    /// A view that logs every lifecycle call and can jump to a successor.
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        jump_on_key: bool,
        reply_with_lobby_end: bool,
    }

    impl Probe {
        fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log,
                jump_on_key: false,
                reply_with_lobby_end: false,
            }
        }

        fn note(&self, what: &str) {
            self.log.lock().unwrap().push(format!("{what}:{}", self.name));
        }
    }

    impl View for Probe {
        fn init(&mut self, _ctx: &mut ViewContext) {
            self.note("init");
        }

        fn process_event(&mut self, ctx: &mut ViewContext, event: &ViewEvent) {
            if let ViewEvent::Key(_) = event {
                self.note("key");
                if self.jump_on_key {
                    self.jump_on_key = false;
                    ctx.set_view(Probe::new("second", Arc::clone(&self.log)));
                }
            }
        }

        fn process_message(
            &mut self,
            _ctx: &mut ViewContext,
            _from: &ClientId,
            packet: &dyn Packet,
        ) -> Option<Box<dyn Packet>> {
            self.log
                .lock()
                .unwrap()
                .push(format!("msg[{}]:{}", packet.tag(), self.name));
            if self.reply_with_lobby_end {
                Some(Box::new(LobbyEnd {}))
            } else {
                None
            }
        }

        fn render(&self, _screen: &mut dyn Screen) {}

        fn unload(&mut self) {
            self.note("unload");
        }
    }

    fn key(c: char) -> LoopInput {
        LoopInput::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    fn manager_with(probe: Probe) -> ViewManager {
        let ctx = ViewContext::new(ClientId::new("me"), "tester");
        ViewManager::new(Box::new(probe), ctx, Box::new(NullScreen))
    }

    #[test]
    fn test_set_view_runs_unload_before_init() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut first = Probe::new("first", Arc::clone(&log));
        first.jump_on_key = true;

        let mut manager = manager_with(first);
        manager.start();
        manager.dispatch(key('x'));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["init:first", "key:first", "unload:first", "init:second"]
        );
    }

    #[test]
    fn test_no_event_after_switch_reaches_prior_view() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut first = Probe::new("first", Arc::clone(&log));
        first.jump_on_key = true;

        let mut manager = manager_with(first);
        manager.start();
        manager.dispatch(key('x'));
        manager.dispatch(key('y'));

        let entries = log.lock().unwrap();
        // The second key lands on the successor only.
        assert_eq!(entries.last().unwrap(), "key:second");
        assert_eq!(entries.iter().filter(|e| *e == "key:first").count(), 1);
    }

    #[test]
    fn test_message_reply_travels_back_on_the_oneshot() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut probe = Probe::new("only", Arc::clone(&log));
        probe.reply_with_lobby_end = true;

        let mut manager = manager_with(probe);
        manager.start();

        let (reply_tx, mut reply_rx) = oneshot::channel();
        manager.dispatch(LoopInput::Message {
            from: ClientId::new("peer"),
            packet: Box::new(Hello {}),
            reply: Some(reply_tx),
        });

        let outcome = reply_rx.try_recv().expect("reply sent").expect("some reply");
        assert!(packet_as::<LobbyEnd>(outcome.as_ref()).is_some());
    }

    #[test]
    fn test_disconnected_surfaces_as_synthetic_disconnect() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager_with(Probe::new("only", Arc::clone(&log)));
        manager.start();

        manager.dispatch(LoopInput::Disconnected(ClientId::new("peer")));

        assert!(log
            .lock()
            .unwrap()
            .contains(&"msg[disconnect]:only".to_string()));
    }

    #[test]
    fn test_quit_input_finishes_the_loop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager_with(Probe::new("only", Arc::clone(&log)));
        manager.start();

        assert!(!manager.finished());
        manager.dispatch(LoopInput::Quit);
        assert!(manager.finished());
    }
}
