//! The explicit root context views act through.
//!
//! No process-wide singletons: identity, the server handle, and the
//! command queue are fields of one [`ViewContext`] owned by the manager
//! and lent to the active view per dispatch. Views never touch the network
//! directly — they queue [`ViewCommand`]s and the manager executes them
//! (spawning sends on detached tasks so a slow peer can't stall the loop).

use coinop_protocol::{ClientId, Packet, Player};

use crate::manager::HubHandle;
use crate::view::View;

/// An effect a view asks the manager to perform.
pub enum ViewCommand {
    /// Replace the active view (unload-then-init, before further events).
    SetView(Box<dyn View>),
    /// Send one message to one client, fire-and-forget.
    SendTo(ClientId, Box<dyn Packet>),
    /// Send one message to every known non-distributor peer.
    Broadcast(Box<dyn Packet>),
    /// Lobby discovery: Hello to every known peer plus an untargeted Hello
    /// for the distributor to fan out.
    Discover,
    /// Stop the event loop.
    Quit,
}

pub struct ViewContext {
    self_id: ClientId,
    username: String,
    server: Option<HubHandle>,
    commands: Vec<ViewCommand>,
}

impl ViewContext {
    pub fn new(self_id: ClientId, username: impl Into<String>) -> Self {
        Self {
            self_id,
            username: username.into(),
            server: None,
            commands: Vec::new(),
        }
    }

    pub fn attach_server(&mut self, server: HubHandle) {
        self.server = Some(server);
    }

    pub fn self_id(&self) -> &ClientId {
        &self.self_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The roster entry this process proposes for itself in Join requests.
    pub fn local_player(&self) -> Player {
        Player {
            client_id: self.self_id.clone(),
            username: self.username.clone(),
            host: false,
        }
    }

    pub fn server(&self) -> Option<&HubHandle> {
        self.server.as_ref()
    }

    // -- command queue ------------------------------------------------------

    pub fn set_view(&mut self, view: impl View + 'static) {
        self.commands.push(ViewCommand::SetView(Box::new(view)));
    }

    pub fn send_to(&mut self, to: ClientId, packet: impl Packet + 'static) {
        self.commands.push(ViewCommand::SendTo(to, Box::new(packet)));
    }

    pub fn broadcast(&mut self, packet: impl Packet + 'static) {
        self.commands.push(ViewCommand::Broadcast(Box::new(packet)));
    }

    pub fn discover(&mut self) {
        self.commands.push(ViewCommand::Discover);
    }

    pub fn quit(&mut self) {
        self.commands.push(ViewCommand::Quit);
    }

    pub(crate) fn push(&mut self, command: ViewCommand) {
        self.commands.push(command);
    }

    pub(crate) fn take_commands(&mut self) -> Vec<ViewCommand> {
        std::mem::take(&mut self.commands)
    }
}
