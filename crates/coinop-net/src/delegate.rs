//! The delegate contract: where inbound traffic goes in host mode.

use std::sync::Arc;

use coinop_protocol::{ClientId, Packet};

use crate::Client;

/// Receives every decoded inbound message on a host-mode server.
///
/// The server calls [`process_message`](Delegate::process_message) from its
/// single dispatch loop, so implementations see messages one at a time, in
/// arrival order. Returning `Some(reply)` sends the reply back to the
/// originating client on a detached task.
///
/// [`client_disconnected`](Delegate::client_disconnected) fires exactly
/// once per vanished client, whether the cause was an explicit Disconnect,
/// a socket failure, or a heartbeat timeout.
pub trait Delegate: Send + Sync + 'static {
    /// Handles one inbound message; the return value, if any, is the reply.
    fn process_message(
        &self,
        from: Arc<Client>,
        packet: Box<dyn Packet>,
    ) -> impl std::future::Future<Output = Option<Box<dyn Packet>>> + Send;

    /// A client was removed from the registry.
    fn client_disconnected(
        &self,
        id: ClientId,
    ) -> impl std::future::Future<Output = ()> + Send;
}

/// The delegate for processes that don't process: distributor mode relays
/// frames without ever decoding them, so nothing reaches this.
pub struct NoDelegate;

impl Delegate for NoDelegate {
    async fn process_message(
        &self,
        _from: Arc<Client>,
        _packet: Box<dyn Packet>,
    ) -> Option<Box<dyn Packet>> {
        None
    }

    async fn client_disconnected(&self, _id: ClientId) {}
}
