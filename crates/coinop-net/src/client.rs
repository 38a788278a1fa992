//! The logical handle to a remote peer.
//!
//! A [`Client`] is identity plus a way to reach it. Directly-connected
//! peers own their connection; peers discovered through the distributor
//! share the distributor's connection and are addressed by the envelope's
//! recipient field.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use coinop_protocol::{ClientId, Envelope, Packet};

use crate::connection::Connection;
use crate::NetError;

/// How frames reach this client.
#[derive(Clone)]
pub(crate) enum Route {
    /// We hold the socket to this peer.
    Direct(Arc<Connection>),
    /// Reachable only through the distributor's connection.
    Relayed { via: Arc<Connection> },
}

/// A remote peer as the local process sees it.
pub struct Client {
    pub id: ClientId,
    /// Display address (`ip:port` for direct peers, the relay note
    /// otherwise).
    pub addr: String,
    /// Whether this peer is the distributor.
    pub distributor: bool,
    pub(crate) route: Route,
    /// Our own id, stamped as the sender on every envelope we originate.
    pub(crate) local_id: ClientId,
}

impl Client {
    /// Sends one message to this client. The envelope always names its
    /// recipient so a relay hop can route it.
    pub async fn send(&self, packet: &dyn Packet) -> Result<(), NetError> {
        let envelope = Envelope::seal(self.local_id.clone(), Some(self.id.clone()), packet)?;
        self.connection().send(&envelope).await
    }

    /// Sends one message with no recipient named. Only meaningful on the
    /// distributor's connection, which fans such frames out to every other
    /// peer — the bootstrap path for discovering peers we don't know yet.
    pub async fn publish(&self, packet: &dyn Packet) -> Result<(), NetError> {
        let envelope = Envelope::seal(self.local_id.clone(), None, packet)?;
        self.connection().send(&envelope).await
    }

    /// Forwards an envelope untouched (relay path — the original sender
    /// must survive the hop).
    pub(crate) async fn forward(&self, envelope: &Envelope) -> Result<(), NetError> {
        self.connection().send(envelope).await
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.route, Route::Direct(_))
    }

    /// Latest heartbeat round-trip to this peer. Direct connections only;
    /// a relayed peer's latency isn't ours to measure.
    pub fn rtt(&self) -> Option<Duration> {
        match &self.route {
            Route::Direct(conn) => conn.rtt(),
            Route::Relayed { .. } => None,
        }
    }

    /// When this peer last sent anything on its direct connection.
    pub fn last_heartbeat(&self) -> Option<Instant> {
        match &self.route {
            Route::Direct(conn) => Some(conn.last_seen()),
            Route::Relayed { .. } => None,
        }
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        match &self.route {
            Route::Direct(conn) => conn,
            Route::Relayed { via } => via,
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("distributor", &self.distributor)
            .field("direct", &self.is_direct())
            .finish()
    }
}
