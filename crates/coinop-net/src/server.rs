//! The process-wide server: client registry plus accept/dial logic.
//!
//! One [`HubServer`] runs per process, in one of two modes:
//!
//! - **Distributor** — accept-only relay. Forwards envelopes between peers
//!   without ever decoding payloads: a named recipient gets the frame
//!   verbatim, no recipient means fan-out to every other peer. Announces
//!   peer deaths to the survivors.
//! - **Host** — accepts inbound peers, dials the distributor once on
//!   startup, and forwards every decoded inbound message to its
//!   [`Delegate`].
//!
//! The client map is a single `RwLock`-guarded structure. Lookups and
//! broadcast iteration take the read lock, registration and removal take
//! the write lock, and the lock is never held across a network send — a
//! client `Arc` is copied out first, so a slow peer can't stall anyone
//! else's traffic.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use coinop_protocol::{
    packet_as, tags, ClientId, Codec, Disconnect, Envelope, ErrorReply, Ident, JsonCodec, Registry,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;

use crate::client::{Client, Route};
use crate::connection::{ConnEvent, Connection, ConnectionId, HeartbeatConfig, WsStream};
use crate::delegate::{Delegate, NoDelegate};
use crate::NetError;

/// How long a fresh connection may take to introduce itself before the
/// handshake is abandoned.
const IDENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Which role this process plays in the hub topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Distributor,
    Host,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distributor => write!(f, "distributor"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Role-specific state. The distributor relays frames without decoding, so
/// it carries neither a registry nor a delegate.
enum Role<D> {
    Distributor,
    Host {
        registry: Arc<Registry>,
        delegate: Arc<D>,
    },
}

/// Bind-time configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen address. Production binds `0.0.0.0:<port>`; tests use
    /// `127.0.0.1:0`.
    pub bind_addr: String,
    pub heartbeat: HeartbeatConfig,
    /// Identity for this process. Generated fresh when not supplied —
    /// supply one when another component (the view layer) must share it.
    pub id: Option<ClientId>,
}

impl HubConfig {
    pub fn on_port(port: u16) -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{port}"),
            heartbeat: HeartbeatConfig::default(),
            id: None,
        }
    }
}

/// The client registry and its accept/dial/dispatch machinery.
pub struct HubServer<D: Delegate> {
    id: ClientId,
    role: Role<D>,
    heartbeat: HeartbeatConfig,
    local_addr: SocketAddr,
    clients: RwLock<HashMap<ClientId, Arc<Client>>>,
    /// Maps live direct connections back to their registry entry, so
    /// connection events can be attributed.
    by_conn: StdMutex<HashMap<ConnectionId, ClientId>>,
    events_tx: mpsc::UnboundedSender<ConnEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<ConnEvent>>>,
    listener: StdMutex<Option<TcpListener>>,
}

impl HubServer<NoDelegate> {
    /// Binds a distributor: relay-only, no delegate, no payload decoding.
    pub async fn distributor(config: HubConfig) -> Result<Arc<Self>, NetError> {
        Self::bind(config, Role::Distributor).await
    }
}

impl<D: Delegate> HubServer<D> {
    /// Binds a host: inbound messages are decoded through `registry` and
    /// handed to `delegate`.
    pub async fn host(
        config: HubConfig,
        registry: Arc<Registry>,
        delegate: Arc<D>,
    ) -> Result<Arc<Self>, NetError> {
        Self::bind(config, Role::Host { registry, delegate }).await
    }

    async fn bind(mut config: HubConfig, role: Role<D>) -> Result<Arc<Self>, NetError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(NetError::Bind)?;
        let local_addr = listener.local_addr().map_err(NetError::Bind)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = config.id.take().unwrap_or_else(ClientId::generate);

        let server = Arc::new(Self {
            id,
            role,
            heartbeat: config.heartbeat,
            local_addr,
            clients: RwLock::new(HashMap::new()),
            by_conn: StdMutex::new(HashMap::new()),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            listener: StdMutex::new(Some(listener)),
        });

        tracing::info!(id = %server.id, addr = %local_addr, mode = %server.mode(), "server bound");
        Ok(server)
    }

    pub fn mode(&self) -> Mode {
        match self.role {
            Role::Distributor => Mode::Distributor,
            Role::Host { .. } => Mode::Host,
        }
    }

    /// This process's identity, stamped as the sender on every envelope it
    /// originates.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The lookup contract for targeting sends.
    pub fn get_client(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.read().unwrap().get(id).cloned()
    }

    /// Every known non-distributor peer — the discovery/broadcast set.
    pub fn peers(&self) -> Vec<Arc<Client>> {
        self.clients
            .read()
            .unwrap()
            .values()
            .filter(|c| !c.distributor)
            .cloned()
            .collect()
    }

    /// The distributor's registry entry, once dialed.
    pub fn distributor(&self) -> Option<Arc<Client>> {
        self.clients
            .read()
            .unwrap()
            .values()
            .find(|c| c.distributor)
            .cloned()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// Runs the accept loop and the event dispatch loop. Call once.
    pub async fn run(self: Arc<Self>) -> Result<(), NetError> {
        let listener = self
            .listener
            .lock()
            .unwrap()
            .take()
            .ok_or(NetError::NotRunnable("run may only be called once"))?;
        let mut events = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or(NetError::NotRunnable("event channel already taken"))?;

        tokio::spawn(Arc::clone(&self).accept_loop(listener));

        while let Some(event) = events.recv().await {
            match event {
                ConnEvent::Frame { conn, envelope } => self.handle_frame(conn, envelope).await,
                ConnEvent::Dead { conn } => self.handle_dead(conn).await,
            }
        }
        Ok(())
    }

    /// Dials a peer once and registers it. Retrying a failed dial is the
    /// caller's decision, not the server's.
    pub async fn connect(&self, addr: &str) -> Result<Arc<Client>, NetError> {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .map_err(|e| NetError::Dial {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let (ws, ident) = self.exchange_ident(ws).await?;
        Ok(self.install_direct(ws, ident, addr.to_string()))
    }

    // -- accept path --------------------------------------------------------

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.admit(stream, addr).await {
                            tracing::warn!(%addr, error = %e, "inbound connection failed");
                        }
                    });
                }
                // A failed accept is logged; the loop keeps serving.
                Err(e) => tracing::error!(error = %e, "accept failed"),
            }
        }
    }

    async fn admit(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), NetError> {
        let ws = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream))
            .await
            .map_err(|e| NetError::Handshake(format!("websocket accept: {e}")))?;
        let (ws, ident) = self.exchange_ident(ws).await?;
        // The ident's port is where this peer accepts inbound dials; the
        // ephemeral source port would be useless to display.
        let display = format!("{}:{}", addr.ip(), ident.port);
        self.install_direct(ws, ident, display);
        Ok(())
    }

    // -- handshake ----------------------------------------------------------

    fn ident(&self) -> Ident {
        Ident {
            id: self.id.clone(),
            distributor: matches!(self.role, Role::Distributor),
            port: self.local_addr.port(),
        }
    }

    /// Sends our `Ident`, then waits for the peer's. Both sides write
    /// first and read second, so neither blocks the other.
    async fn exchange_ident(&self, mut ws: WsStream) -> Result<(WsStream, Ident), NetError> {
        let envelope = Envelope::seal(self.id.clone(), None, &self.ident())?;
        let bytes = JsonCodec.encode(&envelope)?;
        ws.send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| NetError::Handshake(format!("ident send: {e}")))?;

        let ident = tokio::time::timeout(IDENT_TIMEOUT, read_ident(&mut ws))
            .await
            .map_err(|_| NetError::Handshake("timed out waiting for peer ident".into()))??;
        Ok((ws, ident))
    }

    // -- registry maintenance -----------------------------------------------

    fn install_direct(&self, ws: WsStream, ident: Ident, display_addr: String) -> Arc<Client> {
        let connection = Connection::establish(
            ws,
            display_addr.clone(),
            self.id.clone(),
            self.heartbeat.clone(),
            self.events_tx.clone(),
        );
        let client = Arc::new(Client {
            id: ident.id.clone(),
            addr: display_addr,
            distributor: ident.distributor,
            route: Route::Direct(Arc::clone(&connection)),
            local_id: self.id.clone(),
        });

        let previous = self
            .clients
            .write()
            .unwrap()
            .insert(ident.id.clone(), Arc::clone(&client));
        self.by_conn
            .lock()
            .unwrap()
            .insert(connection.id(), ident.id.clone());

        // A reconnecting peer supersedes its stale entry; the old socket
        // goes down without a disconnect report.
        if let Some(previous) = previous {
            if let Route::Direct(old) = &previous.route {
                self.by_conn.lock().unwrap().remove(&old.id());
                old.shutdown_quietly();
                tracing::debug!(client = %client.id, "stale connection replaced");
            }
        }

        tracing::info!(
            client = %client.id,
            addr = %client.addr,
            distributor = client.distributor,
            "client registered"
        );
        client
    }

    /// Registers a peer reachable only through the connection an envelope
    /// just arrived on (the relay path).
    fn learn_relayed(&self, id: &ClientId, via: &Arc<Client>) -> Arc<Client> {
        let mut clients = self.clients.write().unwrap();
        if let Some(existing) = clients.get(id) {
            return Arc::clone(existing);
        }
        let client = Arc::new(Client {
            id: id.clone(),
            addr: format!("relay:{}", via.addr),
            distributor: false,
            route: Route::Relayed {
                via: Arc::clone(via.connection()),
            },
            local_id: self.id.clone(),
        });
        clients.insert(id.clone(), Arc::clone(&client));
        tracing::debug!(client = %id, via = %via.id, "peer learned through relay");
        client
    }

    fn remove_client(&self, id: &ClientId) -> Option<Arc<Client>> {
        let client = self.clients.write().unwrap().remove(id)?;
        if let Route::Direct(conn) = &client.route {
            self.by_conn.lock().unwrap().remove(&conn.id());
            conn.shutdown_quietly();
        }
        tracing::info!(client = %id, "client removed");
        Some(client)
    }

    fn client_by_conn(&self, conn: ConnectionId) -> Option<Arc<Client>> {
        let id = self.by_conn.lock().unwrap().get(&conn).cloned()?;
        self.get_client(&id)
    }

    // -- event dispatch -----------------------------------------------------

    async fn handle_frame(&self, conn: ConnectionId, envelope: Envelope) {
        match &self.role {
            Role::Distributor => self.relay(envelope),
            Role::Host { registry, delegate } => {
                self.deliver(conn, envelope, registry, delegate).await;
            }
        }
    }

    /// Distributor dispatch: route by the envelope's recipient without ever
    /// touching the payload.
    fn relay(&self, envelope: Envelope) {
        match envelope.recipient.clone() {
            Some(id) if id == self.id => {
                tracing::debug!(sender = %envelope.sender, "frame addressed to the relay itself, dropped");
            }
            Some(id) => match self.get_client(&id) {
                Some(target) => {
                    tokio::spawn(async move {
                        if let Err(e) = target.forward(&envelope).await {
                            tracing::debug!(recipient = %id, error = %e, "relay forward failed");
                        }
                    });
                }
                None => tracing::debug!(recipient = %id, "relay target unknown, frame dropped"),
            },
            None => {
                // Fan-out to everyone but the original sender. Snapshot
                // under the read lock; sends happen with no lock held.
                let targets: Vec<Arc<Client>> = self
                    .clients
                    .read()
                    .unwrap()
                    .values()
                    .filter(|c| c.id != envelope.sender)
                    .cloned()
                    .collect();
                tokio::spawn(async move {
                    for target in targets {
                        if let Err(e) = target.forward(&envelope).await {
                            tracing::debug!(recipient = %target.id, error = %e, "fan-out send failed");
                        }
                    }
                });
            }
        }
    }

    /// Host dispatch: decode and hand to the delegate.
    async fn deliver(
        &self,
        conn: ConnectionId,
        envelope: Envelope,
        registry: &Arc<Registry>,
        delegate: &Arc<D>,
    ) {
        let Some(via) = self.client_by_conn(conn) else {
            tracing::debug!(%conn, "frame from unregistered connection dropped");
            return;
        };
        if envelope.recipient.as_ref().is_some_and(|r| r != &self.id) {
            tracing::debug!(recipient = ?envelope.recipient, "frame for another peer dropped (hosts do not relay)");
            return;
        }

        // A sender we don't recognize on the distributor's connection is a
        // peer we can reach back through the same relay.
        let from = if via.id == envelope.sender {
            via
        } else {
            self.learn_relayed(&envelope.sender, &via)
        };

        let packet = match envelope.open(registry) {
            Ok(packet) => packet,
            Err(e) => {
                // A protocol error earns a complaint, not a teardown.
                tracing::warn!(from = %from.id, error = %e, "undecodable payload");
                let complaint = ErrorReply {
                    message: e.to_string(),
                };
                tokio::spawn(async move {
                    let _ = from.send(&complaint).await;
                });
                return;
            }
        };

        // An explicit Disconnect names the departed peer; drop it and tell
        // the delegate. Idempotent — an already-gone client is a no-op.
        if let Some(gone) = packet_as::<Disconnect>(packet.as_ref()) {
            let id = gone.client_id.clone();
            if self.remove_client(&id).is_some() {
                delegate.client_disconnected(id).await;
            }
            return;
        }

        if let Some(reply) = delegate.process_message(Arc::clone(&from), packet).await {
            tokio::spawn(async move {
                if let Err(e) = from.send(reply.as_ref()).await {
                    tracing::debug!(to = %from.id, error = %e, "reply send failed");
                }
            });
        }
    }

    /// A direct connection died (socket failure, clean close, or heartbeat
    /// timeout). The connection's dead-latch guarantees this fires at most
    /// once per connection.
    async fn handle_dead(&self, conn: ConnectionId) {
        let Some(id) = self.by_conn.lock().unwrap().remove(&conn) else {
            // Already removed through an explicit Disconnect.
            return;
        };
        if self.clients.write().unwrap().remove(&id).is_none() {
            return;
        }
        tracing::info!(client = %id, "client connection lost");

        match &self.role {
            Role::Host { delegate, .. } => delegate.client_disconnected(id).await,
            Role::Distributor => {
                // Announce the death so relayed handles and lobby caches
                // degrade everywhere.
                let note = Disconnect { client_id: id };
                let survivors: Vec<Arc<Client>> =
                    self.clients.read().unwrap().values().cloned().collect();
                tokio::spawn(async move {
                    for peer in survivors {
                        if let Err(e) = peer.send(&note).await {
                            tracing::debug!(to = %peer.id, error = %e, "disconnect announce failed");
                        }
                    }
                });
            }
        }
    }
}

impl<D: Delegate> fmt::Debug for HubServer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubServer")
            .field("id", &self.id)
            .field("mode", &self.mode())
            .field("addr", &self.local_addr)
            .field("clients", &self.client_count())
            .finish()
    }
}

/// Reads frames until the peer's `Ident` arrives.
async fn read_ident(ws: &mut WsStream) -> Result<Ident, NetError> {
    while let Some(frame) = ws.next().await {
        let data = match frame {
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(NetError::Handshake(format!("recv failed: {e}"))),
        };
        let envelope: Envelope = JsonCodec.decode(&data)?;
        if envelope.tag() != Some(tags::IDENT) {
            return Err(NetError::Handshake(format!(
                "expected ident as the first frame, got {:?}",
                envelope.tag()
            )));
        }
        return serde_json::from_value(envelope.payload)
            .map_err(|e| NetError::Handshake(format!("malformed ident: {e}")));
    }
    Err(NetError::Handshake(
        "connection closed during ident exchange".into(),
    ))
}
