//! Per-peer framed duplex connection.
//!
//! Each connection owns two background tasks:
//!
//! - a **receive loop** that decodes envelopes off the WebSocket and hands
//!   them to the owning server's event channel — except heartbeats, which
//!   it answers (or accounts) in place so liveness never depends on what
//!   the registry knows;
//! - a **heartbeat loop** that emits `Heartbeat{}` on a fixed interval and
//!   declares the connection dead after too many consecutive unanswered
//!   beats.
//!
//! Sends go through a mutex-guarded sink half, so concurrent callers can
//! never interleave partial frames. Teardown is a `watch` signal both tasks
//! select on; the `dead` latch guarantees the server hears about a given
//! connection's death at most once, no matter which task notices first.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use coinop_protocol::{
    tags, ClientId, Codec, Envelope, Heartbeat, HeartbeatReply, JsonCodec,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::NetError;

/// The one stream type both accept and dial paths produce.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a live connection (process-local, not wire data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Heartbeat cadence and tolerance.
///
/// Defaults to 1 s × 3 misses, so a dead peer is detected within a few
/// seconds. Tests shrink both to keep runtimes sane.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often each side emits `Heartbeat{}`.
    pub interval: Duration,
    /// Consecutive unanswered beats tolerated before the peer is dead.
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_missed: 3,
        }
    }
}

/// What a connection reports up to its owning server.
#[derive(Debug)]
pub(crate) enum ConnEvent {
    /// A decoded non-heartbeat envelope arrived.
    Frame {
        conn: ConnectionId,
        envelope: Envelope,
    },
    /// The connection died: clean close, socket error, or heartbeat
    /// timeout. Emitted at most once per connection.
    Dead { conn: ConnectionId },
}

/// A live framed connection to one peer.
pub struct Connection {
    id: ConnectionId,
    peer_addr: String,
    /// Our own id, stamped on heartbeat frames this connection originates.
    local_id: ClientId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    events: mpsc::UnboundedSender<ConnEvent>,
    shutdown: watch::Sender<bool>,
    /// Heartbeats sent since the last reply.
    missed: AtomicU32,
    /// Once set, no further Dead event may be emitted.
    dead: AtomicBool,
    /// Micros; 0 = no sample yet.
    rtt_micros: AtomicU64,
    heartbeat_sent_at: StdMutex<Option<Instant>>,
    last_seen: StdMutex<Instant>,
}

impl Connection {
    /// Takes ownership of an established (and identified) stream and spawns
    /// the receive and heartbeat loops.
    pub(crate) fn establish(
        ws: WsStream,
        peer_addr: String,
        local_id: ClientId,
        heartbeat: HeartbeatConfig,
        events: mpsc::UnboundedSender<ConnEvent>,
    ) -> Arc<Self> {
        let (sink, stream) = ws.split();
        let (shutdown, _) = watch::channel(false);

        let conn = Arc::new(Self {
            id: ConnectionId::next(),
            peer_addr,
            local_id,
            sink: Mutex::new(sink),
            events,
            shutdown,
            missed: AtomicU32::new(0),
            dead: AtomicBool::new(false),
            rtt_micros: AtomicU64::new(0),
            heartbeat_sent_at: StdMutex::new(None),
            last_seen: StdMutex::new(Instant::now()),
        });

        tokio::spawn(Arc::clone(&conn).receive_loop(stream));
        tokio::spawn(Arc::clone(&conn).heartbeat_loop(heartbeat));

        tracing::debug!(conn = %conn.id, peer = %conn.peer_addr, "connection established");
        conn
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Latest heartbeat round-trip sample, if any.
    pub fn rtt(&self) -> Option<Duration> {
        match self.rtt_micros.load(Ordering::Relaxed) {
            0 => None,
            us => Some(Duration::from_micros(us)),
        }
    }

    /// When the last frame (of any kind) arrived from the peer.
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap()
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Writes one envelope. Serialized against all other senders.
    pub(crate) async fn send(&self, envelope: &Envelope) -> Result<(), NetError> {
        if self.is_dead() {
            return Err(NetError::ConnectionClosed);
        }
        let bytes = JsonCodec.encode(envelope)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| NetError::Send(e.to_string()))
    }

    /// Tears the connection down without reporting a death — used when a
    /// client entry is being replaced, not lost.
    pub(crate) fn shutdown_quietly(&self) {
        self.dead.store(true, Ordering::Release);
        let _ = self.shutdown.send(true);
    }

    /// Marks the connection dead and reports it upstream, exactly once.
    fn mark_dead(&self, cause: &str) {
        if !self.dead.swap(true, Ordering::AcqRel) {
            tracing::info!(conn = %self.id, peer = %self.peer_addr, cause, "connection down");
            let _ = self.shutdown.send(true);
            let _ = self.events.send(ConnEvent::Dead { conn: self.id });
        }
    }

    fn note_seen(&self) {
        *self.last_seen.lock().unwrap() = Instant::now();
    }

    // -- background tasks --------------------------------------------------

    async fn receive_loop(self: Arc<Self>, mut stream: SplitStream<WsStream>) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => break,
                frame = stream.next() => frame,
            };

            let data = match frame {
                Some(Ok(Message::Binary(data))) => data.to_vec(),
                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(Message::Close(_))) | None => {
                    self.mark_dead("peer closed");
                    break;
                }
                Some(Ok(_)) => continue, // ws ping/pong/fragment
                Some(Err(e)) => {
                    self.mark_dead(&format!("recv error: {e}"));
                    break;
                }
            };

            let envelope: Envelope = match JsonCodec.decode(&data) {
                Ok(env) => env,
                Err(e) => {
                    // Not even an envelope. Drop the frame, keep the
                    // connection; the peer may still speak sense.
                    tracing::debug!(conn = %self.id, error = %e, "unreadable frame dropped");
                    continue;
                }
            };

            self.note_seen();

            match envelope.tag() {
                Some(tags::HEARTBEAT) => self.answer_heartbeat().await,
                Some(tags::HEARTBEAT_REPLY) => self.record_heartbeat_reply(),
                _ => {
                    if self.events.send(ConnEvent::Frame {
                        conn: self.id,
                        envelope,
                    })
                    .is_err()
                    {
                        // Server gone; nothing left to deliver to.
                        break;
                    }
                }
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, config: HeartbeatConfig) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            if self.missed.load(Ordering::Acquire) >= config.max_missed {
                self.mark_dead("heartbeat timeout");
                break;
            }

            self.missed.fetch_add(1, Ordering::AcqRel);
            *self.heartbeat_sent_at.lock().unwrap() = Some(Instant::now());

            let beat = match Envelope::seal(self.local_id.clone(), None, &Heartbeat {}) {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(conn = %self.id, error = %e, "heartbeat encode failed");
                    continue;
                }
            };
            if self.send(&beat).await.is_err() {
                self.mark_dead("heartbeat send failed");
                break;
            }
        }
    }

    async fn answer_heartbeat(&self) {
        let reply = match Envelope::seal(self.local_id.clone(), None, &HeartbeatReply {}) {
            Ok(env) => env,
            Err(e) => {
                tracing::error!(conn = %self.id, error = %e, "heartbeat reply encode failed");
                return;
            }
        };
        if let Err(e) = self.send(&reply).await {
            tracing::debug!(conn = %self.id, error = %e, "heartbeat reply send failed");
        }
    }

    fn record_heartbeat_reply(&self) {
        self.missed.store(0, Ordering::Release);
        if let Some(sent) = self.heartbeat_sent_at.lock().unwrap().take() {
            let rtt = sent.elapsed();
            self.rtt_micros
                .store(rtt.as_micros() as u64, Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer_addr)
            .field("dead", &self.is_dead())
            .finish()
    }
}
