//! Error types for the network layer.

use coinop_protocol::ProtocolError;

/// Errors that can occur while binding, dialing, or talking to peers.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Binding the listen socket failed. Fatal at startup.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// An outbound dial failed. Retrying is the caller's decision.
    #[error("dial {addr} failed: {reason}")]
    Dial { addr: String, reason: String },

    /// The connection-establishment ident exchange went wrong.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// The connection is already torn down.
    #[error("connection closed")]
    ConnectionClosed,

    /// Encoding or decoding a frame failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `run()` was called twice, or before `bind` finished.
    #[error("server is not in a runnable state: {0}")]
    NotRunnable(&'static str),
}
