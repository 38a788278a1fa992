//! Connection, liveness, and peer registry layer for Coinop.
//!
//! This crate owns everything between the wire protocol and the
//! lobby/view layers:
//!
//! - [`Connection`](connection) — one framed WebSocket per peer, with the
//!   heartbeat sub-protocol and deterministic teardown.
//! - [`Client`] — the logical handle to a remote peer: identity, address,
//!   distributor flag, and a route (direct socket or relayed through the
//!   distributor).
//! - [`HubServer`] — the process-wide client registry plus accept/dial
//!   logic. Runs in [`Mode::Distributor`] (relay frames, never decode) or
//!   [`Mode::Host`] (decode and forward to a [`Delegate`]).
//!
//! # Topology
//!
//! ```text
//!        ┌──────────────┐
//!        │  Distributor │  accept-only relay
//!        └──▲────────▲──┘
//!      dial │        │ dial
//!     ┌─────┴───┐ ┌──┴──────┐
//!     │  Host A │ │  Host B │   peers; reach each other directly or
//!     └─────────┘ └─────────┘   through the distributor's relay
//! ```

mod client;
mod connection;
mod delegate;
mod error;
mod server;

pub use client::Client;
pub use connection::HeartbeatConfig;
pub use delegate::{Delegate, NoDelegate};
pub use error::NetError;
pub use server::{HubConfig, HubServer, Mode};
