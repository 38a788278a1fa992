//! Command-line surface.

use clap::Parser;

/// Terminal multiplayer game hub.
///
/// Run one distributor somewhere reachable, point peers at it, and browse.
#[derive(Debug, Parser)]
#[command(name = "coinop", version, about)]
pub struct Cli {
    /// Run as the central distributor (rendezvous/relay) instead of a peer.
    #[arg(short = 'd', long)]
    pub distributor: bool,

    /// Address of the distributor to dial on startup (peer mode).
    #[arg(long, visible_alias = "da", default_value = "149.28.43.157:6824")]
    pub distributor_addr: String,

    /// Port to listen on; the process binds 0.0.0.0:<port>.
    #[arg(short = 'p', long, default_value_t = 6824)]
    pub port: u16,

    /// Name shown to other players.
    #[arg(long, default_value = "anon")]
    pub username: String,
}
