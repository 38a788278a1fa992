//! Process entry: flags, logging, message registration, and wiring.
//!
//! One binary, two roles. `--distributor` binds and relays forever with no
//! UI. Peer mode binds, dials the distributor (bounded retry here — the
//! server itself dials exactly once per call), and hands the terminal to
//! the view manager.

mod cli;
mod logging;
mod term;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use coinop_net::{HubConfig, HubServer};
use coinop_protocol::{register_all, ClientId, Registry};
use coinop_view::{SplashView, ViewContext, ViewManager, RENDER_TICK_HZ};

use crate::cli::Cli;
use crate::term::{TerminalGuard, TerminalScreen};

const DIAL_ATTEMPTS: u32 = 5;
const DIAL_BACKOFF: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Without a log file or a listen socket there is nothing useful this
    // process can do, so both failure paths exit immediately.
    if let Err(e) = logging::init(cli.port) {
        eprintln!("coinop: cannot open log-{}: {e}", cli.port);
        return ExitCode::FAILURE;
    }

    let outcome = if cli.distributor {
        run_distributor(cli).await
    } else {
        run_peer(cli).await
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("coinop: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_distributor(cli: Cli) -> Result<(), Box<dyn Error>> {
    let server = HubServer::distributor(HubConfig::on_port(cli.port)).await?;
    tracing::info!(addr = %server.local_addr(), "distributor up");
    server.run().await?;
    Ok(())
}

async fn run_peer(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut registry = Registry::new();
    register_all(&mut registry)?;
    let registry = Arc::new(registry);

    // The view layer and the server must agree on this process's identity:
    // Join requests carry it, and peers route replies back to it.
    let id = ClientId::generate();
    let ctx = ViewContext::new(id.clone(), cli.username.clone());
    let mut manager = ViewManager::new(
        Box::new(SplashView),
        ctx,
        Box::new(TerminalScreen::new()),
    );

    let config = HubConfig {
        id: Some(id),
        ..HubConfig::on_port(cli.port)
    };
    let server = HubServer::host(config, registry, Arc::new(manager.bridge())).await?;
    manager.attach_server(Arc::clone(&server));
    tokio::spawn(Arc::clone(&server).run());

    // Bounded retry lives here, at the call site.
    let mut dialed = false;
    for attempt in 1..=DIAL_ATTEMPTS {
        match server.connect(&cli.distributor_addr).await {
            Ok(_) => {
                dialed = true;
                break;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "distributor dial failed");
                tokio::time::sleep(DIAL_BACKOFF).await;
            }
        }
    }
    if !dialed {
        tracing::warn!(
            addr = %cli.distributor_addr,
            "no distributor reachable; only directly-dialed peers will be visible"
        );
    }

    let guard = TerminalGuard::enter()?;
    term::spawn_input_pump(manager.handle());

    let ticker = manager.handle();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(1000 / RENDER_TICK_HZ as u64));
        loop {
            interval.tick().await;
            if !ticker.tick() {
                break;
            }
        }
    });

    manager.run().await;
    drop(guard);
    Ok(())
}
