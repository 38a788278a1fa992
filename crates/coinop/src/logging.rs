//! Operational logging to an append-only per-port file.
//!
//! Stdout belongs to the terminal UI, so everything tracing emits goes to
//! `log-<port>` in the working directory. `RUST_LOG` filters as usual.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub fn init(port: u16) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(format!("log-{port}"))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
