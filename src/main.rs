mod bootstrap;
mod cli;
mod config;
mod daemon;
mod dispatch;
mod error;
mod ipc;
mod models;
mod registry;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{App, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides --debug
    let default_filter = if cli.debug {
        "warn,mpris_arbiter=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let app = App::new()?;
    app.run(&cli).await
}
