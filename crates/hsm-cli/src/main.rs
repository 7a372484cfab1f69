mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use hsm::session::SessionStore;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let store = cli
        .session_location
        .clone()
        .map(SessionStore::new)
        .unwrap_or_default();

    match &cli.command {
        Commands::Login(args) => commands::login::run(&store, args).await?,
        Commands::Serve(args) => commands::serve::run(store, args).await?,
        Commands::Start(args) => commands::start::run(store, args).await?,
        Commands::DownloadUrl(args) => commands::download::run(store, args).await?,
    }

    Ok(())
}
