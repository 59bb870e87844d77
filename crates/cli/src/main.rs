//! klangreise: administer the offline cache from the command line.
//!
//! Runs the same lifecycle events as the proxy against the same SQLite
//! store. Reports go to stdout as JSON, logs to stderr.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use klangreise_client::{FetchClient, FetchConfig};
use klangreise_core::{AppConfig, CacheDb};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::{Cli, Commands};
use commands::Context;

fn init_tracing(verbose: bool) {
    let filter = if verbose { EnvFilter::new("debug") } else { EnvFilter::from_default_env() };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn print<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let storage = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network = FetchClient::new(FetchConfig::from(&config))?;
    let ctx = Context { config, storage: Arc::new(storage), network: Arc::new(network) };

    match &cli.command {
        Commands::Install => print(&commands::install(&ctx).await?),
        Commands::Activate => print(&commands::activate(&ctx).await?),
        Commands::Status => print(&commands::status(&ctx).await?),
        Commands::Fetch(args) => print(&commands::fetch(&ctx, args).await?),
    }
}
