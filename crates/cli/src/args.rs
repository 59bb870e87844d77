//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Klangreise cache administration.
#[derive(Parser, Debug)]
#[command(name = "klangreise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file layered over the defaults
    #[arg(long, value_name = "FILE", env = "KLANGREISE_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every core asset into the current cache store
    Install,

    /// Evict every cache store except the current one
    Activate,

    /// List cache stores with their entry counts
    Status,

    /// Run one request through the cache controller
    Fetch(FetchArgs),
}

/// Arguments for the `fetch` command.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Site path (`/index.html`) or absolute URL
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Declared destination (document, audio, video, image, script, ...)
    #[arg(long, short, value_name = "DEST", default_value = "empty")]
    pub destination: String,

    /// HTTP method
    #[arg(long, short = 'X', value_name = "METHOD", default_value = "GET")]
    pub method: String,
}
