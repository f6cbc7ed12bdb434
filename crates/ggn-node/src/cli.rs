use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ggnode",
    about = "GGNetwork node: peer-to-peer transport and content-addressable store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the transport listen address
    #[arg(long, global = true)]
    pub listen: Option<String>,

    /// Override the store root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a node until Ctrl+C
    Serve(ServeArgs),
    /// Dial a node and send one message
    Send(SendArgs),
    /// Operate on the local content-addressable store
    Store(StoreArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Peers to dial once listening
    #[arg(long = "peer")]
    pub peers: Vec<String>,
}

#[derive(Args)]
pub struct SendArgs {
    pub addr: String,
    pub message: String,
}

#[derive(Args)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub action: StoreAction,
}

#[derive(Subcommand)]
pub enum StoreAction {
    /// Store a file (or stdin with `-`) under a key
    Put { key: String, source: String },
    /// Write a stored object to stdout
    Get { key: String },
    /// Check whether a key is stored
    Has { key: String },
    /// Remove a stored object
    Delete { key: String },
    /// Show where a key lives on disk
    Path { key: String },
    /// Remove everything under the store root
    Clear,
}
