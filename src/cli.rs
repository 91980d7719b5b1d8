//! CLI definitions for Conduit.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conduit CLI.
#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Trigger-driven messaging runtime")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "conduit.toml", global = true, env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Validate the configuration file
    Check,

    /// Print the effective scheduler, poller and gateway settings
    Describe,
}
