//! Command line interface for the lock service demo binary.
//!
//! This module defines the CLI structure and argument parsing using the
//! `clap` crate: starting the demo shell, validating configuration, and
//! displaying build information.

use clap::{Parser, Subcommand};

/// Main CLI structure for the lock service demo binary.
#[derive(Parser)]
#[command(name = "lockkeeper")]
#[command(about = "Lockkeeper - Distributed Advisory Lock Service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable verbose mode - shows detailed information
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable quiet mode - shows only essential messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: String,

    /// Command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for the lock service demo binary.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the demo shell, dispatching a handful of stub events against the
    /// lock manager.
    Start,
    /// Validate the configuration file
    Config {
        /// Validate the configuration file
        #[arg(short, long)]
        validate: bool,
    },
    /// Display build information
    Info,
}

/// Parse command line arguments and return the CLI structure.
pub fn parse_args() -> Cli {
    Cli::parse()
}
