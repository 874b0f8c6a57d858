//! Command-line interface for chathub
//!
//! The binary is the launcher/bootstrap side of the daemon: it assembles the
//! settings tree, hydrates it and either runs the hub or performs one-shot
//! configuration commands against the local config directory.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// chathub command-line interface
#[derive(Parser)]
#[command(name = "chathub")]
#[command(about = "Chat-hub daemon with a live settings tree")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct ChatHubCli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration directory (defaults to ~/.config/chathub)
    #[arg(short, long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Subcommands; the daemon runs when none is given
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the hub daemon
    Run,

    /// Configuration management commands
    Config(ConfigCommands),
}

/// Configuration management subcommands
#[derive(Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// List the entries of a settings section
    Show {
        /// Dotted section path; empty for the root
        #[arg(default_value = "")]
        path: String,
    },

    /// Print a single parameter value
    Get {
        /// Dotted parameter path
        path: String,
    },

    /// Set a parameter value
    Set {
        /// Dotted parameter path
        path: String,
        /// Raw value, converted and validated by the parameter
        value: String,
        /// Commit in memory without writing the backing file
        #[arg(long)]
        no_persist: bool,
    },
}
