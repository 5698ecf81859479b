//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Reclaim CLI - inspect engine discovery and exercise the session lifecycle
#[derive(Parser, Debug)]
#[command(name = "reclaim")]
#[command(about = "Application engine session lifecycle and leak reclamation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the engine driver and report where it came from
    Discover {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,

        /// Also print the effective configuration
        #[arg(long)]
        print_config: bool,
    },
    /// Run the load / session / dispose / shutdown cycle against the resolved engine
    Demo {
        /// Application class name to load
        #[arg(long)]
        app: String,

        /// Drop one session without closing it and wait for the reaper
        #[arg(long)]
        leak: bool,
    },
}
