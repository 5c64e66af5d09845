//! CLI definitions for busloop.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// busloop CLI.
#[derive(Parser)]
#[command(name = "busloop")]
#[command(about = "Probe bus objects through a managed background loop")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: ./busloop.toml, then the user config dir)
    #[arg(short, long, global = true, env = "BUSLOOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to daily rolling files in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Fetch every property of an interface and print it
    Probe {
        /// Bus name of the service (default: [target] service)
        #[arg(long)]
        service: Option<String>,

        /// Object path (default: [target] path)
        #[arg(long)]
        path: Option<String>,

        /// Interface name (default: the service name)
        #[arg(long)]
        interface: Option<String>,

        /// Print the properties as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration file
    CheckConfig,
}
