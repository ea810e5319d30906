//! MetricSet CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};
use metricset_common::telemetry::LogFormat;

/// metricset - compose MetricSet declarations offline
#[derive(Parser, Debug)]
#[command(name = "metricset")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format (text or json); filter with RUST_LOG
    #[arg(long, global = true, env = "METRICSET_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered metrics and addons
    List(commands::list::ListArgs),
    /// Compose a MetricSet file into containers, volumes, and scripts
    Compose(commands::compose::ComposeArgs),
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::List(args) => commands::list::run(args),
            Commands::Compose(args) => commands::compose::run(args),
        }
    }
}
