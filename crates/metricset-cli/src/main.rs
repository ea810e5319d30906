//! MetricSet CLI
//!
//! Lists the plugin registry and composes MetricSet files without a cluster.

use clap::Parser;

use metricset_cli::{Cli, Result};
use metricset_common::telemetry::{init_logging, LogConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(LogConfig {
        format: cli.log_format,
        default_filter: None,
    })?;

    cli.run()
}
