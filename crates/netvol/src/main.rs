//! netvol CLI entry point.

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use netvol::cli::Cli;
use netvol_common::NetvolError;

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    let level = if cli.debug { "netvol=debug" } else { "netvol=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let result = cli.execute();
    if let Err(report) = &result {
        if report.downcast_ref::<NetvolError>().is_some_and(NetvolError::is_fatal) {
            tracing::error!(error = %report, "Driver cannot continue");
        }
    }
    result
}
