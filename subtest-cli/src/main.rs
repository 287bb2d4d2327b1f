//! subtest: mixture-model decomposition of paired association statistics.
//!
//! CLI entry point using clap for argument parsing.

mod commands;
mod zfile;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "subtest",
    version,
    about = "Three-class mixture fits for subtype-vs-subtype and case-vs-control Z-scores",
    long_about = "Fits a constrained Gaussian mixture to folded (Z_d, Z_a) pairs by penalized EM\n\
                   under a null and a full hypothesis and reports the pseudo-likelihood ratio."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the mixture under the null and/or full hypothesis
    Fit(commands::fit::FitArgs),

    /// Draw a synthetic Z-score table from the mixture
    Simulate(commands::simulate::SimulateArgs),

    /// Print a saved fit, optionally against a null fit
    Summary(commands::summary::SummaryArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Set up thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("subtest v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Summary(args) => commands::summary::run(args),
    }
}
