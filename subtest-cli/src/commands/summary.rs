//! Print a saved fit.
//!
//! subtest summary --fit-file out.full.subtest.fit [--null-fit-file out.null.subtest.fit]

use std::path::Path;

use anyhow::Result;
use clap::Args;

use subtest_core::model::serialization::{fit_summary, load_fit, ratio_summary};
use subtest_core::pseudo_likelihood_ratio;

#[derive(Args)]
pub struct SummaryArgs {
    /// Fit file (.subtest.fit)
    #[arg(long)]
    fit_file: String,

    /// Null fit to compare against (.subtest.fit)
    #[arg(long)]
    null_fit_file: Option<String>,

    /// Print the iteration trace
    #[arg(long, default_value = "false")]
    trace: bool,
}

pub fn run(args: SummaryArgs) -> Result<()> {
    let fit = load_fit(Path::new(&args.fit_file))?;

    println!("Fit: {}", args.fit_file);
    println!("{}", fit_summary(&fit));

    if args.trace {
        println!("iter\tpi0\tpi1\ttau\tsigma1\tsigma2\trho\tloglik");
        for row in fit.trace_table() {
            println!(
                "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
                row[0] as usize, row[1], row[2], row[3], row[4], row[5], row[6], row[7]
            );
        }
    }

    if let Some(null_path) = &args.null_fit_file {
        let null_fit = load_fit(Path::new(null_path))?;
        let lr = pseudo_likelihood_ratio(&null_fit, &fit)?;
        println!("{}", ratio_summary(&lr));
    }

    Ok(())
}
