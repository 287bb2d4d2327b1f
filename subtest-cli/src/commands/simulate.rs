//! Draw a synthetic Z-score table from the mixture.
//!
//! subtest simulate --n 1000 --params 0.8,0.15,2,1.5,4,3 --output-file z.tsv

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use subtest_core::sim::simulate_mixture;
use subtest_core::MixtureParams;

use crate::zfile::write_z_file;

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of rows to draw
    #[arg(long)]
    n: usize,

    /// Generating values pi0,pi1,tau,sigma1,sigma2,rho
    #[arg(long, default_value = "0.8,0.15,2,1.5,4,3")]
    params: String,

    /// Random seed
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Output table path
    #[arg(long)]
    output_file: String,

    /// Add the latent class (1, 2 or 3) as a column
    #[arg(long, default_value = "false")]
    with_class: bool,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    let values = args
        .params
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid parameter value '{}'", s))
        })
        .collect::<Result<Vec<_>>>()?;
    let params = MixtureParams::from_slice(&values)?;

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let sim = simulate_mixture(args.n, &params, &mut rng)?;
    let counts = sim.class_counts();
    info!(
        "Simulated {} rows with class counts {:?} (seed {})",
        args.n, counts, args.seed
    );

    let classes = args.with_class.then_some(sim.classes.as_slice());
    write_z_file(Path::new(&args.output_file), &sim.observations, classes)?;
    println!("Wrote {} rows to {}", args.n, args.output_file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zfile::parse_z_file;

    #[test]
    fn test_simulate_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.tsv");
        run(SimulateArgs {
            n: 50,
            params: "0.7,0.2,2,1.5,3,1".into(),
            seed: 1,
            output_file: path.to_string_lossy().to_string(),
            with_class: true,
        })
        .unwrap();
        let t = parse_z_file(&path, "Z_d", "Z_a", Some("weight")).unwrap();
        assert_eq!(t.z.len(), 50);
        assert!(t.z.iter().all(|r| r[0] >= 0.0 && r[1] >= 0.0));
    }

    #[test]
    fn test_simulate_rejects_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let res = run(SimulateArgs {
            n: 5,
            params: "0.7,0.4,2,1.5,3,1".into(),
            seed: 1,
            output_file: dir.path().join("x.tsv").to_string_lossy().to_string(),
            with_class: false,
        });
        assert!(res.is_err());
    }
}
