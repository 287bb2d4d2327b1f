//! Fit the mixture under the null and/or full hypothesis.
//!
//! subtest fit --z-file ... --output-prefix ... [--hypothesis both|null|full]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use subtest_core::mixture::accel::AccelConfig;
use subtest_core::mixture::rho::RhoSearchConfig;
use subtest_core::model::serialization;
use subtest_core::{
    pseudo_likelihood_ratio, EmFitter, FitConfig, Hypothesis, MixtureFit, MixtureParams,
    Observations,
};

use crate::zfile::parse_z_file;

#[derive(Args)]
pub struct FitArgs {
    /// Z-score table (tab or space delimited, with header)
    #[arg(long)]
    z_file: String,

    /// Column holding the subtype-vs-subtype statistic
    #[arg(long, default_value = "Z_d")]
    zd_col: String,

    /// Column holding the case-vs-control statistic
    #[arg(long, default_value = "Z_a")]
    za_col: String,

    /// Column holding LD weights (default: all ones)
    #[arg(long)]
    weight_col: Option<String>,

    /// Hypotheses to fit: both, null, or full
    #[arg(long, default_value = "both")]
    hypothesis: String,

    /// Starting values pi0,pi1,tau,sigma1,sigma2,rho
    #[arg(long, default_value = "0.8,0.1,2,3,3,1")]
    init: String,

    /// Maximum EM iterations
    #[arg(long, default_value = "10000")]
    max_iter: usize,

    /// Convergence tolerance on the log-likelihood change
    #[arg(long, default_value = "1e-4")]
    tol: f64,

    /// Keep tau, sigma1 and sigma2 at or above 1
    #[arg(long, default_value = "false")]
    min_sd_1: bool,

    /// Disable the extrapolation step
    #[arg(long, default_value = "false")]
    no_accel: bool,

    /// Extrapolation step multiplier
    #[arg(long, default_value = "3")]
    accel_multiplier: f64,

    /// Dirichlet-style penalty weight on the mixing proportions
    #[arg(long, default_value = "1")]
    concentration: f64,

    /// Tolerance of the rho bisection
    #[arg(long, default_value = "1e-3")]
    rho_tol: f64,

    /// Output file prefix
    #[arg(long)]
    output_prefix: Option<String>,

    /// Store the cleaned data inside the fit file
    #[arg(long, default_value = "false")]
    keep_data: bool,

    /// Also save JSON sidecar for debugging
    #[arg(long, default_value = "false")]
    save_json: bool,

    /// Write a checkpoint every N iterations (requires --output-prefix)
    #[arg(long)]
    checkpoint_every: Option<usize>,

    /// Resume one fit from a checkpoint file
    #[arg(long)]
    resume: Option<String>,
}

impl FitArgs {
    fn hypotheses(&self) -> Result<Vec<Hypothesis>> {
        Ok(match self.hypothesis.to_lowercase().as_str() {
            "both" => vec![Hypothesis::Null, Hypothesis::Full],
            "null" => vec![Hypothesis::Null],
            "full" => vec![Hypothesis::Full],
            _ => bail!("Unknown hypothesis: {}", self.hypothesis),
        })
    }

    fn initial(&self) -> Result<MixtureParams> {
        let values = self
            .init
            .split(',')
            .map(|s| {
                s.trim()
                    .parse::<f64>()
                    .with_context(|| format!("Invalid starting value '{}'", s))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MixtureParams::from_slice(&values)?)
    }

    fn config(&self, hypothesis: Hypothesis) -> FitConfig {
        FitConfig {
            fit_null: hypothesis == Hypothesis::Null,
            max_iterations: self.max_iter,
            tolerance: self.tol,
            enforce_min_sd_1: self.min_sd_1,
            use_acceleration: !self.no_accel,
            concentration_c: self.concentration,
            keep_data: self.keep_data,
            accel: AccelConfig {
                multiplier: self.accel_multiplier,
                ..Default::default()
            },
            rho_search: RhoSearchConfig {
                tol: self.rho_tol,
                ..Default::default()
            },
        }
    }
}

fn tag(hypothesis: Hypothesis) -> &'static str {
    match hypothesis {
        Hypothesis::Null => "null",
        Hypothesis::Full => "full",
    }
}

fn output_path(prefix: &str, hypothesis: Hypothesis, ext: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}.{}", prefix, tag(hypothesis), ext))
}

/// Step a fitter to completion, checkpointing every `every` iterations.
fn drive(mut fitter: EmFitter, every: Option<usize>, ckpt: Option<&Path>) -> Result<MixtureFit> {
    while !fitter.status().is_terminal() {
        fitter.step();
        if let (Some(k), Some(path)) = (every, ckpt) {
            if fitter.iteration() % k == 0 && !fitter.status().is_terminal() {
                serialization::save_checkpoint(&fitter, path)?;
                info!(
                    "Checkpoint at iteration {} written to {}",
                    fitter.iteration(),
                    path.display()
                );
            }
        }
    }
    Ok(fitter.finish())
}

pub fn run(args: FitArgs) -> Result<()> {
    let hypotheses = args.hypotheses()?;
    let initial = args.initial()?;
    if args.checkpoint_every == Some(0) {
        bail!("--checkpoint-every must be a positive number of iterations");
    }
    if args.checkpoint_every.is_some() && args.output_prefix.is_none() {
        bail!("--checkpoint-every requires --output-prefix");
    }

    info!("=== Mixture fit ===");
    info!("Z-score file: {}", args.z_file);

    let table = parse_z_file(
        Path::new(&args.z_file),
        &args.zd_col,
        &args.za_col,
        args.weight_col.as_deref(),
    )?;
    let data: Observations = table.into_observations()?;
    info!(
        "Loaded {} rows ({} dropped for missing values)",
        data.len(),
        data.n_dropped()
    );

    let mut resumed = match &args.resume {
        Some(path) => {
            let mut fitter = serialization::load_checkpoint(Path::new(path))?;
            fitter.extend_max_iterations(args.max_iter);
            info!(
                "Resuming {} fit from {} at iteration {}",
                tag(fitter.hypothesis()),
                path,
                fitter.iteration()
            );
            Some(fitter)
        }
        None => None,
    };

    let mut fits = Vec::with_capacity(hypotheses.len());
    for hypothesis in hypotheses {
        let fitter = match resumed.take() {
            Some(f) if f.hypothesis() == hypothesis => f,
            other => {
                resumed = other;
                EmFitter::new(data.clone(), initial, args.config(hypothesis))?
            }
        };
        let ckpt = args
            .output_prefix
            .as_deref()
            .map(|p| output_path(p, hypothesis, "subtest.ckpt"));
        let fit = drive(fitter, args.checkpoint_every, ckpt.as_deref())?;

        if let Some(prefix) = &args.output_prefix {
            let path = output_path(prefix, hypothesis, "subtest.fit");
            serialization::save_fit(&fit, &path)?;
            info!("Fit saved to {}", path.display());
            if args.save_json {
                let json_path = output_path(prefix, hypothesis, "subtest.fit.json");
                serialization::save_fit_json(&fit, &json_path)?;
                info!("JSON sidecar saved to {}", json_path.display());
            }
        }

        println!("{}\n", serialization::fit_summary(&fit));
        fits.push(fit);
    }

    if let Some(f) = resumed {
        bail!(
            "Checkpoint holds a {} fit, which was not requested",
            tag(f.hypothesis())
        );
    }

    if let [null_fit, full_fit] = fits.as_slice() {
        let lr = pseudo_likelihood_ratio(null_fit, full_fit)?;
        println!("{}", serialization::ratio_summary(&lr));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: FitArgs,
    }

    fn parse(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["subtest", "--z-file", "z.tsv"];
        argv.extend_from_slice(extra);
        Harness::parse_from(argv).args
    }

    #[test]
    fn test_defaults_map_to_config() {
        let args = parse(&[]);
        let cfg = args.config(Hypothesis::Full);
        assert!(!cfg.fit_null);
        assert_eq!(cfg.max_iterations, 10_000);
        assert!(cfg.use_acceleration);
        assert_eq!(cfg.concentration_c, 1.0);
        assert_eq!(args.initial().unwrap(), MixtureParams::default());
        assert_eq!(
            args.hypotheses().unwrap(),
            vec![Hypothesis::Null, Hypothesis::Full]
        );
    }

    #[test]
    fn test_bad_init_and_hypothesis() {
        assert!(parse(&["--init", "0.8,0.1,2"]).initial().is_err());
        assert!(parse(&["--init", "0.8,x,2,3,3,1"]).initial().is_err());
        assert!(parse(&["--hypothesis", "alt"]).hypotheses().is_err());
        assert!(parse(&["--no-accel"]).config(Hypothesis::Null).fit_null);
    }

    #[test]
    fn test_zero_checkpoint_interval_rejected() {
        let args = parse(&["--checkpoint-every", "0", "--output-prefix", "out"]);
        let err = run(args).unwrap_err();
        assert!(err.to_string().contains("--checkpoint-every"));
    }

    #[test]
    fn test_run_writes_fits() {
        let dir = tempfile::tempdir().unwrap();
        let z_path = dir.path().join("z.tsv");
        let mut text = String::from("Z_d\tZ_a\n");
        for i in 0..200 {
            text.push_str(&format!(
                "{}\t{}\n",
                ((i * 7) % 19) as f64 * 0.2,
                ((i * 3) % 17) as f64 * 0.25
            ));
        }
        std::fs::write(&z_path, text).unwrap();
        let prefix = dir.path().join("out");

        let z_arg = z_path.to_string_lossy().to_string();
        let prefix_arg = prefix.to_string_lossy().to_string();
        let mut args = parse(&["--max-iter", "15", "--checkpoint-every", "5"]);
        args.z_file = z_arg;
        args.output_prefix = Some(prefix_arg.clone());
        run(args).unwrap();

        let null_fit =
            serialization::load_fit(&output_path(&prefix_arg, Hypothesis::Null, "subtest.fit"))
                .unwrap();
        assert_eq!(null_fit.hypothesis, Hypothesis::Null);
        assert!(output_path(&prefix_arg, Hypothesis::Full, "subtest.fit").exists());
    }
}
