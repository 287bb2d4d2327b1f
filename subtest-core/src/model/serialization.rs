//! Fit and checkpoint serialization.
//!
//! Uses bincode for fast, compact binary serialization.
//! Fit files (.subtest.fit): magic bytes (SBTF) + version + payload.
//! Checkpoints (.subtest.ckpt): magic bytes (SBTC) + version + EM state.
//! Optional JSON sidecar for human inspection.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::mixture::em::EmFitter;
use crate::mixture::params::Hypothesis;

use super::compare::LikelihoodRatio;
use super::fit::MixtureFit;

/// Save a fit to a binary file (.subtest.fit).
pub fn save_fit(fit: &MixtureFit, path: &Path) -> Result<()> {
    let encoded = bincode::serialize(fit)?;
    std::fs::write(path, &encoded)
        .with_context(|| format!("Failed to write fit file: {}", path.display()))?;
    Ok(())
}

/// Load a fit from a binary file (.subtest.fit).
pub fn load_fit(path: &Path) -> Result<MixtureFit> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read fit file: {}", path.display()))?;
    let fit: MixtureFit = bincode::deserialize(&data)?;

    if fit.magic != MixtureFit::MAGIC {
        bail!(
            "Invalid fit file: expected magic bytes {:?}, got {:?}",
            MixtureFit::MAGIC,
            fit.magic
        );
    }
    if fit.version > MixtureFit::VERSION {
        bail!(
            "Fit file version {} is newer than supported version {}",
            fit.version,
            MixtureFit::VERSION
        );
    }

    Ok(fit)
}

/// Save a JSON sidecar for debugging (.subtest.fit.json).
pub fn save_fit_json(fit: &MixtureFit, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(fit)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct Checkpoint {
    magic: [u8; 4],
    version: u32,
    fitter: EmFitter,
}

impl Checkpoint {
    const MAGIC: [u8; 4] = [b'S', b'B', b'T', b'C'];
    const VERSION: u32 = 1;
}

/// Write the full EM state so a run can be resumed later.
pub fn save_checkpoint(fitter: &EmFitter, path: &Path) -> Result<()> {
    let ckpt = Checkpoint {
        magic: Checkpoint::MAGIC,
        version: Checkpoint::VERSION,
        fitter: fitter.clone(),
    };
    let encoded = bincode::serialize(&ckpt)?;
    // replace atomically
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &encoded)
        .with_context(|| format!("Failed to write checkpoint: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Restore an EM state written by [`save_checkpoint`].
pub fn load_checkpoint(path: &Path) -> Result<EmFitter> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
    let ckpt: Checkpoint = bincode::deserialize(&data)?;
    if ckpt.magic != Checkpoint::MAGIC {
        bail!(
            "Invalid checkpoint: expected magic bytes {:?}, got {:?}",
            Checkpoint::MAGIC,
            ckpt.magic
        );
    }
    if ckpt.version != Checkpoint::VERSION {
        bail!("Unsupported checkpoint version {}", ckpt.version);
    }
    ckpt.fitter
        .validate()
        .with_context(|| format!("Corrupt checkpoint state in {}", path.display()))?;
    Ok(ckpt.fitter)
}

/// Summary of a fit (for display).
pub fn fit_summary(fit: &MixtureFit) -> String {
    let p = &fit.params;
    let header = format!(
        "Mixture fit v{}\n\
         Status: {:?} after {} iterations\n\
         Observations: {} ({} dropped)\n\
         Mixing weights: [{:.6}, {:.6}, {:.6}]\n\
         tau: {:.6}\n\
         sigma1: {:.6}",
        fit.version,
        fit.status,
        fit.iterations(),
        fit.n_observations,
        fit.n_dropped,
        p.pi0,
        p.pi1,
        p.pi2(),
        p.tau,
        p.sigma1,
    );
    let body = match fit.hypothesis {
        Hypothesis::Null => "Hypothesis: null (sigma2 = 1, rho = 0)".to_string(),
        Hypothesis::Full => format!(
            "Hypothesis: full\n\
             sigma2: {:.6}\n\
             rho: {:.6} (correlation {:.4})",
            p.sigma2,
            p.rho,
            p.rho / p.rho_bound(),
        ),
    };
    format!(
        "{}\n{}\n\
         Log-likelihood: {:.6}\n\
         Z_a marginal log-likelihood: {:.6}\n\
         Concentration C: {}",
        header, body, fit.log_likelihood, fit.marginal_log_likelihood_za, fit.concentration_c,
    )
}

/// Summary of a likelihood-ratio comparison (for display).
pub fn ratio_summary(lr: &LikelihoodRatio) -> String {
    format!(
        "Pseudo-likelihood ratio: {:.6}\n\
         Z_a marginal share: {:.6}\n\
         Conditional share: {:.6}",
        lr.statistic,
        lr.marginal_za_statistic,
        lr.conditional_statistic(),
    )
}
