//! Null versus full hypothesis comparison.
//!
//! The statistic is 2·(LL_full − LL_null) on the penalized pseudo-likelihood.
//! No p-value is attached: the pseudo-likelihood is not a true likelihood and
//! its calibration is left to the caller.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::Observations;
use crate::error::FitError;
use crate::mixture::em::{fit_mixture, FitConfig};
use crate::mixture::params::{Hypothesis, MixtureParams};

use super::fit::MixtureFit;

/// Pseudo-likelihood ratio between a null and a full fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodRatio {
    /// 2·(LL_full − LL_null) on the joint likelihood.
    pub statistic: f64,
    /// Same, on the Z_a-marginal likelihood.
    pub marginal_za_statistic: f64,
}

impl LikelihoodRatio {
    /// Part of the joint statistic not explained by the Z_a margin.
    pub fn conditional_statistic(&self) -> f64 {
        self.statistic - self.marginal_za_statistic
    }
}

/// Compare a null fit against a full fit on the same data.
pub fn pseudo_likelihood_ratio(
    null_fit: &MixtureFit,
    full_fit: &MixtureFit,
) -> Result<LikelihoodRatio, FitError> {
    if null_fit.hypothesis != Hypothesis::Null || full_fit.hypothesis != Hypothesis::Full {
        return Err(FitError::Incomparable(format!(
            "expected (Null, Full), got ({:?}, {:?})",
            null_fit.hypothesis, full_fit.hypothesis
        )));
    }
    if null_fit.n_observations != full_fit.n_observations {
        return Err(FitError::Incomparable(format!(
            "null fit used {} rows, full fit used {}",
            null_fit.n_observations, full_fit.n_observations
        )));
    }
    if null_fit.concentration_c != full_fit.concentration_c {
        return Err(FitError::Incomparable(format!(
            "concentration differs: {} vs {}",
            null_fit.concentration_c, full_fit.concentration_c
        )));
    }

    Ok(LikelihoodRatio {
        statistic: 2.0 * (full_fit.log_likelihood - null_fit.log_likelihood),
        marginal_za_statistic: 2.0
            * (full_fit.marginal_log_likelihood_za - null_fit.marginal_log_likelihood_za),
    })
}

/// Fit both hypotheses from the same start and compare them.
///
/// `config.fit_null` is ignored; each fit sets it as needed.
pub fn fit_both(
    data: &Observations,
    initial: MixtureParams,
    config: &FitConfig,
) -> Result<(MixtureFit, MixtureFit, LikelihoodRatio), FitError> {
    let null_cfg = FitConfig {
        fit_null: true,
        ..config.clone()
    };
    let full_cfg = FitConfig {
        fit_null: false,
        ..config.clone()
    };
    let null_fit = fit_mixture(data.clone(), initial, &null_cfg)?;
    let full_fit = fit_mixture(data.clone(), initial, &full_cfg)?;
    let lr = pseudo_likelihood_ratio(&null_fit, &full_fit)?;
    info!(
        "Pseudo-likelihood ratio: {:.4} (Z_a margin {:.4})",
        lr.statistic, lr.marginal_za_statistic
    );
    Ok((null_fit, full_fit, lr))
}
