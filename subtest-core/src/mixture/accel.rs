//! Extrapolation along the last EM displacement.
//!
//! EM creeps when the likelihood surface is flat. After an EM update
//! θ_old → θ_new this step tries θ_new + Δθ and then keeps adding
//! `multiplier`·Δθ while the likelihood improves. Every candidate is pulled
//! back into the valid region first, and the result is only kept if it beats
//! θ_new, so the step can never lower the objective.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::density::log_likelihood;
use super::params::MixtureParams;

/// Configuration for the acceleration step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelConfig {
    /// EM iterations to run before extrapolating.
    pub min_iterations: usize,
    /// Step added per advance, in units of the last displacement.
    pub multiplier: f64,
    /// Lower bound for π0 and π1 in a candidate.
    pub prob_floor: f64,
    /// Lower bound for τ, σ1, σ2 in a candidate.
    pub sd_floor: f64,
    /// ρ is capped at this fraction of τσ2.
    pub rho_cap_fraction: f64,
    /// Maximum number of advances per iteration.
    pub max_steps: usize,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            min_iterations: 5,
            multiplier: 3.0,
            prob_floor: 1e-64,
            sd_floor: 0.5,
            rho_cap_fraction: 0.95,
            max_steps: 50,
        }
    }
}

/// Outcome of one acceleration attempt.
#[derive(Debug, Clone, Copy)]
pub struct AccelOutcome {
    pub params: MixtureParams,
    pub log_likelihood: f64,
    /// Advances beyond the first extrapolated candidate.
    pub steps: usize,
    /// Whether the extrapolated point replaced the EM update.
    pub accepted: bool,
}

/// Pull a candidate back into the valid region.
///
/// `anchor` is the pre-acceleration point; its mixing weights are restored
/// when the candidate leaves the simplex. `sd_floor` already accounts for
/// any minimum-SD mode.
pub fn clamp_candidate(
    candidate: MixtureParams,
    anchor: &MixtureParams,
    config: &AccelConfig,
    sd_floor: f64,
) -> MixtureParams {
    let mut p = candidate;
    p.pi0 = p.pi0.max(config.prob_floor);
    p.pi1 = p.pi1.max(config.prob_floor);
    if !(p.pi0 + p.pi1 < 1.0) {
        p.pi0 = anchor.pi0;
        p.pi1 = anchor.pi1;
    }
    p.tau = p.tau.max(sd_floor);
    p.sigma1 = p.sigma1.max(sd_floor);
    p.sigma2 = p.sigma2.max(sd_floor);
    p.rho = p.rho.max(0.0).min(config.rho_cap_fraction * p.tau * p.sigma2);

    if p.is_valid() {
        p
    } else {
        *anchor
    }
}

/// Extrapolate from `current` along `current - previous`.
///
/// `current_ll` must be the objective at `current`.
#[allow(clippy::too_many_arguments)]
pub fn accelerate(
    z: &[[f64; 2]],
    w: &[f64],
    c: f64,
    previous: &MixtureParams,
    current: &MixtureParams,
    current_ll: f64,
    config: &AccelConfig,
    sd_floor: f64,
) -> AccelOutcome {
    let direction = current.delta(previous);
    let clamp = |p: MixtureParams| clamp_candidate(p, current, config, sd_floor);

    let mut best = clamp(current.shifted(&direction, 1.0));
    let mut best_ll = log_likelihood(z, w, &best, c);
    let mut steps = 0;
    while steps < config.max_steps {
        let next = clamp(best.shifted(&direction, config.multiplier));
        let next_ll = log_likelihood(z, w, &next, c);
        if next_ll > best_ll {
            best = next;
            best_ll = next_ll;
            steps += 1;
        } else {
            break;
        }
    }

    if best_ll > current_ll {
        trace!(
            "Acceleration accepted after {} advances: loglik {:.6} -> {:.6}",
            steps,
            current_ll,
            best_ll
        );
        AccelOutcome {
            params: best,
            log_likelihood: best_ll,
            steps,
            accepted: true,
        }
    } else {
        AccelOutcome {
            params: *current,
            log_likelihood: current_ll,
            steps,
            accepted: false,
        }
    }
}
