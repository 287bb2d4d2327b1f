//! Bisection search for the class-3 covariance ρ.
//!
//! ρ has no closed-form update. With every other parameter held fixed the
//! log-likelihood is assumed unimodal in ρ on [0, τσ2), so the sign of the
//! analytic derivative tells which half of the bracket holds the maximizer.
//! The derivative is exactly zero at ρ = 0 (the two sign variants cancel),
//! so the search probes slightly above zero to decide whether the optimum
//! sits on the boundary.

use super::density::rho_slope;
use super::params::MixtureParams;

/// Configuration for the ρ search.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RhoSearchConfig {
    /// Stop once the bracket is narrower than this.
    pub tol: f64,
    /// Point just above zero where the boundary check is made.
    pub probe: f64,
    /// Gap kept below τσ2 so the covariance stays positive definite.
    pub margin: f64,
    /// Hard cap on bisection steps.
    pub max_iter: usize,
}

impl Default for RhoSearchConfig {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            probe: 1e-5,
            margin: 1e-6,
            max_iter: 200,
        }
    }
}

/// Result of the ρ search.
#[derive(Debug, Clone, Copy)]
pub struct RhoSearchResult {
    pub rho: f64,
    /// Number of derivative evaluations.
    pub evaluations: usize,
    /// True when the boundary check settled on ρ = 0.
    pub at_boundary: bool,
}

/// Locate the maximizer of a function on [0, upper) from the sign of its
/// derivative.
///
/// `derivative` must be decreasing through its root (unimodal objective).
pub fn bisect_rho<F>(derivative: F, upper: f64, config: &RhoSearchConfig) -> RhoSearchResult
where
    F: Fn(f64) -> f64,
{
    let hi_limit = upper - config.margin;
    if !(hi_limit > config.probe) {
        return RhoSearchResult {
            rho: 0.0,
            evaluations: 0,
            at_boundary: true,
        };
    }

    let start = derivative(config.probe);
    if !(start > 0.0) {
        return RhoSearchResult {
            rho: 0.0,
            evaluations: 1,
            at_boundary: true,
        };
    }

    let mut lo = 0.0;
    let mut hi = hi_limit;
    let mut evaluations = 1;
    while hi - lo > config.tol && evaluations <= config.max_iter {
        let mid = 0.5 * (lo + hi);
        let d = derivative(mid);
        evaluations += 1;
        if d > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    RhoSearchResult {
        rho: 0.5 * (lo + hi),
        evaluations,
        at_boundary: false,
    }
}

/// Maximize the joint log-likelihood over ρ with the other five
/// parameters of `params` fixed.
pub fn maximize_rho(
    z: &[[f64; 2]],
    weights: &[f64],
    params: &MixtureParams,
    config: &RhoSearchConfig,
) -> RhoSearchResult {
    let derivative = |rho: f64| rho_slope(z, weights, &MixtureParams { rho, ..*params });
    bisect_rho(derivative, params.rho_bound(), config)
}
