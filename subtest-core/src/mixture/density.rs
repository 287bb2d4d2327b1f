//! Likelihood kernel for the three-class mixture.
//!
//! Class densities at a point z = (Z_d, Z_a):
//!   class 1: φ(Z_d) φ(Z_a)
//!   class 2: φ(Z_d) φ(Z_a; σ1)
//!   class 3: ½ [φ₂(z; τ, σ2, +ρ) + φ₂(z; τ, σ2, −ρ)]
//!
//! Class 3 averages the two sign variants because observations are stored
//! as absolute values, so the sign of the Z_d/Z_a coupling is lost.
//!
//! The objective is the pseudo-log-likelihood
//!   Σ w_i log f(z_i) + C log(π0 π1 π2)
//! where the C term acts as a symmetric Dirichlet penalty keeping the
//! mixing weights off the simplex boundary.
//!
//! Row sums run on rayon over fixed chunks. Partial sums are combined in
//! chunk order, so results do not depend on the thread count.

use rayon::prelude::*;
use statrs::distribution::{Continuous, Normal};
use tracing::trace;

use crate::data::check_shape;
use crate::error::FitError;
use crate::util::math::bivariate_normal_pdf;

use super::params::MixtureParams;

/// Replacement for a mixture density that underflows to exactly zero.
pub const DENSITY_FLOOR: f64 = 1e-300;

/// Replacement for a non-finite mixture density.
pub const DENSITY_CEILING: f64 = 1e300;

/// Rows per parallel work unit.
pub(crate) const CHUNK_SIZE: usize = 2048;

/// Map zero densities to [`DENSITY_FLOOR`] and non-finite ones to
/// [`DENSITY_CEILING`]; everything else passes through.
pub fn clamp_density(d: f64) -> f64 {
    if !d.is_finite() {
        DENSITY_CEILING
    } else if d == 0.0 {
        DENSITY_FLOOR
    } else {
        d
    }
}

fn centered_normal(name: &str, sd: f64) -> Result<Normal, FitError> {
    Normal::new(0.0, sd)
        .map_err(|e| FitError::ParameterRange(format!("{} = {}: {}", name, sd, e)))
}

/// Sign-folded bivariate normal density at z.
pub(crate) fn folded_bivariate_pdf(z: &[f64; 2], tau: f64, sigma2: f64, rho: f64) -> f64 {
    0.5 * (bivariate_normal_pdf(z[0], z[1], tau, sigma2, rho)
        + bivariate_normal_pdf(z[0], z[1], tau, sigma2, -rho))
}

/// Component densities for one parameter set.
///
/// The univariate normals are built once and reused for every row.
#[derive(Debug, Clone)]
pub(crate) struct ClassKernels {
    unit: Normal,
    sigma1: Normal,
    sigma2: Normal,
    tau: Normal,
    params: MixtureParams,
}

impl ClassKernels {
    pub(crate) fn new(params: &MixtureParams) -> Result<Self, FitError> {
        Ok(Self {
            unit: centered_normal("unit sd", 1.0)?,
            sigma1: centered_normal("sigma1", params.sigma1)?,
            sigma2: centered_normal("sigma2", params.sigma2)?,
            tau: centered_normal("tau", params.tau)?,
            params: *params,
        })
    }

    pub(crate) fn class1(&self, z: &[f64; 2]) -> f64 {
        self.unit.pdf(z[0]) * self.unit.pdf(z[1])
    }

    pub(crate) fn class2(&self, z: &[f64; 2]) -> f64 {
        self.unit.pdf(z[0]) * self.sigma1.pdf(z[1])
    }

    pub(crate) fn class3(&self, z: &[f64; 2]) -> f64 {
        let p = &self.params;
        if p.rho == 0.0 {
            self.tau.pdf(z[0]) * self.sigma2.pdf(z[1])
        } else {
            folded_bivariate_pdf(z, p.tau, p.sigma2, p.rho)
        }
    }

    /// Prior-weighted class densities [π0 d1, π1 d2, π2 d3] at z.
    pub(crate) fn weighted(&self, z: &[f64; 2]) -> [f64; 3] {
        let p = &self.params;
        [
            p.pi0 * self.class1(z),
            p.pi1 * self.class2(z),
            p.pi2() * self.class3(z),
        ]
    }

    /// Unclamped mixture density at z.
    pub(crate) fn mixture(&self, z: &[f64; 2]) -> f64 {
        self.weighted(z).iter().sum()
    }

    /// Unclamped 1-D mixture density of Z_a with sds (1, σ1, σ2).
    pub(crate) fn marginal_za(&self, za: f64) -> f64 {
        let p = &self.params;
        p.pi0 * self.unit.pdf(za) + p.pi1 * self.sigma1.pdf(za) + p.pi2() * self.sigma2.pdf(za)
    }
}

/// ∂(class-3 density)/∂ρ at z.
///
/// For one sign variant r = ±ρ with D = τ²σ2² − ρ² and
/// Q = (σ2² x² − 2 r x y + τ² y²) / D:
///   ∂ log φ₂ / ∂r = (r + x y − r Q) / D
pub(crate) fn class3_rho_slope(z: &[f64; 2], tau: f64, sigma2: f64, rho: f64) -> f64 {
    let (x, y) = (z[0], z[1]);
    let det = tau * tau * sigma2 * sigma2 - rho * rho;
    if det <= 0.0 {
        return 0.0;
    }
    let mut slope = 0.0;
    for sign in [1.0, -1.0] {
        let r = sign * rho;
        let phi = bivariate_normal_pdf(x, y, tau, sigma2, r);
        let q = (sigma2 * sigma2 * x * x - 2.0 * r * x * y + tau * tau * y * y) / det;
        slope += sign * phi * (r + x * y - r * q) / det;
    }
    0.5 * slope
}

fn mixing_penalty(p: &MixtureParams, c: f64) -> f64 {
    if c == 0.0 {
        return 0.0;
    }
    c * (p.pi0.ln() + p.pi1.ln() + p.pi2().ln())
}

/// Per-chunk accumulator merged in chunk order.
pub(crate) trait RowAccumulator: Default + Send {
    fn merge(&mut self, other: Self);
}

impl RowAccumulator for f64 {
    fn merge(&mut self, other: Self) {
        *self += other;
    }
}

#[derive(Debug, Default)]
struct LogLikSum {
    total: f64,
    clamped: usize,
}

impl RowAccumulator for LogLikSum {
    fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.clamped += other.clamped;
    }
}

/// Apply `f` to every (row, weight) pair and reduce deterministically.
pub(crate) fn fold_rows<A, F>(z: &[[f64; 2]], w: &[f64], f: F) -> A
where
    A: RowAccumulator,
    F: Fn(&mut A, &[f64; 2], f64) + Sync,
{
    let partials: Vec<A> = z
        .par_chunks(CHUNK_SIZE)
        .zip(w.par_chunks(CHUNK_SIZE))
        .map(|(zc, wc)| {
            let mut acc = A::default();
            for (zi, &wi) in zc.iter().zip(wc.iter()) {
                f(&mut acc, zi, wi);
            }
            acc
        })
        .collect();
    partials.into_iter().fold(A::default(), |mut acc, part| {
        acc.merge(part);
        acc
    })
}

/// Joint pseudo-log-likelihood without argument checks.
///
/// Parameters with a non-positive sd score −∞; validated parameters never do.
pub(crate) fn log_likelihood(z: &[[f64; 2]], w: &[f64], p: &MixtureParams, c: f64) -> f64 {
    let Ok(kernels) = ClassKernels::new(p) else {
        return f64::NEG_INFINITY;
    };
    let sum: LogLikSum = fold_rows(z, w, |acc: &mut LogLikSum, zi, wi| {
        let raw = kernels.mixture(zi);
        let d = clamp_density(raw);
        if d != raw {
            acc.clamped += 1;
        }
        acc.total += wi * d.ln();
    });
    if sum.clamped > 0 {
        trace!("Clamped {} mixture densities", sum.clamped);
    }
    sum.total + mixing_penalty(p, c)
}

/// Z_a-marginal pseudo-log-likelihood without argument checks.
pub(crate) fn marginal_za(z: &[[f64; 2]], w: &[f64], p: &MixtureParams, c: f64) -> f64 {
    let Ok(kernels) = ClassKernels::new(p) else {
        return f64::NEG_INFINITY;
    };
    let total: f64 = fold_rows(z, w, |acc: &mut f64, zi, wi| {
        *acc += wi * clamp_density(kernels.marginal_za(zi[1])).ln();
    });
    total + mixing_penalty(p, c)
}

/// ∂(joint log-likelihood)/∂ρ without argument checks.
///
/// Only the data term depends on ρ.
pub(crate) fn rho_slope(z: &[[f64; 2]], w: &[f64], p: &MixtureParams) -> f64 {
    let Ok(kernels) = ClassKernels::new(p) else {
        return 0.0;
    };
    let pi2 = p.pi2();
    fold_rows(z, w, |acc: &mut f64, zi, wi| {
        let dens = clamp_density(kernels.mixture(zi));
        let num = pi2 * class3_rho_slope(zi, p.tau, p.sigma2, p.rho);
        let term = wi * num / dens;
        if term.is_finite() {
            *acc += term;
        }
    })
}

/// Class-1 density for every observation.
pub fn density_class1(z: &[[f64; 2]]) -> Result<Vec<f64>, FitError> {
    let unit = centered_normal("unit sd", 1.0)?;
    Ok(z.iter().map(|zi| unit.pdf(zi[0]) * unit.pdf(zi[1])).collect())
}

/// Class-2 density for every observation.
pub fn density_class2(z: &[[f64; 2]], sigma1: f64) -> Result<Vec<f64>, FitError> {
    if !(sigma1 > 0.0 && sigma1.is_finite()) {
        return Err(FitError::ParameterRange(format!(
            "sigma1 = {} must be positive and finite",
            sigma1
        )));
    }
    let unit = centered_normal("unit sd", 1.0)?;
    let spread = centered_normal("sigma1", sigma1)?;
    Ok(z.iter().map(|zi| unit.pdf(zi[0]) * spread.pdf(zi[1])).collect())
}

/// Class-3 (sign-folded bivariate normal) density for every observation.
pub fn density_class3(
    z: &[[f64; 2]],
    tau: f64,
    sigma2: f64,
    rho: f64,
) -> Result<Vec<f64>, FitError> {
    if !(tau > 0.0 && tau.is_finite() && sigma2 > 0.0 && sigma2.is_finite()) {
        return Err(FitError::ParameterRange(format!(
            "tau = {} and sigma2 = {} must be positive and finite",
            tau, sigma2
        )));
    }
    if !(rho >= 0.0 && rho < tau * sigma2) {
        return Err(FitError::ParameterRange(format!(
            "rho = {} must lie in [0, tau * sigma2 = {})",
            rho,
            tau * sigma2
        )));
    }
    if rho == 0.0 {
        let zd = centered_normal("tau", tau)?;
        let za = centered_normal("sigma2", sigma2)?;
        return Ok(z.iter().map(|zi| zd.pdf(zi[0]) * za.pdf(zi[1])).collect());
    }
    Ok(z.iter()
        .map(|zi| folded_bivariate_pdf(zi, tau, sigma2, rho))
        .collect())
}

/// Mixture density for every observation, clamped into (0, ∞).
pub fn mixture_density(z: &[[f64; 2]], p: &MixtureParams) -> Result<Vec<f64>, FitError> {
    p.validate()?;
    let kernels = ClassKernels::new(p)?;
    Ok(z.iter()
        .map(|zi| clamp_density(kernels.mixture(zi)))
        .collect())
}

/// Joint pseudo-log-likelihood Σ w log f(z) + C log(π0 π1 π2).
///
/// Usable on its own, e.g. to compare a null and a full fit on the same data.
pub fn joint_log_likelihood(
    z: &[[f64; 2]],
    p: &MixtureParams,
    weights: &[f64],
    c: f64,
) -> Result<f64, FitError> {
    check_shape(z, weights)?;
    p.validate()?;
    check_concentration(c)?;
    Ok(log_likelihood(z, weights, p, c))
}

/// Pseudo-log-likelihood of Z_a alone under the 1-D mixture with sds
/// (1, σ1, σ2) and the same mixing weights and penalty.
pub fn marginal_log_likelihood_za(
    z: &[[f64; 2]],
    p: &MixtureParams,
    weights: &[f64],
    c: f64,
) -> Result<f64, FitError> {
    check_shape(z, weights)?;
    p.validate()?;
    check_concentration(c)?;
    Ok(marginal_za(z, weights, p, c))
}

/// Closed-form ∂(joint log-likelihood)/∂ρ at `p`.
pub fn rho_derivative(
    z: &[[f64; 2]],
    p: &MixtureParams,
    weights: &[f64],
) -> Result<f64, FitError> {
    check_shape(z, weights)?;
    p.validate()?;
    Ok(rho_slope(z, weights, p))
}

pub(crate) fn check_concentration(c: f64) -> Result<(), FitError> {
    if c >= 0.0 && c.is_finite() {
        Ok(())
    } else {
        Err(FitError::InvalidConfig {
            field: "concentration_c",
            value: c,
            constraint: "must be finite and non-negative",
        })
    }
}
