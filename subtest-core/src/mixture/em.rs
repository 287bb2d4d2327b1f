//! Constrained EM for the three-class mixture.
//!
//! Each iteration:
//!   1. E-step: responsibilities r_ik ∝ π_k f_k(z_i)
//!   2. π_k = (Σ w r_k + C) / (Σ w + 3C)
//!   3. τ² = Σ w r_3 Z_d² / Σ w r_3,  σ1² = Σ w r_2 Z_a² / Σ w r_2
//!   4. full hypothesis only: σ2² = Σ w r_3 Z_a² / Σ w r_3, then ρ by
//!      bisection on ∂logL/∂ρ
//!   5. optional extrapolation, then a convergence check on |ΔlogL|
//!
//! The loop is exposed as a steppable [`EmFitter`] so callers can stop
//! early, inspect intermediate state or checkpoint it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::{check_shape, Observations};
use crate::error::FitError;
use crate::model::fit::MixtureFit;
use crate::util::math::sd_from_moment;

use super::accel::{accelerate, AccelConfig};
use super::density::{
    check_concentration, fold_rows, log_likelihood, marginal_za, ClassKernels,
    RowAccumulator,
};
use super::params::{Hypothesis, MixtureParams};
use super::rho::{maximize_rho, RhoSearchConfig};

/// Smallest mixing weight the M-step may produce. Only reachable when C = 0.
const MIXING_FLOOR: f64 = 1e-12;

/// Configuration for a mixture fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Pin σ2 = 1 and ρ = 0.
    pub fit_null: bool,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop when |ΔlogL| falls below this.
    pub tolerance: f64,
    /// Floor τ, σ1, σ2 at 1.
    pub enforce_min_sd_1: bool,
    pub use_acceleration: bool,
    /// Dirichlet-style penalty weight on log(π0 π1 π2).
    pub concentration_c: f64,
    /// Keep the cleaned data in the returned fit.
    pub keep_data: bool,
    pub accel: AccelConfig,
    pub rho_search: RhoSearchConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            fit_null: false,
            max_iterations: 10_000,
            tolerance: 1e-4,
            enforce_min_sd_1: false,
            use_acceleration: true,
            concentration_c: 1.0,
            keep_data: false,
            accel: AccelConfig::default(),
            rho_search: RhoSearchConfig::default(),
        }
    }
}

impl FitConfig {
    pub fn hypothesis(&self) -> Hypothesis {
        if self.fit_null {
            Hypothesis::Null
        } else {
            Hypothesis::Full
        }
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.max_iterations == 0 {
            return Err(FitError::InvalidConfig {
                field: "max_iterations",
                value: 0.0,
                constraint: "must be positive",
            });
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(FitError::InvalidConfig {
                field: "tolerance",
                value: self.tolerance,
                constraint: "must be positive and finite",
            });
        }
        check_concentration(self.concentration_c)?;
        if !(self.accel.multiplier > 0.0) {
            return Err(FitError::InvalidConfig {
                field: "accel.multiplier",
                value: self.accel.multiplier,
                constraint: "must be positive",
            });
        }
        if !(self.accel.sd_floor > 0.0) {
            return Err(FitError::InvalidConfig {
                field: "accel.sd_floor",
                value: self.accel.sd_floor,
                constraint: "must be positive",
            });
        }
        if !(self.accel.prob_floor > 0.0 && self.accel.prob_floor < 0.5) {
            return Err(FitError::InvalidConfig {
                field: "accel.prob_floor",
                value: self.accel.prob_floor,
                constraint: "must lie in (0, 0.5)",
            });
        }
        if !(self.accel.rho_cap_fraction > 0.0 && self.accel.rho_cap_fraction < 1.0) {
            return Err(FitError::InvalidConfig {
                field: "accel.rho_cap_fraction",
                value: self.accel.rho_cap_fraction,
                constraint: "must lie in (0, 1)",
            });
        }
        if !(self.rho_search.tol > 0.0) {
            return Err(FitError::InvalidConfig {
                field: "rho_search.tol",
                value: self.rho_search.tol,
                constraint: "must be positive",
            });
        }
        Ok(())
    }

    /// Lowest SD the iteration may produce.
    fn min_sd(&self) -> Option<f64> {
        self.enforce_min_sd_1.then_some(1.0)
    }
}

/// Where the iteration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Iterating,
    Converged,
    MaxIterReached,
}

impl FitStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, FitStatus::Iterating)
    }
}

/// One row of the optimization history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    /// 0 for the starting point.
    pub iteration: usize,
    pub params: MixtureParams,
    pub log_likelihood: f64,
}

/// Weighted responsibility sums from one E-step.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SufficientStats {
    pub weight: f64,
    /// Σ w r_k per class.
    pub class_weight: [f64; 3],
    /// Σ w r_2 Z_a²
    pub za2_class2: f64,
    /// Σ w r_3 Z_d²
    pub zd2_class3: f64,
    /// Σ w r_3 Z_a²
    pub za2_class3: f64,
    /// Rows whose densities were all degenerate.
    pub degenerate: usize,
}

impl RowAccumulator for SufficientStats {
    fn merge(&mut self, other: Self) {
        self.weight += other.weight;
        for k in 0..3 {
            self.class_weight[k] += other.class_weight[k];
        }
        self.za2_class2 += other.za2_class2;
        self.zd2_class3 += other.zd2_class3;
        self.za2_class3 += other.za2_class3;
        self.degenerate += other.degenerate;
    }
}

/// Normalized class responsibilities at z; all zero if every density is degenerate.
pub(crate) fn responsibilities(z: &[f64; 2], kernels: &ClassKernels) -> [f64; 3] {
    let d = kernels.weighted(z);
    let total: f64 = d.iter().sum();
    if total > 0.0 && total.is_finite() {
        [d[0] / total, d[1] / total, d[2] / total]
    } else {
        [0.0; 3]
    }
}

pub(crate) fn e_step(z: &[[f64; 2]], w: &[f64], p: &MixtureParams) -> SufficientStats {
    // validated parameters always build
    let Ok(kernels) = ClassKernels::new(p) else {
        return SufficientStats {
            weight: w.iter().sum(),
            degenerate: z.len(),
            ..Default::default()
        };
    };
    fold_rows(z, w, |acc: &mut SufficientStats, zi, wi| {
        let r = responsibilities(zi, &kernels);
        if r == [0.0; 3] {
            acc.degenerate += 1;
        }
        acc.weight += wi;
        for k in 0..3 {
            acc.class_weight[k] += wi * r[k];
        }
        let (zd2, za2) = (zi[0] * zi[0], zi[1] * zi[1]);
        acc.za2_class2 += wi * r[1] * za2;
        acc.zd2_class3 += wi * r[2] * zd2;
        acc.za2_class3 += wi * r[2] * za2;
    })
}

/// Closed-form part of the M-step. ρ is left at 0 for the full hypothesis
/// and filled in by the root search afterwards.
pub(crate) fn m_step(
    prev: &MixtureParams,
    stats: &SufficientStats,
    c: f64,
    hypothesis: Hypothesis,
    min_sd: Option<f64>,
) -> MixtureParams {
    let denom = stats.weight + 3.0 * c;
    let mut pi0 = ((stats.class_weight[0] + c) / denom).max(MIXING_FLOOR);
    let mut pi1 = ((stats.class_weight[1] + c) / denom).max(MIXING_FLOOR);
    if pi0 + pi1 > 1.0 - MIXING_FLOOR {
        let scale = (1.0 - MIXING_FLOOR) / (pi0 + pi1);
        pi0 *= scale;
        pi1 *= scale;
    }

    let floor = |sd: f64| match min_sd {
        Some(m) => sd.max(m),
        None => sd,
    };
    let tau = floor(sd_from_moment(
        stats.zd2_class3,
        stats.class_weight[2],
        prev.tau,
    ));
    let sigma1 = floor(sd_from_moment(
        stats.za2_class2,
        stats.class_weight[1],
        prev.sigma1,
    ));

    let next = MixtureParams::new(pi0, pi1, tau, sigma1, 1.0, 0.0);
    match hypothesis {
        Hypothesis::Null => next,
        Hypothesis::Full => MixtureParams {
            sigma2: floor(sd_from_moment(
                stats.za2_class3,
                stats.class_weight[2],
                prev.sigma2,
            )),
            ..next
        },
    }
}

/// Steppable EM state.
///
/// Construction is the initializing phase: inputs are validated and the
/// starting objective is recorded as trace row 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmFitter {
    data: Observations,
    config: FitConfig,
    hypothesis: Hypothesis,
    params: MixtureParams,
    log_likelihood: f64,
    iteration: usize,
    status: FitStatus,
    trace: Vec<TraceRow>,
}

impl EmFitter {
    pub fn new(
        data: Observations,
        initial: MixtureParams,
        config: FitConfig,
    ) -> Result<Self, FitError> {
        config.validate()?;
        data.ensure_usable()?;
        initial.validate()?;

        let hypothesis = config.hypothesis();
        let mut params = match hypothesis {
            Hypothesis::Null => initial.pinned_to_null(),
            Hypothesis::Full => initial,
        };
        if let Some(m) = config.min_sd() {
            params.tau = params.tau.max(m);
            params.sigma1 = params.sigma1.max(m);
            params.sigma2 = params.sigma2.max(m);
        }

        let log_likelihood = log_likelihood(
            data.z(),
            data.weights(),
            &params,
            config.concentration_c,
        );

        info!(
            "Starting {:?}-hypothesis EM with n={} ({} rows dropped), loglik={:.4}",
            hypothesis,
            data.len(),
            data.n_dropped(),
            log_likelihood
        );

        Ok(Self {
            data,
            config,
            hypothesis,
            params,
            log_likelihood,
            iteration: 0,
            status: FitStatus::Iterating,
            trace: vec![TraceRow {
                iteration: 0,
                params,
                log_likelihood,
            }],
        })
    }

    /// Run one EM iteration. Does nothing once a terminal state is reached.
    pub fn step(&mut self) -> FitStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let z = self.data.z();
        let w = self.data.weights();
        let c = self.config.concentration_c;
        let prev = self.params;

        let stats = e_step(z, w, &prev);
        if stats.degenerate > 0 {
            debug!(
                "{} rows had degenerate class densities at iteration {}",
                stats.degenerate,
                self.iteration + 1
            );
        }

        let mut next = m_step(&prev, &stats, c, self.hypothesis, self.config.min_sd());
        if self.hypothesis == Hypothesis::Full {
            next.rho = maximize_rho(z, w, &next, &self.config.rho_search).rho;
        }
        let mut ll = log_likelihood(z, w, &next, c);

        if self.config.use_acceleration && self.iteration + 1 >= self.config.accel.min_iterations {
            let sd_floor = self
                .config
                .min_sd()
                .map_or(self.config.accel.sd_floor, |m| m.max(self.config.accel.sd_floor));
            let outcome = accelerate(z, w, c, &prev, &next, ll, &self.config.accel, sd_floor);
            next = outcome.params;
            ll = outcome.log_likelihood;
        }

        let delta = (ll - self.log_likelihood).abs();
        self.iteration += 1;
        self.params = next;
        self.log_likelihood = ll;
        self.trace.push(TraceRow {
            iteration: self.iteration,
            params: next,
            log_likelihood: ll,
        });

        debug!(
            "EM iter {}: pi=[{:.4}, {:.4}, {:.4}] tau={:.4} s1={:.4} s2={:.4} rho={:.4} loglik={:.6} delta={:.2e}",
            self.iteration,
            next.pi0,
            next.pi1,
            next.pi2(),
            next.tau,
            next.sigma1,
            next.sigma2,
            next.rho,
            ll,
            delta
        );

        self.status = if delta < self.config.tolerance {
            info!(
                "EM converged after {} iterations (loglik={:.6})",
                self.iteration, ll
            );
            FitStatus::Converged
        } else if self.iteration >= self.config.max_iterations {
            warn!(
                "EM did not converge after {} iterations (last delta={:.2e})",
                self.iteration, delta
            );
            FitStatus::MaxIterReached
        } else {
            FitStatus::Iterating
        };
        self.status
    }

    /// Iterate until a terminal state and build the fit.
    pub fn run(mut self) -> MixtureFit {
        while !self.status.is_terminal() {
            self.step();
        }
        self.finish()
    }

    /// Build the fit from the current state, terminal or not.
    pub fn finish(self) -> MixtureFit {
        let marginal = marginal_za(
            self.data.z(),
            self.data.weights(),
            &self.params,
            self.config.concentration_c,
        );
        let n_observations = self.data.len();
        let n_dropped = self.data.n_dropped();
        MixtureFit::new(
            self.hypothesis,
            self.params,
            self.trace,
            self.log_likelihood,
            marginal,
            self.status,
            self.config.concentration_c,
            n_observations,
            n_dropped,
            self.config.keep_data.then_some(self.data),
        )
    }

    pub fn params(&self) -> &MixtureParams {
        &self.params
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn status(&self) -> FitStatus {
        self.status
    }

    pub fn trace(&self) -> &[TraceRow] {
        &self.trace
    }

    pub fn hypothesis(&self) -> Hypothesis {
        self.hypothesis
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Re-check a state that did not come from [`EmFitter::new`], such as a
    /// deserialized checkpoint.
    pub fn validate(&self) -> Result<(), FitError> {
        self.config.validate()?;
        check_shape(self.data.z(), self.data.weights())?;
        self.data.ensure_usable()?;
        self.params.validate()?;
        if self.hypothesis != self.config.hypothesis() {
            return Err(FitError::ParameterRange(format!(
                "state is tagged {:?} but its config fits {:?}",
                self.hypothesis,
                self.config.hypothesis()
            )));
        }
        if self.hypothesis == Hypothesis::Null && self.params != self.params.pinned_to_null() {
            return Err(FitError::ParameterRange(format!(
                "null state has sigma2 = {} and rho = {}",
                self.params.sigma2, self.params.rho
            )));
        }
        if !self.log_likelihood.is_finite() {
            return Err(FitError::ParameterRange(format!(
                "log-likelihood {} is not finite",
                self.log_likelihood
            )));
        }
        Ok(())
    }

    /// Raise the iteration cap, e.g. after resuming from a checkpoint.
    /// A run stopped at the old cap becomes steppable again.
    pub fn extend_max_iterations(&mut self, max_iterations: usize) {
        self.config.max_iterations = max_iterations;
        if self.status == FitStatus::MaxIterReached && self.iteration < max_iterations {
            self.status = FitStatus::Iterating;
        }
    }
}

/// Fit the mixture from `initial` under `config`.
pub fn fit_mixture(
    data: Observations,
    initial: MixtureParams,
    config: &FitConfig,
) -> Result<MixtureFit, FitError> {
    Ok(EmFitter::new(data, initial, config.clone())?.run())
}
