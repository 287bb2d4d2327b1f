//! Mixture parameter vector θ = (π0, π1, τ, σ1, σ2, ρ) and its validity region.
//!
//! The valid region is the open simplex for the mixing weights together
//! with a positive-definite class-3 covariance [[τ², ρ], [ρ, σ2²]].

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Which hypothesis a fit was run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hypothesis {
    /// σ2 pinned to 1, ρ pinned to 0.
    Null,
    /// All six parameters free.
    Full,
}

impl Hypothesis {
    /// Numeric tag: 0 for null, 1 for full.
    pub fn flag(self) -> u8 {
        match self {
            Hypothesis::Null => 0,
            Hypothesis::Full => 1,
        }
    }
}

/// Parameters of the three-class mixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixtureParams {
    /// Weight of class 1 (null SNPs).
    pub pi0: f64,
    /// Weight of class 2 (associated, not subtype-differentiating).
    pub pi1: f64,
    /// SD of Z_d in class 3.
    pub tau: f64,
    /// SD of Z_a in class 2.
    pub sigma1: f64,
    /// SD of Z_a in class 3.
    pub sigma2: f64,
    /// Covariance of Z_d and Z_a in class 3.
    pub rho: f64,
}

impl Default for MixtureParams {
    fn default() -> Self {
        Self {
            pi0: 0.8,
            pi1: 0.1,
            tau: 2.0,
            sigma1: 3.0,
            sigma2: 3.0,
            rho: 1.0,
        }
    }
}

impl MixtureParams {
    pub fn new(pi0: f64, pi1: f64, tau: f64, sigma1: f64, sigma2: f64, rho: f64) -> Self {
        Self {
            pi0,
            pi1,
            tau,
            sigma1,
            sigma2,
            rho,
        }
    }

    /// Build from a 6-element slice `[π0, π1, τ, σ1, σ2, ρ]`.
    ///
    /// Only the length is checked here; call [`MixtureParams::validate`]
    /// for the range constraints.
    pub fn from_slice(values: &[f64]) -> Result<Self, FitError> {
        match *values {
            [pi0, pi1, tau, sigma1, sigma2, rho] => {
                Ok(Self::new(pi0, pi1, tau, sigma1, sigma2, rho))
            }
            _ => Err(FitError::InputShape(format!(
                "parameter vector must have 6 elements, got {}",
                values.len()
            ))),
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.pi0,
            self.pi1,
            self.tau,
            self.sigma1,
            self.sigma2,
            self.rho,
        ]
    }

    /// Implied weight of class 3.
    pub fn pi2(&self) -> f64 {
        1.0 - self.pi0 - self.pi1
    }

    /// Pin σ2 = 1 and ρ = 0.
    pub fn pinned_to_null(mut self) -> Self {
        self.sigma2 = 1.0;
        self.rho = 0.0;
        self
    }

    /// Upper bound on ρ for a positive-definite class-3 covariance.
    pub fn rho_bound(&self) -> f64 {
        self.tau * self.sigma2
    }

    /// Membership test for the valid region.
    pub fn is_valid(&self) -> bool {
        self.violation().is_none()
    }

    /// Fail-fast form of [`MixtureParams::is_valid`].
    pub fn validate(&self) -> Result<(), FitError> {
        match self.violation() {
            None => Ok(()),
            Some(msg) => Err(FitError::ParameterRange(msg)),
        }
    }

    fn violation(&self) -> Option<String> {
        let in_unit = |p: f64| p > 0.0 && p < 1.0;
        if !in_unit(self.pi0) {
            return Some(format!("pi0 = {} must lie in (0, 1)", self.pi0));
        }
        if !in_unit(self.pi1) {
            return Some(format!("pi1 = {} must lie in (0, 1)", self.pi1));
        }
        if self.pi0 + self.pi1 >= 1.0 {
            return Some(format!(
                "pi0 + pi1 = {} must be below 1",
                self.pi0 + self.pi1
            ));
        }
        for (name, sd) in [
            ("tau", self.tau),
            ("sigma1", self.sigma1),
            ("sigma2", self.sigma2),
        ] {
            if !(sd > 0.0 && sd.is_finite()) {
                return Some(format!("{} = {} must be positive and finite", name, sd));
            }
        }
        if !(self.rho >= 0.0) {
            return Some(format!("rho = {} must be non-negative", self.rho));
        }
        if self.rho >= self.rho_bound() {
            return Some(format!(
                "rho = {} must be below tau * sigma2 = {}",
                self.rho,
                self.rho_bound()
            ));
        }
        None
    }

    /// Componentwise `self - other`, used as the acceleration direction.
    pub fn delta(&self, other: &Self) -> [f64; 6] {
        let a = self.to_array();
        let b = other.to_array();
        std::array::from_fn(|i| a[i] - b[i])
    }

    /// `self + scale * direction`, with no range checks.
    pub fn shifted(&self, direction: &[f64; 6], scale: f64) -> Self {
        let a = self.to_array();
        let v: [f64; 6] = std::array::from_fn(|i| a[i] + scale * direction[i]);
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}
