//! Three-class mixture model for paired association statistics.
//!
//! - Parameter vector and its valid region
//! - Class densities and the penalized pseudo-log-likelihood
//! - Bisection search for the class-3 covariance ρ
//! - Constrained EM with optional extrapolation

pub mod accel;
pub mod density;
pub mod em;
pub mod params;
pub mod rho;

pub use em::{fit_mixture, EmFitter, FitConfig, FitStatus, TraceRow};
pub use params::{Hypothesis, MixtureParams};
