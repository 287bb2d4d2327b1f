//! subtest-core: mixture-model decomposition of paired association statistics
//!
//! Fits a three-class Gaussian mixture to pairs (Z_d, Z_a) of folded
//! association statistics by penalized EM: a null class, a class associated
//! with the second trait only, and a class associated with both, whose
//! covariance ρ measures shared signal. Also provides the pseudo-likelihood
//! ratio between null and full fits, simulation from the model, and fit
//! serialization.

pub mod data;
pub mod error;
pub mod mixture;
pub mod model;
pub mod sim;
pub mod util;

pub use data::Observations;
pub use error::FitError;
pub use mixture::density::{joint_log_likelihood, marginal_log_likelihood_za};
pub use mixture::{fit_mixture, EmFitter, FitConfig, FitStatus, Hypothesis, MixtureParams};
pub use model::compare::{fit_both, pseudo_likelihood_ratio, LikelihoodRatio};
pub use model::MixtureFit;
