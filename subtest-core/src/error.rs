//! Error types for mixture-model fitting.
//!
//! Only contract violations surface as errors. Numerical trouble during
//! iteration (underflowing densities, overshooting extrapolation) is
//! absorbed by the fitting engine and never reaches the caller.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Input shape mismatch: {0}")]
    InputShape(String),

    #[error("Parameter out of range: {0}")]
    ParameterRange(String),

    #[error("Invalid configuration: {field} = {value} ({constraint})")]
    InvalidConfig {
        field: &'static str,
        value: f64,
        constraint: &'static str,
    },

    #[error("Negative weight {value} at row {row}")]
    InvalidWeight { row: usize, value: f64 },

    #[error("No usable observations: {0}")]
    EmptyData(String),

    #[error("Fits are not comparable: {0}")]
    Incomparable(String),
}
