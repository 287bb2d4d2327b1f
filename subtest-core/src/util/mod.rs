//! Numeric helpers shared across the fitting engine.

pub mod math;
