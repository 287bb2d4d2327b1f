//! Paired statistics and weights, cleaned for fitting.
//!
//! Each row holds (Z_d, Z_a): the subtype-vs-subtype statistic and the
//! case-vs-control statistic for one SNP, plus an LD weight. Rows with any
//! non-finite entry are dropped on construction and counted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FitError;

/// Cleaned observations ready for fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observations {
    z: Vec<[f64; 2]>,
    weights: Vec<f64>,
    n_dropped: usize,
}

impl Observations {
    /// Build from rows of `[Z_d, Z_a]` and optional weights (default all ones).
    pub fn new(z: Vec<[f64; 2]>, weights: Option<Vec<f64>>) -> Result<Self, FitError> {
        let weights = match weights {
            Some(w) => {
                if w.len() != z.len() {
                    return Err(FitError::InputShape(format!(
                        "{} weights for {} observations",
                        w.len(),
                        z.len()
                    )));
                }
                w
            }
            None => vec![1.0; z.len()],
        };

        if let Some((row, &value)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| w.is_finite() && **w < 0.0)
        {
            return Err(FitError::InvalidWeight { row, value });
        }

        let n_in = z.len();
        let (z, weights): (Vec<[f64; 2]>, Vec<f64>) = z
            .into_iter()
            .zip(weights)
            .filter(|(zi, wi)| zi[0].is_finite() && zi[1].is_finite() && wi.is_finite())
            .unzip();
        let n_dropped = n_in - z.len();
        if n_dropped > 0 {
            debug!("Dropped {} of {} rows with non-finite values", n_dropped, n_in);
        }

        Ok(Self {
            z,
            weights,
            n_dropped,
        })
    }

    /// Build from two equal-length columns.
    pub fn from_columns(
        z_d: &[f64],
        z_a: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<Self, FitError> {
        if z_d.len() != z_a.len() {
            return Err(FitError::InputShape(format!(
                "Z_d has {} rows but Z_a has {}",
                z_d.len(),
                z_a.len()
            )));
        }
        let z = z_d.iter().zip(z_a.iter()).map(|(&d, &a)| [d, a]).collect();
        Self::new(z, weights.map(|w| w.to_vec()))
    }

    /// Build from generic rows; every row must have exactly two columns.
    pub fn from_rows(rows: &[Vec<f64>], weights: Option<&[f64]>) -> Result<Self, FitError> {
        let z = rows
            .iter()
            .enumerate()
            .map(|(i, r)| match r.as_slice() {
                &[d, a] => Ok([d, a]),
                _ => Err(FitError::InputShape(format!(
                    "row {} has {} columns, expected 2",
                    i,
                    r.len()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(z, weights.map(|w| w.to_vec()))
    }

    pub fn z(&self) -> &[[f64; 2]] {
        &self.z
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// Rows removed because of non-finite values.
    pub fn n_dropped(&self) -> usize {
        self.n_dropped
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Error unless at least one row carries positive weight.
    pub fn ensure_usable(&self) -> Result<(), FitError> {
        if self.is_empty() {
            return Err(FitError::EmptyData(format!(
                "all {} rows were non-finite",
                self.n_dropped
            )));
        }
        if self.total_weight() <= 0.0 {
            return Err(FitError::EmptyData("total weight is zero".into()));
        }
        Ok(())
    }
}

/// Check that a weight slice matches a data slice.
pub(crate) fn check_shape(z: &[[f64; 2]], weights: &[f64]) -> Result<(), FitError> {
    if z.len() != weights.len() {
        return Err(FitError::InputShape(format!(
            "{} weights for {} observations",
            weights.len(),
            z.len()
        )));
    }
    Ok(())
}
