//! MixtureFit: the outcome of one EM run, serialized to .subtest.fit files.

use serde::{Deserialize, Serialize};

use crate::data::Observations;
use crate::mixture::em::{FitStatus, TraceRow};
use crate::mixture::params::{Hypothesis, MixtureParams};

/// A completed (or interrupted) mixture fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixtureFit {
    /// Magic bytes for validation.
    pub magic: [u8; 4],
    /// Format version.
    pub version: u32,
    pub hypothesis: Hypothesis,
    /// Final parameter estimate.
    pub params: MixtureParams,
    /// One row per iteration, row 0 being the starting point.
    pub trace: Vec<TraceRow>,
    /// Penalized joint pseudo-log-likelihood at `params`.
    pub log_likelihood: f64,
    /// Penalized Z_a-marginal pseudo-log-likelihood at `params`.
    pub marginal_log_likelihood_za: f64,
    pub status: FitStatus,
    pub concentration_c: f64,
    /// Rows used in the fit.
    pub n_observations: usize,
    /// Rows removed for non-finite values.
    pub n_dropped: usize,
    /// Cleaned input, when requested.
    pub data: Option<Observations>,
}

impl MixtureFit {
    /// Magic bytes: "SBTF" (SuBTest Fit).
    pub const MAGIC: [u8; 4] = [b'S', b'B', b'T', b'F'];
    pub const VERSION: u32 = 1;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hypothesis: Hypothesis,
        params: MixtureParams,
        trace: Vec<TraceRow>,
        log_likelihood: f64,
        marginal_log_likelihood_za: f64,
        status: FitStatus,
        concentration_c: f64,
        n_observations: usize,
        n_dropped: usize,
        data: Option<Observations>,
    ) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            hypothesis,
            params,
            trace,
            log_likelihood,
            marginal_log_likelihood_za,
            status,
            concentration_c,
            n_observations,
            n_dropped,
            data,
        }
    }

    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    /// Number of EM iterations performed.
    pub fn iterations(&self) -> usize {
        self.trace.len().saturating_sub(1)
    }

    /// Change in log-likelihood over the last iteration.
    pub fn final_delta(&self) -> Option<f64> {
        match self.trace.as_slice() {
            [.., a, b] => Some(b.log_likelihood - a.log_likelihood),
            _ => None,
        }
    }

    /// 0 for the null hypothesis, 1 for the full one.
    pub fn hypothesis_flag(&self) -> u8 {
        self.hypothesis.flag()
    }

    /// Trace as a flat table: iteration, six parameters, log-likelihood.
    pub fn trace_table(&self) -> Vec<[f64; 8]> {
        self.trace
            .iter()
            .map(|row| {
                let p = row.params.to_array();
                [
                    row.iteration as f64,
                    p[0],
                    p[1],
                    p[2],
                    p[3],
                    p[4],
                    p[5],
                    row.log_likelihood,
                ]
            })
            .collect()
    }
}
