//! Draw synthetic paired statistics straight from the three-class mixture.
//!
//! Each draw picks a latent class with probabilities (π0, π1, π2), samples
//! (Z_d, Z_a) from that class and stores absolute values, mirroring how
//! observed statistics are folded. The generating parameters and class
//! labels travel with the data so a test can compare fit against truth.

use rand::Rng;
use statrs::distribution::Normal;

use crate::data::Observations;
use crate::error::FitError;
use crate::mixture::params::MixtureParams;

/// Simulated observations bundled with the parameters that produced them.
#[derive(Debug, Clone)]
pub struct SimulatedData {
    pub observations: Observations,
    pub params: MixtureParams,
    /// Latent class per row: 0, 1 or 2.
    pub classes: Vec<u8>,
}

impl SimulatedData {
    /// Number of rows drawn from each class.
    pub fn class_counts(&self) -> [usize; 3] {
        let mut counts = [0usize; 3];
        for &c in &self.classes {
            counts[c as usize] += 1;
        }
        counts
    }
}

/// Draw `n` folded observations with unit weights.
pub fn simulate_mixture<R: Rng + ?Sized>(
    n: usize,
    params: &MixtureParams,
    rng: &mut R,
) -> Result<SimulatedData, FitError> {
    params.validate()?;
    let classes: Vec<u8> = (0..n)
        .map(|_| {
            let u: f64 = rng.gen();
            if u < params.pi0 {
                0
            } else if u < params.pi0 + params.pi1 {
                1
            } else {
                2
            }
        })
        .collect();
    simulate_classes(&classes, params, rng)
}

/// Draw one folded observation per entry of `classes`.
///
/// Useful when exact class counts are wanted (e.g. 800/150/50).
pub fn simulate_classes<R: Rng + ?Sized>(
    classes: &[u8],
    params: &MixtureParams,
    rng: &mut R,
) -> Result<SimulatedData, FitError> {
    params.validate()?;
    let std_normal = Normal::new(0.0, 1.0)
        .map_err(|e| FitError::ParameterRange(format!("standard normal: {}", e)))?;
    let corr = params.rho / params.rho_bound();
    let resid = (1.0 - corr * corr).sqrt();

    let mut z = Vec::with_capacity(classes.len());
    for &class in classes {
        let e1: f64 = rng.sample(std_normal);
        let e2: f64 = rng.sample(std_normal);
        let row = match class {
            0 => [e1, e2],
            1 => [e1, params.sigma1 * e2],
            2 => [params.tau * e1, params.sigma2 * (corr * e1 + resid * e2)],
            other => {
                return Err(FitError::InputShape(format!(
                    "class label {} is not one of 0, 1, 2",
                    other
                )))
            }
        };
        z.push([row[0].abs(), row[1].abs()]);
    }

    Ok(SimulatedData {
        observations: Observations::new(z, None)?,
        params: *params,
        classes: classes.to_vec(),
    })
}
