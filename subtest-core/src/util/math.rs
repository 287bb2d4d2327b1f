//! Mathematical utility functions.

/// Density of a zero-mean bivariate normal with covariance
/// [[sx², cov], [cov, sy²]] at (x, y).
///
/// Returns 0 when the covariance is not positive definite.
pub fn bivariate_normal_pdf(x: f64, y: f64, sx: f64, sy: f64, cov: f64) -> f64 {
    let det = sx * sx * sy * sy - cov * cov;
    if det <= 0.0 {
        return 0.0;
    }
    let q = (sy * sy * x * x - 2.0 * cov * x * y + sx * sx * y * y) / det;
    (-0.5 * q).exp() / (2.0 * std::f64::consts::PI * det.sqrt())
}

/// Safe division: returns 0 if denominator is near zero.
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den.abs() > 1e-30 {
        num / den
    } else {
        0.0
    }
}

/// Square root of a second moment, or `fallback` if the moment is unusable.
pub fn sd_from_moment(moment_sum: f64, weight_sum: f64, fallback: f64) -> f64 {
    let var = safe_div(moment_sum, weight_sum);
    if var > 0.0 && var.is_finite() {
        var.sqrt()
    } else {
        fallback
    }
}
