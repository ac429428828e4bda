//! Angle normalization helpers
//!
//! Every heading and bearing in this crate lives in (-pi, pi]. Differences
//! of angles must go through [`angle_diff`] before they feed an innovation,
//! a covariance term or a sigma-point spread.

use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Normalize an angle to (-pi, pi]
pub fn wrap_angle(angle: f64) -> f64 {
    if !angle.is_finite() || (angle > -PI && angle <= PI) {
        return angle;
    }
    // rem_euclid lands in [0, 2pi), shift to [-pi, pi) then flip the lower bound
    let a = (angle + PI).rem_euclid(TWO_PI) - PI;
    if a <= -PI {
        a + TWO_PI
    } else {
        a
    }
}

/// Normalize every angle of a slice in place
pub fn wrap_angles(angles: &mut [f64]) {
    for a in angles.iter_mut() {
        *a = wrap_angle(*a);
    }
}

/// Wrapped difference `a - b`
pub fn angle_diff(a: f64, b: f64) -> f64 {
    wrap_angle(a - b)
}

/// Weighted mean of angles, accumulated as wrapped offsets from `reference`
///
/// Equals the plain weighted sum (wrapped) whenever no sample crosses the
/// +-pi seam, and stays correct when they do.
pub fn weighted_angle_mean<'a, I>(reference: f64, samples: I) -> f64
where
    I: IntoIterator<Item = (f64, &'a f64)>,
{
    let offset: f64 = samples
        .into_iter()
        .map(|(w, &a)| w * angle_diff(a, reference))
        .sum();
    wrap_angle(reference + offset)
}
