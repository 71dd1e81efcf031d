//! Circular statistics on angles expressed in degrees.
//!
//! The mean direction and circular standard deviation are computed from the
//! **mean resultant vector** of the sample:
//!
//! ```text
//! C = mean(cos θ),  S = mean(sin θ),  R̄ = sqrt(C² + S²)
//! mean = atan2(S, C)
//! sd   = sqrt(-2 ln R̄)
//! ```
//!
//! When every angle is identical `R̄ = 1` and the standard deviation is exactly `0`.
//! Rounding can push `R̄` marginally above one, so it is clamped before the logarithm.
use crate::constants::{Degree, Radian};

/// Wrap an angle in radians to `(-π, π]`.
#[inline]
pub fn wrap_radians(a: Radian) -> Radian {
    let tau = std::f64::consts::TAU;
    let mut w = a.rem_euclid(tau);
    if w > std::f64::consts::PI {
        w -= tau;
    }
    w
}

/// Wrap an angle in degrees to `(-180, 180]`.
#[inline]
pub fn wrap_degrees(a: Degree) -> Degree {
    wrap_radians(a.to_radians()).to_degrees()
}

/// Mean resultant vector `(C, S)` of a sample of angles in degrees.
///
/// Returns `None` for an empty sample or when any angle is non-finite.
pub fn mean_resultant(angles: &[Degree]) -> Option<(f64, f64)> {
    if angles.is_empty() || angles.iter().any(|a| !a.is_finite()) {
        return None;
    }
    let n = angles.len() as f64;
    let (c, s) = angles.iter().fold((0.0, 0.0), |(c, s), a| {
        let r = a.to_radians();
        (c + r.cos(), s + r.sin())
    });
    Some((c / n, s / n))
}

/// Mean resultant length `R̄ ∈ [0, 1]`.
pub fn mean_resultant_length(angles: &[Degree]) -> Option<f64> {
    mean_resultant(angles).map(|(c, s)| (c * c + s * s).sqrt().min(1.0))
}

/// Circular mean direction in degrees, `(-180, 180]`.
///
/// Returns `None` when the sample is empty or the resultant vanishes (no preferred direction).
pub fn circular_mean(angles: &[Degree]) -> Option<Degree> {
    let (c, s) = mean_resultant(angles)?;
    if c.hypot(s) < 1e-12 {
        return None;
    }
    Some(wrap_degrees(s.atan2(c).to_degrees()))
}

/// Circular standard deviation in degrees, `sqrt(-2 ln R̄)` converted from radians.
///
/// Returns `Some(0.0)` for a sample of identical angles and `None` when the resultant
/// vanishes (the statistic diverges).
pub fn circular_sd(angles: &[Degree]) -> Option<Degree> {
    let r = mean_resultant_length(angles)?;
    if r >= 1.0 {
        return Some(0.0);
    }
    if r < 1e-12 {
        return None;
    }
    let sd = (-2.0 * r.ln()).sqrt().to_degrees();
    // identical angles can leave R̄ a few ulps below one
    if sd < 1e-6 {
        Some(0.0)
    } else {
        Some(sd)
    }
}

#[cfg(test)]
mod circular_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wrap() {
        assert_abs_diff_eq!(wrap_degrees(190.0), -170.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_degrees(-190.0), 170.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_degrees(180.0), 180.0, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_degrees(360.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mean_across_zero() {
        let m = circular_mean(&[359.0, 1.0]).unwrap();
        assert_abs_diff_eq!(m, 0.0, epsilon = 1e-9);
        let m = circular_mean(&[170.0, -170.0]).unwrap();
        assert_abs_diff_eq!(m.abs(), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sd_identical_is_zero() {
        assert_eq!(circular_sd(&[42.0, 42.0, 42.0, 42.0]), Some(0.0));
    }

    #[test]
    fn test_sd_opposite_is_undefined() {
        assert_eq!(circular_sd(&[0.0, 180.0]), None);
        assert_eq!(circular_mean(&[0.0, 180.0]), None);
    }

    #[test]
    fn test_sd_positive() {
        let sd = circular_sd(&[-10.0, 0.0, 10.0]).unwrap();
        assert!(sd > 0.0 && sd < 10.0);
    }

    #[test]
    fn test_empty() {
        assert_eq!(circular_mean(&[]), None);
        assert_eq!(circular_sd(&[]), None);
    }
}
