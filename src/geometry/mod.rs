//! # Geometry kernel
//!
//! Per-trackway kinematic and shape descriptors computed from a medial [`Trajectory`] and its
//! footprint sequence.
//!
//! Submodules
//! -----------------
//! * [`circular`] – resultant-vector mean and standard deviation of angles,
//! * [`polygon`] – convex hull, minimum-area rectangle and point-in-polygon tests,
//! * [`track_param`] – the [`MovementParams`](track_param::MovementParams) record and the
//!   [`track_param`](track_param::track_param) batch entry point.
//!
//! The helpers below are shared by the simulator (corridor distances) and by the clustering
//! and variance modules.
use nalgebra::{Matrix2, SymmetricEigen, Vector2};

use crate::constants::{Point, EPS};
use crate::trackway::Trajectory;

pub mod circular;
pub mod polygon;
pub mod track_param;

/// Unit direction of the first principal component of a point cloud.
///
/// Return
/// ----------
/// * `Some(u)` – unit vector of the largest-variance direction,
/// * `None` – fewer than two finite points, or all points coincide.
pub fn principal_axis(points: &[Point]) -> Option<Vector2<f64>> {
    let pts: Vec<&Point> = points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    if pts.len() < 2 {
        return None;
    }
    let n = pts.len() as f64;
    let (mx, my) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (mx, my) = (mx / n, my / n);

    let mut cov = Matrix2::zeros();
    for p in &pts {
        let d = Vector2::new(p.x - mx, p.y - my);
        cov += d * d.transpose();
    }
    cov /= n - 1.0;
    if cov.trace() < EPS * EPS {
        return None;
    }

    let eig = SymmetricEigen::new(cov);
    let imax = eig.eigenvalues.imax();
    let axis: Vector2<f64> = eig.eigenvectors.column(imax).into_owned();
    let norm = axis.norm();
    if norm < EPS {
        None
    } else {
        Some(axis / norm)
    }
}

/// Euclidean distance from `p` to the segment `[a, b]`, with the closest point on it.
pub fn closest_on_segment(p: &Point, a: &Point, b: &Point) -> (f64, Point) {
    let ab = b - a;
    let len2 = ab.norm_squared();
    let t = if len2 < EPS * EPS {
        0.0
    } else {
        ((p - a).dot(&ab) / len2).clamp(0.0, 1.0)
    };
    let q = a + ab * t;
    ((p - q).norm(), q)
}

/// Distance from `p` to a polyline and the closest point on it.
///
/// A single-point polyline degenerates to the point distance; an empty one yields `None`.
pub fn closest_on_polyline(p: &Point, trajectory: &Trajectory) -> Option<(f64, Point)> {
    match trajectory.points.as_slice() {
        [] => None,
        [only] => Some(((p - only).norm(), *only)),
        pts => pts
            .windows(2)
            .map(|w| closest_on_segment(p, &w[0], &w[1]))
            .min_by(|a, b| a.0.total_cmp(&b.0)),
    }
}

#[cfg(test)]
mod geometry_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_principal_axis_horizontal() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.1),
            Point::new(2.0, -0.1),
            Point::new(3.0, 0.0),
        ];
        let u = principal_axis(&pts).unwrap();
        assert_abs_diff_eq!(u.x.abs(), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_principal_axis_degenerate() {
        assert!(principal_axis(&[Point::new(1.0, 1.0)]).is_none());
        assert!(principal_axis(&[Point::new(1.0, 1.0), Point::new(1.0, 1.0)]).is_none());
    }

    #[test]
    fn test_closest_on_polyline() {
        let t = Trajectory::from_xy(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let (d, q) = closest_on_polyline(&Point::new(5.0, 2.0), &t).unwrap();
        assert_abs_diff_eq!(d, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q.x, 5.0, epsilon = 1e-12);
        let (d, _) = closest_on_polyline(&Point::new(12.0, 5.0), &t).unwrap();
        assert_abs_diff_eq!(d, 2.0, epsilon = 1e-12);
    }
}
