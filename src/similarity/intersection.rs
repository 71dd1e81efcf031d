//! Crossing points between two trajectories.
//!
//! Every segment of one polyline is tested against every segment of the other with the
//! parametric determinant test. Parallel and collinear segment pairs (zero determinant) are not
//! counted. A crossing that falls exactly on a shared vertex is reported by each adjacent
//! segment pair; such duplicates are merged when their coordinates agree within
//! [`INTERSECTION_EPS`] on both axes.
use smallvec::SmallVec;

use crate::constants::{Point, INTERSECTION_EPS};
use crate::trackway::Trajectory;

#[inline]
fn cross(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Intersection point of segments `[p1, p2]` and `[q1, q2]`, if they cross.
///
/// Endpoints are inclusive. Returns `None` for parallel or collinear segments and for
/// degenerate (zero-length) segments.
pub fn segment_intersection(p1: &Point, p2: &Point, q1: &Point, q2: &Point) -> Option<Point> {
    let r = p2 - p1;
    let s = q2 - q1;
    let denom = cross(r.x, r.y, s.x, s.y);
    let scale = r.norm() * s.norm();
    if scale == 0.0 || denom.abs() <= f64::EPSILON * scale {
        return None;
    }
    let qp = q1 - p1;
    let t = cross(qp.x, qp.y, s.x, s.y) / denom;
    let u = cross(qp.x, qp.y, r.x, r.y) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(p1 + r * t)
    } else {
        None
    }
}

/// All distinct crossing points between two polylines.
pub fn crossing_points(a: &[Point], b: &[Point]) -> SmallVec<[Point; 4]> {
    let mut found: SmallVec<[Point; 4]> = SmallVec::new();
    for sa in a.windows(2) {
        for sb in b.windows(2) {
            if let Some(p) = segment_intersection(&sa[0], &sa[1], &sb[0], &sb[1]) {
                let duplicate = found.iter().any(|q| {
                    (q.x - p.x).abs() <= INTERSECTION_EPS && (q.y - p.y).abs() <= INTERSECTION_EPS
                });
                if !duplicate {
                    found.push(p);
                }
            }
        }
    }
    found
}

/// Number of distinct crossings between two trajectories.
///
/// Return
/// ----------
/// * `None` when either trajectory has non-finite coordinates,
/// * `Some(0)` when either has fewer than two points (no segment to cross).
pub fn intersect_count(a: &Trajectory, b: &Trajectory) -> Option<usize> {
    crossings(a, b).map(|pts| pts.len())
}

/// Distinct crossing points between two trajectories, `None` when either has non-finite
/// coordinates.
pub fn crossings(a: &Trajectory, b: &Trajectory) -> Option<SmallVec<[Point; 4]>> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some(crossing_points(&a.points, &b.points))
}
