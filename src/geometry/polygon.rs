//! Planar polygon helpers used by origin permutation.
//!
//! * [`convex_hull`] – Andrew's monotone chain, counter-clockwise, no repeated closing vertex.
//! * [`min_area_rect`] – minimum-area enclosing rectangle; one side of the optimum is collinear
//!   with a hull edge, so every hull edge direction is tried.
//! * [`contains`] – even-odd ray casting test.
//! * [`area`] – absolute shoelace area.
use smallvec::SmallVec;

use crate::constants::{Point, EPS};

/// Four corners of a rectangle, counter-clockwise.
pub type Rectangle = SmallVec<[Point; 4]>;

#[inline]
fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull of a point set in counter-clockwise order.
///
/// Collinear points on the hull boundary are dropped. Fewer than three distinct input points
/// yield the distinct points themselves (a degenerate hull).
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .copied()
        .collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Absolute area of a simple polygon (shoelace formula).
pub fn area(polygon: &[Point]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let n = polygon.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = &polygon[i];
            let b = &polygon[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    0.5 * twice.abs()
}

/// Axis-aligned bounding box `(min, max)`, `None` for an empty polygon.
pub fn bounding_box(polygon: &[Point]) -> Option<(Point, Point)> {
    let first = polygon.first()?;
    let (mut lo, mut hi) = (*first, *first);
    for p in polygon {
        lo.x = lo.x.min(p.x);
        lo.y = lo.y.min(p.y);
        hi.x = hi.x.max(p.x);
        hi.y = hi.y.max(p.y);
    }
    Some((lo, hi))
}

/// Even-odd rule point-in-polygon test. Points exactly on an edge may fall either way.
pub fn contains(polygon: &[Point], p: &Point) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (&polygon[i], &polygon[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Minimum-area rectangle enclosing `points`.
///
/// Return
/// ----------
/// * `Some(corners)` – four counter-clockwise corners,
/// * `None` – the hull is degenerate (fewer than three non-collinear points).
pub fn min_area_rect(points: &[Point]) -> Option<Rectangle> {
    let hull = convex_hull(points);
    if hull.len() < 3 || area(&hull) < EPS {
        return None;
    }

    let mut best: Option<(f64, Rectangle)> = None;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let edge = b - a;
        let len = edge.norm();
        if len < EPS {
            continue;
        }
        let u = edge / len;
        let v = nalgebra::Vector2::new(-u.y, u.x);

        let (mut min_u, mut max_u, mut min_v, mut max_v) =
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let d = *p - a;
            let pu = d.dot(&u);
            let pv = d.dot(&v);
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }
        let rect_area = (max_u - min_u) * (max_v - min_v);
        if best.as_ref().map_or(true, |(ba, _)| rect_area < *ba) {
            let corner = |su: f64, sv: f64| a + u * su + v * sv;
            let corners: Rectangle = SmallVec::from_buf([
                corner(min_u, min_v),
                corner(max_u, min_v),
                corner(max_u, max_v),
                corner(min_u, max_v),
            ]);
            best = Some((rect_area, corners));
        }
    }
    best.map(|(_, r)| r)
}
