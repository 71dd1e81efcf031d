//! Discrete Fréchet distance.
//!
//! The coupling distance of the best monotonic alignment, i.e. the minimum over warping paths
//! of the maximum local Euclidean distance along the path:
//!
//! ```text
//! F(i, j) = max( d(a_i, b_j), min( F(i-1, j), F(i-1, j-1), F(i, j-1) ) )
//! ```
use crate::constants::Point;

/// Discrete Fréchet distance; `None` if either sequence is empty or has non-finite points.
pub fn frechet_distance(a: &[Point], b: &[Point]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a.iter().chain(b).any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return None;
    }

    let m = b.len();
    let mut prev = vec![f64::INFINITY; m];
    let mut curr = vec![f64::INFINITY; m];
    for (i, pa) in a.iter().enumerate() {
        for (j, pb) in b.iter().enumerate() {
            let d = (pa - pb).norm();
            curr[j] = match (i, j) {
                (0, 0) => d,
                (0, _) => d.max(curr[j - 1]),
                (_, 0) => d.max(prev[0]),
                _ => d.max(prev[j].min(prev[j - 1]).min(curr[j - 1])),
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    Some(prev[m - 1])
}

#[cfg(test)]
mod frechet_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pts(xy: &[(f64, f64)]) -> Vec<Point> {
        xy.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_parallel_offset() {
        let a = pts(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let b = pts(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)]);
        assert_abs_diff_eq!(frechet_distance(&a, &b).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bounded_by_endpoints() {
        let a = pts(&[(0.0, 0.0), (5.0, 0.0)]);
        let b = pts(&[(0.0, 0.0), (2.0, 1.0), (5.0, 0.0)]);
        let f = frechet_distance(&a, &b).unwrap();
        // (2,1) must couple with (0,0) or (5,0)
        assert_abs_diff_eq!(f, 5.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_symmetric() {
        let a = pts(&[(0.0, 0.0), (1.0, 3.0), (4.0, 1.0), (6.0, 2.0)]);
        let b = pts(&[(0.5, 0.5), (3.0, 2.0), (6.0, 0.0)]);
        assert_abs_diff_eq!(
            frechet_distance(&a, &b).unwrap(),
            frechet_distance(&b, &a).unwrap(),
            epsilon = 1e-12
        );
    }
}
