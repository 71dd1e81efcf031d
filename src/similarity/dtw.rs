//! Dynamic Time Warping distance between two point sequences.
//!
//! The warping path is monotonic and contiguous from `(0, 0)` to `(n-1, m-1)`; its cost is the
//! sum of the Euclidean distances of the aligned point pairs (symmetric step pattern, no slope
//! weighting, no normalisation by length):
//!
//! ```text
//! D(i, j) = d(a_i, b_j) + min( D(i-1, j), D(i-1, j-1), D(i, j-1) )
//! ```
//!
//! Only two rows of the cost matrix are kept in memory.
use crate::constants::Point;

/// DTW distance between `a` and `b`; `None` if either is empty or has non-finite points.
pub fn dtw_distance(a: &[Point], b: &[Point]) -> Option<f64> {
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
            let cost = (pa - pb).norm();
            let best = match (i, j) {
                (0, 0) => 0.0,
                (0, _) => curr[j - 1],
                (_, 0) => prev[0],
                _ => prev[j].min(prev[j - 1]).min(curr[j - 1]),
            };
            curr[j] = cost + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    Some(prev[m - 1])
}

#[cfg(test)]
mod dtw_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pts(xy: &[(f64, f64)]) -> Vec<Point> {
        xy.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_identical_is_zero() {
        let a = pts(&[(0.0, 0.0), (1.0, 2.0), (3.0, 1.0)]);
        assert_eq!(dtw_distance(&a, &a), Some(0.0));
    }

    #[test]
    fn test_parallel_offset() {
        let a = pts(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let b = pts(&[(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)]);
        assert_abs_diff_eq!(dtw_distance(&a, &b).unwrap(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_different_lengths_warp() {
        // b repeats a's middle point; warping absorbs the repetition at zero cost
        let a = pts(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let b = pts(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        assert_abs_diff_eq!(dtw_distance(&a, &b).unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            dtw_distance(&a, &b).unwrap(),
            dtw_distance(&b, &a).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_single_point() {
        let a = pts(&[(0.0, 0.0)]);
        let b = pts(&[(3.0, 4.0), (0.0, 0.0)]);
        assert_abs_diff_eq!(dtw_distance(&a, &b).unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty() {
        assert_eq!(dtw_distance(&[], &pts(&[(0.0, 0.0)])), None);
    }
}
