//! Benjamini–Hochberg false discovery rate adjustment.
//!
//! For `m` p-values sorted ascending `p_(1) ≤ … ≤ p_(m)`:
//!
//! ```text
//! q_(i) = min_{k ≥ i} min(1, m / k · p_(k))
//! ```
//!
//! Non-finite inputs are left as `NaN` and do not count towards `m`.
use crate::ichnos_errors::IchnosError;
use crate::similarity::PairwiseMatrix;

/// BH-adjusted p-values, returned in the input order.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..p_values.len())
        .filter(|&i| p_values[i].is_finite())
        .collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m = order.len() as f64;
    let mut adjusted = vec![f64::NAN; p_values.len()];
    let mut running = 1.0_f64;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let q = (m / (rank + 1) as f64 * p_values[idx]).min(1.0);
        running = running.min(q);
        adjusted[idx] = running;
    }
    adjusted
}

/// BH adjustment over the unique (upper-triangle) pairs of a p-value matrix.
///
/// The symmetric lower half is mirrored from the adjusted upper half, so each pair is counted
/// once in `m`.
pub fn adjust_pairwise(p_values: &PairwiseMatrix) -> Result<PairwiseMatrix, IchnosError> {
    let adjusted = benjamini_hochberg(&p_values.upper_values());
    PairwiseMatrix::from_upper(p_values.names().to_vec(), &adjusted)
}
