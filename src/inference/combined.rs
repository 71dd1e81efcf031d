//! Joint significance over several Monte Carlo tests.
//!
//! Given tests that share one simulated ensemble (same replicates, same trackways), a
//! replicate is a *hit* for pair `(i, j)` only if it is as extreme as observed under **every**
//! test for that pair. The pairwise joint p-value is `(1 + #hits) / (nsim + 1)`, adjusted by
//! Benjamini–Hochberg over unique pairs.
//!
//! The global p-value requires a replicate to be as extreme as observed for every test and
//! every pair at once. It is an intersection-union style rule and becomes very conservative as
//! the number of pairs grows; with many trackways it is rarely small even when most pairs are
//! individually significant.
use std::fmt;

use tracing::debug;

use crate::ichnos_errors::IchnosError;
use crate::inference::{fdr, MonteCarloResult};
use crate::similarity::{PairMetric, PairwiseMatrix};

/// Joint p-values over several tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedResult {
    pub metrics: Vec<PairMetric>,
    pub nsim: usize,
    pub p_values: PairwiseMatrix,
    pub p_adjusted: PairwiseMatrix,
    pub global_p: f64,
}

/// Combine Monte Carlo tests computed on the same ensemble.
///
/// Arguments
/// -----------------
/// * `results`: At least one test; all must share `nsim` and the trackway set.
///
/// Return
/// ----------
/// * A [`CombinedResult`] with per-pair joint p-values, their BH adjustment and the global
///   AND p-value.
///
/// Errors
/// -----------------
/// * [`IchnosError::InvalidParameter`] if `results` is empty or the tests disagree on `nsim`.
/// * [`IchnosError::ShapeMismatch`] if the tests index different trackways.
pub fn combined_prob(results: &[&MonteCarloResult]) -> Result<CombinedResult, IchnosError> {
    let Some(first) = results.first() else {
        return Err(IchnosError::InvalidParameter(
            "results: at least one test is required".into(),
        ));
    };
    let nsim = first.nsim();
    for r in results.iter().skip(1) {
        if r.nsim() != nsim {
            return Err(IchnosError::InvalidParameter(format!(
                "results: tests were run with different nsim ({} vs {nsim})",
                r.nsim()
            )));
        }
        if !r.observed.same_layout(&first.observed) {
            return Err(IchnosError::ShapeMismatch(
                "results: tests index different trackways".into(),
            ));
        }
    }

    let pair_defined = |i: usize, j: usize| results.iter().all(|t| t.observed.get(i, j).is_some());
    let joint_hit = |rep: usize, i: usize, j: usize| {
        results
            .iter()
            .all(|t| t.is_extreme(rep, i, j).unwrap_or(false))
    };

    let names = first.observed.names().to_vec();
    let p_values = PairwiseMatrix::from_pairs(names, |i, j| {
        if !pair_defined(i, j) {
            return None;
        }
        let hits = (0..nsim).filter(|&r| joint_hit(r, i, j)).count();
        Some((1 + hits) as f64 / (nsim + 1) as f64)
    });
    let p_adjusted = fdr::adjust_pairwise(&p_values)?;

    let global_hits = (0..nsim)
        .filter(|&r| results.iter().all(|t| t.replicate_is_hit(r)))
        .count();
    let global_p = (1 + global_hits) as f64 / (nsim + 1) as f64;

    let metrics: Vec<PairMetric> = results.iter().map(|r| r.metric).collect();
    debug!(?metrics, nsim, global_p, "combined tests");

    Ok(CombinedResult {
        metrics,
        nsim,
        p_values,
        p_adjusted,
        global_p,
    })
}

impl fmt::Display for CombinedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.metrics.iter().map(|m| m.to_string()).collect();
        writeln!(
            f,
            "Combined [{}] (nsim = {}), global p = {:.4}",
            labels.join(" & "),
            self.nsim,
            self.global_p
        )?;
        write!(f, "{}", self.p_adjusted)
    }
}

#[cfg(test)]
mod combined_test {
    use super::*;
    use crate::inference::Direction;
    use approx::assert_abs_diff_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{i}")).collect()
    }

    fn result(metric: PairMetric, obs: &[f64], sims: &[&[f64]]) -> MonteCarloResult {
        let observed = PairwiseMatrix::from_upper(names(3), obs).unwrap();
        let simulated = sims
            .iter()
            .map(|s| PairwiseMatrix::from_upper(names(3), s).unwrap())
            .collect();
        MonteCarloResult::from_matrices(metric, Direction::Lower, observed, simulated).unwrap()
    }

    #[test]
    fn test_joint_requires_all_metrics() {
        let dtw = result(
            PairMetric::Dtw,
            &[1.0, 1.0, 1.0],
            &[&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.0], &[2.0, 2.0, 2.0]],
        );
        let fre = result(
            PairMetric::Frechet,
            &[1.0, 1.0, 1.0],
            &[&[0.0, 0.0, 0.0], &[2.0, 2.0, 2.0], &[0.0, 0.0, 0.0]],
        );
        let c = combined_prob(&[&dtw, &fre]).unwrap();
        // only replicate 0 is extreme under both tests
        assert_abs_diff_eq!(c.p_values.get(0, 1).unwrap(), 2.0 / 4.0, epsilon = 1e-15);
        assert_abs_diff_eq!(c.global_p, 2.0 / 4.0, epsilon = 1e-15);
        // joint hits never outnumber the hits of a single test
        assert!(c.global_p <= dtw.global_p.min(fre.global_p));
        for (i, j, pc) in c.p_values.upper_pairs() {
            assert!(pc <= dtw.p_values.get(i, j).unwrap());
            assert!(pc <= fre.p_values.get(i, j).unwrap());
        }
    }

    #[test]
    fn test_rejects_mismatched_nsim() {
        let a = result(PairMetric::Dtw, &[1.0, 1.0, 1.0], &[&[0.0, 0.0, 0.0]]);
        let b = result(
            PairMetric::Frechet,
            &[1.0, 1.0, 1.0],
            &[&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.0]],
        );
        assert!(matches!(
            combined_prob(&[&a, &b]),
            Err(IchnosError::InvalidParameter(_))
        ));
        assert!(matches!(
            combined_prob(&[]),
            Err(IchnosError::InvalidParameter(_))
        ));
    }
}
