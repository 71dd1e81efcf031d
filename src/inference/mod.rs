//! # Monte Carlo inference
//!
//! Turns an observed pairwise metric matrix and `nsim` simulated matrices into significance
//! statements.
//!
//! ## Pairwise p-values
//!
//! For each unique pair `(i, j)`:
//!
//! ```text
//! p = (1 + #{ r : sim_r(i, j) is at least as extreme as obs(i, j) }) / (nsim + 1)
//! ```
//!
//! The `+1` in numerator and denominator counts the observed configuration as one draw from
//! the null, so `p` is never zero. With `nsim = 10` and an observed value more extreme than
//! every replicate, `p = 1/11`.
//!
//! "Extreme" follows a [`Direction`]:
//!
//! * [`Direction::Lower`] – simulated `≤` observed. Used for DTW and Fréchet distances (are
//!   the real trajectories more similar than random?) and for intersection counts under the
//!   coordinated-movement hypothesis.
//! * [`Direction::Higher`] – simulated `≥` observed. Intersection counts under the pursuit
//!   hypothesis.
//!
//! ## Multiple testing
//!
//! Benjamini–Hochberg adjustment ([`fdr`]) is applied over the upper triangle only.
//!
//! ## Global p-value
//!
//! A replicate is a *hit* when every defined pair is simultaneously as extreme as observed.
//! `global_p = (1 + #hits) / (nsim + 1)`. [`combined`] extends the AND rule across several
//! metrics.
//!
//! ## Parallelism and cancellation
//!
//! Simulated matrices are evaluated per replicate, in parallel with `rayon` when the
//! `parallel` feature is enabled. A [`CancelToken`] is polled before each replicate.
use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rand::Rng;
use tracing::{debug, warn};

use crate::ichnos_errors::IchnosError;
use crate::progress::{CancelToken, ReplicateProgress};
use crate::similarity::{PairMetric, PairwiseMatrix, Superposition};
use crate::simulation::origin::{permute_origins, OriginRegion};
use crate::simulation::SimulationEnsemble;
use crate::trackway::{Trajectory, TrackwayCollection};

pub mod combined;
pub mod fdr;

/// Tail of the null distribution considered extreme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Lower,
    Higher,
}

impl Direction {
    /// True when `simulated` is at least as extreme as `observed`.
    ///
    /// Undefined (`NaN`) values are never extreme.
    #[inline]
    pub fn is_extreme(&self, simulated: f64, observed: f64) -> bool {
        match self {
            Direction::Lower => simulated <= observed,
            Direction::Higher => simulated >= observed,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Lower => f.write_str("lower"),
            Direction::Higher => f.write_str("higher"),
        }
    }
}

/// Monte Carlo p-value of one observed statistic against its simulated values.
///
/// Return
/// ----------
/// * `(1 + #extreme) / (nsim + 1)`, or `NaN` when `observed` is undefined.
pub fn mc_p_value(
    observed: f64,
    simulated: impl IntoIterator<Item = f64>,
    direction: Direction,
) -> f64 {
    if observed.is_nan() {
        return f64::NAN;
    }
    let (extreme, nsim) = simulated
        .into_iter()
        .fold((0usize, 0usize), |(e, n), s| {
            (e + usize::from(direction.is_extreme(s, observed)), n + 1)
        });
    (1 + extreme) as f64 / (nsim + 1) as f64
}

/// Outcome of one Monte Carlo test.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloResult {
    pub metric: PairMetric,
    pub direction: Direction,
    pub observed: PairwiseMatrix,
    /// One matrix per replicate, in replicate order.
    pub simulated: Vec<PairwiseMatrix>,
    pub p_values: PairwiseMatrix,
    /// Benjamini–Hochberg adjusted over unique pairs.
    pub p_adjusted: PairwiseMatrix,
    /// AND-combined p-value over every defined pair.
    pub global_p: f64,
}

impl MonteCarloResult {
    /// Assemble a result from an observed matrix and its simulated counterparts.
    ///
    /// Arguments
    /// -----------------
    /// * `metric`: Statistic the matrices hold.
    /// * `direction`: Tail tested.
    /// * `observed`: Observed pairwise matrix.
    /// * `simulated`: `nsim` matrices over the same trackways, same order.
    ///
    /// Errors
    /// -----------------
    /// * [`IchnosError::InvalidParameter`] if `simulated` is empty.
    /// * [`IchnosError::ShapeMismatch`] if a simulated matrix indexes different trackways.
    pub fn from_matrices(
        metric: PairMetric,
        direction: Direction,
        observed: PairwiseMatrix,
        simulated: Vec<PairwiseMatrix>,
    ) -> Result<Self, IchnosError> {
        if simulated.is_empty() {
            return Err(IchnosError::InvalidParameter(
                "nsim must be >= 1 (no simulated matrix)".into(),
            ));
        }
        if let Some(r) = simulated.iter().position(|m| !m.same_layout(&observed)) {
            return Err(IchnosError::ShapeMismatch(format!(
                "simulated matrix {r} does not index the observed trackways"
            )));
        }

        let p_values = PairwiseMatrix::from_pairs(observed.names().to_vec(), |i, j| {
            let obs = observed.get(i, j)?;
            let sims = simulated
                .iter()
                .map(|m| m.get(i, j).unwrap_or(f64::NAN));
            Some(mc_p_value(obs, sims, direction))
        });
        let p_adjusted = fdr::adjust_pairwise(&p_values)?;

        let mut result = MonteCarloResult {
            metric,
            direction,
            observed,
            simulated,
            p_values,
            p_adjusted,
            global_p: f64::NAN,
        };
        let hits = (0..result.nsim())
            .filter(|&r| result.replicate_is_hit(r))
            .count();
        result.global_p = (1 + hits) as f64 / (result.nsim() + 1) as f64;

        debug!(
            metric = %metric,
            direction = %direction,
            nsim = result.nsim(),
            global_p = result.global_p,
            "monte carlo test done"
        );
        Ok(result)
    }

    pub fn nsim(&self) -> usize {
        self.simulated.len()
    }

    /// Whether replicate `r` is at least as extreme as observed for pair `(i, j)`.
    ///
    /// `None` when the observed statistic of the pair is undefined.
    pub fn is_extreme(&self, r: usize, i: usize, j: usize) -> Option<bool> {
        let obs = self.observed.get(i, j)?;
        let sim = self.simulated.get(r)?.get(i, j).unwrap_or(f64::NAN);
        Some(self.direction.is_extreme(sim, obs))
    }

    /// True when every defined pair of replicate `r` is as extreme as observed.
    pub fn replicate_is_hit(&self, r: usize) -> bool {
        self.observed
            .upper_pairs()
            .all(|(i, j, _)| self.is_extreme(r, i, j).unwrap_or(true))
    }

    /// Pairs whose adjusted p-value is at most `alpha`, as `(name_i, name_j, p_adjusted)`.
    pub fn significant_pairs(&self, alpha: f64) -> Vec<(&str, &str, f64)> {
        let names = self.p_adjusted.names();
        self.p_adjusted
            .upper_pairs()
            .filter(|(_, _, q)| *q <= alpha)
            .map(|(i, j, q)| (names[i].as_str(), names[j].as_str(), q))
            .collect()
    }
}

impl fmt::Display for MonteCarloResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} test ({} tail, nsim = {}), global p = {:.4}",
            self.metric,
            self.direction,
            self.nsim(),
            self.global_p
        )?;
        if f.alternate() {
            writeln!(f, "Observed:")?;
            write!(f, "{}", self.observed)?;
            writeln!(f, "p-values:")?;
            write!(f, "{}", self.p_values)?;
        }
        writeln!(f, "BH-adjusted p-values:")?;
        write!(f, "{}", self.p_adjusted)
    }
}

fn check_inputs(
    collection: &TrackwayCollection,
    ensemble: &SimulationEnsemble,
) -> Result<(), IchnosError> {
    if collection.len() < 2 {
        return Err(IchnosError::NotEnoughTrackways {
            required: 2,
            found: collection.len(),
        });
    }
    if ensemble.nsim() == 0 {
        return Err(IchnosError::InvalidParameter(
            "nsim must be >= 1 (empty ensemble)".into(),
        ));
    }
    if ensemble.names != collection.names() {
        return Err(IchnosError::ShapeMismatch(
            "simulated ensemble was not generated from this collection".into(),
        ));
    }
    if let Some(r) = ensemble
        .replicates
        .iter()
        .position(|rep| rep.len() != collection.len())
    {
        return Err(IchnosError::ShapeMismatch(format!(
            "replicate {r} holds {} trajectories, expected {}",
            ensemble.replicates[r].len(),
            collection.len()
        )));
    }
    let undefined: Vec<&str> = collection
        .iter()
        .filter(|(_, t, _)| t.is_empty() || !t.is_finite())
        .map(|(n, _, _)| n)
        .collect();
    if !undefined.is_empty() {
        warn!("trackway(s) {undefined:?} have no usable trajectory; their pairs are reported as NA");
    }
    Ok(())
}

/// Evaluate `metric` on every replicate of an ensemble.
pub(crate) fn evaluate_replicates(
    metric: PairMetric,
    names: &[String],
    replicates: &[Vec<Trajectory>],
    superposition: Superposition,
    cancel: Option<&CancelToken>,
) -> Result<Vec<PairwiseMatrix>, IchnosError> {
    let progress = ReplicateProgress::new(replicates.len(), &metric.to_string());
    let eval = |rep: &Vec<Trajectory>| -> Result<PairwiseMatrix, IchnosError> {
        CancelToken::check(cancel)?;
        let m = metric.matrix(names, rep, superposition)?;
        progress.inc();
        Ok(m)
    };

    #[cfg(feature = "parallel")]
    let out: Result<Vec<PairwiseMatrix>, IchnosError> = replicates.par_iter().map(eval).collect();
    #[cfg(not(feature = "parallel"))]
    let out: Result<Vec<PairwiseMatrix>, IchnosError> = replicates.iter().map(eval).collect();

    progress.finish();
    out
}

/// Similarity test of observed trajectories against a simulated ensemble.
///
/// Tests, for every pair of trackways, whether the observed distance is smaller than expected
/// under the simulated null (lower tail).
///
/// Arguments
/// -----------------
/// * `collection`: Observed trackways (at least two).
/// * `ensemble`: Replicates simulated from `collection`.
/// * `metric`: [`PairMetric::Dtw`] or [`PairMetric::Frechet`].
/// * `superposition`: Applied to observed and simulated trajectories alike.
///
/// Errors
/// -----------------
/// * [`IchnosError::NotEnoughTrackways`] with fewer than two trackways.
/// * [`IchnosError::InvalidParameter`] for an empty ensemble or a non-distance metric.
/// * [`IchnosError::ShapeMismatch`] if the ensemble was built from another collection.
///
/// See also
/// ------------
/// * [`intersection_test`] – crossing-count counterpart.
/// * [`combined::combined_prob`] – joint significance over several tests.
pub fn similarity_test(
    collection: &TrackwayCollection,
    ensemble: &SimulationEnsemble,
    metric: PairMetric,
    superposition: Superposition,
) -> Result<MonteCarloResult, IchnosError> {
    similarity_test_with_cancel(collection, ensemble, metric, superposition, None)
}

/// [`similarity_test`] with a cancellation token polled between replicates.
pub fn similarity_test_with_cancel(
    collection: &TrackwayCollection,
    ensemble: &SimulationEnsemble,
    metric: PairMetric,
    superposition: Superposition,
    cancel: Option<&CancelToken>,
) -> Result<MonteCarloResult, IchnosError> {
    if !metric.is_distance() {
        return Err(IchnosError::InvalidParameter(format!(
            "metric: similarity tests need a distance metric, got {metric}"
        )));
    }
    check_inputs(collection, ensemble)?;

    let observed = metric.matrix(collection.names(), collection.trajectories(), superposition)?;
    let simulated = evaluate_replicates(
        metric,
        collection.names(),
        &ensemble.replicates,
        superposition,
        cancel,
    )?;
    MonteCarloResult::from_matrices(metric, Direction::Lower, observed, simulated)
}

/// Intersection test of observed trajectories against a simulated ensemble.
///
/// Arguments
/// -----------------
/// * `collection`: Observed trackways (at least two).
/// * `ensemble`: Replicates simulated from `collection`.
/// * `origin`: Optional relocation of simulated starting points; see
///   [`crate::simulation::origin`].
/// * `direction`: [`Direction::Lower`] for fewer crossings than random (coordinated movement),
///   [`Direction::Higher`] for more (pursuit).
/// * `rng`: Random number generator used for origin permutation.
///
/// Errors
/// -----------------
/// * Same as [`similarity_test`], plus [`IchnosError::InvalidRegion`] for an invalid custom
///   origin polygon.
pub fn intersection_test(
    collection: &TrackwayCollection,
    ensemble: &SimulationEnsemble,
    origin: &OriginRegion,
    direction: Direction,
    rng: &mut impl Rng,
) -> Result<MonteCarloResult, IchnosError> {
    intersection_test_with_cancel(collection, ensemble, origin, direction, rng, None)
}

/// [`intersection_test`] with a cancellation token polled between replicates.
pub fn intersection_test_with_cancel(
    collection: &TrackwayCollection,
    ensemble: &SimulationEnsemble,
    origin: &OriginRegion,
    direction: Direction,
    rng: &mut impl Rng,
    cancel: Option<&CancelToken>,
) -> Result<MonteCarloResult, IchnosError> {
    check_inputs(collection, ensemble)?;

    let metric = PairMetric::Intersection;
    let observed = metric.matrix(
        collection.names(),
        collection.trajectories(),
        Superposition::None,
    )?;

    let simulated = match origin {
        OriginRegion::None => evaluate_replicates(
            metric,
            collection.names(),
            &ensemble.replicates,
            Superposition::None,
            cancel,
        )?,
        region => {
            let moved = permute_origins(ensemble.clone(), collection, region, rng)?;
            evaluate_replicates(
                metric,
                collection.names(),
                &moved.replicates,
                Superposition::None,
                cancel,
            )?
        }
    };
    MonteCarloResult::from_matrices(metric, direction, observed, simulated)
}

#[cfg(test)]
mod inference_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{i}")).collect()
    }

    #[test]
    fn test_p_value_never_zero() {
        let p = mc_p_value(0.0, vec![1.0; 10], Direction::Lower);
        assert_abs_diff_eq!(p, 1.0 / 11.0, epsilon = 1e-15);
        let p = mc_p_value(5.0, vec![1.0; 10], Direction::Lower);
        assert_abs_diff_eq!(p, 1.0, epsilon = 1e-15);
        assert!(mc_p_value(f64::NAN, vec![1.0], Direction::Lower).is_nan());
    }

    #[test]
    fn test_ties_count_as_extreme() {
        let p = mc_p_value(2.0, vec![2.0, 3.0, 1.0], Direction::Higher);
        assert_abs_diff_eq!(p, 3.0 / 4.0, epsilon = 1e-15);
    }

    #[test]
    fn test_from_matrices_and_global() {
        let obs = PairwiseMatrix::from_upper(names(3), &[1.0, 1.0, 1.0]).unwrap();
        let sims = vec![
            PairwiseMatrix::from_upper(names(3), &[0.5, 0.5, 0.5]).unwrap(), // hit
            PairwiseMatrix::from_upper(names(3), &[0.5, 2.0, 0.5]).unwrap(), // partial
            PairwiseMatrix::from_upper(names(3), &[2.0, 2.0, 2.0]).unwrap(),
        ];
        let r = MonteCarloResult::from_matrices(PairMetric::Dtw, Direction::Lower, obs, sims)
            .unwrap();
        assert_abs_diff_eq!(r.p_values.get(0, 1).unwrap(), 3.0 / 4.0, epsilon = 1e-15);
        assert_abs_diff_eq!(r.p_values.get(0, 2).unwrap(), 2.0 / 4.0, epsilon = 1e-15);
        assert_abs_diff_eq!(r.global_p, 2.0 / 4.0, epsilon = 1e-15);
        for (i, j, q) in r.p_adjusted.upper_pairs() {
            assert!(q >= r.p_values.get(i, j).unwrap());
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let obs = PairwiseMatrix::from_upper(names(2), &[1.0]).unwrap();
        let sim = PairwiseMatrix::from_upper(names(3), &[1.0, 1.0, 1.0]).unwrap();
        let err = MonteCarloResult::from_matrices(PairMetric::Dtw, Direction::Lower, obs, vec![sim])
            .unwrap_err();
        assert!(matches!(err, IchnosError::ShapeMismatch(_)));
    }

    #[test]
    fn test_empty_simulation_rejected() {
        let obs = PairwiseMatrix::from_upper(names(2), &[1.0]).unwrap();
        assert!(matches!(
            MonteCarloResult::from_matrices(PairMetric::Dtw, Direction::Lower, obs, vec![]),
            Err(IchnosError::InvalidParameter(_))
        ));
    }
}
