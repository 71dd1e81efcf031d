//! # Pairwise trajectory metrics
//!
//! Symmetric matrices of pairwise similarity or intersection statistics between trajectories.
//!
//! ## Metrics
//!
//! * [`dtw`] – Dynamic Time Warping distance with Euclidean local cost,
//! * [`frechet`] – discrete Fréchet distance,
//! * [`intersection`] – number of distinct crossing points between two polylines.
//!
//! DTW and Fréchet can be computed after a [`Superposition`] applied identically to every
//! trajectory (observed or simulated): raw coordinates, centroid-centred or origin-centred.
//!
//! ## Matrix layout
//!
//! A [`PairwiseMatrix`] is filled by iterating over the upper triangle once and writing both
//! `(i, j)` and `(j, i)`, so symmetry holds by construction. The diagonal holds `NaN` and is
//! reported as `None` by [`PairwiseMatrix::get`].
use std::fmt;

use itertools::Itertools;
use nalgebra::DMatrix;

use crate::ichnos_errors::IchnosError;
use crate::trackway::{Trajectory, TrackwayCollection};

pub mod dtw;
pub mod frechet;
pub mod intersection;

/// Coordinate normalisation applied to every trajectory before a distance is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Superposition {
    /// Raw coordinates.
    #[default]
    None,
    /// Subtract the trajectory's centroid.
    Centroid,
    /// Subtract the trajectory's first point.
    Origin,
}

impl Superposition {
    pub fn apply(&self, trajectory: &Trajectory) -> Trajectory {
        let reference = match self {
            Superposition::None => return trajectory.clone(),
            Superposition::Centroid => trajectory.centroid(),
            Superposition::Origin => trajectory.first().copied(),
        };
        match reference {
            Some(r) => trajectory.translated(-r.x, -r.y),
            None => trajectory.clone(),
        }
    }
}

/// Pairwise statistic computed between two trajectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairMetric {
    Dtw,
    Frechet,
    Intersection,
}

impl PairMetric {
    /// Statistic between two trajectories; `None` when either is empty or non-finite.
    pub fn between(&self, a: &Trajectory, b: &Trajectory) -> Option<f64> {
        match self {
            PairMetric::Dtw => dtw::dtw_distance(&a.points, &b.points),
            PairMetric::Frechet => frechet::frechet_distance(&a.points, &b.points),
            PairMetric::Intersection => intersection::intersect_count(a, b).map(|c| c as f64),
        }
    }

    /// Matrix of this statistic over a set of trajectories.
    ///
    /// The superposition is applied to every trajectory first for distance metrics; it is
    /// ignored for intersection counts, which are defined on raw positions.
    pub fn matrix(
        &self,
        names: &[String],
        trajectories: &[Trajectory],
        superposition: Superposition,
    ) -> Result<PairwiseMatrix, IchnosError> {
        if names.len() != trajectories.len() {
            return Err(IchnosError::ShapeMismatch(format!(
                "{} names for {} trajectories",
                names.len(),
                trajectories.len()
            )));
        }
        let prepared: Vec<Trajectory> = match self {
            PairMetric::Intersection => trajectories.to_vec(),
            _ => trajectories.iter().map(|t| superposition.apply(t)).collect(),
        };
        Ok(PairwiseMatrix::from_pairs(names.to_vec(), |i, j| {
            self.between(&prepared[i], &prepared[j])
        }))
    }

    /// Distance metrics are similarity statistics tested on the lower tail.
    pub fn is_distance(&self) -> bool {
        matches!(self, PairMetric::Dtw | PairMetric::Frechet)
    }
}

impl fmt::Display for PairMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PairMetric::Dtw => "DTW",
            PairMetric::Frechet => "Frechet",
            PairMetric::Intersection => "Intersection",
        };
        f.write_str(s)
    }
}

/// Square symmetric matrix of pairwise values indexed by trackway.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseMatrix {
    names: Vec<String>,
    values: DMatrix<f64>,
}

impl PairwiseMatrix {
    /// Build a matrix by evaluating `f(i, j)` once for every `i < j`.
    ///
    /// `None` results are stored as `NaN`. The diagonal is always `NaN`.
    pub fn from_pairs<F>(names: Vec<String>, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> Option<f64>,
    {
        let n = names.len();
        let mut values = DMatrix::from_element(n, n, f64::NAN);
        for (i, j) in (0..n).tuple_combinations() {
            let v = f(i, j).unwrap_or(f64::NAN);
            values[(i, j)] = v;
            values[(j, i)] = v;
        }
        PairwiseMatrix { names, values }
    }

    /// Matrix from precomputed values in upper-triangle order `(0,1), (0,2), …, (n-2,n-1)`.
    pub fn from_upper(names: Vec<String>, upper: &[f64]) -> Result<Self, IchnosError> {
        let n = names.len();
        let expected = n * n.saturating_sub(1) / 2;
        if upper.len() != expected {
            return Err(IchnosError::ShapeMismatch(format!(
                "{} upper-triangle values for {} trackways (expected {expected})",
                upper.len(),
                n
            )));
        }
        let mut it = upper.iter();
        Ok(Self::from_pairs(names, |_, _| it.next().copied()))
    }

    pub fn n(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Value at `(i, j)`; `None` on the diagonal, out of range, or for undefined entries.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i == j || i >= self.n() || j >= self.n() {
            return None;
        }
        let v = self.values[(i, j)];
        (!v.is_nan()).then_some(v)
    }

    pub fn get_by_name(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        self.get(i, j)
    }

    /// Iterate over `(i, j, value)` for every `i < j` (undefined values are `NaN`).
    pub fn upper_pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n())
            .tuple_combinations()
            .map(move |(i, j)| (i, j, self.values[(i, j)]))
    }

    /// Upper-triangle values in row order.
    pub fn upper_values(&self) -> Vec<f64> {
        self.upper_pairs().map(|(_, _, v)| v).collect()
    }

    /// Underlying dense matrix (diagonal is `NaN`).
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// True when both matrices index the same trackways in the same order.
    pub fn same_layout(&self, other: &PairwiseMatrix) -> bool {
        self.names == other.names
    }
}

impl fmt::Display for PairwiseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10}", "")?;
        for n in &self.names {
            write!(f, " {n:>10}")?;
        }
        writeln!(f)?;
        for (i, row_name) in self.names.iter().enumerate() {
            write!(f, "{row_name:<10}")?;
            for j in 0..self.n() {
                match self.get(i, j) {
                    Some(v) => write!(f, " {v:>10.4}")?,
                    None => write!(f, " {:>10}", "NA")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// DTW distance matrix of a collection.
pub fn simil_dtw(
    collection: &TrackwayCollection,
    superposition: Superposition,
) -> Result<PairwiseMatrix, IchnosError> {
    PairMetric::Dtw.matrix(collection.names(), collection.trajectories(), superposition)
}

/// Discrete Fréchet distance matrix of a collection.
pub fn simil_frechet(
    collection: &TrackwayCollection,
    superposition: Superposition,
) -> Result<PairwiseMatrix, IchnosError> {
    PairMetric::Frechet.matrix(collection.names(), collection.trajectories(), superposition)
}

/// Intersection-count matrix of a collection.
pub fn track_intersection(collection: &TrackwayCollection) -> Result<PairwiseMatrix, IchnosError> {
    PairMetric::Intersection.matrix(
        collection.names(),
        collection.trajectories(),
        Superposition::None,
    )
}
