//! # Trackway data model
//!
//! A **trackway** is the ordered sequence of footprints left by one moving individual.
//! This module defines the immutable records every analysis stage consumes:
//!
//! * [`Footprint`] – one digitized print (position, side, provenance),
//! * [`Trajectory`] – the **medial line** of a trackway, i.e. the midpoints of consecutive
//!   footprints (always one point fewer than the footprint count),
//! * [`Trackway`] – a named footprint sequence together with its derived trajectory,
//! * [`TrackwayCollection`] – two aligned sequences (`trajectories`, `footprints`) plus the
//!   trackway names, with the invariant `len(trajectories) == len(footprints)`.
//!
//! Data flow
//! -----------------
//! Collections are produced once by an external parser and never mutated afterwards. The only
//! way to obtain a smaller collection is the explicit [`TrackwayCollection::subset`].
//!
//! Example
//! -----------------
//! ```rust
//! use ichnos::trackway::{Trackway, TrackwayCollection};
//!
//! let a = Trackway::from_coordinates("T1", &[(0.0, 0.0), (1.0, 0.5), (2.0, 0.0), (3.0, 0.5)]);
//! let b = Trackway::from_coordinates("T2", &[(0.0, 4.0), (1.0, 4.5), (2.0, 4.0), (3.0, 4.5)]);
//! let collection = TrackwayCollection::from_trackways(vec![a, b]);
//!
//! assert_eq!(collection.len(), 2);
//! assert_eq!(collection.trajectories()[0].len(), 3);
//! ```
use serde::{Deserialize, Serialize};

use crate::constants::Point;
use crate::ichnos_errors::IchnosError;

/// Body side of a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Side assigned by position in an alternating sequence: even indices are left prints.
    pub fn from_index(index: usize) -> Side {
        if index % 2 == 0 {
            Side::Left
        } else {
            Side::Right
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Whether a footprint was observed or reconstructed during missing-data interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Actual,
    Inferred,
}

/// One digitized footprint.
///
/// Fields
/// -----------------
/// * `x`, `y` – landmark coordinates; a missing coordinate is stored as a non-finite value.
/// * `image_ref` – identifier of the image the print was digitized from.
/// * `id` – index of the print inside its trackway.
/// * `side` – body side, `None` when the side column was missing.
/// * `provenance` – [`Provenance::Actual`] or [`Provenance::Inferred`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub x: f64,
    pub y: f64,
    pub image_ref: String,
    pub id: usize,
    pub side: Option<Side>,
    pub provenance: Provenance,
}

impl Footprint {
    /// Observed footprint with the side derived from its index.
    pub fn new(id: usize, x: f64, y: f64) -> Self {
        Footprint {
            x,
            y,
            image_ref: String::new(),
            id,
            side: Some(Side::from_index(id)),
            provenance: Provenance::Actual,
        }
    }

    /// Position of the footprint, or `None` when a coordinate is missing.
    #[inline]
    pub fn position(&self) -> Option<Point> {
        if self.x.is_finite() && self.y.is_finite() {
            Some(Point::new(self.x, self.y))
        } else {
            None
        }
    }

    /// Same footprint moved to a new position.
    pub fn with_position(&self, x: f64, y: f64) -> Self {
        Footprint {
            x,
            y,
            ..self.clone()
        }
    }
}

/// Medial line of a trackway: an ordered sequence of 2D points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    pub points: Vec<Point>,
}

impl Trajectory {
    pub fn new(points: Vec<Point>) -> Self {
        Trajectory { points }
    }

    /// Build a trajectory from raw `(x, y)` pairs.
    pub fn from_xy(coords: &[(f64, f64)]) -> Self {
        Trajectory {
            points: coords.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    /// Midpoints of consecutive footprints.
    ///
    /// A footprint with a missing coordinate yields non-finite midpoints; they are kept so the
    /// point count stays `footprints.len() - 1` and downstream code can report the record.
    pub fn from_footprints(footprints: &[Footprint]) -> Self {
        let points = footprints
            .windows(2)
            .map(|w| Point::new(0.5 * (w[0].x + w[1].x), 0.5 * (w[0].y + w[1].y)))
            .collect();
        Trajectory { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&Point> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    /// True when every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Arithmetic mean of the points, `None` for an empty trajectory.
    pub fn centroid(&self) -> Option<Point> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }

    /// Copy of the trajectory shifted by `(dx, dy)`.
    pub fn translated(&self, dx: f64, dy: f64) -> Trajectory {
        Trajectory {
            points: self
                .points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        }
    }
}

/// A named footprint sequence with its medial trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Trackway {
    pub name: String,
    pub footprints: Vec<Footprint>,
    pub trajectory: Trajectory,
}

impl Trackway {
    pub fn new(name: impl Into<String>, footprints: Vec<Footprint>) -> Self {
        let trajectory = Trajectory::from_footprints(&footprints);
        Trackway {
            name: name.into(),
            footprints,
            trajectory,
        }
    }

    /// Observed trackway from raw coordinates, alternating left/right from the first print.
    pub fn from_coordinates(name: impl Into<String>, coords: &[(f64, f64)]) -> Self {
        let footprints = coords
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Footprint::new(i, x, y))
            .collect();
        Trackway::new(name, footprints)
    }
}

/// Aligned trajectories and footprint sequences, one entry per physical trackway.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackwayCollection {
    names: Vec<String>,
    trajectories: Vec<Trajectory>,
    footprints: Vec<Vec<Footprint>>,
}

impl TrackwayCollection {
    /// Assemble a collection from its two aligned sequences.
    ///
    /// Errors
    /// -----------------
    /// * [`IchnosError::MismatchedLengths`] if `trajectories` and `footprints` differ in length.
    /// * [`IchnosError::InvalidParameter`] if `names` does not match the trackway count.
    /// * [`IchnosError::InvalidTrackway`] if a trajectory is not one point shorter than its
    ///   footprint sequence.
    pub fn new(
        names: Vec<String>,
        trajectories: Vec<Trajectory>,
        footprints: Vec<Vec<Footprint>>,
    ) -> Result<Self, IchnosError> {
        if trajectories.len() != footprints.len() {
            return Err(IchnosError::MismatchedLengths {
                trajectories: trajectories.len(),
                footprints: footprints.len(),
            });
        }
        if names.len() != trajectories.len() {
            return Err(IchnosError::InvalidParameter(format!(
                "names: expected {} entries, got {}",
                trajectories.len(),
                names.len()
            )));
        }
        for ((name, traj), fps) in names.iter().zip(&trajectories).zip(&footprints) {
            if traj.len() != fps.len().saturating_sub(1) {
                return Err(IchnosError::InvalidTrackway(format!(
                    "{name}: trajectory has {} points for {} footprints",
                    traj.len(),
                    fps.len()
                )));
            }
        }
        Ok(TrackwayCollection {
            names,
            trajectories,
            footprints,
        })
    }

    pub fn from_trackways(trackways: Vec<Trackway>) -> Self {
        let mut names = Vec::with_capacity(trackways.len());
        let mut trajectories = Vec::with_capacity(trackways.len());
        let mut footprints = Vec::with_capacity(trackways.len());
        for t in trackways {
            names.push(t.name);
            trajectories.push(t.trajectory);
            footprints.push(t.footprints);
        }
        TrackwayCollection {
            names,
            trajectories,
            footprints,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    pub fn footprints(&self) -> &[Vec<Footprint>] {
        &self.footprints
    }

    /// Iterate over `(name, trajectory, footprints)` triples in collection order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Trajectory, &[Footprint])> {
        self.names
            .iter()
            .zip(&self.trajectories)
            .zip(&self.footprints)
            .map(|((n, t), f)| (n.as_str(), t, f.as_slice()))
    }

    /// Owned trackway at `index`.
    pub fn trackway(&self, index: usize) -> Option<Trackway> {
        Some(Trackway {
            name: self.names.get(index)?.clone(),
            footprints: self.footprints.get(index)?.clone(),
            trajectory: self.trajectories.get(index)?.clone(),
        })
    }

    /// Starting point of every trajectory that has one.
    pub fn origins(&self) -> Vec<Point> {
        self.trajectories
            .iter()
            .filter_map(|t| t.first().copied())
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .collect()
    }

    /// New collection holding only the trackways at `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, IchnosError> {
        let mut trackways = Vec::with_capacity(indices.len());
        for &i in indices {
            let t = self.trackway(i).ok_or_else(|| {
                IchnosError::InvalidParameter(format!(
                    "indices: {i} is out of range for {} trackways",
                    self.len()
                ))
            })?;
            trackways.push(t);
        }
        Ok(TrackwayCollection::from_trackways(trackways))
    }
}

#[cfg(test)]
mod trackway_test {
    use super::*;

    #[test]
    fn test_medial_trajectory() {
        let t = Trackway::from_coordinates("T", &[(0.0, 0.0), (2.0, 2.0), (4.0, 0.0)]);
        assert_eq!(t.trajectory.len(), 2);
        assert_eq!(t.trajectory.points[0], Point::new(1.0, 1.0));
        assert_eq!(t.trajectory.points[1], Point::new(3.0, 1.0));
        assert_eq!(t.footprints[0].side, Some(Side::Left));
        assert_eq!(t.footprints[1].side, Some(Side::Right));
    }

    #[test]
    fn test_mismatched_lengths() {
        let err = TrackwayCollection::new(
            vec!["a".into()],
            vec![Trajectory::default()],
            vec![vec![], vec![]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            IchnosError::MismatchedLengths {
                trajectories: 1,
                footprints: 2
            }
        );
    }

    #[test]
    fn test_inconsistent_trajectory() {
        let fps = vec![Footprint::new(0, 0.0, 0.0), Footprint::new(1, 1.0, 0.0)];
        let err = TrackwayCollection::new(
            vec!["a".into()],
            vec![Trajectory::from_xy(&[(0.0, 0.0), (1.0, 1.0)])],
            vec![fps],
        )
        .unwrap_err();
        assert!(matches!(err, IchnosError::InvalidTrackway(_)));
    }

    #[test]
    fn test_subset() {
        let c = TrackwayCollection::from_trackways(vec![
            Trackway::from_coordinates("a", &[(0.0, 0.0), (1.0, 0.0)]),
            Trackway::from_coordinates("b", &[(0.0, 1.0), (1.0, 1.0)]),
            Trackway::from_coordinates("c", &[(0.0, 2.0), (1.0, 2.0)]),
        ]);
        let s = c.subset(&[2, 0]).unwrap();
        assert_eq!(s.names(), &["c".to_string(), "a".to_string()]);
        assert!(c.subset(&[5]).is_err());
    }
}
