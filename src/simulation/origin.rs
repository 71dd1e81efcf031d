//! # Origin permutation
//!
//! By default every simulated trajectory starts where its observed counterpart starts, so the
//! null hypothesis is a *same-origin random walk*. Origin permutation relocates each simulated
//! trajectory (by translation) to a starting point drawn uniformly from a region, turning the
//! null into a *random walk from anywhere in that region*:
//!
//! * [`OriginRegion::None`] – no relocation,
//! * [`OriginRegion::MinBox`] – minimum-area rectangle enclosing the observed origins,
//! * [`OriginRegion::ConvexHull`] – convex hull of the observed origins,
//! * [`OriginRegion::Custom`] – a caller-supplied polygon.
//!
//! Uniform points are drawn by rejection inside the polygon's bounding box. When the observed
//! origins are collinear (or coincide) the hull has no area; sampling then falls back to the
//! segment joining the extreme origins and a warning is emitted.
use rand::Rng;
use tracing::warn;

use crate::constants::{Point, EPS, MAX_REJECTION_ATTEMPTS};
use crate::geometry::polygon::{area, bounding_box, contains, convex_hull, min_area_rect};
use crate::ichnos_errors::IchnosError;
use crate::simulation::SimulationEnsemble;
use crate::trackway::TrackwayCollection;

/// Region from which simulated starting points are drawn.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OriginRegion {
    #[default]
    None,
    MinBox,
    ConvexHull,
    Custom(Vec<Point>),
}

/// A resolved region ready for sampling.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingRegion {
    Polygon(Vec<Point>),
    Segment(Point, Point),
}

impl OriginRegion {
    /// Resolve the region against the observed starting points.
    ///
    /// Return
    /// ----------
    /// * `Ok(None)` for [`OriginRegion::None`],
    /// * `Ok(Some(region))` otherwise.
    ///
    /// Errors
    /// -----------------
    /// * [`IchnosError::InvalidRegion`] for a custom polygon with fewer than three vertices,
    ///   non-finite vertices or zero area, or when no observed origin is available.
    pub fn resolve(&self, origins: &[Point]) -> Result<Option<SamplingRegion>, IchnosError> {
        match self {
            OriginRegion::None => Ok(None),
            OriginRegion::Custom(polygon) => {
                if polygon.len() < 3 {
                    return Err(IchnosError::InvalidRegion(format!(
                        "custom polygon needs at least 3 vertices, got {}",
                        polygon.len()
                    )));
                }
                if polygon.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
                    return Err(IchnosError::InvalidRegion(
                        "custom polygon has non-finite vertices".into(),
                    ));
                }
                if area(polygon) < EPS {
                    return Err(IchnosError::InvalidRegion(
                        "custom polygon has zero area".into(),
                    ));
                }
                Ok(Some(SamplingRegion::Polygon(polygon.clone())))
            }
            OriginRegion::MinBox | OriginRegion::ConvexHull => {
                let hull = convex_hull(origins);
                if hull.is_empty() {
                    return Err(IchnosError::InvalidRegion(
                        "no observed origin to build a region from".into(),
                    ));
                }
                if hull.len() < 3 || area(&hull) < EPS {
                    warn!(
                        "observed origins span no area; drawing origins along the segment joining them"
                    );
                    return Ok(Some(SamplingRegion::Segment(hull[0], hull[hull.len() - 1])));
                }
                let polygon = match self {
                    OriginRegion::MinBox => match min_area_rect(&hull) {
                        Some(rect) => rect.to_vec(),
                        None => hull,
                    },
                    _ => hull,
                };
                Ok(Some(SamplingRegion::Polygon(polygon)))
            }
        }
    }
}

impl SamplingRegion {
    /// Draw one point uniformly from the region.
    ///
    /// Errors
    /// -----------------
    /// * [`IchnosError::NumericDegeneracy`] if rejection sampling exhausts its attempts.
    pub fn sample(&self, rng: &mut impl Rng) -> Result<Point, IchnosError> {
        match self {
            SamplingRegion::Segment(a, b) => {
                let t: f64 = rng.random();
                Ok(a + (b - a) * t)
            }
            SamplingRegion::Polygon(polygon) => {
                let (lo, hi) = bounding_box(polygon).ok_or_else(|| {
                    IchnosError::InvalidRegion("empty sampling polygon".into())
                })?;
                for _ in 0..MAX_REJECTION_ATTEMPTS {
                    let p = Point::new(
                        lo.x + (hi.x - lo.x) * rng.random::<f64>(),
                        lo.y + (hi.y - lo.y) * rng.random::<f64>(),
                    );
                    if contains(polygon, &p) {
                        return Ok(p);
                    }
                }
                Err(IchnosError::NumericDegeneracy(format!(
                    "no point drawn inside the origin region after {MAX_REJECTION_ATTEMPTS} attempts"
                )))
            }
        }
    }
}

/// Relocate every simulated trajectory to a random starting point in `region`.
///
/// Arguments
/// -----------------
/// * `ensemble`: Simulated replicates (consumed and returned relocated).
/// * `observed`: Observed collection whose starting points define `MinBox`/`ConvexHull`.
/// * `region`: Region selector; [`OriginRegion::None`] returns the ensemble unchanged.
/// * `rng`: Random number generator.
///
/// Return
/// ----------
/// * The relocated ensemble; trajectory shapes are unchanged, only translated.
pub fn permute_origins(
    mut ensemble: SimulationEnsemble,
    observed: &TrackwayCollection,
    region: &OriginRegion,
    rng: &mut impl Rng,
) -> Result<SimulationEnsemble, IchnosError> {
    let Some(sampling) = region.resolve(&observed.origins())? else {
        return Ok(ensemble);
    };
    for replicate in ensemble.replicates.iter_mut() {
        for traj in replicate.iter_mut() {
            let Some(start) = traj.first().copied() else {
                continue;
            };
            let target = sampling.sample(rng)?;
            *traj = traj.translated(target.x - start.x, target.y - start.y);
        }
    }
    Ok(ensemble)
}

#[cfg(test)]
mod origin_test {
    use super::*;
    use crate::simulation::{simulate_track, SimulationParams};
    use crate::trackway::Trackway;
    use rand::{rngs::StdRng, SeedableRng};

    fn observed() -> TrackwayCollection {
        let mk = |name: &str, x0: f64, y0: f64| {
            let coords: Vec<(f64, f64)> = (0..8)
                .map(|i| {
                    let side = if i % 2 == 0 { 0.3 } else { -0.3 };
                    (x0 + i as f64, y0 + side + 0.2 * (i as f64).cos())
                })
                .collect();
            Trackway::from_coordinates(name, &coords)
        };
        TrackwayCollection::from_trackways(vec![
            mk("A", 0.0, 0.0),
            mk("B", 4.0, 1.0),
            mk("C", 1.0, 6.0),
        ])
    }

    #[test]
    fn test_custom_polygon_validation() {
        let bad = OriginRegion::Custom(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        assert!(matches!(bad.resolve(&[]), Err(IchnosError::InvalidRegion(_))));
        let flat = OriginRegion::Custom(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
        ]);
        assert!(matches!(flat.resolve(&[]), Err(IchnosError::InvalidRegion(_))));
    }

    #[test]
    fn test_relocated_origins_inside_hull() {
        let obs = observed();
        let params = SimulationParams::builder().nsim(25).build().unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let ens = simulate_track(&obs, &params, &mut rng).unwrap();
        let moved = permute_origins(ens, &obs, &OriginRegion::ConvexHull, &mut rng).unwrap();

        let hull = convex_hull(&obs.origins());
        for rep in &moved.replicates {
            for (sim, o) in rep.iter().zip(obs.trajectories()) {
                assert_eq!(sim.len(), o.len());
                assert!(contains(&hull, sim.first().unwrap()));
            }
        }
    }

    #[test]
    fn test_none_is_identity() {
        let obs = observed();
        let params = SimulationParams::builder().nsim(3).build().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let ens = simulate_track(&obs, &params, &mut rng).unwrap();
        let same = permute_origins(ens.clone(), &obs, &OriginRegion::None, &mut rng).unwrap();
        assert_eq!(ens, same);
    }

    #[test]
    fn test_collinear_origins_fall_back_to_segment() {
        let origins = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(3.0, 3.0),
        ];
        let region = OriginRegion::MinBox.resolve(&origins).unwrap().unwrap();
        assert!(matches!(region, SamplingRegion::Segment(_, _)));
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let p = region.sample(&mut rng).unwrap();
            assert!((p.x - p.y).abs() < 1e-12);
            assert!((0.0..=3.0).contains(&p.x));
        }
    }

    #[test]
    fn test_min_box_contains_hull_samples() {
        let origins = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(1.0, 2.0),
        ];
        let region = OriginRegion::MinBox.resolve(&origins).unwrap().unwrap();
        let SamplingRegion::Polygon(rect) = region else {
            panic!("expected a polygon");
        };
        assert_eq!(rect.len(), 4);
        assert!(area(&rect) >= area(&convex_hull(&origins)) - 1e-12);
    }
}
