//! # Ichnos
//!
//! Quantitative analysis of fossil trackways: movement parameters, null-model simulation,
//! pairwise similarity with Monte Carlo significance, clustering and measurement-error
//! variance decomposition.
//!
//! Pipeline
//! -----------------
//! ```text
//! TrackwayCollection ──► track_param ──► ParamTable ──► cluster_track
//!        │                                   │
//!        │                                   └──► anatomical_variance / observer_variance
//!        ▼
//! simulate_track ──► SimulationEnsemble ──► similarity_test / intersection_test
//!                                                   │
//!                                                   └──► combined_prob
//! ```
//!
//! Every stochastic entry point takes a caller-supplied `rng: &mut impl Rng`; a seeded
//! generator reproduces the result exactly. Long Monte Carlo runs have `*_with_cancel`
//! variants accepting a [`progress::CancelToken`].
//!
//! Cargo features
//! -----------------
//! * `parallel` (default): replicate metrics are evaluated with rayon.
//! * `progress`: an indicatif progress bar over replicates.
//!
//! Example
//! -----------------
//! ```rust
//! use ichnos::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let zigzag = |name: &str, dy: f64| {
//!     let coords: Vec<(f64, f64)> = (0..8)
//!         .map(|i| (i as f64, dy + if i % 2 == 0 { 0.2 } else { -0.2 }))
//!         .collect();
//!     Trackway::from_coordinates(name, &coords)
//! };
//! let collection =
//!     TrackwayCollection::from_trackways(vec![zigzag("A", 0.0), zigzag("B", 3.0)]);
//!
//! let params = SimulationParams::builder().nsim(19).build().unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//! let ensemble = simulate_track(&collection, &params, &mut rng).unwrap();
//!
//! let result = similarity_test(
//!     &collection,
//!     &ensemble,
//!     PairMetric::Dtw,
//!     Superposition::Centroid,
//! )
//! .unwrap();
//! let p = result.p_values.get(0, 1).unwrap();
//! assert!(p >= 1.0 / 20.0 && p <= 1.0);
//! ```
pub mod clustering;
pub mod constants;
pub mod geometry;
pub mod ichnos_errors;
pub mod inference;
pub mod progress;
pub mod similarity;
pub mod simulation;
pub mod trackway;
pub mod variance;

/// The types and entry points most analyses need.
pub mod prelude {
    pub use crate::clustering::{cluster_track, ClusterMethod, ClusterParams, ClusterResult};
    pub use crate::geometry::track_param::{track_param, MovementParams, ParamTable, Variable};
    pub use crate::ichnos_errors::IchnosError;
    pub use crate::inference::combined::{combined_prob, CombinedResult};
    pub use crate::inference::{
        intersection_test, similarity_test, Direction, MonteCarloResult,
    };
    pub use crate::progress::CancelToken;
    pub use crate::similarity::{
        simil_dtw, simil_frechet, track_intersection, PairMetric, PairwiseMatrix, Superposition,
    };
    pub use crate::simulation::origin::OriginRegion;
    pub use crate::simulation::{
        simulate_track, MovementModel, SimulationEnsemble, SimulationParams,
    };
    pub use crate::trackway::{Footprint, Side, Trackway, TrackwayCollection, Trajectory};
    pub use crate::variance::anatomical::{anatomical_variance, AnatomicalParams, Jitter};
    pub use crate::variance::observer::{observer_variance, ReplicateRecord};
    pub use crate::variance::{SnrRating, VarianceTable};
}
