//! # Trackway clustering
//!
//! Groups trackways by their movement signature.
//!
//! ## Pipeline
//!
//! 1. **Working matrix** ([`features`]) – filter short or incomplete trackways, expand circular
//!    variables into sine/cosine pairs, optional monotone transforms and z-scaling.
//! 2. **Backend**, chosen by [`ClusterMethod`]:
//!    * [`ClusterMethod::Hierarchical`] – dissimilarity matrix + Lance–Williams agglomeration
//!      ([`hierarchical`]), optionally cut into `k` groups,
//!    * [`ClusterMethod::ModelBased`] – Gaussian mixtures over `1..=max_clusters` components
//!      and every applicable covariance model, selected by BIC ([`gmm`]).
//!
//! With fewer than two trackways left after filtering, [`cluster_track`] returns
//! [`ClusterOutcome::NotPossible`] instead of an error.
//!
//! ## Example
//!
//! ```rust
//! use ichnos::clustering::{cluster_track, ClusterMethod, ClusterOutcome, ClusterParams};
//! use ichnos::geometry::track_param::track_param;
//! use ichnos::trackway::{Trackway, TrackwayCollection};
//!
//! let mk = |name: &str, amp: f64| {
//!     let coords: Vec<(f64, f64)> = (0..8)
//!         .map(|i| (i as f64, if i % 2 == 0 { amp } else { -amp }))
//!         .collect();
//!     Trackway::from_coordinates(name, &coords)
//! };
//! let table = track_param(&TrackwayCollection::from_trackways(vec![mk("A", 0.3), mk("B", 0.5)]));
//!
//! let params = ClusterParams::builder()
//!     .variables(&["StepLen", "TrackWidth"])
//!     .method(ClusterMethod::Hierarchical)
//!     .k(2)
//!     .build()
//!     .unwrap();
//! let result = cluster_track(&table, &params).unwrap();
//! assert!(matches!(result.outcome, ClusterOutcome::Hierarchical { .. }));
//! ```
use std::fmt;

use tracing::{info, warn};

use crate::constants::DEFAULT_MAX_CLUSTERS;
use crate::geometry::track_param::{ParamTable, Variable};
use crate::ichnos_errors::IchnosError;

pub mod features;
pub mod gmm;
pub mod hierarchical;

use features::{working_matrix, WorkingMatrix};
use gmm::{fit_gmm, CovarianceModel, GmmResult};
use hierarchical::{distance_matrix, hclust, Dendrogram, DistanceMetric, Linkage};

/// Clustering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterMethod {
    Hierarchical,
    #[default]
    ModelBased,
}

/// Clustering configuration.
///
/// Defaults
/// -----------------
/// Variables `TurnAng, sdTurnAng, Sinuosity, Straightness, PathLen, BeelineLen, StepLen`,
/// transforms and scaling on, model-based backend, Euclidean distance, complete linkage,
/// no cut, `max_clusters = 9`, every applicable covariance model.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub variables: Vec<Variable>,
    pub transform: bool,
    pub scale: bool,
    pub method: ClusterMethod,
    pub distance: DistanceMetric,
    pub linkage: Linkage,
    /// Number of groups for the hierarchical cut; `None` leaves the tree uncut.
    pub k: Option<usize>,
    pub max_clusters: usize,
    /// Covariance models tried by the model-based backend; empty means all applicable.
    pub models: Vec<CovarianceModel>,
}

impl ClusterParams {
    pub fn builder() -> ClusterParamsBuilder {
        ClusterParamsBuilder::new()
    }
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            variables: vec![
                Variable::TurnAngle,
                Variable::SdTurnAngle,
                Variable::Sinuosity,
                Variable::Straightness,
                Variable::PathLength,
                Variable::BeelineLength,
                Variable::StepLength,
            ],
            transform: true,
            scale: true,
            method: ClusterMethod::default(),
            distance: DistanceMetric::default(),
            linkage: Linkage::default(),
            k: None,
            max_clusters: DEFAULT_MAX_CLUSTERS,
            models: Vec::new(),
        }
    }
}

/// Builder for [`ClusterParams`], with validation.
///
/// Variables are given by name; unknown names are dropped with a warning when the builder
/// is validated.
#[derive(Debug, Clone, Default)]
pub struct ClusterParamsBuilder {
    params: ClusterParams,
    variable_names: Option<Vec<String>>,
}

impl ClusterParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.variable_names = Some(names.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }
    pub fn transform(mut self, v: bool) -> Self {
        self.params.transform = v;
        self
    }
    pub fn scale(mut self, v: bool) -> Self {
        self.params.scale = v;
        self
    }
    pub fn method(mut self, v: ClusterMethod) -> Self {
        self.params.method = v;
        self
    }
    pub fn distance(mut self, v: DistanceMetric) -> Self {
        self.params.distance = v;
        self
    }
    pub fn linkage(mut self, v: Linkage) -> Self {
        self.params.linkage = v;
        self
    }
    pub fn k(mut self, v: usize) -> Self {
        self.params.k = Some(v);
        self
    }
    pub fn max_clusters(mut self, v: usize) -> Self {
        self.params.max_clusters = v;
        self
    }
    pub fn models(mut self, v: &[CovarianceModel]) -> Self {
        self.params.models = v.to_vec();
        self
    }

    /// Validate and produce the parameters.
    ///
    /// Validation rules
    /// -----------------
    /// * at least one recognised variable ([`IchnosError::NoValidVariables`] otherwise),
    /// * `k >= 1` when set,
    /// * `max_clusters >= 1`,
    /// * Minkowski exponent `p >= 1`.
    pub fn build(mut self) -> Result<ClusterParams, IchnosError> {
        if let Some(names) = self.variable_names.take() {
            self.params.variables = Variable::parse_list(&names)?;
        }
        let p = &self.params;
        if p.k == Some(0) {
            return Err(IchnosError::InvalidParameter("k must be >= 1".into()));
        }
        if p.max_clusters == 0 {
            return Err(IchnosError::InvalidParameter(
                "max_clusters must be >= 1".into(),
            ));
        }
        if let DistanceMetric::Minkowski(exp) = p.distance {
            if !(exp >= 1.0 && exp.is_finite()) {
                return Err(IchnosError::InvalidParameter(format!(
                    "minkowski exponent must be a finite value >= 1, got {exp}"
                )));
            }
        }
        Ok(self.params)
    }
}

impl fmt::Display for ClusterParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars: Vec<&str> = self.variables.iter().map(|v| v.name()).collect();
        if f.alternate() {
            writeln!(f, "Clustering parameters")?;
            writeln!(f, "---------------------")?;
            writeln!(f, "  variables    = {}", vars.join(", "))?;
            writeln!(f, "  transform    = {}", self.transform)?;
            writeln!(f, "  scale        = {}", self.scale)?;
            writeln!(f, "  method       = {:?}", self.method)?;
            writeln!(f, "  distance     = {}", self.distance)?;
            writeln!(f, "  linkage      = {}", self.linkage)?;
            writeln!(
                f,
                "  k            = {}",
                self.k.map_or_else(|| "none".to_string(), |k| k.to_string())
            )?;
            write!(f, "  max_clusters = {}", self.max_clusters)
        } else {
            write!(
                f,
                "ClusterParams(method={:?}, variables=[{}], k={:?}, max_clusters={})",
                self.method,
                vars.join(","),
                self.k,
                self.max_clusters
            )
        }
    }
}

/// Backend output.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOutcome {
    Hierarchical {
        tree: Dendrogram,
        /// Group per included trackway when `k` was given.
        groups: Option<Vec<usize>>,
    },
    ModelBased(GmmResult),
    /// Fewer than two trackways were left after filtering.
    NotPossible { reason: String },
}

/// Clustering of a parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResult {
    pub variables: Vec<Variable>,
    pub working: WorkingMatrix,
    pub outcome: ClusterOutcome,
}

impl ClusterResult {
    /// Included trackways, in row order of the working matrix.
    pub fn names(&self) -> &[String] {
        &self.working.names
    }

    /// Trackways left out of the analysis, with the reason.
    pub fn excluded(&self) -> &[(String, String)] {
        &self.working.excluded
    }

    /// Hard assignment per included trackway, when one exists.
    pub fn labels(&self) -> Option<&[usize]> {
        match &self.outcome {
            ClusterOutcome::Hierarchical { groups, .. } => groups.as_deref(),
            ClusterOutcome::ModelBased(g) => Some(&g.classification),
            ClusterOutcome::NotPossible { .. } => None,
        }
    }

    pub fn is_possible(&self) -> bool {
        !matches!(self.outcome, ClusterOutcome::NotPossible { .. })
    }
}

impl fmt::Display for ClusterResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ClusterOutcome::NotPossible { reason } => writeln!(f, "No clustering possible: {reason}")?,
            ClusterOutcome::Hierarchical { tree, .. } => write!(f, "{tree}")?,
            ClusterOutcome::ModelBased(g) => writeln!(f, "{g}")?,
        }
        if let Some(labels) = self.labels() {
            for (name, l) in self.names().iter().zip(labels) {
                writeln!(f, "  {name:<12} -> {l}")?;
            }
        }
        for (name, why) in self.excluded() {
            writeln!(f, "  {name:<12} excluded: {why}")?;
        }
        Ok(())
    }
}

/// Cluster trackways by their movement parameters.
///
/// Arguments
/// -----------------
/// * `table`: Parameter table from [`crate::geometry::track_param::track_param`].
/// * `params`: Variables, preprocessing and backend.
///
/// Return
/// ----------
/// * A [`ClusterResult`]; its outcome is [`ClusterOutcome::NotPossible`] when fewer than two
///   trackways survive filtering.
///
/// Errors
/// -----------------
/// * [`IchnosError::NoValidVariables`] for an empty variable selection.
/// * [`IchnosError::InvalidParameter`] if `k` exceeds the number of included trackways.
/// * [`IchnosError::NumericDegeneracy`] if no mixture model can be fitted.
pub fn cluster_track(
    table: &ParamTable,
    params: &ClusterParams,
) -> Result<ClusterResult, IchnosError> {
    if params.variables.is_empty() {
        return Err(IchnosError::NoValidVariables(
            "empty variable selection".into(),
        ));
    }
    let working = working_matrix(table, &params.variables, params.transform, params.scale);

    let outcome = if working.n_obs() < 2 {
        let reason = format!(
            "{} trackway(s) left after filtering, at least 2 required",
            working.n_obs()
        );
        warn!("{reason}");
        ClusterOutcome::NotPossible { reason }
    } else {
        match params.method {
            ClusterMethod::Hierarchical => {
                let dist = distance_matrix(&working.data, params.distance);
                let tree = hclust(&dist, working.names.clone(), params.linkage)?;
                let groups = params.k.map(|k| tree.cut(k)).transpose()?;
                ClusterOutcome::Hierarchical { tree, groups }
            }
            ClusterMethod::ModelBased => {
                let g = fit_gmm(&working.data, params.max_clusters, &params.models)?;
                info!(
                    model = %g.best.model,
                    components = g.best.g,
                    bic = g.best.bic,
                    "mixture model selected"
                );
                ClusterOutcome::ModelBased(g)
            }
        }
    };

    Ok(ClusterResult {
        variables: params.variables.clone(),
        working,
        outcome,
    })
}

#[cfg(test)]
mod clustering_test {
    use super::*;
    use crate::geometry::track_param::track_param;
    use crate::trackway::{Trackway, TrackwayCollection};

    fn zig(name: &str, n: usize, amp: f64, step: f64) -> Trackway {
        let coords: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let s = if i % 2 == 0 { amp } else { -amp };
                (step * i as f64, s + 0.05 * (i as f64 * 1.3).sin())
            })
            .collect();
        Trackway::from_coordinates(name, &coords)
    }

    #[test]
    fn test_builder() {
        let p = ClusterParams::builder()
            .variables(&["StepLen", "bogus", "Gauge"])
            .build()
            .unwrap();
        assert_eq!(p.variables, vec![Variable::StepLength, Variable::Gauge]);
        assert!(matches!(
            ClusterParams::builder().variables(&["nope"]).build(),
            Err(IchnosError::NoValidVariables(_))
        ));
        assert!(ClusterParams::builder().k(0).build().is_err());
        assert!(ClusterParams::builder()
            .distance(DistanceMetric::Minkowski(0.5))
            .build()
            .is_err());
    }

    #[test]
    fn test_not_possible_with_one_trackway() {
        let table = track_param(&TrackwayCollection::from_trackways(vec![
            zig("A", 8, 0.3, 1.0),
            zig("tiny", 3, 0.3, 1.0),
        ]));
        for method in [ClusterMethod::Hierarchical, ClusterMethod::ModelBased] {
            let params = ClusterParams::builder()
                .variables(&["StepLen"])
                .method(method)
                .build()
                .unwrap();
            let r = cluster_track(&table, &params).unwrap();
            assert!(!r.is_possible());
            assert_eq!(r.excluded()[0].0, "tiny");
            assert_eq!(r.labels(), None);
        }
    }

    #[test]
    fn test_hierarchical_separates_step_lengths() {
        let table = track_param(&TrackwayCollection::from_trackways(vec![
            zig("s1", 10, 0.3, 1.0),
            zig("l1", 10, 0.3, 3.0),
            zig("s2", 10, 0.32, 1.05),
            zig("l2", 10, 0.31, 3.1),
        ]));
        let params = ClusterParams::builder()
            .variables(&["StepLen"])
            .method(ClusterMethod::Hierarchical)
            .linkage(Linkage::WardD2)
            .k(2)
            .build()
            .unwrap();
        let r = cluster_track(&table, &params).unwrap();
        assert_eq!(r.labels(), Some(&[0, 1, 0, 1][..]));
    }

    #[test]
    fn test_single_circular_variable_uses_multivariate_models() {
        let heading = |name: &str, deg: f64| {
            let (sin, cos) = deg.to_radians().sin_cos();
            let coords: Vec<(f64, f64)> = (0..8)
                .map(|i| {
                    let side = if i % 2 == 0 { 0.3 } else { -0.3 };
                    let along = i as f64;
                    (along * cos - side * sin, along * sin + side * cos)
                })
                .collect();
            Trackway::from_coordinates(name, &coords)
        };
        let table = track_param(&TrackwayCollection::from_trackways(vec![
            heading("a", 0.0),
            heading("b", 25.0),
            heading("c", 70.0),
            heading("d", 110.0),
        ]));
        let params = ClusterParams::builder()
            .variables(&["TurnAng"])
            .max_clusters(1)
            .build()
            .unwrap();
        let r = cluster_track(&table, &params).unwrap();
        assert_eq!(r.working.columns, vec!["TurnAng_sin", "TurnAng_cos"]);
        match &r.outcome {
            ClusterOutcome::ModelBased(g) => {
                assert_eq!(g.bic.models, CovarianceModel::MULTIVARIATE.to_vec());
                assert!(!g.best.model.is_univariate());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_k_larger_than_observations() {
        let table = track_param(&TrackwayCollection::from_trackways(vec![
            zig("a", 8, 0.3, 1.0),
            zig("b", 8, 0.3, 2.0),
        ]));
        let params = ClusterParams::builder()
            .variables(&["StepLen"])
            .method(ClusterMethod::Hierarchical)
            .k(3)
            .build()
            .unwrap();
        assert!(matches!(
            cluster_track(&table, &params),
            Err(IchnosError::InvalidParameter(_))
        ));
    }
}
