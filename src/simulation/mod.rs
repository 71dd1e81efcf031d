//! # Trajectory simulation
//!
//! Randomized trajectory ensembles used as null models by the Monte Carlo tests.
//!
//! ## Movement models
//!
//! Every simulated trajectory is rebuilt step by step from the **step lengths** and
//! **turning statistics** of the observed trajectory it replaces:
//!
//! * [`MovementModel::Unconstrained`] – correlated random walk with a uniformly random initial
//!   heading; each heading is the previous one plus a drawn relative turn.
//! * [`MovementModel::Directed`] – every heading is the target bearing plus a drawn deviation
//!   of the original headings about their circular mean. The bearing defaults to the
//!   original first → last direction.
//! * [`MovementModel::Constrained`] – correlated random walk starting on the original initial
//!   heading and kept inside a corridor of half-width `corridor_width` around the original
//!   polyline. Steps that leave the corridor are redrawn up to `max_retries` times, then
//!   clipped onto the corridor boundary.
//!
//! Draws come from the trajectory's own steps/turns ([`StepSampling::Empirical`], bootstrap)
//! or from Normal / wrapped-Normal laws fitted to them ([`StepSampling::Parametric`]).
//!
//! ## Guarantees
//!
//! * the simulated trajectory has the same number of points as the original,
//! * it starts at the original starting point (see [`origin`] for origin permutation),
//! * the whole ensemble is a pure function of the input and the caller's generator: a fixed
//!   seed reproduces it exactly.
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use ichnos::simulation::{simulate_track, MovementModel, SimulationParams};
//! use ichnos::trackway::{Trackway, TrackwayCollection};
//!
//! let t = Trackway::from_coordinates("T1", &[(0.0, 0.0), (1.0, 0.4), (2.0, 0.1), (3.0, 0.6), (4.0, 0.2)]);
//! let collection = TrackwayCollection::from_trackways(vec![t]);
//! let params = SimulationParams::builder()
//!     .nsim(20)
//!     .model(MovementModel::Directed)
//!     .build()
//!     .unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let ensemble = simulate_track(&collection, &params, &mut rng).unwrap();
//! assert_eq!(ensemble.nsim(), 20);
//! assert_eq!(ensemble.replicates[0][0].len(), collection.trajectories()[0].len());
//! ```
use std::f64::consts::PI;
use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, warn};

use crate::constants::{Degree, Point, DEFAULT_NSIM, EPS};
use crate::geometry::circular::{circular_mean, circular_sd, wrap_radians};
use crate::geometry::closest_on_polyline;
use crate::ichnos_errors::IchnosError;
use crate::progress::{CancelToken, ReplicateProgress};
use crate::trackway::{Trajectory, TrackwayCollection};

pub mod origin;

/// Null movement model used to randomize trajectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementModel {
    Unconstrained,
    Directed,
    Constrained,
}

impl fmt::Display for MovementModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MovementModel::Unconstrained => "Unconstrained",
            MovementModel::Directed => "Directed",
            MovementModel::Constrained => "Constrained",
        };
        f.write_str(s)
    }
}

/// How step lengths and angles are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSampling {
    /// Resample the trajectory's own values with replacement.
    Empirical,
    /// Normal step lengths (truncated at zero) and wrapped-Normal angles.
    Parametric,
}

/// Configuration of [`simulate_track`].
///
/// Fields
/// -----------------
/// * `nsim` – number of replicate collections.
/// * `model` – null movement model.
/// * `sampling` – empirical bootstrap or parametric draws.
/// * `target_bearing` – bearing (degrees, CCW from +x) of the directed model; `None` uses each
///   trajectory's own first → last bearing.
/// * `corridor_width` – half-width of the constrained corridor; `None` uses each trajectory's
///   mean step length.
/// * `max_retries` – redraws allowed before a constrained step is clipped.
///
/// Defaults
/// -----------------
/// `nsim = 1000`, `Unconstrained`, `Empirical`, no target bearing, no corridor width,
/// `max_retries = 50`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub nsim: usize,
    pub model: MovementModel,
    pub sampling: StepSampling,
    pub target_bearing: Option<Degree>,
    pub corridor_width: Option<f64>,
    pub max_retries: usize,
}

impl SimulationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SimulationParamsBuilder {
        SimulationParamsBuilder::new()
    }
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            nsim: DEFAULT_NSIM,
            model: MovementModel::Unconstrained,
            sampling: StepSampling::Empirical,
            target_bearing: None,
            corridor_width: None,
            max_retries: 50,
        }
    }
}

/// Builder for [`SimulationParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct SimulationParamsBuilder {
    params: SimulationParams,
}

impl SimulationParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: SimulationParams::default(),
        }
    }

    pub fn nsim(mut self, v: usize) -> Self {
        self.params.nsim = v;
        self
    }
    pub fn model(mut self, v: MovementModel) -> Self {
        self.params.model = v;
        self
    }
    pub fn sampling(mut self, v: StepSampling) -> Self {
        self.params.sampling = v;
        self
    }
    pub fn target_bearing(mut self, v: Degree) -> Self {
        self.params.target_bearing = Some(v);
        self
    }
    pub fn corridor_width(mut self, v: f64) -> Self {
        self.params.corridor_width = Some(v);
        self
    }
    pub fn max_retries(mut self, v: usize) -> Self {
        self.params.max_retries = v;
        self
    }

    /// Validate and produce the parameters.
    ///
    /// Validation rules
    /// -----------------
    /// * `nsim >= 1`,
    /// * `target_bearing` finite when set,
    /// * `corridor_width > 0` when set.
    pub fn build(self) -> Result<SimulationParams, IchnosError> {
        let p = &self.params;
        if p.nsim == 0 {
            return Err(IchnosError::InvalidParameter("nsim must be >= 1".into()));
        }
        if let Some(b) = p.target_bearing {
            if !b.is_finite() {
                return Err(IchnosError::InvalidParameter(
                    "target_bearing must be finite".into(),
                ));
            }
        }
        if let Some(w) = p.corridor_width {
            if w.partial_cmp(&0.0) != Some(std::cmp::Ordering::Greater) {
                return Err(IchnosError::InvalidParameter(
                    "corridor_width must be > 0".into(),
                ));
            }
        }
        Ok(self.params)
    }
}

impl fmt::Display for SimulationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<f64>| v.map_or_else(|| "auto".to_string(), |x| format!("{x:.3}"));
        if f.alternate() {
            writeln!(f, "Trajectory simulation parameters")?;
            writeln!(f, "--------------------------------")?;
            writeln!(f, "  nsim           = {}", self.nsim)?;
            writeln!(f, "  model          = {}", self.model)?;
            writeln!(f, "  sampling       = {:?}", self.sampling)?;
            writeln!(f, "  target_bearing = {}", opt(self.target_bearing))?;
            writeln!(f, "  corridor_width = {}", opt(self.corridor_width))?;
            write!(f, "  max_retries    = {}", self.max_retries)
        } else {
            write!(
                f,
                "SimulationParams(nsim={}, model={}, sampling={:?}, bearing={}, corridor={})",
                self.nsim,
                self.model,
                self.sampling,
                opt(self.target_bearing),
                opt(self.corridor_width)
            )
        }
    }
}

/// `nsim` randomized replicates of an observed collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationEnsemble {
    pub names: Vec<String>,
    pub model: MovementModel,
    /// One entry per replicate; each holds one trajectory per observed trackway.
    pub replicates: Vec<Vec<Trajectory>>,
}

impl SimulationEnsemble {
    pub fn nsim(&self) -> usize {
        self.replicates.len()
    }

    pub fn n_trackways(&self) -> usize {
        self.names.len()
    }
}

/// Step statistics of one observed trajectory.
struct StepModel {
    origin: Point,
    n_points: usize,
    steps: Vec<f64>,
    /// relative turns, radians
    turns: Vec<f64>,
    /// headings minus their circular mean, radians
    deviations: Vec<f64>,
    first_heading: f64,
    bearing: f64,
    step_normal: Option<Normal<f64>>,
    turn_normal: Option<Normal<f64>>,
    deviation_normal: Option<Normal<f64>>,
    mean_step: f64,
}

fn normal_or_none(mean: f64, sd: f64) -> Result<Option<Normal<f64>>, IchnosError> {
    if sd.is_finite() && sd > 0.0 {
        Ok(Some(Normal::new(mean, sd)?))
    } else {
        Ok(None)
    }
}

impl StepModel {
    /// `None` when the trajectory has fewer than two points or never moves.
    fn fit(trajectory: &Trajectory) -> Result<Option<Self>, IchnosError> {
        let pts = &trajectory.points;
        if pts.len() < 2 || !trajectory.is_finite() {
            return Ok(None);
        }
        let steps: Vec<f64> = pts.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
        let headings: Vec<f64> = pts
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|v| v.norm() > EPS)
            .map(|v| v.y.atan2(v.x))
            .collect();
        if headings.is_empty() {
            return Ok(None);
        }
        let turns: Vec<f64> = headings
            .windows(2)
            .map(|w| wrap_radians(w[1] - w[0]))
            .collect();

        let heading_deg: Vec<Degree> = headings.iter().map(|h| h.to_degrees()).collect();
        let mean_heading = circular_mean(&heading_deg).map_or(headings[0], f64::to_radians);
        let deviations: Vec<f64> = headings
            .iter()
            .map(|h| wrap_radians(h - mean_heading))
            .collect();
        let sd_heading = circular_sd(&heading_deg).unwrap_or(0.0).to_radians();

        let turn_deg: Vec<Degree> = turns.iter().map(|t| t.to_degrees()).collect();
        let mean_turn = circular_mean(&turn_deg).map_or(0.0, f64::to_radians);
        let sd_turn = circular_sd(&turn_deg).unwrap_or(0.0).to_radians();

        let n = steps.len() as f64;
        let mean_step = steps.iter().sum::<f64>() / n;
        let sd_step = if steps.len() > 1 {
            (steps.iter().map(|s| (s - mean_step).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        let first = pts[0];
        let last = pts[pts.len() - 1];
        let chord = last - first;
        let bearing = if chord.norm() > EPS {
            chord.y.atan2(chord.x)
        } else {
            mean_heading
        };

        Ok(Some(StepModel {
            origin: first,
            n_points: pts.len(),
            step_normal: normal_or_none(mean_step, sd_step)?,
            turn_normal: normal_or_none(mean_turn, sd_turn)?,
            deviation_normal: normal_or_none(0.0, sd_heading)?,
            steps,
            turns,
            deviations,
            first_heading: headings[0],
            bearing,
            mean_step,
        }))
    }

    fn draw_step<R: Rng>(&self, sampling: StepSampling, rng: &mut R) -> f64 {
        match (sampling, &self.step_normal) {
            (StepSampling::Parametric, Some(normal)) => {
                for _ in 0..100 {
                    let s = normal.sample(rng);
                    if s > 0.0 {
                        return s;
                    }
                }
                self.mean_step
            }
            (StepSampling::Parametric, None) => self.mean_step,
            (StepSampling::Empirical, _) => self.steps[rng.random_range(0..self.steps.len())],
        }
    }

    fn draw_turn<R: Rng>(&self, sampling: StepSampling, rng: &mut R) -> f64 {
        match sampling {
            StepSampling::Parametric => self
                .turn_normal
                .as_ref()
                .map_or(0.0, |n| wrap_radians(n.sample(rng))),
            StepSampling::Empirical if self.turns.is_empty() => 0.0,
            StepSampling::Empirical => self.turns[rng.random_range(0..self.turns.len())],
        }
    }

    fn draw_deviation<R: Rng>(&self, sampling: StepSampling, rng: &mut R) -> f64 {
        match sampling {
            StepSampling::Parametric => self
                .deviation_normal
                .as_ref()
                .map_or(0.0, |n| wrap_radians(n.sample(rng))),
            StepSampling::Empirical => {
                self.deviations[rng.random_range(0..self.deviations.len())]
            }
        }
    }
}

#[inline]
fn advance(p: &Point, heading: f64, step: f64) -> Point {
    Point::new(p.x + step * heading.cos(), p.y + step * heading.sin())
}

fn simulate_one<R: Rng>(
    model: &StepModel,
    reference: &Trajectory,
    params: &SimulationParams,
    rng: &mut R,
) -> Trajectory {
    let mut points = Vec::with_capacity(model.n_points);
    points.push(model.origin);
    let sampling = params.sampling;

    match params.model {
        MovementModel::Unconstrained => {
            let mut heading = rng.random_range(-PI..PI);
            for i in 1..model.n_points {
                if i > 1 {
                    heading = wrap_radians(heading + model.draw_turn(sampling, rng));
                }
                let step = model.draw_step(sampling, rng);
                points.push(advance(&points[i - 1], heading, step));
            }
        }
        MovementModel::Directed => {
            let bearing = params
                .target_bearing
                .map_or(model.bearing, |b| b.to_radians());
            for i in 1..model.n_points {
                let heading = bearing + model.draw_deviation(sampling, rng);
                let step = model.draw_step(sampling, rng);
                points.push(advance(&points[i - 1], heading, step));
            }
        }
        MovementModel::Constrained => {
            let half_width = params.corridor_width.unwrap_or(model.mean_step).max(EPS);
            let mut heading = model.first_heading;
            for i in 1..model.n_points {
                let prev = points[i - 1];
                let mut accepted = None;
                let mut candidate = prev;
                let mut candidate_heading = heading;
                for attempt in 0..=params.max_retries {
                    candidate_heading = if i == 1 && attempt == 0 {
                        heading
                    } else {
                        wrap_radians(heading + model.draw_turn(sampling, rng))
                    };
                    let step = model.draw_step(sampling, rng);
                    candidate = advance(&prev, candidate_heading, step);
                    let inside = closest_on_polyline(&candidate, reference)
                        .is_some_and(|(d, _)| d <= half_width);
                    if inside {
                        accepted = Some(candidate);
                        break;
                    }
                }
                let next = match accepted {
                    Some(p) => {
                        heading = candidate_heading;
                        p
                    }
                    None => {
                        // clip onto the corridor boundary
                        let clipped = match closest_on_polyline(&candidate, reference) {
                            Some((d, q)) if d > EPS => q + (candidate - q) * (half_width / d),
                            _ => candidate,
                        };
                        let v = clipped - prev;
                        if v.norm() > EPS {
                            heading = v.y.atan2(v.x);
                        }
                        clipped
                    }
                };
                points.push(next);
            }
        }
    }
    Trajectory::new(points)
}

/// Simulate `params.nsim` replicate collections from an observed collection.
///
/// Arguments
/// -----------------
/// * `collection`: Observed trackways; each trajectory is randomized independently.
/// * `params`: Movement model and sampling configuration.
/// * `rng`: Random number generator, seeded once by the caller for reproducibility.
///
/// Return
/// ----------
/// * A [`SimulationEnsemble`] whose replicates hold one trajectory per observed trackway, in
///   collection order. Trajectories with fewer than two points (or that never move) are copied
///   unchanged and named in a warning.
///
/// Errors
/// -----------------
/// * [`IchnosError::NotEnoughTrackways`] for an empty collection.
/// * [`IchnosError::InvalidParameter`] if `nsim == 0`.
pub fn simulate_track(
    collection: &TrackwayCollection,
    params: &SimulationParams,
    rng: &mut impl Rng,
) -> Result<SimulationEnsemble, IchnosError> {
    simulate_track_with_cancel(collection, params, rng, None)
}

/// [`simulate_track`] with a cancellation token polled between replicates.
pub fn simulate_track_with_cancel(
    collection: &TrackwayCollection,
    params: &SimulationParams,
    rng: &mut impl Rng,
    cancel: Option<&CancelToken>,
) -> Result<SimulationEnsemble, IchnosError> {
    if collection.is_empty() {
        return Err(IchnosError::NotEnoughTrackways {
            required: 1,
            found: 0,
        });
    }
    if params.nsim == 0 {
        return Err(IchnosError::InvalidParameter("nsim must be >= 1".into()));
    }

    let mut models = Vec::with_capacity(collection.len());
    let mut copied = Vec::new();
    for (name, traj, _) in collection.iter() {
        let m = StepModel::fit(traj)?;
        if m.is_none() {
            copied.push(name.to_string());
        }
        models.push(m);
    }
    if !copied.is_empty() {
        warn!("trackway(s) {copied:?} too short to randomize; copied unchanged into every replicate");
    }
    debug!(nsim = params.nsim, model = %params.model, "simulating trajectories");

    let progress = ReplicateProgress::new(params.nsim, "simulate");
    let mut replicates = Vec::with_capacity(params.nsim);
    for _ in 0..params.nsim {
        CancelToken::check(cancel)?;
        let replicate = models
            .iter()
            .zip(collection.trajectories())
            .map(|(m, traj)| match m {
                Some(m) => simulate_one(m, traj, params, &mut *rng),
                None => traj.clone(),
            })
            .collect();
        replicates.push(replicate);
        progress.inc();
    }
    progress.finish();

    Ok(SimulationEnsemble {
        names: collection.names().to_vec(),
        model: params.model,
        replicates,
    })
}
