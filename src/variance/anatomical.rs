//! Anatomical (landmark) uncertainty by simulation.
//!
//! Every footprint is moved to a random point of a disk of radius `error_radius` centred on
//! its digitized position, the medial trajectory is rebuilt, and the movement parameters are
//! recomputed. Repeating this `n_sim` times gives, for each trackway `t` and variable, a sample
//! `x_{t,1..n_sim}`. With population variances:
//!
//! ```text
//! Var(x) = Var_t( mean_s x_{t,s} ) + mean_t( Var_s x_{t,s} )
//!           └──── Track ────────┘   └──── Anatomical ───┘
//! ```
use std::f64::consts::PI;
use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, warn};

use crate::constants::MAX_REJECTION_ATTEMPTS;
use crate::geometry::track_param::{MovementParams, Variable};
use crate::ichnos_errors::IchnosError;
use crate::progress::{CancelToken, ReplicateProgress};
use crate::trackway::{Footprint, Trajectory, TrackwayCollection};
use crate::variance::{
    average_components, Component, QcSummary, VarianceMode, VarianceRow, VarianceTable,
};

/// Distribution of the landmark displacement inside the error disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Uniform over the disk area.
    Uniform,
    /// Isotropic Gaussian with standard deviation `sd`, redrawn until inside the disk.
    TruncatedGaussian { sd: f64 },
}

/// Anatomical simulation settings.
///
/// Defaults
/// -----------------
/// `error_radius = 0`, `n_sim = 100`, uniform jitter, every variable.
#[derive(Debug, Clone, PartialEq)]
pub struct AnatomicalParams {
    pub error_radius: f64,
    pub n_sim: usize,
    pub jitter: Jitter,
    pub variables: Vec<Variable>,
}

impl AnatomicalParams {
    pub fn builder() -> AnatomicalParamsBuilder {
        AnatomicalParamsBuilder::new()
    }
}

impl Default for AnatomicalParams {
    fn default() -> Self {
        AnatomicalParams {
            error_radius: 0.0,
            n_sim: 100,
            jitter: Jitter::Uniform,
            variables: Variable::ALL.to_vec(),
        }
    }
}

impl fmt::Display for AnatomicalParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars: Vec<&str> = self.variables.iter().map(|v| v.name()).collect();
        if f.alternate() {
            writeln!(f, "Anatomical uncertainty parameters")?;
            writeln!(f, "---------------------------------")?;
            writeln!(f, "  error_radius = {}", self.error_radius)?;
            writeln!(f, "  n_sim        = {}", self.n_sim)?;
            writeln!(f, "  jitter       = {:?}", self.jitter)?;
            write!(f, "  variables    = {}", vars.join(", "))
        } else {
            write!(
                f,
                "AnatomicalParams(radius={}, n_sim={}, jitter={:?})",
                self.error_radius, self.n_sim, self.jitter
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnatomicalParamsBuilder {
    params: AnatomicalParams,
    variable_names: Option<Vec<String>>,
}

impl AnatomicalParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_radius(mut self, v: f64) -> Self {
        self.params.error_radius = v;
        self
    }
    pub fn n_sim(mut self, v: usize) -> Self {
        self.params.n_sim = v;
        self
    }
    pub fn jitter(mut self, v: Jitter) -> Self {
        self.params.jitter = v;
        self
    }
    pub fn variables<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.variable_names = Some(names.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Validate and produce the parameters.
    ///
    /// Validation rules
    /// -----------------
    /// * `error_radius` finite and `>= 0`,
    /// * `n_sim >= 2`,
    /// * truncated-Gaussian `sd` finite and `> 0`,
    /// * at least one recognised variable.
    pub fn build(mut self) -> Result<AnatomicalParams, IchnosError> {
        if let Some(names) = self.variable_names.take() {
            self.params.variables = Variable::parse_list(&names)?;
        }
        let p = &self.params;
        if !(p.error_radius.is_finite() && p.error_radius >= 0.0) {
            return Err(IchnosError::InvalidParameter(format!(
                "error_radius must be finite and >= 0, got {}",
                p.error_radius
            )));
        }
        if p.n_sim < 2 {
            return Err(IchnosError::InvalidParameter("n_sim must be >= 2".into()));
        }
        if let Jitter::TruncatedGaussian { sd } = p.jitter {
            if !(sd.is_finite() && sd > 0.0) {
                return Err(IchnosError::InvalidParameter(format!(
                    "jitter sd must be finite and > 0, got {sd}"
                )));
            }
        }
        Ok(self.params)
    }
}

/// Random displacement inside a disk of radius `radius`.
fn draw_offset(
    jitter: &Jitter,
    radius: f64,
    normal: Option<&Normal<f64>>,
    rng: &mut impl Rng,
) -> Result<(f64, f64), IchnosError> {
    if radius == 0.0 {
        return Ok((0.0, 0.0));
    }
    match (jitter, normal) {
        (Jitter::TruncatedGaussian { .. }, Some(normal)) => {
            for _ in 0..MAX_REJECTION_ATTEMPTS {
                let dx = normal.sample(&mut *rng);
                let dy = normal.sample(&mut *rng);
                if dx.hypot(dy) <= radius {
                    return Ok((dx, dy));
                }
            }
            Err(IchnosError::NumericDegeneracy(format!(
                "no Gaussian displacement inside radius {radius} after {MAX_REJECTION_ATTEMPTS} draws"
            )))
        }
        _ => {
            let r = radius * rng.random::<f64>().sqrt();
            let theta = 2.0 * PI * rng.random::<f64>();
            Ok((r * theta.cos(), r * theta.sin()))
        }
    }
}

fn jitter_footprints(
    footprints: &[Footprint],
    params: &AnatomicalParams,
    normal: Option<&Normal<f64>>,
    rng: &mut impl Rng,
) -> Result<Vec<Footprint>, IchnosError> {
    footprints
        .iter()
        .map(|fp| {
            if fp.position().is_none() {
                return Ok(fp.clone());
            }
            let (dx, dy) = draw_offset(&params.jitter, params.error_radius, normal, &mut *rng)?;
            Ok(fp.with_position(fp.x + dx, fp.y + dy))
        })
        .collect()
}

/// Population mean and variance of the finite values, `None` if there are none.
fn mean_var(values: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var))
}

/// Between-track and within-track variance of per-track samples.
///
/// Tracks with no finite value are skipped; `None` if fewer than one track remains.
pub fn total_variance_split(samples: &[Vec<f64>]) -> Option<(f64, f64)> {
    let stats: Vec<(f64, f64)> = samples.iter().filter_map(|s| mean_var(s)).collect();
    if stats.is_empty() {
        return None;
    }
    let means: Vec<f64> = stats.iter().map(|(m, _)| *m).collect();
    let (_, between) = mean_var(&means)?;
    let within = stats.iter().map(|(_, v)| v).sum::<f64>() / stats.len() as f64;
    Some((between, within))
}

fn decompose(samples: &[Vec<f64>]) -> Option<Vec<(Component, f64)>> {
    let (between, within) = total_variance_split(samples)?;
    Some(vec![
        (Component::Track, between),
        (Component::Anatomical, within),
    ])
}

/// Anatomical variance decomposition.
///
/// Arguments
/// -----------------
/// * `collection`: Observed trackways.
/// * `params`: Error radius, simulation count, jitter law and variables.
/// * `rng`: Random number generator.
///
/// Return
/// ----------
/// * A [`VarianceTable`] with `Track` and `Anatomical` components per variable. Variables that
///   are undefined for every trackway are reported in the QC summary and have no row.
///
/// Errors
/// -----------------
/// * [`IchnosError::NotEnoughTrackways`] for an empty collection.
/// * [`IchnosError::InvalidParameter`] for an invalid radius, jitter or `n_sim`.
pub fn anatomical_variance(
    collection: &TrackwayCollection,
    params: &AnatomicalParams,
    rng: &mut impl Rng,
) -> Result<VarianceTable, IchnosError> {
    anatomical_variance_with_cancel(collection, params, rng, None)
}

/// [`anatomical_variance`] with a cancellation token polled between simulations.
pub fn anatomical_variance_with_cancel(
    collection: &TrackwayCollection,
    params: &AnatomicalParams,
    rng: &mut impl Rng,
    cancel: Option<&CancelToken>,
) -> Result<VarianceTable, IchnosError> {
    if collection.is_empty() {
        return Err(IchnosError::NotEnoughTrackways {
            required: 1,
            found: 0,
        });
    }
    if !(params.error_radius.is_finite() && params.error_radius >= 0.0) || params.n_sim < 2 {
        return Err(IchnosError::InvalidParameter(format!(
            "invalid anatomical parameters: {params}"
        )));
    }
    let normal = match params.jitter {
        Jitter::TruncatedGaussian { sd } => Some(Normal::new(0.0, sd)?),
        Jitter::Uniform => None,
    };

    let n_tracks = collection.len();
    let n_vars = params.variables.len();
    // samples[v][t][s]
    let mut samples = vec![vec![Vec::with_capacity(params.n_sim); n_tracks]; n_vars];

    debug!(
        radius = params.error_radius,
        n_sim = params.n_sim,
        "simulating anatomical uncertainty"
    );
    let progress = ReplicateProgress::new(params.n_sim, "anatomical");
    for _ in 0..params.n_sim {
        CancelToken::check(cancel)?;
        for (t, (name, _, footprints)) in collection.iter().enumerate() {
            let jittered = jitter_footprints(footprints, params, normal.as_ref(), &mut *rng)?;
            let trajectory = Trajectory::from_footprints(&jittered);
            let mp = MovementParams::compute(name, &trajectory, &jittered);
            for (v, variable) in params.variables.iter().enumerate() {
                samples[v][t].push(variable.value(&mp).unwrap_or(f64::NAN));
            }
        }
        progress.inc();
    }
    progress.finish();

    let mut qc = QcSummary {
        n_tracks,
        n_units: params.n_sim,
        ..QcSummary::default()
    };
    for (t, name) in collection.names().iter().enumerate() {
        let undefined: Vec<&str> = params
            .variables
            .iter()
            .enumerate()
            .filter(|(v, _)| samples[*v][t].iter().all(|x| !x.is_finite()))
            .map(|(_, var)| var.name())
            .collect();
        if !undefined.is_empty() {
            qc.excluded
                .push((name.clone(), format!("undefined {}", undefined.join(", "))));
        }
    }
    if !qc.excluded.is_empty() {
        warn!(
            "trackway(s) {:?} left out of some variables (undefined values)",
            qc.excluded.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>()
        );
    }

    let mut rows = Vec::with_capacity(n_vars);
    for (v, variable) in params.variables.iter().enumerate() {
        let components = if variable.is_circular() {
            let on = |f: fn(f64) -> f64| -> Vec<Vec<f64>> {
                samples[v]
                    .iter()
                    .map(|s| s.iter().map(|d| f(d.to_radians())).collect())
                    .collect()
            };
            match (decompose(&on(f64::sin)), decompose(&on(f64::cos))) {
                (Some(s), Some(c)) => Some(average_components(&s, &c)),
                _ => None,
            }
        } else {
            decompose(&samples[v])
        };
        match components {
            Some(c) => rows.push(VarianceRow::new(*variable, &c, false)),
            None => warn!(variable = variable.name(), "variable undefined for every trackway"),
        }
    }

    Ok(VarianceTable {
        mode: VarianceMode::Anatomical,
        rows,
        qc,
    })
}
