//! # Movement parameters
//!
//! Deterministic descriptors of one trackway, recomputed on every call from a
//! [`Trajectory`] and its footprint sequence.
//!
//! Trajectory descriptors
//! -----------------
//! * **Turning angles** – heading of every step, in degrees, measured counter-clockwise from
//!   the positive x-axis and wrapped to `(-180, 180]`. Their circular mean and circular
//!   standard deviation are reported with the resultant-vector formulas of
//!   [`circular`](crate::geometry::circular).
//! * **Step lengths**, **path length** (sum of steps) and **beeline length**
//!   (first → last point).
//! * **Straightness** `= beeline / path ∈ (0, 1]`.
//! * **Sinuosity** (Benhamou):
//!
//!   ```text
//!   S = 2 · [ p · ( (1 + c) / (1 - c) + b² ) ]^(-1/2)
//!   ```
//!
//!   with `p` the mean step length, `b` the coefficient of variation of step lengths and `c`
//!   the mean cosine of the *relative* turns (heading changes). A path that never turns has
//!   `c = 1`, where the expression is undefined; such paths are assigned `S = 1`, the
//!   straight-path value that agrees with `straightness = 1`.
//!
//! Footprint descriptors
//! -----------------
//! * **Trackway width** – footprints are projected on the normal of the trajectory's first
//!   principal axis; the width is `|mean(left offsets) − mean(right offsets)|`.
//! * **Pace angulation** – mean interior angle at every footprint whose neighbours lie on the
//!   opposite side (L/R/L or R/L/R), in `[0, 180]`.
//! * **Step angle** – mean absolute angle between each pace vector and the principal axis,
//!   in `[0, 90]`.
//! * **Stride lengths** (same side, consecutive) and **pace lengths** (opposite sides,
//!   consecutive), and **gauge** `= width / mean pace length`.
//!
//! Error policy
//! -----------------
//! Missing sides or coordinates never abort a batch: the affected fields become `None` and a
//! `tracing` warning names the trackway and the footprint ids involved.
use std::fmt;
use std::io;
use std::str::FromStr;

use nalgebra::Vector2;
use serde::Serialize;
use tracing::warn;

use crate::constants::{Degree, Point, EPS, STRAIGHT_COS_EPS};
use crate::geometry::circular::{circular_mean, circular_sd, wrap_degrees};
use crate::geometry::principal_axis;
use crate::ichnos_errors::IchnosError;
use crate::trackway::{Footprint, Side, Trajectory, TrackwayCollection};

/// Movement parameters of one trackway.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementParams {
    pub name: String,
    pub n_footprints: usize,
    /// Heading of every non-degenerate step, degrees.
    pub turning_angles: Vec<Degree>,
    pub mean_turning_angle: Option<Degree>,
    pub sd_turning_angle: Option<Degree>,
    pub step_lengths: Vec<f64>,
    pub mean_step_length: Option<f64>,
    pub path_length: f64,
    pub beeline_length: f64,
    pub sinuosity: Option<f64>,
    pub straightness: Option<f64>,
    pub trackway_width: Option<f64>,
    pub pace_angulation: Option<Degree>,
    pub step_angle: Option<Degree>,
    pub stride_lengths: Vec<f64>,
    pub pace_lengths: Vec<f64>,
    pub gauge: Option<f64>,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n − 1), `None` below two values.
fn sample_sd(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() as f64 - 1.0)).sqrt())
}

/// Angle between two vectors in degrees, `[0, 180]`.
fn angle_between(a: &Vector2<f64>, b: &Vector2<f64>) -> Option<Degree> {
    let na = a.norm();
    let nb = b.norm();
    if na < EPS || nb < EPS {
        return None;
    }
    Some((a.dot(b) / (na * nb)).clamp(-1.0, 1.0).acos().to_degrees())
}

/// Benhamou sinuosity from step lengths and relative turns (degrees).
pub fn sinuosity(step_lengths: &[f64], relative_turns: &[Degree]) -> Option<f64> {
    let p = mean(step_lengths)?;
    if p < EPS {
        return None;
    }
    let b = sample_sd(step_lengths).unwrap_or(0.0) / p;
    let c = mean(
        &relative_turns
            .iter()
            .map(|t| t.to_radians().cos())
            .collect::<Vec<_>>(),
    )
    .unwrap_or(1.0);
    if c >= 1.0 - STRAIGHT_COS_EPS {
        return Some(1.0);
    }
    Some(2.0 * (p * ((1.0 + c) / (1.0 - c) + b * b)).powf(-0.5))
}

impl MovementParams {
    /// Compute every descriptor of one trackway.
    ///
    /// Arguments
    /// -----------------
    /// * `name`: Trackway label used in warnings and tables.
    /// * `trajectory`: Medial trajectory of the trackway.
    /// * `footprints`: Footprint sequence the trajectory was derived from.
    ///
    /// Return
    /// ----------
    /// * A fully populated record; fields that cannot be computed are `None` (or empty).
    pub fn compute(name: &str, trajectory: &Trajectory, footprints: &[Footprint]) -> Self {
        let points: Vec<Point> = trajectory
            .points
            .iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .copied()
            .collect();
        if points.len() != trajectory.len() {
            warn!(
                trackway = name,
                "{} trajectory point(s) with missing coordinates ignored",
                trajectory.len() - points.len()
            );
        }
        if points.len() < 2 {
            warn!(
                trackway = name,
                "trajectory has {} usable point(s); step-based parameters unavailable",
                points.len()
            );
        }

        // --- Trajectory descriptors
        let step_vectors: Vec<Vector2<f64>> = points.windows(2).map(|w| w[1] - w[0]).collect();
        let step_lengths: Vec<f64> = step_vectors.iter().map(|v| v.norm()).collect();
        let turning_angles: Vec<Degree> = step_vectors
            .iter()
            .filter(|v| v.norm() > EPS)
            .map(|v| v.y.atan2(v.x).to_degrees())
            .collect();
        let relative_turns: Vec<Degree> = turning_angles
            .windows(2)
            .map(|w| wrap_degrees(w[1] - w[0]))
            .collect();

        let path_length: f64 = step_lengths.iter().sum();
        let beeline_length = match (points.first(), points.last()) {
            (Some(a), Some(b)) => (b - a).norm(),
            _ => 0.0,
        };
        let straightness = if path_length > EPS {
            Some((beeline_length / path_length).min(1.0))
        } else {
            None
        };

        // --- Footprint descriptors
        let missing_side: Vec<usize> = footprints
            .iter()
            .filter(|f| f.side.is_none())
            .map(|f| f.id)
            .collect();
        if !missing_side.is_empty() {
            warn!(
                trackway = name,
                "footprint(s) {missing_side:?} have no side; side-dependent parameters use the rest"
            );
        }
        let missing_xy: Vec<usize> = footprints
            .iter()
            .filter(|f| f.position().is_none())
            .map(|f| f.id)
            .collect();
        if !missing_xy.is_empty() {
            warn!(
                trackway = name,
                "footprint(s) {missing_xy:?} have missing coordinates and are ignored"
            );
        }

        let axis = principal_axis(&points);
        let trackway_width = axis.and_then(|u| trackway_width(footprints, &points, &u));
        let pace_angulation = pace_angulation(footprints);
        let step_angle = axis.and_then(|u| step_angle(footprints, &u));
        let stride_lengths = stride_lengths(footprints);
        let pace_lengths = pace_lengths(footprints);
        let gauge = match (trackway_width, mean(&pace_lengths)) {
            (Some(w), Some(p)) if p > EPS => Some(w / p),
            _ => None,
        };

        MovementParams {
            name: name.to_string(),
            n_footprints: footprints.len(),
            mean_turning_angle: circular_mean(&turning_angles),
            sd_turning_angle: circular_sd(&turning_angles),
            mean_step_length: mean(&step_lengths),
            sinuosity: sinuosity(&step_lengths, &relative_turns),
            turning_angles,
            step_lengths,
            path_length,
            beeline_length,
            straightness,
            trackway_width,
            pace_angulation,
            step_angle,
            stride_lengths,
            pace_lengths,
            gauge,
        }
    }

    pub fn mean_stride_length(&self) -> Option<f64> {
        mean(&self.stride_lengths)
    }

    pub fn mean_pace_length(&self) -> Option<f64> {
        mean(&self.pace_lengths)
    }
}

fn sided_positions(footprints: &[Footprint]) -> Vec<(usize, Side, Point)> {
    footprints
        .iter()
        .enumerate()
        .filter_map(|(i, f)| Some((i, f.side?, f.position()?)))
        .collect()
}

fn trackway_width(footprints: &[Footprint], points: &[Point], axis: &Vector2<f64>) -> Option<f64> {
    let n = points.len() as f64;
    let (cx, cy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let centre = Point::new(cx / n, cy / n);
    let normal = Vector2::new(-axis.y, axis.x);

    let (mut left, mut right) = (Vec::new(), Vec::new());
    for (_, side, p) in sided_positions(footprints) {
        let offset = (p - centre).dot(&normal);
        match side {
            Side::Left => left.push(offset),
            Side::Right => right.push(offset),
        }
    }
    Some((mean(&left)? - mean(&right)?).abs())
}

fn pace_angulation(footprints: &[Footprint]) -> Option<Degree> {
    let angles: Vec<Degree> = footprints
        .windows(3)
        .filter_map(|w| {
            let (s0, s1, s2) = (w[0].side?, w[1].side?, w[2].side?);
            if s0 == s1 || s2 == s1 {
                return None;
            }
            let (p0, p1, p2) = (w[0].position()?, w[1].position()?, w[2].position()?);
            angle_between(&(p0 - p1), &(p2 - p1))
        })
        .collect();
    mean(&angles)
}

fn step_angle(footprints: &[Footprint], axis: &Vector2<f64>) -> Option<Degree> {
    let angles: Vec<Degree> = footprints
        .windows(2)
        .filter_map(|w| {
            if w[0].side? == w[1].side? {
                return None;
            }
            let v = w[1].position()? - w[0].position()?;
            let len = v.norm();
            if len < EPS {
                return None;
            }
            Some((v.dot(axis).abs() / len).clamp(0.0, 1.0).acos().to_degrees())
        })
        .collect();
    mean(&angles)
}

fn stride_lengths(footprints: &[Footprint]) -> Vec<f64> {
    let sided = sided_positions(footprints);
    let mut strides = Vec::new();
    for (k, (_, side, p)) in sided.iter().enumerate() {
        if let Some((_, _, q)) = sided[k + 1..].iter().find(|(_, s, _)| s == side) {
            strides.push((q - p).norm());
        }
    }
    strides
}

fn pace_lengths(footprints: &[Footprint]) -> Vec<f64> {
    footprints
        .windows(2)
        .filter_map(|w| {
            if w[0].side? == w[1].side? {
                return None;
            }
            Some((w[1].position()? - w[0].position()?).norm())
        })
        .collect()
}

/// Scalar movement variables addressable by name.
///
/// Names follow the labels used in parameter tables (`"TurnAng"`, `"Sinuosity"`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    TurnAngle,
    SdTurnAngle,
    Sinuosity,
    Straightness,
    PathLength,
    BeelineLength,
    StepLength,
    TrackWidth,
    PaceAngulation,
    StepAngle,
    StrideLength,
    PaceLength,
    Gauge,
}

impl Variable {
    pub const ALL: [Variable; 13] = [
        Variable::TurnAngle,
        Variable::SdTurnAngle,
        Variable::Sinuosity,
        Variable::Straightness,
        Variable::PathLength,
        Variable::BeelineLength,
        Variable::StepLength,
        Variable::TrackWidth,
        Variable::PaceAngulation,
        Variable::StepAngle,
        Variable::StrideLength,
        Variable::PaceLength,
        Variable::Gauge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variable::TurnAngle => "TurnAng",
            Variable::SdTurnAngle => "sdTurnAng",
            Variable::Sinuosity => "Sinuosity",
            Variable::Straightness => "Straightness",
            Variable::PathLength => "PathLen",
            Variable::BeelineLength => "BeelineLen",
            Variable::StepLength => "StepLen",
            Variable::TrackWidth => "TrackWidth",
            Variable::PaceAngulation => "PaceAng",
            Variable::StepAngle => "StepAng",
            Variable::StrideLength => "StrideLen",
            Variable::PaceLength => "PaceLen",
            Variable::Gauge => "Gauge",
        }
    }

    /// Angular variables handled on the unit circle (sine/cosine expansion).
    pub fn is_circular(&self) -> bool {
        matches!(self, Variable::TurnAngle | Variable::SdTurnAngle)
    }

    /// Length-like variables on the positive reals.
    pub fn is_length(&self) -> bool {
        matches!(
            self,
            Variable::PathLength
                | Variable::BeelineLength
                | Variable::StepLength
                | Variable::TrackWidth
                | Variable::StrideLength
                | Variable::PaceLength
                | Variable::Gauge
        )
    }

    /// Scalar value of this variable in a parameter record.
    pub fn value(&self, p: &MovementParams) -> Option<f64> {
        let v = match self {
            Variable::TurnAngle => p.mean_turning_angle,
            Variable::SdTurnAngle => p.sd_turning_angle,
            Variable::Sinuosity => p.sinuosity,
            Variable::Straightness => p.straightness,
            Variable::PathLength => Some(p.path_length),
            Variable::BeelineLength => Some(p.beeline_length),
            Variable::StepLength => p.mean_step_length,
            Variable::TrackWidth => p.trackway_width,
            Variable::PaceAngulation => p.pace_angulation,
            Variable::StepAngle => p.step_angle,
            Variable::StrideLength => p.mean_stride_length(),
            Variable::PaceLength => p.mean_pace_length(),
            Variable::Gauge => p.gauge,
        };
        v.filter(|x| x.is_finite())
    }

    /// Resolve a list of names, warning about and dropping the unknown ones.
    ///
    /// Errors
    /// -----------------
    /// * [`IchnosError::NoValidVariables`] if no name is recognised.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Variable>, IchnosError> {
        let mut vars = Vec::new();
        let mut unknown = Vec::new();
        for n in names {
            match n.as_ref().parse::<Variable>() {
                Ok(v) if !vars.contains(&v) => vars.push(v),
                Ok(_) => {}
                Err(_) => unknown.push(n.as_ref().to_string()),
            }
        }
        if !unknown.is_empty() {
            warn!("unknown variable(s) {unknown:?} ignored");
        }
        if vars.is_empty() {
            return Err(IchnosError::NoValidVariables(format!(
                "none of {:?} is a movement variable",
                names.iter().map(|n| n.as_ref()).collect::<Vec<_>>()
            )));
        }
        Ok(vars)
    }
}

impl FromStr for Variable {
    type Err = IchnosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variable::ALL
            .iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| IchnosError::UnknownVariable(s.to_string()))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Serialize)]
struct ParamRow<'a> {
    trackway: &'a str,
    n_footprints: usize,
    turn_ang: Option<f64>,
    sd_turn_ang: Option<f64>,
    step_len: Option<f64>,
    path_len: f64,
    beeline_len: f64,
    sinuosity: Option<f64>,
    straightness: Option<f64>,
    track_width: Option<f64>,
    pace_ang: Option<f64>,
    step_ang: Option<f64>,
    stride_len: Option<f64>,
    pace_len: Option<f64>,
    gauge: Option<f64>,
}

/// Movement parameters of a whole collection, in collection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamTable {
    pub rows: Vec<MovementParams>,
}

impl ParamTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&MovementParams> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Values of one variable for every trackway (`None` where unavailable).
    pub fn column(&self, variable: Variable) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| variable.value(r)).collect()
    }

    /// Write the scalar summary of every trackway as CSV (empty cells for missing values).
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), IchnosError> {
        let mut wtr = csv::Writer::from_writer(writer);
        for r in &self.rows {
            wtr.serialize(ParamRow {
                trackway: &r.name,
                n_footprints: r.n_footprints,
                turn_ang: r.mean_turning_angle,
                sd_turn_ang: r.sd_turning_angle,
                step_len: r.mean_step_length,
                path_len: r.path_length,
                beeline_len: r.beeline_length,
                sinuosity: r.sinuosity,
                straightness: r.straightness,
                track_width: r.trackway_width,
                pace_ang: r.pace_angulation,
                step_ang: r.step_angle,
                stride_len: r.mean_stride_length(),
                pace_len: r.mean_pace_length(),
                gauge: r.gauge,
            })?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

impl fmt::Display for ParamTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |x| format!("{x:.3}"));
        writeln!(
            f,
            "{:<12} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "trackway", "TurnAng", "sdTurnAng", "PathLen", "Sinuos.", "Straight.", "Width"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:<12} {:>9} {:>9} {:>9.3} {:>9} {:>9} {:>9}",
                r.name,
                cell(r.mean_turning_angle),
                cell(r.sd_turning_angle),
                r.path_length,
                cell(r.sinuosity),
                cell(r.straightness),
                cell(r.trackway_width),
            )?;
        }
        Ok(())
    }
}

/// Movement parameters of every trackway in a collection.
///
/// Never fails: trackways with unusable records get `None` fields and a warning naming them.
pub fn track_param(collection: &TrackwayCollection) -> ParamTable {
    ParamTable {
        rows: collection
            .iter()
            .map(|(name, traj, fps)| MovementParams::compute(name, traj, fps))
            .collect(),
    }
}
