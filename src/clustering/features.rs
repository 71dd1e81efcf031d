//! Working matrix for clustering.
//!
//! Rows are trackways, columns are *working variables* derived from the selected movement
//! variables:
//!
//! 1. trackways with fewer than [`MIN_FOOTPRINTS_CLUSTER`] footprints, or with an undefined
//!    value in any selected variable, are excluded (and named in a warning),
//! 2. circular variables (`TurnAng`, `sdTurnAng`) become a `sin`/`cos` pair,
//! 3. optionally, a monotone transform matched to each variable's support is applied:
//!    logit for straightness, log for sinuosity, shifted log for lengths,
//! 4. optionally, every column is centred and scaled to unit variance; a constant column
//!    becomes all zeros.
use nalgebra::DMatrix;
use tracing::warn;

use crate::constants::{MIN_FOOTPRINTS_CLUSTER, SHIFT_EPS};
use crate::geometry::track_param::{ParamTable, Variable};

/// Clustering input after filtering, expansion and transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingMatrix {
    /// Included trackways, row order.
    pub names: Vec<String>,
    /// Working column labels (`TurnAng_sin`, `TurnAng_cos`, `Sinuosity`, …).
    pub columns: Vec<String>,
    pub data: DMatrix<f64>,
    /// Trackways left out, with the reason.
    pub excluded: Vec<(String, String)>,
}

impl WorkingMatrix {
    pub fn n_obs(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_vars(&self) -> usize {
        self.data.ncols()
    }
}

/// Logit with the argument clamped to `[ε, 1 - ε]` so a perfectly straight path stays finite.
fn logit(p: f64) -> f64 {
    let p = p.clamp(SHIFT_EPS, 1.0 - SHIFT_EPS);
    (p / (1.0 - p)).ln()
}

/// Log of a column, shifted to positive support when any value is `≤ 0`.
///
/// `shift = ε - min + ε`, so the smallest value maps to `ln(2ε)`.
pub fn shifted_log(values: &mut [f64]) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let shift = if min <= 0.0 {
        SHIFT_EPS - min + SHIFT_EPS
    } else {
        0.0
    };
    for v in values.iter_mut() {
        *v = (*v + shift).ln();
    }
}

fn transform_column(variable: Variable, values: &mut [f64]) {
    match variable {
        Variable::Straightness => values.iter_mut().for_each(|v| *v = logit(*v)),
        Variable::Sinuosity => shifted_log(values),
        v if v.is_length() => shifted_log(values),
        _ => {}
    }
}

/// Centre and scale a column by its sample standard deviation; constant columns become zeros.
pub fn z_scale(values: &mut [f64]) {
    let n = values.len();
    if n == 0 {
        return;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sd = if n > 1 {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    for v in values.iter_mut() {
        *v = if sd > 0.0 && sd.is_finite() {
            (*v - mean) / sd
        } else {
            0.0
        };
    }
}

/// Build the working matrix for a variable selection.
///
/// Arguments
/// -----------------
/// * `table`: Movement parameters, one row per trackway.
/// * `variables`: Selected variables (non-empty, already validated).
/// * `transform`: Apply support-matched monotone transforms.
/// * `scale`: Z-scale every working column.
pub fn working_matrix(
    table: &ParamTable,
    variables: &[Variable],
    transform: bool,
    scale: bool,
) -> WorkingMatrix {
    let mut names = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut excluded = Vec::new();

    for p in &table.rows {
        if p.n_footprints < MIN_FOOTPRINTS_CLUSTER {
            excluded.push((
                p.name.clone(),
                format!(
                    "{} footprints (< {MIN_FOOTPRINTS_CLUSTER})",
                    p.n_footprints
                ),
            ));
            continue;
        }
        let missing: Vec<&str> = variables
            .iter()
            .filter(|v| v.value(p).is_none())
            .map(|v| v.name())
            .collect();
        if !missing.is_empty() {
            excluded.push((p.name.clone(), format!("undefined {}", missing.join(", "))));
            continue;
        }
        names.push(p.name.clone());
        rows.push(variables.iter().filter_map(|v| v.value(p)).collect());
    }

    if !excluded.is_empty() {
        let labels: Vec<String> = excluded
            .iter()
            .map(|(n, why)| format!("{n} ({why})"))
            .collect();
        warn!("trackway(s) excluded from clustering: {}", labels.join("; "));
    }

    let mut columns = Vec::new();
    let mut cols: Vec<Vec<f64>> = Vec::new();
    for (c, variable) in variables.iter().enumerate() {
        let raw: Vec<f64> = rows.iter().map(|r| r[c]).collect();
        if variable.is_circular() {
            columns.push(format!("{}_sin", variable.name()));
            cols.push(raw.iter().map(|d| d.to_radians().sin()).collect());
            columns.push(format!("{}_cos", variable.name()));
            cols.push(raw.iter().map(|d| d.to_radians().cos()).collect());
        } else {
            let mut col = raw;
            if transform {
                transform_column(*variable, &mut col);
            }
            columns.push(variable.name().to_string());
            cols.push(col);
        }
    }
    if scale {
        cols.iter_mut().for_each(|c| z_scale(c));
    }

    let data = DMatrix::from_fn(names.len(), cols.len(), |i, j| cols[j][i]);
    WorkingMatrix {
        names,
        columns,
        data,
        excluded,
    }
}

#[cfg(test)]
mod features_test {
    use super::*;
    use crate::geometry::track_param::track_param;
    use crate::trackway::{Trackway, TrackwayCollection};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn table() -> ParamTable {
        let zig = |name: &str, n: usize, amp: f64, slope: f64| {
            let coords: Vec<(f64, f64)> = (0..n)
                .map(|i| {
                    let s = if i % 2 == 0 { amp } else { -amp };
                    (i as f64, slope * i as f64 + s + 0.1 * (i as f64).sin())
                })
                .collect();
            Trackway::from_coordinates(name, &coords)
        };
        track_param(&TrackwayCollection::from_trackways(vec![
            zig("A", 10, 0.3, 0.0),
            zig("B", 10, 0.4, 0.5),
            zig("short", 3, 0.3, 0.0),
            zig("C", 12, 0.2, -0.3),
        ]))
    }

    #[test]
    fn test_short_trackways_excluded() {
        let w = working_matrix(&table(), &[Variable::StepLength], false, false);
        assert_eq!(w.names, vec!["A", "B", "C"]);
        assert_eq!(w.excluded.len(), 1);
        assert_eq!(w.excluded[0].0, "short");
    }

    #[test]
    fn test_circular_expansion() {
        let w = working_matrix(
            &table(),
            &[Variable::TurnAngle, Variable::Sinuosity],
            false,
            false,
        );
        assert_eq!(w.columns, vec!["TurnAng_sin", "TurnAng_cos", "Sinuosity"]);
        for i in 0..w.n_obs() {
            let s = w.data[(i, 0)];
            let c = w.data[(i, 1)];
            assert_abs_diff_eq!(s * s + c * c, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_variance_scales_to_zero() {
        let mut col = vec![2.0, 2.0, 2.0];
        z_scale(&mut col);
        assert_eq!(col, vec![0.0, 0.0, 0.0]);

        let mut col = vec![1.0, 2.0, 3.0];
        z_scale(&mut col);
        assert_abs_diff_eq!(col[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(col[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shifted_log() {
        let mut col = vec![-1.0, 0.0, 1.0];
        shifted_log(&mut col);
        assert!(col.iter().all(|v| v.is_finite()));
        // x - min + eps loses digits to cancellation at the minimum
        assert_relative_eq!(col[0], (2.0 * SHIFT_EPS).ln(), max_relative = 1e-9);
        assert!(col[0] < col[1] && col[1] < col[2]);

        let mut pos = vec![1.0, std::f64::consts::E];
        shifted_log(&mut pos);
        assert_abs_diff_eq!(pos[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_logit_finite_for_straight_path() {
        assert!(logit(1.0).is_finite());
        assert_abs_diff_eq!(logit(0.5), 0.0, epsilon = 1e-12);
    }
}
