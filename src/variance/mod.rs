//! # Variance decomposition
//!
//! Splits the variance of each movement variable into a biological part (between trackways)
//! and measurement-error parts, then summarises the split as a signal-to-noise ratio.
//!
//! ## Modes
//!
//! * [`anatomical`] – simulation: every footprint is jittered inside a disk whose radius is the
//!   landmark uncertainty, parameters are recomputed, and the law of total variance splits the
//!   result into `Track` (variance of per-track means) and `Anatomical` (mean of per-track
//!   variances).
//! * [`observer`] – mixed model: independently re-digitized trackways are annotated with track,
//!   observer and replica identifiers, and random-intercept variance components for `Track`,
//!   `Observer`, `TrackObserver` and `Residual` are estimated by REML ([`reml`]).
//!
//! Circular variables (`TurnAng`, `sdTurnAng`) are decomposed separately on their sine and
//! cosine and the two sets of components are averaged.
//!
//! ## Output
//!
//! Both modes produce a [`VarianceTable`]: one [`VarianceRow`] per variable plus a
//! [`QcSummary`]. The signal-to-noise ratio is
//!
//! ```text
//! SNR = Var(Track) / Σ Var(non-track components)
//! ```
//!
//! rated [`SnrRating::Weak`] below 1, [`SnrRating::Moderate`] from 1 to 2 and
//! [`SnrRating::Strong`] above 2.
use std::fmt;

use crate::geometry::track_param::Variable;

pub mod anatomical;
pub mod observer;
pub mod reml;

/// Source of variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Track,
    Anatomical,
    Observer,
    TrackObserver,
    Residual,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::Track => "Track",
            Component::Anatomical => "Anatomical",
            Component::Observer => "Observer",
            Component::TrackObserver => "Track:Observer",
            Component::Residual => "Residual",
        };
        f.write_str(s)
    }
}

/// Qualitative reading of a signal-to-noise ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnrRating {
    Weak,
    Moderate,
    Strong,
}

impl SnrRating {
    pub fn from_snr(snr: f64) -> Option<Self> {
        if snr.is_nan() {
            None
        } else if snr < 1.0 {
            Some(SnrRating::Weak)
        } else if snr <= 2.0 {
            Some(SnrRating::Moderate)
        } else {
            Some(SnrRating::Strong)
        }
    }
}

impl fmt::Display for SnrRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnrRating::Weak => f.write_str("weak"),
            SnrRating::Moderate => f.write_str("moderate"),
            SnrRating::Strong => f.write_str("strong"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentVariance {
    pub component: Component,
    pub variance: f64,
    /// Share of the row total, in percent; `None` when the total is zero.
    pub percent: Option<f64>,
}

/// Decomposition of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceRow {
    pub variable: Variable,
    pub components: Vec<ComponentVariance>,
    pub total: f64,
    /// `None` when there is no track component or both signal and noise are zero.
    pub snr: Option<f64>,
    pub rating: Option<SnrRating>,
    /// A component was estimated on the boundary and reported as zero.
    pub singular: bool,
}

impl VarianceRow {
    /// Row from raw component variances; negative or non-finite inputs are clamped to zero.
    pub fn new(variable: Variable, components: &[(Component, f64)], singular: bool) -> Self {
        let clean: Vec<(Component, f64)> = components
            .iter()
            .map(|&(c, v)| (c, if v.is_finite() && v > 0.0 { v } else { 0.0 }))
            .collect();
        let total: f64 = clean.iter().map(|(_, v)| v).sum();
        let components = clean
            .iter()
            .map(|&(component, variance)| ComponentVariance {
                component,
                variance,
                percent: (total > 0.0).then(|| 100.0 * variance / total),
            })
            .collect();

        let signal = clean
            .iter()
            .find(|(c, _)| *c == Component::Track)
            .map(|(_, v)| *v);
        let noise: f64 = clean
            .iter()
            .filter(|(c, _)| *c != Component::Track)
            .map(|(_, v)| v)
            .sum();
        let snr = signal.and_then(|s| match (s > 0.0, noise > 0.0) {
            (_, true) => Some(s / noise),
            (true, false) => Some(f64::INFINITY),
            (false, false) => None,
        });

        VarianceRow {
            variable,
            components,
            total,
            rating: snr.and_then(SnrRating::from_snr),
            snr,
            singular,
        }
    }

    pub fn variance_of(&self, component: Component) -> Option<f64> {
        self.components
            .iter()
            .find(|c| c.component == component)
            .map(|c| c.variance)
    }

    pub fn percent_of(&self, component: Component) -> Option<f64> {
        self.components
            .iter()
            .find(|c| c.component == component)
            .and_then(|c| c.percent)
    }
}

/// Average two component lists element-wise (sine and cosine parts of a circular variable).
pub(crate) fn average_components(
    a: &[(Component, f64)],
    b: &[(Component, f64)],
) -> Vec<(Component, f64)> {
    a.iter()
        .map(|&(c, va)| {
            let vb = b
                .iter()
                .find(|(cb, _)| *cb == c)
                .map_or(0.0, |(_, v)| *v);
            (c, 0.5 * (va + vb))
        })
        .collect()
}

/// Which decomposition produced a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceMode {
    Anatomical,
    Observer,
}

/// Quality-control summary shared by both modes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QcSummary {
    pub n_tracks: usize,
    /// Simulations per track (anatomical) or digitizations (observer).
    pub n_units: usize,
    /// Trackways or records left out, with the reason.
    pub excluded: Vec<(String, String)>,
    /// Random-effect terms removed before fitting.
    pub dropped_terms: Vec<String>,
    pub singular: Vec<Variable>,
    pub not_converged: Vec<Variable>,
}

/// Variance components of every requested variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceTable {
    pub mode: VarianceMode,
    pub rows: Vec<VarianceRow>,
    pub qc: QcSummary,
}

impl VarianceTable {
    pub fn row(&self, variable: Variable) -> Option<&VarianceRow> {
        self.rows.iter().find(|r| r.variable == variable)
    }
}

impl fmt::Display for VarianceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:?} variance decomposition ({} tracks, {} units)",
            self.mode, self.qc.n_tracks, self.qc.n_units
        )?;
        for row in &self.rows {
            write!(f, "{:<12}", row.variable.name())?;
            for c in &row.components {
                let pct = c
                    .percent
                    .map_or_else(|| "NA".to_string(), |p| format!("{p:.1}%"));
                write!(f, " {}={:.4} ({pct})", c.component, c.variance)?;
            }
            match (row.snr, row.rating) {
                (Some(s), Some(r)) => write!(f, " SNR={s:.2} [{r}]")?,
                _ => write!(f, " SNR=NA")?,
            }
            if row.singular {
                write!(f, " (singular)")?;
            }
            writeln!(f)?;
        }
        if f.alternate() {
            for (name, why) in &self.qc.excluded {
                writeln!(f, "  excluded {name}: {why}")?;
            }
            for term in &self.qc.dropped_terms {
                writeln!(f, "  dropped term {term}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod variance_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_percent_and_snr() {
        let row = VarianceRow::new(
            Variable::StepLength,
            &[(Component::Track, 3.0), (Component::Anatomical, 1.0)],
            false,
        );
        assert_abs_diff_eq!(row.percent_of(Component::Track).unwrap(), 75.0);
        assert_abs_diff_eq!(row.snr.unwrap(), 3.0);
        assert_eq!(row.rating, Some(SnrRating::Strong));
        let sum: f64 = row.components.iter().filter_map(|c| c.percent).sum();
        assert_abs_diff_eq!(sum, 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_total() {
        let row = VarianceRow::new(
            Variable::Gauge,
            &[(Component::Track, 0.0), (Component::Residual, 0.0)],
            false,
        );
        assert_eq!(row.percent_of(Component::Track), None);
        assert_eq!(row.snr, None);
        assert_eq!(row.rating, None);
    }

    #[test]
    fn test_rating_thresholds() {
        assert_eq!(SnrRating::from_snr(0.5), Some(SnrRating::Weak));
        assert_eq!(SnrRating::from_snr(1.0), Some(SnrRating::Moderate));
        assert_eq!(SnrRating::from_snr(2.0), Some(SnrRating::Moderate));
        assert_eq!(SnrRating::from_snr(2.5), Some(SnrRating::Strong));
        assert_eq!(SnrRating::from_snr(f64::INFINITY), Some(SnrRating::Strong));
    }

    #[test]
    fn test_average_components() {
        let a = [(Component::Track, 2.0), (Component::Anatomical, 0.0)];
        let b = [(Component::Track, 4.0), (Component::Anatomical, 1.0)];
        let avg = average_components(&a, &b);
        assert_eq!(avg, vec![(Component::Track, 3.0), (Component::Anatomical, 0.5)]);
    }
}
