//! Observer (digitization) error by linear mixed model.
//!
//! Each trackway of the collection is one digitization of a physical track. Replicate
//! metadata names the physical track, the observer who digitized it and the replica number.
//! For every variable a random-intercept model
//!
//! ```text
//! value ~ 1 + (1 | track) + (1 | observer) + (1 | track:observer)
//! ```
//!
//! is fitted by REML. A factor with a single level is dropped (its variance is not
//! identifiable), and the interaction is dropped when every observation forms its own
//! track × observer cell (it would be confounded with the residual).
use ahash::AHashMap;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::track_param::{track_param, Variable};
use crate::ichnos_errors::IchnosError;
use crate::trackway::TrackwayCollection;
use crate::variance::reml::{fit_reml, RandomTerm};
use crate::variance::{
    average_components, Component, QcSummary, VarianceMode, VarianceRow, VarianceTable,
};

/// Digitization metadata for one trackway of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicateRecord {
    pub track: String,
    pub observer: String,
    pub replica: String,
}

impl ReplicateRecord {
    pub fn new(
        track: impl Into<String>,
        observer: impl Into<String>,
        replica: impl Into<String>,
    ) -> Self {
        ReplicateRecord {
            track: track.into(),
            observer: observer.into(),
            replica: replica.into(),
        }
    }
}

/// Factor levels for a subset of records.
fn factor<'a>(name: &str, keys: impl Iterator<Item = &'a str>) -> RandomTerm {
    let mut index: AHashMap<&str, usize> = AHashMap::new();
    let levels = keys
        .map(|k| {
            let next = index.len();
            *index.entry(k).or_insert(next)
        })
        .collect();
    RandomTerm {
        name: name.to_string(),
        levels,
        n_levels: index.len(),
    }
}

/// Random terms kept for the given records, with the names of the dropped ones.
fn design(records: &[&ReplicateRecord]) -> (Vec<(Component, RandomTerm)>, Vec<String>) {
    let n = records.len();
    let track = factor("track", records.iter().map(|r| r.track.as_str()));
    let observer = factor("observer", records.iter().map(|r| r.observer.as_str()));
    let cells: Vec<String> = records
        .iter()
        .map(|r| format!("{}\u{1f}{}", r.track, r.observer))
        .collect();
    let interaction = factor("track:observer", cells.iter().map(|s| s.as_str()));

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (component, term) in [
        (Component::Track, track),
        (Component::Observer, observer),
    ] {
        if term.n_levels > 1 {
            kept.push((component, term));
        } else {
            dropped.push(format!("{} (single level)", term.name));
        }
    }
    let has_track = kept.iter().any(|(c, _)| *c == Component::Track);
    let has_observer = kept.iter().any(|(c, _)| *c == Component::Observer);
    if !(has_track && has_observer) {
        dropped.push("track:observer (needs both factors)".to_string());
    } else if interaction.n_levels >= n {
        dropped.push("track:observer (one observation per cell)".to_string());
    } else {
        kept.push((Component::TrackObserver, interaction));
    }
    (kept, dropped)
}

fn fit_components(
    y: &[f64],
    terms: &[(Component, RandomTerm)],
) -> Result<(Vec<(Component, f64)>, bool, bool), IchnosError> {
    let random: Vec<RandomTerm> = terms.iter().map(|(_, t)| t.clone()).collect();
    let fit = fit_reml(&DVector::from_column_slice(y), &random)?;
    let mut comps: Vec<(Component, f64)> = terms
        .iter()
        .zip(&fit.sigma2)
        .map(|((c, _), s)| (*c, *s))
        .collect();
    comps.push((Component::Residual, fit.residual));
    Ok((comps, fit.singular, fit.converged))
}

/// Observer variance decomposition.
///
/// Arguments
/// -----------------
/// * `collection`: Every digitization, one trackway each.
/// * `metadata`: One [`ReplicateRecord`] per trackway, in collection order.
/// * `variables`: Movement variables to decompose.
///
/// Return
/// ----------
/// * A [`VarianceTable`] with `Track`, `Observer`, `TrackObserver` (when identifiable) and
///   `Residual` components. Records with an undefined value are left out of that variable's
///   fit and listed in the QC summary.
///
/// Errors
/// -----------------
/// * [`IchnosError::MismatchedLengths`] if `metadata` and `collection` differ in length.
/// * [`IchnosError::NoValidVariables`] for an empty variable list.
/// * [`IchnosError::NotEnoughTrackways`] with fewer than two digitizations.
pub fn observer_variance(
    collection: &TrackwayCollection,
    metadata: &[ReplicateRecord],
    variables: &[Variable],
) -> Result<VarianceTable, IchnosError> {
    if metadata.len() != collection.len() {
        return Err(IchnosError::MismatchedLengths {
            trajectories: collection.len(),
            footprints: metadata.len(),
        });
    }
    if variables.is_empty() {
        return Err(IchnosError::NoValidVariables("empty variable list".into()));
    }
    if collection.len() < 2 {
        return Err(IchnosError::NotEnoughTrackways {
            required: 2,
            found: collection.len(),
        });
    }

    let table = track_param(collection);
    let n_tracks = {
        let mut seen: AHashMap<&str, ()> = AHashMap::new();
        metadata.iter().for_each(|r| {
            seen.insert(r.track.as_str(), ());
        });
        seen.len()
    };
    let mut qc = QcSummary {
        n_tracks,
        n_units: collection.len(),
        ..QcSummary::default()
    };

    let mut rows = Vec::with_capacity(variables.len());
    for variable in variables {
        let column = table.column(*variable);
        let (keep, missing): (Vec<usize>, Vec<usize>) =
            (0..column.len()).partition(|&i| column[i].is_some());
        for &i in &missing {
            let entry = (
                collection.names()[i].clone(),
                format!("undefined {}", variable.name()),
            );
            if !qc.excluded.contains(&entry) {
                qc.excluded.push(entry);
            }
        }
        if !missing.is_empty() {
            warn!(
                variable = variable.name(),
                "{} digitization(s) with undefined values left out",
                missing.len()
            );
        }
        if keep.len() < 2 {
            warn!(variable = variable.name(), "fewer than 2 usable digitizations; no decomposition");
            continue;
        }

        let records: Vec<&ReplicateRecord> = keep.iter().map(|&i| &metadata[i]).collect();
        let values: Vec<f64> = keep.iter().filter_map(|&i| column[i]).collect();
        let (terms, dropped) = design(&records);
        for d in dropped {
            if !qc.dropped_terms.contains(&d) {
                qc.dropped_terms.push(d);
            }
        }

        let (components, singular, converged) = if variable.is_circular() {
            let sin: Vec<f64> = values.iter().map(|d| d.to_radians().sin()).collect();
            let cos: Vec<f64> = values.iter().map(|d| d.to_radians().cos()).collect();
            let (cs, s1, c1) = fit_components(&sin, &terms)?;
            let (cc, s2, c2) = fit_components(&cos, &terms)?;
            (average_components(&cs, &cc), s1 || s2, c1 && c2)
        } else {
            fit_components(&values, &terms)?
        };
        if singular {
            qc.singular.push(*variable);
        }
        if !converged {
            warn!(variable = variable.name(), "REML did not converge");
            qc.not_converged.push(*variable);
        }
        debug!(variable = variable.name(), ?components, "observer decomposition");
        rows.push(VarianceRow::new(*variable, &components, singular));
    }

    Ok(VarianceTable {
        mode: VarianceMode::Observer,
        rows,
        qc,
    })
}

#[cfg(test)]
mod observer_test {
    use super::*;
    use crate::trackway::{Trackway, TrackwayCollection};
    use approx::assert_abs_diff_eq;

    /// Digitization of track `t` by observer `o`, replica `r`.
    fn digitization(t: usize, o: usize, r: usize) -> (Trackway, ReplicateRecord) {
        let step = 1.0 + 0.5 * t as f64;
        let wobble = 0.01 * ((t * 7 + o * 3 + r * 5) as f64).sin();
        let coords: Vec<(f64, f64)> = (0..8)
            .map(|i| {
                let s = if i % 2 == 0 { 0.3 } else { -0.3 };
                ((step + wobble) * i as f64, s)
            })
            .collect();
        (
            Trackway::from_coordinates(format!("T{t}_O{o}_R{r}"), &coords),
            ReplicateRecord::new(format!("T{t}"), format!("O{o}"), format!("R{r}")),
        )
    }

    fn dataset() -> (TrackwayCollection, Vec<ReplicateRecord>) {
        let mut tws = Vec::new();
        let mut meta = Vec::new();
        for t in 0..3 {
            for o in 0..2 {
                for r in 0..2 {
                    let (tw, m) = digitization(t, o, r);
                    tws.push(tw);
                    meta.push(m);
                }
            }
        }
        (TrackwayCollection::from_trackways(tws), meta)
    }

    #[test]
    fn test_track_dominates() {
        let (c, meta) = dataset();
        let table = observer_variance(&c, &meta, &[Variable::StepLength]).unwrap();
        let row = table.row(Variable::StepLength).unwrap();
        let track = row.variance_of(Component::Track).unwrap();
        let noise = row.total - track;
        assert!(track > 100.0 * noise);
        assert_eq!(row.rating, Some(crate::variance::SnrRating::Strong));
        let pct: f64 = row.components.iter().filter_map(|c| c.percent).sum();
        assert_abs_diff_eq!(pct, 100.0, epsilon = 1e-9);
        assert_eq!(table.qc.n_tracks, 3);
        assert_eq!(table.qc.n_units, 12);
    }

    #[test]
    fn test_single_observer_drops_terms() {
        let (c, meta) = dataset();
        let keep: Vec<usize> = (0..meta.len()).filter(|&i| meta[i].observer == "O0").collect();
        let sub = c.subset(&keep).unwrap();
        let sub_meta: Vec<ReplicateRecord> = keep.iter().map(|&i| meta[i].clone()).collect();
        let table = observer_variance(&sub, &sub_meta, &[Variable::StepLength]).unwrap();
        let row = table.row(Variable::StepLength).unwrap();
        assert_eq!(row.variance_of(Component::Observer), None);
        assert_eq!(row.variance_of(Component::TrackObserver), None);
        assert!(table.qc.dropped_terms.iter().any(|d| d.starts_with("observer")));
    }

    #[test]
    fn test_interaction_dropped_without_replicas() {
        let records: Vec<ReplicateRecord> = (0..2)
            .flat_map(|t| (0..2).map(move |o| ReplicateRecord::new(format!("T{t}"), format!("O{o}"), "R0")))
            .collect();
        let refs: Vec<&ReplicateRecord> = records.iter().collect();
        let (terms, dropped) = design(&refs);
        assert_eq!(terms.len(), 2);
        assert!(dropped[0].contains("one observation per cell"));
    }

    #[test]
    fn test_metadata_length_checked() {
        let (c, meta) = dataset();
        assert!(matches!(
            observer_variance(&c, &meta[..3], &[Variable::StepLength]),
            Err(IchnosError::MismatchedLengths { .. })
        ));
    }
}
