mod common;

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ichnos::geometry::track_param::Variable;
use ichnos::trackway::TrackwayCollection;
use ichnos::variance::anatomical::{anatomical_variance, AnatomicalParams, Jitter};
use ichnos::variance::observer::{observer_variance, ReplicateRecord};
use ichnos::variance::{Component, SnrRating, VarianceMode};

#[test]
fn test_anatomical_small_error_keeps_signal() {
    let collection = common::two_gaits();
    let params = AnatomicalParams::builder()
        .error_radius(0.02)
        .n_sim(60)
        .jitter(Jitter::TruncatedGaussian { sd: 0.01 })
        .variables(&["StepLen", "TurnAng", "Straightness"])
        .build()
        .unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let table = anatomical_variance(&collection, &params, &mut rng).unwrap();

    assert_eq!(table.mode, VarianceMode::Anatomical);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.qc.n_tracks, 4);
    assert_eq!(table.qc.n_units, 60);

    let step = table.row(Variable::StepLength).unwrap();
    assert_eq!(step.rating, Some(SnrRating::Strong));
    for row in &table.rows {
        if row.percent_of(Component::Track).is_some() {
            let sum: f64 = row.components.iter().filter_map(|c| c.percent).sum();
            assert_abs_diff_eq!(sum, 100.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_anatomical_larger_error_lowers_snr() {
    let collection = common::two_gaits();
    let run = |radius: f64| {
        let params = AnatomicalParams::builder()
            .error_radius(radius)
            .n_sim(40)
            .variables(&["StepLen"])
            .build()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let table = anatomical_variance(&collection, &params, &mut rng).unwrap();
        table.row(Variable::StepLength).unwrap().snr.unwrap()
    };
    assert!(run(0.3) < run(0.03));
}

#[test]
fn test_observer_design_from_replicates() {
    // 2 tracks x 3 observers x 2 replicas, observer 2 reads every step 4% long
    let mut tws = Vec::new();
    let mut meta = Vec::new();
    for (t, step) in [(0usize, 1.0), (1, 1.8)] {
        for o in 0..3 {
            for r in 0..2 {
                let bias = if o == 2 { 1.04 } else { 1.0 };
                let jitter = 0.002 * (r as f64 - 0.5);
                tws.push(common::zigzag(
                    &format!("T{t}O{o}R{r}"),
                    0.0,
                    5.0 * t as f64,
                    0.0,
                    step * bias + jitter,
                    9,
                ));
                meta.push(ReplicateRecord::new(
                    format!("T{t}"),
                    format!("O{o}"),
                    format!("R{r}"),
                ));
            }
        }
    }
    let collection = TrackwayCollection::from_trackways(tws);
    let table = observer_variance(
        &collection,
        &meta,
        &[Variable::StepLength, Variable::TurnAngle],
    )
    .unwrap();

    assert_eq!(table.mode, VarianceMode::Observer);
    assert_eq!(table.qc.n_tracks, 2);
    assert_eq!(table.qc.n_units, 12);
    assert!(table.qc.dropped_terms.is_empty());

    let step = table.row(Variable::StepLength).unwrap();
    assert!(step.variance_of(Component::Observer).is_some());
    assert!(step.variance_of(Component::TrackObserver).is_some());
    assert!(
        step.variance_of(Component::Track).unwrap()
            > step.variance_of(Component::Residual).unwrap()
    );
    // every print heads due east: nothing to decompose
    let turn = table.row(Variable::TurnAngle).unwrap();
    assert_eq!(turn.snr, None);
}
