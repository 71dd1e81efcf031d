mod common;

use ichnos::clustering::hierarchical::Linkage;
use ichnos::clustering::{cluster_track, ClusterMethod, ClusterOutcome, ClusterParams};
use ichnos::geometry::track_param::{track_param, Variable};
use ichnos::ichnos_errors::IchnosError;
use ichnos::trackway::{Trackway, TrackwayCollection};

#[test]
fn test_hierarchical_separates_gaits() {
    let table = track_param(&common::two_gaits());
    let params = ClusterParams::builder()
        .variables(&["StepLen", "TurnAng"])
        .method(ClusterMethod::Hierarchical)
        .linkage(Linkage::WardD2)
        .k(2)
        .build()
        .unwrap();
    let result = cluster_track(&table, &params).unwrap();

    assert_eq!(result.variables, vec![Variable::StepLength, Variable::TurnAngle]);
    assert_eq!(
        result.working.columns,
        vec!["StepLen", "TurnAng_sin", "TurnAng_cos"]
    );
    assert_eq!(result.labels(), Some(&[0, 0, 1, 1][..]));
    match &result.outcome {
        ClusterOutcome::Hierarchical { tree, .. } => {
            assert_eq!(tree.merges.len(), 3);
            let h = tree.heights();
            assert!(h.windows(2).all(|w| w[0] <= w[1]));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_model_based_separates_gaits() {
    let table = track_param(&common::two_gaits());
    let params = ClusterParams::builder()
        .variables(&["StepLen"])
        .max_clusters(2)
        .build()
        .unwrap();
    let result = cluster_track(&table, &params).unwrap();

    let labels = result.labels().unwrap();
    assert_eq!(labels[0], labels[1]);
    assert_eq!(labels[2], labels[3]);
    assert_ne!(labels[0], labels[2]);
    match &result.outcome {
        ClusterOutcome::ModelBased(g) => {
            assert_eq!(g.best.g, 2);
            assert!(g.uncertainty.iter().all(|u| (0.0..=1.0).contains(u)));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_short_trackways_are_excluded() {
    let mut tws = vec![
        common::zigzag("a", 0.0, 0.0, 0.0, 1.0, 8),
        common::zigzag("b", 0.0, 4.0, 5.0, 1.2, 8),
    ];
    tws.push(Trackway::from_coordinates(
        "stub",
        &[(0.0, 9.0), (1.0, 9.5), (2.0, 9.0)],
    ));
    let table = track_param(&TrackwayCollection::from_trackways(tws));
    let params = ClusterParams::builder()
        .variables(&["StepLen", "PathLen"])
        .method(ClusterMethod::Hierarchical)
        .build()
        .unwrap();
    let result = cluster_track(&table, &params).unwrap();

    assert_eq!(result.names(), &["a".to_string(), "b".to_string()]);
    assert_eq!(result.excluded().len(), 1);
    assert_eq!(result.excluded()[0].0, "stub");
    assert!(result.is_possible());
}

#[test]
fn test_not_possible_with_one_trackway() {
    let table = track_param(&TrackwayCollection::from_trackways(vec![common::zigzag(
        "only", 0.0, 0.0, 0.0, 1.0, 8,
    )]));
    let result = cluster_track(&table, &ClusterParams::default()).unwrap();
    assert!(!result.is_possible());
    assert_eq!(result.labels(), None);
}

#[test]
fn test_unknown_variables() {
    let params = ClusterParams::builder()
        .variables(&["StepLen", "Wingspan"])
        .build()
        .unwrap();
    assert_eq!(params.variables, vec![Variable::StepLength]);

    assert!(matches!(
        ClusterParams::builder().variables(&["Wingspan"]).build(),
        Err(IchnosError::NoValidVariables(_))
    ));
}
