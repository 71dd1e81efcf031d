mod common;

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ichnos::ichnos_errors::IchnosError;
use ichnos::inference::combined::combined_prob;
use ichnos::inference::{
    intersection_test, similarity_test, similarity_test_with_cancel, Direction,
};
use ichnos::progress::CancelToken;
use ichnos::similarity::{PairMetric, Superposition};
use ichnos::simulation::origin::OriginRegion;
use ichnos::simulation::{simulate_track, MovementModel, SimulationParams};
use ichnos::trackway::TrackwayCollection;

const NSIM: usize = 49;

fn ensemble_for(
    collection: &TrackwayCollection,
    model: MovementModel,
    seed: u64,
) -> ichnos::simulation::SimulationEnsemble {
    let params = SimulationParams::builder()
        .nsim(NSIM)
        .model(model)
        .build()
        .unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    simulate_track(collection, &params, &mut rng).unwrap()
}

#[test]
fn test_simulation_is_reproducible() {
    let collection = common::parallel_group();
    let a = ensemble_for(&collection, MovementModel::Unconstrained, 11);
    let b = ensemble_for(&collection, MovementModel::Unconstrained, 11);
    assert_eq!(a, b);
    assert_eq!(a.nsim(), NSIM);
    assert_eq!(a.n_trackways(), 3);
    for replicate in &a.replicates {
        for (sim, obs) in replicate.iter().zip(collection.trajectories()) {
            assert_eq!(sim.len(), obs.len());
        }
    }
}

#[test]
fn test_parallel_tracks_are_more_similar_than_random() {
    let collection = common::parallel_group();
    let ensemble = ensemble_for(&collection, MovementModel::Unconstrained, 3);

    for metric in [PairMetric::Dtw, PairMetric::Frechet] {
        let result =
            similarity_test(&collection, &ensemble, metric, Superposition::Centroid).unwrap();
        assert_eq!(result.nsim(), NSIM);
        for (_, _, p) in result.p_values.upper_pairs() {
            assert_relative_eq!(p, 1.0 / (NSIM + 1) as f64);
        }
        for (_, _, q) in result.p_adjusted.upper_pairs() {
            assert!(q >= 1.0 / (NSIM + 1) as f64 && q <= 1.0);
        }
    }
}

#[test]
fn test_intersection_p_values_are_bounded() {
    let collection = common::parallel_group();
    let ensemble = ensemble_for(&collection, MovementModel::Unconstrained, 5);
    let mut rng = StdRng::seed_from_u64(17);

    let lower = intersection_test(
        &collection,
        &ensemble,
        &OriginRegion::ConvexHull,
        Direction::Lower,
        &mut rng,
    )
    .unwrap();
    assert_eq!(lower.observed.get_by_name("P1", "P3"), Some(0.0));
    for (_, _, p) in lower.p_values.upper_pairs() {
        assert!(p >= 1.0 / (NSIM + 1) as f64 && p <= 1.0);
    }

    // every count is >= 0, so nothing is less extreme than zero crossings
    let higher = intersection_test(
        &collection,
        &ensemble,
        &OriginRegion::None,
        Direction::Higher,
        &mut rng,
    )
    .unwrap();
    for (_, _, p) in higher.p_values.upper_pairs() {
        assert_relative_eq!(p, 1.0);
    }
    assert_relative_eq!(higher.global_p, 1.0);
}

#[test]
fn test_combined_probability() {
    let collection = common::parallel_group();
    let ensemble = ensemble_for(&collection, MovementModel::Directed, 23);

    let dtw = similarity_test(&collection, &ensemble, PairMetric::Dtw, Superposition::Centroid)
        .unwrap();
    let frechet = similarity_test(
        &collection,
        &ensemble,
        PairMetric::Frechet,
        Superposition::Centroid,
    )
    .unwrap();
    let combined = combined_prob(&[&dtw, &frechet]).unwrap();

    assert_eq!(combined.nsim, NSIM);
    for ((_, _, pc), (_, _, pd)) in combined
        .p_values
        .upper_pairs()
        .zip(dtw.p_values.upper_pairs())
    {
        // a joint hit needs a hit in every test
        assert!(pc <= pd + 1e-12);
        assert!(pc >= 1.0 / (NSIM + 1) as f64);
    }
    assert!(combined.global_p >= 1.0 / (NSIM + 1) as f64);
}

#[test]
fn test_combined_rejects_other_ensemble_size() {
    let collection = common::parallel_group();
    let big = ensemble_for(&collection, MovementModel::Unconstrained, 1);
    let params = SimulationParams::builder().nsim(9).build().unwrap();
    let small = simulate_track(&collection, &params, &mut StdRng::seed_from_u64(2)).unwrap();

    let a = similarity_test(&collection, &big, PairMetric::Dtw, Superposition::None).unwrap();
    let b = similarity_test(&collection, &small, PairMetric::Dtw, Superposition::None).unwrap();
    assert!(matches!(
        combined_prob(&[&a, &b]),
        Err(IchnosError::InvalidParameter(_))
    ));
}

#[test]
fn test_cancelled_run() {
    let collection = common::parallel_group();
    let ensemble = ensemble_for(&collection, MovementModel::Unconstrained, 9);
    let token = CancelToken::new();
    token.cancel();
    let res = similarity_test_with_cancel(
        &collection,
        &ensemble,
        PairMetric::Dtw,
        Superposition::None,
        Some(&token),
    );
    assert_eq!(res.unwrap_err(), IchnosError::Cancelled);
}

#[test]
fn test_single_trackway_is_rejected() {
    let one = TrackwayCollection::from_trackways(vec![common::zigzag(
        "solo", 0.0, 0.0, 0.0, 1.0, 6,
    )]);
    let params = SimulationParams::builder().nsim(5).build().unwrap();
    let ensemble = simulate_track(&one, &params, &mut StdRng::seed_from_u64(0)).unwrap();
    assert!(matches!(
        similarity_test(&one, &ensemble, PairMetric::Dtw, Superposition::None),
        Err(IchnosError::NotEnoughTrackways { .. })
    ));
}
