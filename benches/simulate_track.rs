use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ichnos::inference::similarity_test;
use ichnos::similarity::{PairMetric, Superposition};
use ichnos::simulation::{simulate_track, MovementModel, SimulationParams};
use ichnos::trackway::{Trackway, TrackwayCollection};

fn collection(n_tracks: usize, n_prints: usize) -> TrackwayCollection {
    let tws = (0..n_tracks)
        .map(|t| {
            let coords: Vec<(f64, f64)> = (0..n_prints)
                .map(|i| {
                    let side = if i % 2 == 0 { 0.3 } else { -0.3 };
                    (i as f64 * 0.9, 4.0 * t as f64 + side + 0.05 * (i as f64).sin())
                })
                .collect();
            Trackway::from_coordinates(format!("T{t}"), &coords)
        })
        .collect();
    TrackwayCollection::from_trackways(tws)
}

fn bench_simulation(c: &mut Criterion) {
    let data = collection(6, 30);
    let mut group = c.benchmark_group("simulate_track");

    for model in [
        MovementModel::Unconstrained,
        MovementModel::Directed,
        MovementModel::Constrained,
    ] {
        let params = SimulationParams::builder()
            .nsim(200)
            .model(model)
            .build()
            .unwrap();
        group.bench_function(format!("{model}"), |b| {
            b.iter_batched(
                || StdRng::seed_from_u64(7),
                |mut rng| simulate_track(&data, &params, &mut rng).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_similarity_test(c: &mut Criterion) {
    let data = collection(6, 30);
    let params = SimulationParams::builder().nsim(200).build().unwrap();
    let ensemble = simulate_track(&data, &params, &mut StdRng::seed_from_u64(3)).unwrap();

    c.bench_function("similarity_test/dtw_200", |b| {
        b.iter(|| {
            similarity_test(&data, &ensemble, PairMetric::Dtw, Superposition::Centroid).unwrap()
        })
    });
}

criterion_group!(benches, bench_simulation, bench_similarity_test);
criterion_main!(benches);
