#![allow(dead_code)]
use ichnos::trackway::{Trackway, TrackwayCollection};

/// Alternating left/right prints along a straight line from `(x0, y0)` with heading `deg`.
pub fn zigzag(name: &str, x0: f64, y0: f64, deg: f64, step: f64, n: usize) -> Trackway {
    let (s, c) = deg.to_radians().sin_cos();
    let coords: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let along = step * i as f64;
            let side = if i % 2 == 0 { 0.25 } else { -0.25 };
            (x0 + along * c - side * s, y0 + along * s + side * c)
        })
        .collect();
    Trackway::from_coordinates(name, &coords)
}

/// Three parallel trackways heading east, 3 units apart.
pub fn parallel_group() -> TrackwayCollection {
    TrackwayCollection::from_trackways(vec![
        zigzag("P1", 0.0, 0.0, 0.0, 1.0, 12),
        zigzag("P2", 0.0, 3.0, 0.0, 1.0, 12),
        zigzag("P3", 0.0, 6.0, 0.0, 1.0, 12),
    ])
}

/// Two short, slow trackways and two long, fast ones.
pub fn two_gaits() -> TrackwayCollection {
    TrackwayCollection::from_trackways(vec![
        zigzag("slow1", 0.0, 0.0, 10.0, 0.5, 10),
        zigzag("slow2", 0.0, 5.0, 12.0, 0.55, 10),
        zigzag("fast1", 0.0, 10.0, 80.0, 2.0, 10),
        zigzag("fast2", 0.0, 15.0, 82.0, 2.1, 10),
    ])
}
