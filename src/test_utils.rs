//! Synthetic point clouds and other helpers shared by tests and benchmarks
//!
//! Generators are seeded, so a given `(count, extent, seed)` always yields the same frame.
//! Regression tests rely on that to pin exact output counts.

#![cfg(any(test, feature = "benchmark"))]

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{Color, Point, PointCloudFrame};

/// `count` points uniformly distributed in `[0, extent)^3` with random opaque colors.
pub fn random_cube_frame(count: usize, extent: f32, seed: u64) -> PointCloudFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let position = Vec3::new(
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
            );
            let color = Color::rgb(
                rng.gen_range(0.0..=1.0),
                rng.gen_range(0.0..=1.0),
                rng.gen_range(0.0..=1.0),
            );
            Point::new(position, color)
        })
        .collect()
}

/// A `side` x `side` grid of points on the plane `z = 0`, spaced `spacing` apart.
pub fn planar_grid_frame(side: usize, spacing: f32) -> PointCloudFrame {
    (0..side * side)
        .map(|i| {
            let position = Vec3::new((i % side) as f32 * spacing, (i / side) as f32 * spacing, 0.0);
            Point::new(position, Color::rgb(0.2, 0.4, 0.8))
        })
        .collect()
}

/// Split a frame into the position and color arrays a capture layer would hand over.
pub fn capture_arrays(frame: &PointCloudFrame) -> (Vec<Vec3>, Vec<Color>) {
    frame.clone().into_arrays()
}

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
