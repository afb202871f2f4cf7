//! Stream a synthetic point cloud through an in-process pipeline.
//!
//! ```text
//! cargo run --example loopback [config.yaml]
//! RUST_LOG=pointstream=debug cargo run --example loopback
//! ```

use anyhow::{Context, Result};
use glam::Vec3;
use pointstream::types::Color;
use pointstream::{MemoryTransport, PipelineConfig, PointStream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::info;

const FRAMES: usize = 5;
const POINTS_PER_FRAME: usize = 100_000;

/// A noisy sphere shell, roughly what a depth camera sees of a round object
fn capture(rng: &mut StdRng) -> (Vec<Vec3>, Vec<Color>) {
    (0..POINTS_PER_FRAME)
        .map(|_| {
            let direction = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
            .normalize_or_zero();
            let radius = 0.5 + rng.gen_range(-0.01..0.01);
            let position = direction * radius;
            let color = Color::rgb(position.x + 0.5, position.y + 0.5, position.z + 0.5);
            (position, color)
        })
        .unzip()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pointstream=info".parse()?),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => PipelineConfig::default(),
    };
    info!("Config:\n{}", config.to_yaml_string()?);

    let (tx, rx) = MemoryTransport::pair(config.max_chunk_size, 64);
    let mut feed = PointStream::receive(rx, &config)?;
    let mut producer = PointStream::producer(tx, &config)?;
    let mut rng = StdRng::seed_from_u64(2024);

    for n in 0..FRAMES {
        let (positions, colors) = capture(&mut rng);
        let started = Instant::now();
        let report = producer.capture_frame(&positions, &colors).await?;
        let frame = feed.next_frame().await.context("receiver stopped")?;

        info!(
            frame = n,
            captured = report.input_points,
            sent = report.output_points,
            bytes = report.encoded_bytes,
            messages = report.messages,
            received = frame.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Round trip complete"
        );
    }

    drop(producer);
    info!("Receiver stats: {:?}", feed.stats());
    Ok(())
}
