//! Voxel-grid downsampling.
//!
//! Every strategy starts the same way: points are hashed into cubic cells of edge
//! `voxel_size` ([`VoxelKey`]), then each non-empty cell ([`VoxelBucket`]) is reduced
//! independently. The strategies differ only in how a bucket is reduced:
//!
//! | Strategy | Bucket filter | Points emitted per bucket |
//! |----------|---------------|---------------------------|
//! | [`DownsampleStrategy::Average`] | none | one: mean position, mean color |
//! | [`DownsampleStrategy::DensityAdaptive`] | `len >= min_points_threshold` | `min(len, ceil(sqrt(len) * density_factor))` nearest the voxel center |
//! | [`DownsampleStrategy::SurfaceAware`] | threshold, then smallest covariance eigenvalue `<= curvature_threshold` | same count, nearest the bucket centroid |
//!
//! All strategies sit behind the [`Downsampler`] trait, so call sites select a strategy
//! through configuration without changing.
//!
//! ```rust
//! use pointstream::downsample::{DownsampleStrategy, Downsampler, VoxelDownsampler};
//! use pointstream::types::{Color, Point, PointCloudFrame};
//! use glam::Vec3;
//!
//! let frame: PointCloudFrame = [0.01, 0.02, 0.03, 0.51]
//!     .iter()
//!     .map(|&x| Point::new(Vec3::new(x, 0.0, 0.0), Color::rgb(1.0, 1.0, 1.0)))
//!     .collect();
//!
//! let downsampler = VoxelDownsampler::new(0.5, DownsampleStrategy::Average).unwrap();
//! let reduced = downsampler.downsample(frame).unwrap();
//! assert_eq!(reduced.len(), 2);
//! ```
//!
//! ## Determinism
//!
//! Buckets are emitted in the order their first point was seen, so identical input
//! produces identical output. Across permutations of the input the *set* of output
//! points is the same, but mean positions may differ in the last bits because floating
//! point summation order changes. Compare such outputs with a tolerance.

mod average;
mod density;
mod eigen;
mod surface;
mod voxel_grid;

pub use average::VoxelAverage;
pub use density::{DensityAdaptive, points_to_keep};
pub use eigen::{SymmetricMatrix3, symmetric_eigenvalues};
pub use surface::SurfaceAware;
pub use voxel_grid::{VoxelBucket, VoxelGrid, VoxelKey};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::PointCloudFrame;
use crate::{Result, StreamError};

/// Capability shared by every downsampling strategy.
pub trait Downsampler: Send + Sync {
    /// Reduce a frame. The output never has more points than the input.
    fn downsample(&self, frame: PointCloudFrame) -> Result<PointCloudFrame>;

    /// Edge length of the voxel grid cells
    fn voxel_size(&self) -> f32;
}

/// Strategy selection, as it appears in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DownsampleStrategy {
    /// One averaged point per voxel
    #[default]
    Average,

    /// Noise rejection plus structure-preserving subsampling in dense voxels
    DensityAdaptive { min_points_threshold: usize, density_factor: f32 },

    /// Like `DensityAdaptive`, additionally discarding non-planar voxels
    SurfaceAware { min_points_threshold: usize, density_factor: f32, curvature_threshold: f32 },
}

impl DownsampleStrategy {
    /// Reject parameter combinations that cannot produce a meaningful result.
    pub fn validate(&self) -> Result<()> {
        match *self {
            DownsampleStrategy::Average => Ok(()),
            DownsampleStrategy::DensityAdaptive { density_factor, .. } => {
                validate_density_factor(density_factor)
            }
            DownsampleStrategy::SurfaceAware { density_factor, curvature_threshold, .. } => {
                validate_density_factor(density_factor)?;
                if !curvature_threshold.is_finite() || curvature_threshold < 0.0 {
                    return Err(StreamError::invalid_configuration(
                        "curvature_threshold",
                        format!("must be a finite non-negative number, got {curvature_threshold}"),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn validate_density_factor(density_factor: f32) -> Result<()> {
    if !density_factor.is_finite() || density_factor <= 0.0 {
        return Err(StreamError::invalid_configuration(
            "density_factor",
            format!("must be a finite positive number, got {density_factor}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_voxel_size(voxel_size: f32) -> Result<()> {
    if !voxel_size.is_finite() || voxel_size <= 0.0 {
        return Err(StreamError::invalid_configuration(
            "voxel_size",
            format!("must be a finite positive number, got {voxel_size}"),
        ));
    }
    Ok(())
}

/// Downsampler that dispatches to the configured strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelDownsampler {
    voxel_size: f32,
    strategy: DownsampleStrategy,
}

impl VoxelDownsampler {
    /// Validates both the voxel size and the strategy parameters up front.
    pub fn new(voxel_size: f32, strategy: DownsampleStrategy) -> Result<Self> {
        validate_voxel_size(voxel_size)?;
        strategy.validate()?;
        Ok(Self { voxel_size, strategy })
    }

    pub fn strategy(&self) -> DownsampleStrategy {
        self.strategy
    }
}

impl Downsampler for VoxelDownsampler {
    fn downsample(&self, frame: PointCloudFrame) -> Result<PointCloudFrame> {
        let input_len = frame.len();
        let output = match self.strategy {
            DownsampleStrategy::Average => VoxelAverage::new(self.voxel_size)?.downsample(frame),
            DownsampleStrategy::DensityAdaptive { min_points_threshold, density_factor } => {
                DensityAdaptive::new(self.voxel_size, min_points_threshold, density_factor)?
                    .downsample(frame)
            }
            DownsampleStrategy::SurfaceAware {
                min_points_threshold,
                density_factor,
                curvature_threshold,
            } => SurfaceAware::new(
                self.voxel_size,
                min_points_threshold,
                density_factor,
                curvature_threshold,
            )?
            .downsample(frame),
        }?;

        debug!(
            input = input_len,
            output = output.len(),
            strategy = ?self.strategy,
            "Downsampled frame"
        );
        Ok(output)
    }

    fn voxel_size(&self) -> f32 {
        self.voxel_size
    }
}

/// Downsample a frame with the given voxel size and strategy in one call.
pub fn downsample(
    frame: PointCloudFrame,
    voxel_size: f32,
    strategy: DownsampleStrategy,
) -> Result<PointCloudFrame> {
    VoxelDownsampler::new(voxel_size, strategy)?.downsample(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::random_cube_frame;

    #[test]
    fn rejects_non_positive_voxel_size() {
        for voxel_size in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let result = VoxelDownsampler::new(voxel_size, DownsampleStrategy::Average);
            assert!(
                matches!(result, Err(StreamError::InvalidConfiguration { .. })),
                "voxel_size {voxel_size} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_bad_strategy_parameters() {
        let bad_density =
            DownsampleStrategy::DensityAdaptive { min_points_threshold: 1, density_factor: 0.0 };
        assert!(VoxelDownsampler::new(0.1, bad_density).is_err());

        let bad_curvature = DownsampleStrategy::SurfaceAware {
            min_points_threshold: 1,
            density_factor: 1.0,
            curvature_threshold: -0.5,
        };
        assert!(VoxelDownsampler::new(0.1, bad_curvature).is_err());
    }

    #[test]
    fn empty_input_gives_empty_output_for_every_strategy() {
        let strategies = [
            DownsampleStrategy::Average,
            DownsampleStrategy::DensityAdaptive { min_points_threshold: 2, density_factor: 1.6 },
            DownsampleStrategy::SurfaceAware {
                min_points_threshold: 2,
                density_factor: 1.6,
                curvature_threshold: 0.01,
            },
        ];
        for strategy in strategies {
            let out = downsample(PointCloudFrame::empty(), 0.05, strategy).unwrap();
            assert!(out.is_empty());
        }
    }

    /// Occupied 5cm voxels for `random_cube_frame(100_000, 10.0, 0x5eed)`
    const SEEDED_CUBE_VOXELS: usize = 99_325;

    #[test]
    fn hundred_thousand_points_regression() {
        // 100k points in a 10x10x10 cube at 5cm voxels
        let frame = random_cube_frame(100_000, 10.0, 0x5eed);
        let first = downsample(frame.clone(), 0.05, DownsampleStrategy::Average).unwrap();
        assert_eq!(first.len(), SEEDED_CUBE_VOXELS);

        let second = downsample(frame, 0.05, DownsampleStrategy::Average).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn strategies_are_interchangeable_behind_the_trait() {
        let frame = random_cube_frame(2_000, 1.0, 7);
        let downsamplers: Vec<Box<dyn Downsampler>> = vec![
            Box::new(VoxelAverage::new(0.25).unwrap()),
            Box::new(DensityAdaptive::new(0.25, 1, 1.0).unwrap()),
            Box::new(SurfaceAware::new(0.25, 1, 1.0, 1.0).unwrap()),
        ];

        for downsampler in &downsamplers {
            let out = downsampler.downsample(frame.clone()).unwrap();
            assert!(out.len() <= frame.len());
            assert_eq!(downsampler.voxel_size(), 0.25);
        }
    }

    #[test]
    fn strategy_parses_from_yaml() {
        let yaml = "mode: density_adaptive\nmin_points_threshold: 3\ndensity_factor: 1.6\n";
        let strategy: DownsampleStrategy = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(
            strategy,
            DownsampleStrategy::DensityAdaptive { min_points_threshold: 3, density_factor: 1.6 }
        );
    }
}
