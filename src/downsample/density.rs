//! Density-adaptive subsampling
//!
//! Sparse voxels are treated as noise and dropped. Dense voxels keep a number of points
//! that grows with the square root of their population, chosen nearest the voxel center
//! rather than averaged, so genuine shape inside a crowded cell survives.

use super::{Downsampler, VoxelGrid, validate_density_factor, validate_voxel_size};
use crate::Result;
use crate::types::PointCloudFrame;

/// `min(count, ceil(sqrt(count) * density_factor))`
pub fn points_to_keep(count: usize, density_factor: f32) -> usize {
    if count == 0 {
        return 0;
    }
    let target = ((count as f64).sqrt() * density_factor as f64).ceil();
    if target <= 0.0 { 0 } else { (target as usize).min(count) }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityAdaptive {
    voxel_size: f32,
    min_points_threshold: usize,
    density_factor: f32,
}

impl DensityAdaptive {
    pub fn new(voxel_size: f32, min_points_threshold: usize, density_factor: f32) -> Result<Self> {
        validate_voxel_size(voxel_size)?;
        validate_density_factor(density_factor)?;
        Ok(Self { voxel_size, min_points_threshold, density_factor })
    }
}

impl Downsampler for DensityAdaptive {
    fn downsample(&self, frame: PointCloudFrame) -> Result<PointCloudFrame> {
        if frame.is_empty() {
            return Ok(frame);
        }

        let grid = VoxelGrid::build(frame, self.voxel_size);
        let mut kept = Vec::new();

        for bucket in grid.buckets() {
            if bucket.len() < self.min_points_threshold {
                continue;
            }
            let keep = points_to_keep(bucket.len(), self.density_factor);
            kept.extend(bucket.nearest_to(bucket.key.center(self.voxel_size), keep));
        }

        Ok(PointCloudFrame::new(kept))
    }

    fn voxel_size(&self) -> f32 {
        self.voxel_size
    }
}
