//! Classic voxel-grid filter: one mean point per occupied voxel

use glam::Vec3;

use super::{Downsampler, VoxelBucket, VoxelGrid, validate_voxel_size};
use crate::Result;
use crate::types::{Color, Point, PointCloudFrame};

/// Replaces each occupied voxel with the mean position and mean color of its points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelAverage {
    voxel_size: f32,
}

impl VoxelAverage {
    pub fn new(voxel_size: f32) -> Result<Self> {
        validate_voxel_size(voxel_size)?;
        Ok(Self { voxel_size })
    }
}

/// Mean of every point in the bucket, summed in f64 to keep rounding drift small.
pub(crate) fn mean_point(bucket: &VoxelBucket) -> Point {
    let mut position = [0.0f64; 3];
    let mut color = [0.0f64; 4];

    for p in &bucket.points {
        position[0] += p.position.x as f64;
        position[1] += p.position.y as f64;
        position[2] += p.position.z as f64;
        for (acc, channel) in color.iter_mut().zip(p.color.to_array()) {
            *acc += channel as f64;
        }
    }

    let n = bucket.points.len().max(1) as f64;
    Point::new(
        Vec3::new((position[0] / n) as f32, (position[1] / n) as f32, (position[2] / n) as f32),
        Color::from_array(color.map(|c| (c / n) as f32)),
    )
}

impl Downsampler for VoxelAverage {
    fn downsample(&self, frame: PointCloudFrame) -> Result<PointCloudFrame> {
        if frame.is_empty() {
            return Ok(frame);
        }
        let grid = VoxelGrid::build(frame, self.voxel_size);
        Ok(grid.buckets().iter().map(mean_point).collect())
    }

    fn voxel_size(&self) -> f32 {
        self.voxel_size
    }
}
