//! Surface-aware subsampling
//!
//! A voxel whose points lie close to a plane has one covariance eigenvalue near zero.
//! Voxels whose smallest eigenvalue exceeds `curvature_threshold` are treated as
//! non-planar clutter and discarded; planar voxels keep the density-adaptive number of
//! points, nearest the bucket centroid.

use super::{
    Downsampler, SymmetricMatrix3, VoxelGrid, points_to_keep, symmetric_eigenvalues,
    validate_density_factor, validate_voxel_size,
};
use crate::types::PointCloudFrame;
use crate::{Result, StreamError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceAware {
    voxel_size: f32,
    min_points_threshold: usize,
    density_factor: f32,
    curvature_threshold: f32,
}

impl SurfaceAware {
    pub fn new(
        voxel_size: f32,
        min_points_threshold: usize,
        density_factor: f32,
        curvature_threshold: f32,
    ) -> Result<Self> {
        validate_voxel_size(voxel_size)?;
        validate_density_factor(density_factor)?;
        if !curvature_threshold.is_finite() || curvature_threshold < 0.0 {
            return Err(StreamError::invalid_configuration(
                "curvature_threshold",
                format!("must be a finite non-negative number, got {curvature_threshold}"),
            ));
        }
        Ok(Self { voxel_size, min_points_threshold, density_factor, curvature_threshold })
    }
}

impl Downsampler for SurfaceAware {
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

            let centroid = bucket.centroid();
            let covariance = SymmetricMatrix3::covariance(&bucket.points, centroid);
            let [flatness, _, _] = symmetric_eigenvalues(&covariance);
            if flatness > self.curvature_threshold as f64 {
                continue;
            }

            let keep = points_to_keep(bucket.len(), self.density_factor);
            kept.extend(bucket.nearest_to(centroid, keep));
        }

        Ok(PointCloudFrame::new(kept))
    }

    fn voxel_size(&self) -> f32 {
        self.voxel_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::random_cube_frame;
    use crate::types::{Color, Point};
    use glam::Vec3;

    /// 36 points on the plane y = 0.5 inside voxel (0, 0, 0)
    fn planar_patch() -> Vec<Point> {
        (0..36)
            .map(|i| {
                let (u, w) = (0.05 + (i % 6) as f32 * 0.15, 0.05 + (i / 6) as f32 * 0.15);
                Point::new(Vec3::new(u, 0.5, w), Color::rgb(0.0, 1.0, 0.0))
            })
            .collect()
    }

    /// Points scattered through voxel (2, 0, 0)
    fn scattered_blob() -> Vec<Point> {
        random_cube_frame(36, 1.0, 99)
            .into_iter()
            .map(|p| Point::new(p.position + Vec3::new(2.0, 0.0, 0.0), p.color))
            .collect()
    }

    #[test]
    fn keeps_planar_voxels_and_drops_scattered_ones() {
        let mut points = planar_patch();
        points.extend(scattered_blob());

        let out = SurfaceAware::new(1.0, 4, 1.0, 1e-4)
            .unwrap()
            .downsample(PointCloudFrame::new(points))
            .unwrap();

        // sqrt(36) * 1.0 from the planar voxel only
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|p| p.position.x < 1.0 && p.position.y == 0.5));
    }

    #[test]
    fn generous_threshold_keeps_both() {
        let mut points = planar_patch();
        points.extend(scattered_blob());

        let out = SurfaceAware::new(1.0, 4, 1.0, 10.0)
            .unwrap()
            .downsample(PointCloudFrame::new(points))
            .unwrap();
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn respects_minimum_point_threshold() {
        let out = SurfaceAware::new(1.0, 100, 1.0, 10.0)
            .unwrap()
            .downsample(PointCloudFrame::new(planar_patch()))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_negative_curvature_threshold() {
        assert!(matches!(
            SurfaceAware::new(1.0, 1, 1.0, -1.0),
            Err(StreamError::InvalidConfiguration { .. })
        ));
    }
}
