//! Spatial hashing of points into voxel buckets

use glam::Vec3;
use std::collections::HashMap;
use tracing::trace;

use crate::types::{Point, PointCloudFrame};

/// Integer grid coordinates of a voxel: `floor(p / voxel_size)` per axis.
///
/// Only used as a hash key; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelKey {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl VoxelKey {
    pub fn of(position: Vec3, voxel_size: f32) -> Self {
        let size = voxel_size as f64;
        Self {
            x: (position.x as f64 / size).floor() as i64,
            y: (position.y as f64 / size).floor() as i64,
            z: (position.z as f64 / size).floor() as i64,
        }
    }

    /// Geometric center of the cell.
    pub fn center(self, voxel_size: f32) -> Vec3 {
        let size = voxel_size as f64;
        Vec3::new(
            ((self.x as f64 + 0.5) * size) as f32,
            ((self.y as f64 + 0.5) * size) as f32,
            ((self.z as f64 + 0.5) * size) as f32,
        )
    }
}

/// The points that fell into one voxel.
#[derive(Debug, Clone)]
pub struct VoxelBucket {
    pub key: VoxelKey,
    pub points: Vec<Point>,
}

impl VoxelBucket {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arithmetic mean of the bucket's positions, accumulated in f64.
    pub fn centroid(&self) -> Vec3 {
        if self.points.is_empty() {
            return Vec3::ZERO;
        }
        let mut sum = [0.0f64; 3];
        for p in &self.points {
            sum[0] += p.position.x as f64;
            sum[1] += p.position.y as f64;
            sum[2] += p.position.z as f64;
        }
        let n = self.points.len() as f64;
        Vec3::new((sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32)
    }

    /// The `count` points closest to `anchor`, nearest first.
    ///
    /// Ties are broken by original position in the bucket so the result is deterministic.
    pub fn nearest_to(&self, anchor: Vec3, count: usize) -> Vec<Point> {
        let mut ranked: Vec<(f32, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.position.distance_squared(anchor), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ranked.into_iter().take(count).map(|(_, i)| self.points[i]).collect()
    }
}

/// Transient voxel map, rebuilt on every downsample call.
///
/// Buckets keep first-seen order, which makes output order a pure function of input order.
#[derive(Debug)]
pub struct VoxelGrid {
    voxel_size: f32,
    buckets: Vec<VoxelBucket>,
    skipped: usize,
}

impl VoxelGrid {
    /// Hash every point of `frame` into its voxel.
    ///
    /// Points with a non-finite coordinate cannot be placed in a cell and are skipped.
    pub fn build(frame: PointCloudFrame, voxel_size: f32) -> Self {
        let mut index: HashMap<VoxelKey, usize> = HashMap::with_capacity(frame.len() / 2);
        let mut buckets: Vec<VoxelBucket> = Vec::new();
        let mut skipped = 0usize;

        for point in frame {
            if !point.position.is_finite() {
                skipped += 1;
                continue;
            }
            let key = VoxelKey::of(point.position, voxel_size);
            let slot = *index.entry(key).or_insert_with(|| {
                buckets.push(VoxelBucket { key, points: Vec::new() });
                buckets.len() - 1
            });
            buckets[slot].points.push(point);
        }

        if skipped > 0 {
            trace!("Skipped {} points with non-finite positions", skipped);
        }

        Self { voxel_size, buckets, skipped }
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of input points that were not placed in any bucket.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn buckets(&self) -> &[VoxelBucket] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<VoxelBucket> {
        self.buckets
    }
}
