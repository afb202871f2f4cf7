//! Frame types that flow through the pipeline

use glam::Vec3;

use super::{Color, Point};
use crate::{Result, StreamError};

/// An ordered set of points owned by exactly one pipeline stage at a time.
///
/// Frames are moved, never shared: the downsampler consumes one and returns a new one,
/// the queue hands ownership to the consumer. Point order survives encode/decode but
/// carries no meaning after downsampling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloudFrame {
    points: Vec<Point>,
}

impl PointCloudFrame {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a frame from parallel position and color arrays, as delivered by a capture layer.
    pub fn from_parts(positions: &[Vec3], colors: &[Color]) -> Result<Self> {
        if positions.len() != colors.len() {
            return Err(StreamError::invalid_input(format!(
                "{} positions but {} colors",
                positions.len(),
                colors.len()
            )));
        }

        let points =
            positions.iter().zip(colors).map(|(&position, &color)| Point::new(position, color));
        Ok(Self { points: points.collect() })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// Split into the vertex and color arrays a renderer uploads.
    pub fn into_arrays(self) -> (Vec<Vec3>, Vec<Color>) {
        self.points.into_iter().map(|p| (p.position, p.color)).unzip()
    }
}

impl FromIterator<Point> for PointCloudFrame {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self { points: iter.into_iter().collect() }
    }
}

impl IntoIterator for PointCloudFrame {
    type Item = Point;
    type IntoIter = std::vec::IntoIter<Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

/// Quantized byte form of a frame. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: Vec<u8>,
}

impl EncodedFrame {
    /// Wrap bytes received from a peer. No validation happens until decode.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for EncodedFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
