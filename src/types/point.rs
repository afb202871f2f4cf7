//! Point and color primitives

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Normalized RGBA color, each channel nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    /// Opaque color from three channels.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub(crate) fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub(crate) fn from_array(channels: [f32; 4]) -> Self {
        Self { r: channels[0], g: channels[1], b: channels[2], a: channels[3] }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// A single captured sample. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Position in the capture device's local coordinate space
    pub position: Vec3,
    pub color: Color,
}

impl Point {
    pub const fn new(position: Vec3, color: Color) -> Self {
        Self { position, color }
    }
}
