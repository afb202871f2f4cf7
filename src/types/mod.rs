//! Core types for point-cloud frames.
//!
//! - [`Point`] is a single captured sample: a position in local coordinates plus an RGBA color
//! - [`PointCloudFrame`] is an ordered, exclusively owned sequence of points that moves
//!   between pipeline stages by value
//! - [`EncodedFrame`] is the immutable quantized byte form produced by the codec
//! - [`UpdateRate`] controls how fast a consumer wants to see frames
//!
//! ```rust
//! use pointstream::types::{Color, Point, PointCloudFrame};
//! use glam::Vec3;
//!
//! let frame = PointCloudFrame::from_parts(
//!     &[Vec3::new(0.0, 1.0, 2.0)],
//!     &[Color::rgb(1.0, 0.5, 0.0)],
//! )
//! .unwrap();
//! assert_eq!(frame.len(), 1);
//! assert_eq!(frame.points()[0], Point::new(Vec3::new(0.0, 1.0, 2.0), Color::rgb(1.0, 0.5, 0.0)));
//! ```

mod frame;
mod point;
mod update_rate;

pub use frame::{EncodedFrame, PointCloudFrame};
pub use point::{Color, Point};
pub use update_rate::UpdateRate;
