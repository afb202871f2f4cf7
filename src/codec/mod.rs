//! Quantized binary wire format for a single frame
//!
//! ## Layout (little-endian)
//!
//! ```text
//! offset        size      field
//! 0             4         i32 point count N
//! 4             6 * N     i16 x, y, z per point, value * position_scale
//! 4 + 6N        3 * N     u8  r, g, b per point, channel * color_scale
//! ```
//!
//! Positions are stored for all points first, then all colors. Alpha is not transmitted;
//! decoded points are opaque.
//!
//! ## Precision
//!
//! With the default scales a round trip reproduces positions within ±0.5 mm and color
//! channels within ±0.5/255. Positions outside ±32.767 (default scale) saturate at the
//! i16 bounds rather than wrapping around.

mod quantize;

pub use quantize::{dequantize_color, dequantize_position, quantize_color, quantize_position};

use glam::Vec3;
use tracing::{debug, trace};

use crate::types::{Color, EncodedFrame, Point, PointCloudFrame};
use crate::{Result, StreamError};

/// Size of the point count header
pub const COUNT_SIZE: usize = 4;
/// Bytes per quantized position (3 x i16)
pub const POSITION_STRIDE: usize = 6;
/// Bytes per quantized color (3 x u8)
pub const COLOR_STRIDE: usize = 3;

pub const DEFAULT_POSITION_SCALE: f32 = 1000.0;
pub const DEFAULT_COLOR_SCALE: f32 = 255.0;

/// Total encoded size for `count` points, or `None` on overflow.
pub fn encoded_len(count: usize) -> Option<usize> {
    count.checked_mul(POSITION_STRIDE + COLOR_STRIDE)?.checked_add(COUNT_SIZE)
}

/// Parse and validate the point count header.
pub fn parse_count(header: &[u8]) -> Result<usize> {
    if header.len() < COUNT_SIZE {
        return Err(StreamError::decode_error(
            "Point count parsing",
            format!("Need {} header bytes, have {}", COUNT_SIZE, header.len()),
        ));
    }
    let count = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    usize::try_from(count).map_err(|_| {
        StreamError::decode_error("Point count parsing", format!("Negative point count {}", count))
    })
}

/// Encoder/decoder for the frame layout, parameterized by quantization scales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCodec {
    position_scale: f32,
    color_scale: f32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self { position_scale: DEFAULT_POSITION_SCALE, color_scale: DEFAULT_COLOR_SCALE }
    }
}

impl FrameCodec {
    pub fn new(position_scale: f32, color_scale: f32) -> Result<Self> {
        for (parameter, value) in [("position_scale", position_scale), ("color_scale", color_scale)]
        {
            if !value.is_finite() || value <= 0.0 {
                return Err(StreamError::invalid_configuration(
                    parameter,
                    format!("must be a finite positive number, got {value}"),
                ));
            }
        }
        Ok(Self { position_scale, color_scale })
    }

    pub fn position_scale(&self) -> f32 {
        self.position_scale
    }

    pub fn color_scale(&self) -> f32 {
        self.color_scale
    }

    /// Serialize a frame.
    ///
    /// Fails only when the point count does not fit the i32 header.
    pub fn encode(&self, frame: &PointCloudFrame) -> Result<EncodedFrame> {
        let count = i32::try_from(frame.len()).map_err(|_| {
            StreamError::invalid_input(format!(
                "{} points exceed the i32 count header",
                frame.len()
            ))
        })?;
        let total = encoded_len(frame.len()).ok_or_else(|| {
            StreamError::invalid_input(format!("{} points overflow the frame size", frame.len()))
        })?;

        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(&count.to_le_bytes());

        let mut clamped = 0usize;
        for point in frame.iter() {
            for axis in point.position.to_array() {
                let (q, was_clamped) = quantize_position(axis, self.position_scale);
                clamped += was_clamped as usize;
                bytes.extend_from_slice(&q.to_le_bytes());
            }
        }
        for point in frame.iter() {
            let c = point.color;
            bytes.extend_from_slice(&[
                quantize_color(c.r, self.color_scale),
                quantize_color(c.g, self.color_scale),
                quantize_color(c.b, self.color_scale),
            ]);
        }

        if clamped > 0 {
            debug!(clamped, "Position components saturated during quantization");
        }
        trace!(points = frame.len(), bytes = bytes.len(), "Encoded frame");

        Ok(EncodedFrame::from_bytes(bytes))
    }

    /// Deserialize a frame, rejecting any buffer whose length disagrees with its count.
    pub fn decode(&self, bytes: &[u8]) -> Result<PointCloudFrame> {
        let count = parse_count(bytes)?;
        let expected = encoded_len(count).ok_or_else(|| {
            StreamError::decode_error(
                "Frame length validation",
                format!("Point count {} overflows the frame size", count),
            )
        })?;

        if bytes.len() != expected {
            return Err(StreamError::decode_error(
                "Frame length validation",
                format!(
                    "Expected {} bytes for {} points, got {}",
                    expected,
                    count,
                    bytes.len()
                ),
            ));
        }

        let positions = &bytes[COUNT_SIZE..COUNT_SIZE + count * POSITION_STRIDE];
        let colors = &bytes[COUNT_SIZE + count * POSITION_STRIDE..];

        let points = positions
            .chunks_exact(POSITION_STRIDE)
            .zip(colors.chunks_exact(COLOR_STRIDE))
            .map(|(p, c)| {
                let axis = |i: usize| {
                    dequantize_position(i16::from_le_bytes([p[i], p[i + 1]]), self.position_scale)
                };
                Point::new(
                    Vec3::new(axis(0), axis(2), axis(4)),
                    Color::rgb(
                        dequantize_color(c[0], self.color_scale),
                        dequantize_color(c[1], self.color_scale),
                        dequantize_color(c[2], self.color_scale),
                    ),
                )
            })
            .collect();

        trace!(points = count, bytes = bytes.len(), "Decoded frame");
        Ok(PointCloudFrame::new(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_four_zero_bytes() {
        let codec = FrameCodec::default();
        let encoded = codec.encode(&PointCloudFrame::empty()).unwrap();
        assert_eq!(encoded.as_bytes(), &[0, 0, 0, 0]);
        assert!(codec.decode(encoded.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn layout_matches_wire_format() {
        let frame = PointCloudFrame::new(vec![
            Point::new(Vec3::new(1.0, -0.5, 0.001), Color::rgb(1.0, 0.0, 0.5)),
            Point::new(Vec3::new(0.0, 2.0, -3.0), Color::rgb(0.0, 1.0, 0.0)),
        ]);
        let bytes = FrameCodec::default().encode(&frame).unwrap().into_bytes();

        assert_eq!(bytes.len(), 4 + 2 * 9);
        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        assert_eq!(&bytes[4..6], &1000i16.to_le_bytes());
        assert_eq!(&bytes[6..8], &(-500i16).to_le_bytes());
        assert_eq!(&bytes[8..10], &1i16.to_le_bytes());
        assert_eq!(&bytes[10..12], &0i16.to_le_bytes());
        assert_eq!(&bytes[12..14], &2000i16.to_le_bytes());
        assert_eq!(&bytes[14..16], &(-3000i16).to_le_bytes());
        assert_eq!(&bytes[16..22], &[255, 0, 128, 0, 255, 0]);
    }

    #[test]
    fn decodes_bytes_built_by_hand() {
        let mut bytes = 1i32.to_le_bytes().to_vec();
        for v in [250i16, -1000, 32767] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 51, 255]);

        let frame = FrameCodec::default().decode(&bytes).unwrap();
        let p = frame.points()[0];
        assert_eq!(p.position, Vec3::new(0.25, -1.0, 32.767));
        assert_eq!(p.color, Color::rgba(0.0, 0.2, 1.0, 1.0));
    }

    #[test]
    fn rejects_negative_count() {
        let bytes = (-1i32).to_le_bytes();
        let err = FrameCodec::default().decode(&bytes).unwrap_err();
        assert!(matches!(err, StreamError::Decode { .. }));
    }

    #[test]
    fn rejects_short_and_overlong_buffers() {
        let codec = FrameCodec::default();
        let frame = PointCloudFrame::new(vec![Point::default(); 3]);
        let bytes = codec.encode(&frame).unwrap().into_bytes();

        assert!(codec.decode(&bytes[..bytes.len() - 1]).is_err());
        let mut long = bytes.clone();
        long.push(0);
        assert!(codec.decode(&long).is_err());
        assert!(codec.decode(&bytes[..2]).is_err());
        assert!(codec.decode(&[]).is_err());
    }

    #[test]
    fn huge_declared_count_is_rejected_without_allocating() {
        let bytes = i32::MAX.to_le_bytes();
        assert!(FrameCodec::default().decode(&bytes).is_err());
    }

    #[test]
    fn out_of_range_positions_saturate() {
        let codec = FrameCodec::default();
        let frame = PointCloudFrame::new(vec![Point::new(
            Vec3::new(100.0, -100.0, 0.0),
            Color::rgb(2.0, -1.0, 0.5),
        )]);
        let decoded = codec.decode(codec.encode(&frame).unwrap().as_bytes()).unwrap();
        let p = decoded.points()[0];
        assert_eq!(p.position.x, 32.767);
        assert_eq!(p.position.y, -32.768);
        assert_eq!(p.color.r, 1.0);
        assert_eq!(p.color.g, 0.0);
    }

    #[test]
    fn custom_scales_are_honoured() {
        let codec = FrameCodec::new(100.0, 255.0).unwrap();
        let frame = PointCloudFrame::new(vec![Point::new(Vec3::splat(300.0), Color::BLACK)]);
        let decoded = codec.decode(codec.encode(&frame).unwrap().as_bytes()).unwrap();
        assert_eq!(decoded.points()[0].position, Vec3::splat(300.0));
    }

    #[test]
    fn rejects_invalid_scales() {
        assert!(FrameCodec::new(0.0, 255.0).is_err());
        assert!(FrameCodec::new(1000.0, -1.0).is_err());
        assert!(FrameCodec::new(f32::NAN, 255.0).is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn point_strategy() -> impl Strategy<Value = Point> {
            (
                -32.767f32..=32.767,
                -32.767f32..=32.767,
                -32.767f32..=32.767,
                0.0f32..=1.0,
                0.0f32..=1.0,
                0.0f32..=1.0,
            )
                .prop_map(|(x, y, z, r, g, b)| Point::new(Vec3::new(x, y, z), Color::rgb(r, g, b)))
        }

        proptest! {
          #[test]
          fn round_trip_stays_within_quantization_error(
            points in prop::collection::vec(point_strategy(), 0..200)
          ) {
            let codec = FrameCodec::default();
            let frame = PointCloudFrame::new(points);
            let encoded = codec.encode(&frame).unwrap();
            prop_assert_eq!(encoded.len(), 4 + 9 * frame.len());

            let decoded = codec.decode(encoded.as_bytes()).unwrap();
            prop_assert_eq!(decoded.len(), frame.len());

            // Half a quantization step plus f32 representation error near |32|
            for (a, b) in frame.iter().zip(decoded.iter()) {
              let delta = (a.position - b.position).abs();
              prop_assert!(delta.max_element() <= 0.0005 + 1e-5, "{:?} vs {:?}", a, b);
              prop_assert!((a.color.r - b.color.r).abs() <= 0.002);
              prop_assert!((a.color.g - b.color.g).abs() <= 0.002);
              prop_assert!((a.color.b - b.color.b).abs() <= 0.002);
              prop_assert_eq!(b.color.a, 1.0);
            }
          }

          #[test]
          fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = FrameCodec::default().decode(&bytes);
          }
        }
    }
}
