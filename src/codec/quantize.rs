//! Scale-and-round quantization helpers
//!
//! Positions outside the i16 range saturate at the nearest bound instead of wrapping.
//! NaN quantizes to zero (Rust's float-to-int `as` cast semantics).

/// `round(value * scale)`, saturated to `i16`. Returns the value and whether it was clamped.
pub fn quantize_position(value: f32, scale: f32) -> (i16, bool) {
    let scaled = (value as f64 * scale as f64).round();
    let clamped = scaled < i16::MIN as f64 || scaled > i16::MAX as f64;
    (scaled as i16, clamped)
}

pub fn dequantize_position(value: i16, scale: f32) -> f32 {
    (value as f64 / scale as f64) as f32
}

/// `round(channel * scale)`, saturated to `u8`.
pub fn quantize_color(channel: f32, scale: f32) -> u8 {
    (channel as f64 * scale as f64).round() as u8
}

pub fn dequantize_color(value: u8, scale: f32) -> f32 {
    (value as f64 / scale as f64) as f32
}
