//! Fixed-point conversion for hardware register fields.
//!
//! Every register field has a declared bit width and a legal `[min, max]`
//! interval. Calibration values are floats, so packing a field is: optional
//! Q-number scaling, round to nearest, clamp into the interval. Values out of
//! range saturate at the interval edge and never wrap. NaN packs to the
//! interval minimum.

use serde::{Deserialize, Serialize};

/// Denominators smaller than this trigger the reciprocal fallback.
pub const RECIPROCAL_EPSILON: f32 = 1e-6;

/// Legal integer interval of a register field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRange {
    pub min: i64,
    pub max: i64,
}

impl FieldRange {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Full range of an unsigned field of `bits` width.
    pub const fn unsigned(bits: u32) -> Self {
        Self {
            min: 0,
            max: (1_i64 << bits) - 1,
        }
    }

    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }
}

pub const UINT1: FieldRange = FieldRange::unsigned(1);
pub const UINT2: FieldRange = FieldRange::unsigned(2);
pub const UINT4: FieldRange = FieldRange::unsigned(4);
pub const UINT7: FieldRange = FieldRange::unsigned(7);
pub const UINT9: FieldRange = FieldRange::unsigned(9);
pub const UINT12: FieldRange = FieldRange::unsigned(12);
pub const UINT13: FieldRange = FieldRange::unsigned(13);
pub const UINT14: FieldRange = FieldRange::unsigned(14);
pub const UINT15: FieldRange = FieldRange::unsigned(15);
pub const UINT17: FieldRange = FieldRange::unsigned(17);

/// Scale `value` into Q`q` fixed point and round.
pub fn q_number(value: f32, q: u32) -> i64 {
    round_to_i64(value * (1_u32 << q) as f32)
}

/// Round and clamp an unsigned field.
pub fn quantize(value: f32, range: FieldRange) -> u32 {
    debug_assert!(range.min >= 0);
    range.clamp(round_to_i64(value)) as u32
}

/// Q`q` encode, round, and clamp an unsigned field.
pub fn quantize_q(value: f32, q: u32, range: FieldRange) -> u32 {
    debug_assert!(range.min >= 0);
    range.clamp(q_number(value, q)) as u32
}

/// `round(2^q / value)` clamped to `range`.
///
/// A (near-)zero or non-finite denominator yields `range.max`, the value the
/// hardware expects for an unbounded reciprocal.
pub fn reciprocal_q(value: f32, q: u32, range: FieldRange) -> u32 {
    if !value.is_finite() || value.abs() < RECIPROCAL_EPSILON {
        return range.max as u32;
    }
    quantize((1_u32 << q) as f32 / value, range)
}

/// `round(2^q * numerator / denominator)` clamped to `range`, with the
/// same `range.max` fallback as [`reciprocal_q`] for a vanishing denominator.
pub fn ratio_q(numerator: f32, denominator: f32, q: u32, range: FieldRange) -> u32 {
    if !denominator.is_finite() || denominator.abs() < RECIPROCAL_EPSILON {
        return range.max as u32;
    }
    quantize_q(numerator / denominator, q, range)
}

/// `ceil(log2(value))` clamped to `range`; non-positive input yields `range.min`.
pub fn log2_ceil(value: i64, range: FieldRange) -> u32 {
    if value <= 0 {
        return range.min.max(0) as u32;
    }
    let bits = 64 - (value - 1).leading_zeros() as i64;
    range.clamp(bits) as u32
}

fn round_to_i64(value: f32) -> i64 {
    // NaN sinks to the bottom of any range; `as` saturates everything else
    if value.is_nan() {
        i64::MIN
    } else {
        value.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_ranges() {
        assert_eq!(UINT12, FieldRange::new(0, 4095));
        assert_eq!(UINT14.max, 16383);
        assert_eq!(UINT1, FieldRange::new(0, 1));
    }

    #[test]
    fn test_quantize_rounds_to_nearest() {
        assert_eq!(quantize(10.4, UINT12), 10);
        assert_eq!(quantize(10.5, UINT12), 11);
        assert_eq!(quantize(-0.4, UINT12), 0);
    }

    #[test]
    fn test_quantize_clamps_instead_of_wrapping() {
        assert_eq!(quantize(5000.0, UINT12), 4095);
        assert_eq!(quantize(-7.0, UINT12), 0);
        assert_eq!(quantize(f32::INFINITY, UINT9), 511);
    }

    #[test]
    fn test_nan_packs_to_minimum() {
        assert_eq!(quantize(f32::NAN, UINT12), 0);
    }

    #[test]
    fn test_q_number() {
        assert_eq!(q_number(1.0, 12), 4096);
        assert_eq!(q_number(1.5, 10), 1536);
        assert_eq!(quantize_q(2.0, 12, UINT13), 8191);
    }

    #[test]
    fn test_reciprocal_fallback() {
        assert_eq!(reciprocal_q(4.0, 8, UINT9), 64);
        assert_eq!(reciprocal_q(0.0, 8, UINT9), 511);
        assert_eq!(reciprocal_q(1e-9, 12, UINT13), 8191);
        assert_eq!(reciprocal_q(f32::NAN, 12, UINT13), 8191);
    }

    #[test]
    fn test_ratio_q() {
        assert_eq!(ratio_q(2.0, 1.0, 12, UINT17), 8192);
        assert_eq!(ratio_q(1.0, 2.0, 12, UINT17), 2048);
        assert_eq!(ratio_q(1.0, 0.0, 12, UINT17), 131_071);
        assert_eq!(ratio_q(100.0, 1.0, 12, UINT17), 131_071);
    }

    #[test]
    fn test_log2_ceil() {
        assert_eq!(log2_ceil(1, UINT4), 0);
        assert_eq!(log2_ceil(2, UINT4), 1);
        assert_eq!(log2_ceil(1000, UINT4), 10);
        assert_eq!(log2_ceil(1024, UINT4), 10);
        assert_eq!(log2_ceil(0, UINT4), 0);
        assert_eq!(log2_ceil(-5, UINT4), 0);
        assert_eq!(log2_ceil(1 << 20, UINT4), 15);
    }
}
