//! Record-level interpolation.
//!
//! Each module's calibration record implements [`FieldInterpolate::blend`]
//! for the open interval `(0, 1)`. [`interpolate`] wraps it with the boundary
//! policy every module shares:
//!
//! ```text
//!  record a          blend            record b
//! ---------- | ------------------- | ----------
//! ratio = 0 ..... 0 < ratio < 1 ..... ratio = 1
//! ```
//!
//! Boundary ratios return a copy of the selected input so repeated merges
//! never accumulate rounding drift.

use iq_math::feq;

use crate::error::TuningError;

/// Per-field interpolation between two calibration records.
pub trait FieldInterpolate: Clone {
    /// Blend `a` towards `b` with `ratio` strictly inside `(0, 1)`.
    ///
    /// Float fields interpolate linearly, integer-valued fields round to the
    /// nearest whole number, and flag or enum fields copy `a`.
    fn blend(a: &Self, b: &Self, ratio: f32) -> Self;
}

/// Interpolate two records, applying the shared boundary policy.
///
/// # Returns
/// * `Ok(record)` - Copy of `a` when both inputs are the same record or the
///   ratio is 0, copy of `b` when the ratio is 1, otherwise the blend
/// * `Err(TuningError::RatioOutOfRange)` - Ratio outside `[0, 1]` or NaN
pub fn interpolate<R: FieldInterpolate>(a: &R, b: &R, ratio: f32) -> Result<R, TuningError> {
    if std::ptr::eq(a, b) {
        Ok(a.clone())
    } else if ratio > 0.0 && ratio < 1.0 {
        Ok(R::blend(a, b, ratio))
    } else if feq(ratio, 0.0) {
        Ok(a.clone())
    } else if feq(ratio, 1.0) {
        Ok(b.clone())
    } else {
        Err(TuningError::RatioOutOfRange(ratio))
    }
}
