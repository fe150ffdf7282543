//! Scalar interpolation helpers shared by every calibration record.

/// Tolerance used for float equality on trigger values and ratios.
pub const FLOAT_EPSILON: f32 = 1e-9;

/// Float equality within [`FLOAT_EPSILON`].
pub fn feq(a: f32, b: f32) -> bool {
    (a - b).abs() < FLOAT_EPSILON
}

/// Linear interpolation `a * (1 - ratio) + b * ratio`.
///
/// Written as `a + (b - a) * ratio` so that `ratio == 0` returns `a` exactly;
/// the result always lies between `a` and `b` for `ratio` in `[0, 1]`.
pub fn lerp(a: f32, b: f32, ratio: f32) -> f32 {
    if ratio >= 1.0 {
        return b;
    }
    let value = a + (b - a) * ratio;
    // Guard the bound against float rounding at ratios close to 1
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    value.clamp(lo, hi)
}

/// Interpolate an integer-valued calibration field and round to the nearest
/// whole number.
pub fn lerp_rounded(a: f32, b: f32, ratio: f32) -> f32 {
    lerp(a, b, ratio).round()
}

/// Element-wise [`lerp`] over fixed-length tables.
pub fn lerp_table<const N: usize>(a: &[f32; N], b: &[f32; N], ratio: f32) -> [f32; N] {
    std::array::from_fn(|i| lerp(a[i], b[i], ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lerp_endpoints_exact() {
        assert_eq!(lerp(0.1, 0.7, 0.0), 0.1);
        assert_eq!(lerp(0.1, 0.7, 1.0), 0.7);
    }

    #[test]
    fn test_lerp_midpoint() {
        assert_relative_eq!(lerp(10.0, 20.0, 0.5), 15.0);
        assert_relative_eq!(lerp(20.0, 10.0, 0.25), 17.5);
    }

    #[test]
    fn test_lerp_stays_between_inputs() {
        let (a, b) = (1234.567_f32, -98.25_f32);
        for step in 1..100 {
            let v = lerp(a, b, step as f32 / 100.0);
            assert!(v <= a && v >= b);
        }
    }

    #[test]
    fn test_lerp_rounded() {
        assert_eq!(lerp_rounded(1.0, 4.0, 0.5), 3.0);
        assert_eq!(lerp_rounded(1.0, 4.0, 0.1), 1.0);
    }

    #[test]
    fn test_lerp_table() {
        let out = lerp_table(&[0.0, 10.0, 20.0], &[10.0, 10.0, 0.0], 0.5);
        assert_eq!(out, [5.0, 10.0, 10.0]);
    }

    #[test]
    fn test_feq() {
        assert!(feq(0.5, 0.5));
        assert!(!feq(0.5, 0.500_1));
    }
}
