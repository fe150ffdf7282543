//! iq-math - numeric primitives for ISP calibration interpolation
//!
//! - **Region** - trigger region lookup with bracketing ratios
//! - **Lerp** - float interpolation and epsilon comparison
//! - **Quantize** - Q-number encoding, rounding and clamping for register fields

pub mod lerp;
pub mod quantize;
pub mod region;

pub use lerp::{feq, lerp, lerp_rounded, lerp_table, FLOAT_EPSILON};
pub use quantize::{log2_ceil, q_number, quantize, quantize_q, ratio_q, reciprocal_q, FieldRange};
pub use region::{interpolation_ratio, locate, LocateError, LocateResult, Region, MAX_NUM_REGION};
