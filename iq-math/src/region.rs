//! Trigger region lookup.
//!
//! A calibration level stores an ordered list of trigger regions, each a
//! closed `[start, end]` range mapped to the record at the same index. Given
//! the live trigger value, [`locate`] finds the region the value falls in, or
//! the pair of neighbouring regions it sits between together with the
//! fractional position used as an interpolation weight.
//!
//! # Semantics
//!
//! - A value inside a region (boundaries included) selects that region alone.
//! - A value before the first region selects the first region.
//! - A value past the last region selects the last region.
//! - A value in the gap between two regions selects both, with the ratio
//!   running from 0 at the left region's end to 1 at the right region's start.
//! - When two regions touch or overlap there is no gap, so the transition runs
//!   from the left region's end to the right region's end instead.
//!
//! # Example
//!
//! ```
//! use iq_math::region::{locate, Region};
//!
//! let regions = [Region::new(0.0, 50.0), Region::new(100.0, 150.0)];
//! let hit = locate(&regions, 75.0).unwrap();
//! assert_eq!((hit.start_index, hit.end_index), (0, 1));
//! assert!((hit.ratio - 0.5).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest number of regions a single calibration level may hold.
pub const MAX_NUM_REGION: usize = 20;

/// Errors raised by region lookup
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocateError {
    #[error("Region table is empty")]
    NoRegions,
    #[error("Region table holds {count} regions, limit is {limit}")]
    TooManyRegions { count: usize, limit: usize },
}

/// A closed trigger range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub start: f32,
    pub end: f32,
}

impl Region {
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }
}

/// Outcome of a region lookup.
///
/// `start_index == end_index` with `ratio == 0` means a single region was
/// selected. Otherwise `ratio` lies in `(0, 1)` and weights the record at
/// `end_index`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocateResult {
    pub start_index: usize,
    pub end_index: usize,
    pub ratio: f32,
}

impl LocateResult {
    /// Select a single region with no blending.
    pub const fn single(index: usize) -> Self {
        Self {
            start_index: index,
            end_index: index,
            ratio: 0.0,
        }
    }

    /// True when the lookup straddles two regions.
    pub fn is_blend(&self) -> bool {
        self.start_index != self.end_index
    }

    fn clamped(self, count: usize) -> Self {
        let last = count.saturating_sub(1);
        Self {
            start_index: self.start_index.min(last),
            end_index: self.end_index.min(last),
            ratio: self.ratio,
        }
    }
}

/// Fractional position of `value` inside `[start, end]`, saturated to `[0, 1]`.
///
/// Returns 0 at or below `start` and 1 at or above `end`, so a degenerate
/// range never divides by zero.
pub fn interpolation_ratio(value: f32, start: f32, end: f32) -> f32 {
    if value <= start {
        0.0
    } else if value >= end {
        1.0
    } else {
        (value - start) / (end - start)
    }
}

/// Find the region (or bracketing pair of regions) for `value`.
///
/// # Arguments
/// * `regions` - Sorted, non-overlapping trigger regions for one level
/// * `value` - Live trigger value on that level's axis
///
/// # Returns
/// * `Ok(LocateResult)` - Indices clamped to `[0, regions.len() - 1]`
/// * `Err(LocateError)` - Empty table or more than [`MAX_NUM_REGION`] entries
pub fn locate(regions: &[Region], value: f32) -> Result<LocateResult, LocateError> {
    if regions.is_empty() {
        return Err(LocateError::NoRegions);
    }
    if regions.len() > MAX_NUM_REGION {
        return Err(LocateError::TooManyRegions {
            count: regions.len(),
            limit: MAX_NUM_REGION,
        });
    }

    let last = regions.len() - 1;
    for (i, pair) in regions.windows(2).enumerate() {
        let (left, right) = (pair[0], pair[1]);
        if value <= left.end {
            return Ok(LocateResult::single(i));
        }

        // Gap between the regions: blend across it. Touching regions have
        // no gap, so the right region itself carries the transition.
        let transition_end = if right.start > left.end {
            right.start
        } else {
            right.end
        };
        if value < transition_end {
            let result = LocateResult {
                start_index: i,
                end_index: i + 1,
                ratio: interpolation_ratio(value, left.end, transition_end),
            };
            return Ok(result.clamped(regions.len()));
        }
    }

    Ok(LocateResult::single(last))
}
