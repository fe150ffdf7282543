//! Hardware block instantiations of the calibration-tree engine.
//!
//! - [`hdr`] - highlight/shadow merge of the long and short HDR exposures
//! - [`pdpc`] - bad pixel and phase-detection pixel correction
//! - [`bls`] - black level subtraction
//!
//! Each module supplies its dataset layout, a per-level search enum, the
//! record interpolator and the register packer. The zone and region types
//! below are shared by the levels the modules have in common.

pub mod bls;
pub mod hdr;
pub mod pdpc;

use iq_math::{LocateError, Region, MAX_NUM_REGION};
use serde::{Deserialize, Serialize};

use crate::error::TuningError;
use crate::trigger::{AecControl, HdrAecControl, TriggerSet};
use crate::tree::{locate_at, Expansion};

/// A hardware block driven by the calibration engine.
pub trait IqModule {
    /// Short name used in logs
    const NAME: &'static str;

    /// Everything the module reads per frame; compared by the change detector
    type Input: TriggerSet;

    /// Packed register settings handed to command emission
    type Registers: Clone + Serialize;

    /// Build, merge and pack the register record for one frame.
    fn calculate(&mut self, input: &Self::Input) -> Result<Self::Registers, TuningError>;
}

/// One entry of a calibration sub-table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone<R, T> {
    pub region: R,
    pub data: T,
}

impl<R, T> Zone<R, T> {
    pub fn new(region: R, data: T) -> Self {
        Self { region, data }
    }
}

/// Region bounds of an HDR-AEC zone, one pair per control method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HdrAecRegion {
    pub exposure_time: Region,
    pub sensitivity: Region,
    pub exposure_gain: Region,
}

impl HdrAecRegion {
    /// Same bounds for every control method.
    pub fn uniform(region: Region) -> Self {
        Self {
            exposure_time: region,
            sensitivity: region,
            exposure_gain: region,
        }
    }

    pub fn select(&self, control: HdrAecControl) -> Region {
        match control {
            HdrAecControl::ExposureTimeRatio => self.exposure_time,
            HdrAecControl::SensitivityRatio => self.sensitivity,
            HdrAecControl::ExposureGainRatio => self.exposure_gain,
        }
    }
}

/// Region bounds of an AEC zone, one pair per control method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AecRegion {
    pub lux_index: Region,
    pub gain: Region,
}

impl AecRegion {
    pub fn new(lux_index: Region, gain: Region) -> Self {
        Self { lux_index, gain }
    }

    pub fn select(&self, control: AecControl) -> Region {
        match control {
            AecControl::LuxIndex => self.lux_index,
            AecControl::Gain => self.gain,
        }
    }
}

/// Locate `value` among `zones` and expand to the selected zone data.
///
/// `region_of` picks the bounds of each zone on the active axis. Region
/// bounds are gathered on the stack, so a lookup never allocates.
pub(crate) fn bracket<'a, R, T>(
    level: usize,
    zones: &'a [Zone<R, T>],
    value: f32,
    region_of: impl Fn(&R) -> Region,
) -> Result<Expansion<&'a T>, TuningError> {
    if zones.len() > MAX_NUM_REGION {
        return Err(TuningError::Locate {
            level,
            source: LocateError::TooManyRegions {
                count: zones.len(),
                limit: MAX_NUM_REGION,
            },
        });
    }

    let mut regions = [Region::new(0.0, 0.0); MAX_NUM_REGION];
    for (slot, zone) in regions.iter_mut().zip(zones) {
        *slot = region_of(&zone.region);
    }
    let hit = locate_at(level, &regions[..zones.len()], value)?;
    Ok(Expansion::from_locate(hit, |i| &zones[i].data))
}

/// White balance gains applied by the preceding stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhiteBalanceGains {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for WhiteBalanceGains {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        }
    }
}

impl WhiteBalanceGains {
    fn as_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// Which exposure the first red/blue row of a zigzag HDR sensor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZzHdrFirstExposure {
    #[default]
    Long,
    Short,
}

impl ZzHdrFirstExposure {
    /// Register encoding: 1 for a short first exposure.
    pub fn bit(self) -> u32 {
        match self {
            ZzHdrFirstExposure::Long => 0,
            ZzHdrFirstExposure::Short => 1,
        }
    }
}
