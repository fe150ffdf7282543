//! Runtime trigger signals and the per-module change detector.
//!
//! The auto-exposure and white-balance collaborators publish a
//! [`TriggerSnapshot`] every frame. Which signal drives a given calibration
//! level is chosen by the control methods stored alongside the calibration
//! data. [`ChangeDetector`] caches the last snapshot a module consumed so
//! unchanged frames can reuse the previous register record.
//! [`DynamicEnable`] switches a block on or off from a trigger with a
//! hysteresis band.

use iq_math::{feq, Region};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trigger signals sampled for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    /// AEC lux index
    pub lux_index: f32,
    /// AEC real (analog x digital) gain
    pub real_gain: f32,
    /// AEC sensitivity (gain x exposure time)
    pub aec_sensitivity: f32,
    /// Exposure time ratio between the long and short HDR exposures
    pub exposure_time: f32,
    /// Gain ratio between the long and short HDR exposures
    pub exposure_gain_ratio: f32,
    /// Correlated color temperature in kelvin
    pub color_temperature: f32,
    /// Dynamic range compression gain
    pub drc_gain: f32,
    /// Auxiliary light (LED flash) sensitivity
    pub led_sensitivity: f32,
    /// Mix ratio of the first LED when two LEDs fire
    pub led_first_entry_ratio: f32,
    /// Number of LEDs firing this frame
    pub led_count: u32,
}

/// Signal that drives the HDR-AEC calibration level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HdrAecControl {
    #[default]
    ExposureTimeRatio,
    SensitivityRatio,
    ExposureGainRatio,
}

/// Signal that drives the AEC calibration level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AecControl {
    #[default]
    LuxIndex,
    Gain,
}

/// Control methods carried by a calibration dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlMethod {
    pub hdr_aec: HdrAecControl,
    pub aec: AecControl,
}

/// HDR-AEC trigger value together with the method that produced it; the
/// method also picks the region bounds compared against the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HdrAecAxis {
    pub value: f32,
    pub control: HdrAecControl,
}

/// AEC trigger value together with the method that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AecAxis {
    pub value: f32,
    pub control: AecControl,
}

/// Signal compared against a [`DynamicEnable`] band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DynamicEnableControl {
    #[default]
    LuxIndex,
    Gain,
    DrcGain,
    ExposureTimeRatio,
    SensitivityRatio,
    ColorTemperature,
}

/// Which side of the band turns the block on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HysteresisMode {
    /// On at or above `trigger.end`, off below `trigger.start`
    #[default]
    Upward,
    /// Off above `trigger.end`, on at or below `trigger.start`
    Downward,
}

/// Trigger-driven on/off switch.
///
/// Values inside the band keep whatever state the previous frame left, so a
/// trigger hovering near one edge does not toggle the block every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicEnable {
    /// When false the switch is bypassed and always reports on
    pub enable: bool,
    pub control: DynamicEnableControl,
    /// Hysteresis band in the units of `control`
    pub trigger: Region,
    pub mode: HysteresisMode,
}

impl Default for DynamicEnable {
    fn default() -> Self {
        Self {
            enable: false,
            control: DynamicEnableControl::default(),
            trigger: Region::new(0.0, 0.0),
            mode: HysteresisMode::default(),
        }
    }
}

impl DynamicEnable {
    /// State for this frame given the state the last evaluation returned.
    pub fn evaluate(&self, snapshot: &TriggerSnapshot, previous: bool) -> bool {
        if !self.enable {
            return true;
        }
        let value = snapshot.dynamic_trigger(self.control);
        let Region { start, end } = self.trigger;
        match self.mode {
            HysteresisMode::Upward if value >= end => true,
            HysteresisMode::Upward if value < start => false,
            HysteresisMode::Downward if value > end => false,
            HysteresisMode::Downward if value <= start => true,
            _ => previous,
        }
    }
}

impl TriggerSnapshot {
    pub fn hdr_aec_axis(&self, control: HdrAecControl) -> HdrAecAxis {
        HdrAecAxis {
            value: self.hdr_aec_trigger(control),
            control,
        }
    }

    pub fn aec_axis(&self, control: AecControl) -> AecAxis {
        AecAxis {
            value: self.aec_trigger(control),
            control,
        }
    }

    /// Value on the HDR-AEC axis selected by `control`.
    pub fn hdr_aec_trigger(&self, control: HdrAecControl) -> f32 {
        match control {
            HdrAecControl::ExposureTimeRatio => self.exposure_time,
            HdrAecControl::SensitivityRatio => self.aec_sensitivity,
            HdrAecControl::ExposureGainRatio => self.exposure_gain_ratio,
        }
    }

    /// Value on the AEC axis selected by `control`.
    pub fn aec_trigger(&self, control: AecControl) -> f32 {
        match control {
            AecControl::LuxIndex => self.lux_index,
            AecControl::Gain => self.real_gain,
        }
    }

    /// Value compared against a dynamic enable band.
    pub fn dynamic_trigger(&self, control: DynamicEnableControl) -> f32 {
        match control {
            DynamicEnableControl::LuxIndex => self.lux_index,
            DynamicEnableControl::Gain => self.real_gain,
            DynamicEnableControl::DrcGain => self.drc_gain,
            DynamicEnableControl::ExposureTimeRatio => self.exposure_time,
            DynamicEnableControl::SensitivityRatio => self.aec_sensitivity,
            DynamicEnableControl::ColorTemperature => self.color_temperature,
        }
    }

    fn float_fields(&self) -> [f32; 9] {
        [
            self.lux_index,
            self.real_gain,
            self.aec_sensitivity,
            self.exposure_time,
            self.exposure_gain_ratio,
            self.color_temperature,
            self.drc_gain,
            self.led_sensitivity,
            self.led_first_entry_ratio,
        ]
    }
}

/// True when any pair of floats differs by more than the shared epsilon.
pub fn floats_differ(current: &[f32], cached: &[f32]) -> bool {
    current.len() != cached.len() || current.iter().zip(cached).any(|(a, b)| !feq(*a, *b))
}

/// A set of trigger inputs a module tracks between frames.
pub trait TriggerSet: Clone {
    /// True when recomputation is needed to follow `self` after `cached`.
    fn differs_from(&self, cached: &Self) -> bool;
}

impl TriggerSet for TriggerSnapshot {
    fn differs_from(&self, cached: &Self) -> bool {
        floats_differ(&self.float_fields(), &cached.float_fields())
            || self.led_count != cached.led_count
    }
}

/// Last-seen trigger cache for one module instance.
///
/// Owned by the single call site that runs the module for a camera session;
/// `update` takes `&mut self`, so the cache has exactly one writer.
#[derive(Debug, Clone)]
pub struct ChangeDetector<T> {
    last: Option<T>,
}

impl<T> Default for ChangeDetector<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: TriggerSet> ChangeDetector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `current` against the cache.
    ///
    /// Returns true (and overwrites the cache) on the first frame or when any
    /// tracked field moved; returns false otherwise.
    pub fn update(&mut self, current: &T) -> bool {
        let changed = match &self.last {
            Some(cached) => current.differs_from(cached),
            None => true,
        };
        if changed {
            debug!("Trigger inputs changed, cache refreshed");
            self.last = Some(current.clone());
        }
        changed
    }

    /// Forget the cached inputs so the next frame recomputes.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// Inputs the cache currently holds.
    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TriggerSnapshot {
        TriggerSnapshot {
            lux_index: 250.0,
            real_gain: 2.0,
            aec_sensitivity: 0.066,
            exposure_time: 4.0,
            exposure_gain_ratio: 4.0,
            color_temperature: 5000.0,
            drc_gain: 1.5,
            led_sensitivity: 0.0,
            led_first_entry_ratio: 0.0,
            led_count: 0,
        }
    }

    #[test]
    fn test_first_frame_is_changed() {
        let mut detector = ChangeDetector::new();
        assert!(detector.update(&snapshot()));
        assert_eq!(detector.last(), Some(&snapshot()));
    }

    #[test]
    fn test_identical_snapshot_unchanged() {
        let mut detector = ChangeDetector::new();
        detector.update(&snapshot());
        assert!(!detector.update(&snapshot()));
    }

    #[test]
    fn test_each_tracked_field_triggers_change() {
        let edits: [fn(&mut TriggerSnapshot); 10] = [
            |s| s.lux_index += 1.0,
            |s| s.real_gain += 0.01,
            |s| s.aec_sensitivity += 0.001,
            |s| s.exposure_time += 0.5,
            |s| s.exposure_gain_ratio += 0.5,
            |s| s.color_temperature += 10.0,
            |s| s.drc_gain += 0.1,
            |s| s.led_sensitivity += 1.0,
            |s| s.led_first_entry_ratio += 0.25,
            |s| s.led_count = 2,
        ];
        for (i, edit) in edits.iter().enumerate() {
            let mut detector = ChangeDetector::new();
            detector.update(&snapshot());
            let mut moved = snapshot();
            edit(&mut moved);
            assert!(detector.update(&moved), "edit {i} not detected");
            assert!(!detector.update(&moved), "edit {i} not cached");
        }
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let mut detector = ChangeDetector::new();
        detector.update(&snapshot());
        detector.invalidate();
        assert!(detector.update(&snapshot()));
    }

    #[test]
    fn test_axis_selection() {
        let s = snapshot();
        assert_eq!(s.hdr_aec_trigger(HdrAecControl::ExposureTimeRatio), 4.0);
        assert_eq!(s.hdr_aec_trigger(HdrAecControl::SensitivityRatio), 0.066);
        assert_eq!(s.aec_trigger(AecControl::LuxIndex), 250.0);
        assert_eq!(s.aec_trigger(AecControl::Gain), 2.0);
        assert_eq!(s.dynamic_trigger(DynamicEnableControl::DrcGain), 1.5);
        assert_eq!(s.dynamic_trigger(DynamicEnableControl::ColorTemperature), 5000.0);
    }

    fn gain_switch(mode: HysteresisMode) -> DynamicEnable {
        DynamicEnable {
            enable: true,
            control: DynamicEnableControl::Gain,
            trigger: Region::new(2.0, 4.0),
            mode,
        }
    }

    fn at_gain(real_gain: f32) -> TriggerSnapshot {
        TriggerSnapshot {
            real_gain,
            ..snapshot()
        }
    }

    /// Feed `gains` through the switch frame by frame, starting from on.
    fn sweep(switch: &DynamicEnable, gains: &[f32]) -> Vec<bool> {
        let mut state = true;
        gains
            .iter()
            .map(|&gain| {
                state = switch.evaluate(&at_gain(gain), state);
                state
            })
            .collect()
    }

    #[test]
    fn test_upward_hysteresis() {
        let switch = gain_switch(HysteresisMode::Upward);
        // Inside the band the first frame keeps the initial on state
        assert_eq!(
            sweep(&switch, &[3.0, 1.9, 3.0, 3.9, 4.0, 3.0, 2.0, 1.0]),
            vec![true, false, false, false, true, true, true, false]
        );
    }

    #[test]
    fn test_downward_hysteresis() {
        let switch = gain_switch(HysteresisMode::Downward);
        assert_eq!(
            sweep(&switch, &[3.0, 4.1, 3.0, 2.1, 2.0, 3.0, 4.0, 5.0]),
            vec![true, false, false, false, true, true, true, false]
        );
    }

    #[test]
    fn test_bypassed_switch_reports_on() {
        let switch = DynamicEnable {
            enable: false,
            ..gain_switch(HysteresisMode::Upward)
        };
        assert!(switch.evaluate(&at_gain(0.0), false));
        assert!(DynamicEnable::default().evaluate(&at_gain(100.0), false));
    }
}
