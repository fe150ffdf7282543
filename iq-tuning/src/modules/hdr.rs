//! Merge of the long and short exposures of an HDR frame.
//!
//! Calibration nests two trigger dimensions:
//!
//! ```text
//! HDR-AEC -> AEC -> record
//! ```
//!
//! The packed registers pair the merged motion and reconstruction tuning
//! with per-frame exposure, black level and white balance state.

use iq_math::quantize::{UINT1, UINT12, UINT14, UINT15, UINT2, UINT4, UINT9};
use iq_math::{lerp, lerp_rounded, log2_ceil, quantize, quantize_q, reciprocal_q, FieldRange};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    bracket, AecRegion, HdrAecRegion, IqModule, WhiteBalanceGains, Zone, ZzHdrFirstExposure,
};
use crate::error::TuningError;
use crate::interpolate::FieldInterpolate;
use crate::trigger::{
    floats_differ, AecAxis, ControlMethod, HdrAecAxis, TriggerSet, TriggerSnapshot,
};
use crate::tree::{build, merge, tree_capacity, Expansion, Level, LevelSearch};

const STRENGTH_RANGE: FieldRange = FieldRange::new(0, 256);
const TAP_RANGE: FieldRange = FieldRange::new(0, 5);
const DILATION_RANGE: FieldRange = FieldRange::new(0, 5);

/// Calibration record of the HDR merge block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdrRecord {
    /// Reconstruct starting from the first field of the zigzag pattern
    pub rec_first_field: bool,
    pub rec_hedge_threshold: f32,
    pub rec_edge_lpf_tap0: f32,
    pub mac_motion0_th1: f32,
    pub mac_motion0_th2: f32,
    /// Motion adaptation strength in `[0, 1]`
    pub mac_motion_strength: f32,
    pub mac_low_light_th1: f32,
    pub mac_low_light_strength: f32,
    pub mac_high_light_th1: f32,
    pub mac_smooth_enable: bool,
    pub mac_smooth_th1: f32,
    pub mac_smooth_dt: f32,
    pub mac_motion_dilation: f32,
    /// Ceiling applied to the sensor exposure ratio
    pub exp_ratio_max: f32,
}

impl FieldInterpolate for HdrRecord {
    fn blend(a: &Self, b: &Self, ratio: f32) -> Self {
        Self {
            rec_first_field: a.rec_first_field,
            rec_hedge_threshold: lerp(a.rec_hedge_threshold, b.rec_hedge_threshold, ratio),
            rec_edge_lpf_tap0: lerp_rounded(a.rec_edge_lpf_tap0, b.rec_edge_lpf_tap0, ratio),
            mac_motion0_th1: lerp(a.mac_motion0_th1, b.mac_motion0_th1, ratio),
            mac_motion0_th2: lerp(a.mac_motion0_th2, b.mac_motion0_th2, ratio),
            mac_motion_strength: lerp(a.mac_motion_strength, b.mac_motion_strength, ratio),
            mac_low_light_th1: lerp(a.mac_low_light_th1, b.mac_low_light_th1, ratio),
            mac_low_light_strength: lerp(
                a.mac_low_light_strength,
                b.mac_low_light_strength,
                ratio,
            ),
            mac_high_light_th1: lerp(a.mac_high_light_th1, b.mac_high_light_th1, ratio),
            mac_smooth_enable: a.mac_smooth_enable,
            mac_smooth_th1: lerp(a.mac_smooth_th1, b.mac_smooth_th1, ratio),
            mac_smooth_dt: lerp(a.mac_smooth_dt, b.mac_smooth_dt, ratio),
            mac_motion_dilation: lerp_rounded(a.mac_motion_dilation, b.mac_motion_dilation, ratio),
            exp_ratio_max: lerp(a.exp_ratio_max, b.exp_ratio_max, ratio),
        }
    }
}

pub type AecTable = Vec<Zone<AecRegion, HdrRecord>>;

/// Complete HDR merge calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdrDataset {
    pub enable: bool,
    pub control: ControlMethod,
    pub hdr_aec_zones: Vec<Zone<HdrAecRegion, AecTable>>,
}

#[derive(Debug, Clone, Copy)]
pub enum HdrNode<'a> {
    Root(&'a HdrDataset),
    Aec(&'a AecTable),
    Leaf(&'a HdrRecord),
}

impl HdrNode<'_> {
    fn kind(&self) -> &'static str {
        match self {
            HdrNode::Root(_) => "root",
            HdrNode::Aec(_) => "aec",
            HdrNode::Leaf(_) => "leaf",
        }
    }
}

fn leaf_record<'a>(node: &HdrNode<'a>) -> Option<&'a HdrRecord> {
    match *node {
        HdrNode::Leaf(record) => Some(record),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HdrTriggers {
    pub hdr_aec: HdrAecAxis,
    pub aec: AecAxis,
}

impl HdrTriggers {
    pub fn resolve(snapshot: &TriggerSnapshot, control: ControlMethod) -> Self {
        Self {
            hdr_aec: snapshot.hdr_aec_axis(control.hdr_aec),
            aec: snapshot.aec_axis(control.aec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdrLevel {
    HdrAec,
    Aec,
}

impl HdrLevel {
    pub const fn table() -> [Level<HdrLevel>; 2] {
        [Level::new(HdrLevel::HdrAec, 2), Level::new(HdrLevel::Aec, 2)]
    }
}

const LEVELS: [Level<HdrLevel>; 2] = HdrLevel::table();

/// Nodes in the largest HDR merge tree.
pub const TREE_CAPACITY: usize = tree_capacity(&LEVELS);

impl<'a> LevelSearch<HdrNode<'a>, HdrTriggers> for HdrLevel {
    fn expand(
        &self,
        level: usize,
        node: &HdrNode<'a>,
        triggers: &HdrTriggers,
    ) -> Result<Expansion<HdrNode<'a>>, TuningError> {
        match (self, *node) {
            (HdrLevel::HdrAec, HdrNode::Root(dataset)) => {
                let axis = triggers.hdr_aec;
                Ok(
                    bracket(level, &dataset.hdr_aec_zones, axis.value, |r| {
                        r.select(axis.control)
                    })?
                    .map(HdrNode::Aec),
                )
            }
            (HdrLevel::Aec, HdrNode::Aec(zones)) => {
                let axis = triggers.aec;
                Ok(bracket(level, zones, axis.value, |r| r.select(axis.control))?
                    .map(HdrNode::Leaf))
            }
            (_, other) => Err(TuningError::UnexpectedNode {
                level,
                found: other.kind(),
            }),
        }
    }
}

/// Everything the HDR merge block reads per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrInput {
    pub triggers: TriggerSnapshot,
    /// Long over short exposure ratio reported by the sensor
    pub exposure_ratio: f32,
    pub black_level_offset: u32,
    pub wb_gains: WhiteBalanceGains,
    pub zz_hdr_first_exposure: ZzHdrFirstExposure,
    /// Zigzag exposure pattern, 0..=3
    pub zz_hdr_pattern: u32,
}

impl TriggerSet for HdrInput {
    fn differs_from(&self, cached: &Self) -> bool {
        self.triggers.differs_from(&cached.triggers)
            || floats_differ(
                &[self.exposure_ratio, self.wb_gains.r, self.wb_gains.g, self.wb_gains.b],
                &[
                    cached.exposure_ratio,
                    cached.wb_gains.r,
                    cached.wb_gains.g,
                    cached.wb_gains.b,
                ],
            )
            || self.black_level_offset != cached.black_level_offset
            || self.zz_hdr_first_exposure != cached.zz_hdr_first_exposure
            || self.zz_hdr_pattern != cached.zz_hdr_pattern
    }
}

/// Per-session HDR merge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdrSettings {
    pub module_enable: bool,
}

impl Default for HdrSettings {
    fn default() -> Self {
        Self {
            module_enable: true,
        }
    }
}

/// Packed HDR merge register settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HdrRegisters {
    pub enable: bool,
    pub zz_hdr_first_rb_exp: u32,
    pub zz_hdr_pattern: u32,
    pub rec_first_field: bool,
    pub mac_smooth_enable: bool,
    /// Q10 exposure ratio after the calibrated ceiling
    pub exp_ratio: u32,
    /// Q8 reciprocal of the exposure ratio
    pub exp_ratio_recip: u32,
    pub rec_hedge_threshold: u32,
    pub rec_edge_lpf_tap0: u32,
    pub mac_motion0_th1: u32,
    pub mac_motion0_th2: u32,
    /// `ceil(log2(th2 - th1))`, the motion ramp shift
    pub mac_motion0_dt0: u32,
    pub mac_motion_strength: u32,
    pub mac_low_light_th1: u32,
    pub mac_low_light_strength: u32,
    pub mac_high_light_th1: u32,
    pub mac_smooth_th1: u32,
    pub mac_smooth_dt: u32,
    pub mac_motion_dilation: u32,
    pub black_level: u32,
    /// Q7 white balance gains
    pub wb_gain_r: u32,
    pub wb_gain_g: u32,
    pub wb_gain_b: u32,
}

/// Quantize a merged HDR record with this frame's exposure state.
pub fn pack(record: &HdrRecord, enable: bool, input: &HdrInput) -> HdrRegisters {
    let ratio = input.exposure_ratio.min(record.exp_ratio_max);
    let th1 = quantize(record.mac_motion0_th1, UINT14);
    let th2 = quantize(record.mac_motion0_th2, UINT14);
    let dt0 = if th2 > th1 {
        log2_ceil(i64::from(th2 - th1), UINT4)
    } else {
        0
    };

    HdrRegisters {
        enable,
        zz_hdr_first_rb_exp: input.zz_hdr_first_exposure.bit() & UINT1.max as u32,
        zz_hdr_pattern: quantize(input.zz_hdr_pattern as f32, UINT2),
        rec_first_field: record.rec_first_field,
        mac_smooth_enable: record.mac_smooth_enable,
        exp_ratio: quantize_q(ratio, 10, UINT15),
        exp_ratio_recip: reciprocal_q(ratio, 8, UINT9),
        rec_hedge_threshold: quantize(record.rec_hedge_threshold, UINT14),
        rec_edge_lpf_tap0: quantize(record.rec_edge_lpf_tap0, TAP_RANGE),
        mac_motion0_th1: th1,
        mac_motion0_th2: th2,
        mac_motion0_dt0: dt0,
        mac_motion_strength: quantize_q(record.mac_motion_strength, 8, STRENGTH_RANGE),
        mac_low_light_th1: quantize(record.mac_low_light_th1, UINT14),
        mac_low_light_strength: quantize_q(record.mac_low_light_strength, 8, STRENGTH_RANGE),
        mac_high_light_th1: quantize(record.mac_high_light_th1, UINT14),
        mac_smooth_th1: quantize(record.mac_smooth_th1, UINT14),
        mac_smooth_dt: quantize(record.mac_smooth_dt, UINT4),
        mac_motion_dilation: quantize(record.mac_motion_dilation, DILATION_RANGE),
        black_level: quantize(input.black_level_offset as f32, UINT12),
        wb_gain_r: quantize_q(input.wb_gains.r, 7, UINT14),
        wb_gain_g: quantize_q(input.wb_gains.g, 7, UINT14),
        wb_gain_b: quantize_q(input.wb_gains.b, 7, UINT14),
    }
}

/// HDR merge block bound to its calibration dataset.
#[derive(Debug, Clone)]
pub struct HdrMergeModule<'d> {
    dataset: &'d HdrDataset,
    settings: HdrSettings,
}

impl<'d> HdrMergeModule<'d> {
    pub fn new(dataset: &'d HdrDataset, settings: HdrSettings) -> Self {
        Self {
            dataset,
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.module_enable && self.dataset.enable
    }

    pub fn interpolate(&self, snapshot: &TriggerSnapshot) -> Result<HdrRecord, TuningError> {
        let triggers = HdrTriggers::resolve(snapshot, self.dataset.control);
        let root = HdrNode::Root(self.dataset);
        let tree = build::<_, _, _, TREE_CAPACITY>(&LEVELS, root, &triggers)?;
        merge(&tree, leaf_record)
    }
}

impl IqModule for HdrMergeModule<'_> {
    const NAME: &'static str = "HDR";
    type Input = HdrInput;
    type Registers = HdrRegisters;

    fn calculate(&mut self, input: &HdrInput) -> Result<HdrRegisters, TuningError> {
        if !self.is_enabled() {
            debug!("HDR merge block disabled");
            return Ok(HdrRegisters::default());
        }
        let record = self.interpolate(&input.triggers)?;
        Ok(pack(&record, true, input))
    }
}
