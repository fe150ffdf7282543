//! Bad pixel and phase-detection pixel correction.
//!
//! Calibration nests three trigger dimensions:
//!
//! ```text
//! DRC gain -> HDR-AEC -> AEC -> record
//! ```
//!
//! The packed output combines the merged record with per-frame sensor data:
//! black level from the black level stage, white balance gains, the HDR
//! exposure ratio and the phase-detection pixel layout.

use iq_math::quantize::{UINT1, UINT12, UINT13, UINT14, UINT15, UINT17, UINT2, UINT7, UINT9};
use iq_math::{
    lerp, lerp_rounded, lerp_table, quantize, quantize_q, ratio_q, reciprocal_q, FieldRange,
    Region,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    bracket, AecRegion, HdrAecRegion, IqModule, WhiteBalanceGains, Zone, ZzHdrFirstExposure,
};
use crate::error::TuningError;
use crate::interpolate::FieldInterpolate;
use crate::trigger::{
    floats_differ, AecAxis, ControlMethod, DynamicEnable, HdrAecAxis, TriggerSet,
    TriggerSnapshot,
};
use crate::tree::{build, merge, tree_capacity, Expansion, Level, LevelSearch};

/// Entries in the noise standard deviation table.
pub const NOISE_LUT_LEN: usize = 64;

/// Rows in the phase-detection pixel mask table.
pub const PDAF_MASK_ROWS: usize = 64;

const DIR_TK_RANGE: FieldRange = FieldRange::new(0, 8);
const STRENGTH_RANGE: FieldRange = FieldRange::new(0, 256);

/// Serde glue for tables longer than the 32 entries serde derives for
/// arrays.
mod lut_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T, const N: usize>(lut: &[T; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(lut)
    }

    pub fn deserialize<'de, D, T, const N: usize>(deserializer: D) -> Result<[T; N], D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let entries = Vec::<T>::deserialize(deserializer)?;
        let len = entries.len();
        entries
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"a full table"))
    }
}

/// Calibration record of the defect pixel block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdpcRecord {
    /// Upper detection threshold, percent of the local maximum
    pub fmax: f32,
    /// Lower detection threshold, percent of the local minimum
    pub fmin: f32,
    pub bpc_offset: f32,
    pub bcc_offset: f32,
    pub fmax_flat: f32,
    pub fmin_flat: f32,
    pub bpc_offset_flat: f32,
    pub bcc_offset_flat: f32,
    /// Directional detection tap count
    pub dir_tk: f32,
    pub dir_offset: f32,
    /// Flatness threshold; packed as its Q12 reciprocal
    pub flat_threshold: f32,
    pub fmax_gic: f32,
    pub bpc_offset_gic: f32,
    pub gic_thin_line_noise_offset: f32,
    /// Green imbalance filter strength in `[0, 1]`
    pub gic_filter_strength: f32,
    pub saturation_threshold: f32,
    pub use_same_channel_only: bool,
    pub single_bpc_only: bool,
    pub flat_detection_enable: bool,
    pub directional_bpc_enable: bool,
    #[serde(with = "lut_serde")]
    pub noise_std_lut: [f32; NOISE_LUT_LEN],
}

impl FieldInterpolate for PdpcRecord {
    fn blend(a: &Self, b: &Self, ratio: f32) -> Self {
        Self {
            fmax: lerp_rounded(a.fmax, b.fmax, ratio),
            fmin: lerp_rounded(a.fmin, b.fmin, ratio),
            bpc_offset: lerp(a.bpc_offset, b.bpc_offset, ratio),
            bcc_offset: lerp(a.bcc_offset, b.bcc_offset, ratio),
            fmax_flat: lerp_rounded(a.fmax_flat, b.fmax_flat, ratio),
            fmin_flat: lerp_rounded(a.fmin_flat, b.fmin_flat, ratio),
            bpc_offset_flat: lerp(a.bpc_offset_flat, b.bpc_offset_flat, ratio),
            bcc_offset_flat: lerp(a.bcc_offset_flat, b.bcc_offset_flat, ratio),
            dir_tk: lerp_rounded(a.dir_tk, b.dir_tk, ratio),
            dir_offset: lerp(a.dir_offset, b.dir_offset, ratio),
            flat_threshold: lerp(a.flat_threshold, b.flat_threshold, ratio),
            fmax_gic: lerp_rounded(a.fmax_gic, b.fmax_gic, ratio),
            bpc_offset_gic: lerp(a.bpc_offset_gic, b.bpc_offset_gic, ratio),
            gic_thin_line_noise_offset: lerp(
                a.gic_thin_line_noise_offset,
                b.gic_thin_line_noise_offset,
                ratio,
            ),
            gic_filter_strength: lerp(a.gic_filter_strength, b.gic_filter_strength, ratio),
            saturation_threshold: lerp(a.saturation_threshold, b.saturation_threshold, ratio),
            use_same_channel_only: a.use_same_channel_only,
            single_bpc_only: a.single_bpc_only,
            flat_detection_enable: a.flat_detection_enable,
            directional_bpc_enable: a.directional_bpc_enable,
            noise_std_lut: lerp_table(&a.noise_std_lut, &b.noise_std_lut, ratio),
        }
    }
}

pub type AecTable = Vec<Zone<AecRegion, PdpcRecord>>;
pub type HdrAecTable = Vec<Zone<HdrAecRegion, AecTable>>;

/// Sub-block enables of the calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdpcEnableSection {
    pub pdpc_enable: bool,
    pub bpc_enable: bool,
    pub gic_enable: bool,
}

/// Complete defect pixel calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdpcDataset {
    pub enable_section: PdpcEnableSection,
    /// Trigger-driven switch for the whole block; bypassed by default
    #[serde(default)]
    pub dynamic_enable: DynamicEnable,
    pub control: ControlMethod,
    pub drc_zones: Vec<Zone<Region, HdrAecTable>>,
}

#[derive(Debug, Clone, Copy)]
pub enum PdpcNode<'a> {
    Root(&'a PdpcDataset),
    HdrAec(&'a HdrAecTable),
    Aec(&'a AecTable),
    Leaf(&'a PdpcRecord),
}

impl PdpcNode<'_> {
    fn kind(&self) -> &'static str {
        match self {
            PdpcNode::Root(_) => "root",
            PdpcNode::HdrAec(_) => "hdr-aec",
            PdpcNode::Aec(_) => "aec",
            PdpcNode::Leaf(_) => "leaf",
        }
    }
}

fn leaf_record<'a>(node: &PdpcNode<'a>) -> Option<&'a PdpcRecord> {
    match *node {
        PdpcNode::Leaf(record) => Some(record),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdpcTriggers {
    pub drc_gain: f32,
    pub hdr_aec: HdrAecAxis,
    pub aec: AecAxis,
}

impl PdpcTriggers {
    pub fn resolve(snapshot: &TriggerSnapshot, control: ControlMethod) -> Self {
        Self {
            drc_gain: snapshot.drc_gain,
            hdr_aec: snapshot.hdr_aec_axis(control.hdr_aec),
            aec: snapshot.aec_axis(control.aec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdpcLevel {
    DrcGain,
    HdrAec,
    Aec,
}

impl PdpcLevel {
    pub const fn table() -> [Level<PdpcLevel>; 3] {
        [
            Level::new(PdpcLevel::DrcGain, 2),
            Level::new(PdpcLevel::HdrAec, 2),
            Level::new(PdpcLevel::Aec, 2),
        ]
    }
}

const LEVELS: [Level<PdpcLevel>; 3] = PdpcLevel::table();

/// Nodes in the largest defect pixel tree.
pub const TREE_CAPACITY: usize = tree_capacity(&LEVELS);

impl<'a> LevelSearch<PdpcNode<'a>, PdpcTriggers> for PdpcLevel {
    fn expand(
        &self,
        level: usize,
        node: &PdpcNode<'a>,
        triggers: &PdpcTriggers,
    ) -> Result<Expansion<PdpcNode<'a>>, TuningError> {
        match (self, *node) {
            (PdpcLevel::DrcGain, PdpcNode::Root(dataset)) => {
                Ok(bracket(level, &dataset.drc_zones, triggers.drc_gain, |r| *r)?
                    .map(PdpcNode::HdrAec))
            }
            (PdpcLevel::HdrAec, PdpcNode::HdrAec(zones)) => {
                let axis = triggers.hdr_aec;
                Ok(bracket(level, zones, axis.value, |r| r.select(axis.control))?
                    .map(PdpcNode::Aec))
            }
            (PdpcLevel::Aec, PdpcNode::Aec(zones)) => {
                let axis = triggers.aec;
                Ok(bracket(level, zones, axis.value, |r| r.select(axis.control))?
                    .map(PdpcNode::Leaf))
            }
            (_, other) => Err(TuningError::UnexpectedNode {
                level,
                found: other.kind(),
            }),
        }
    }
}

/// Color filter arrangement of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BayerPattern {
    #[default]
    Rggb,
    Grbg,
    Bggr,
    Gbrg,
}

impl BayerPattern {
    pub fn bits(self) -> u32 {
        match self {
            BayerPattern::Rggb => 0,
            BayerPattern::Grbg => 1,
            BayerPattern::Bggr => 2,
            BayerPattern::Gbrg => 3,
        }
    }
}

/// Hot pixel correction mode requested by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HotPixelMode {
    Off,
    #[default]
    Fast,
    HighQuality,
}

/// Phase-detection pixel layout of the sensor mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdafLayout {
    pub global_offset_x: u32,
    pub global_offset_y: u32,
    pub block_width: u32,
    pub block_height: u32,
    /// Stripe-relative start of the mask table
    pub table_offset_x: u32,
    pub table_offset_y: u32,
    /// Sensor coordinates of the phase-detection pixels
    pub pixel_coords: Vec<(u32, u32)>,
}

impl PdafLayout {
    pub fn pixel_count(&self) -> usize {
        self.pixel_coords.len()
    }

    /// Bit mask of phase-detection pixel positions within one block.
    ///
    /// Row `y` of the block sets bit `x` for every pixel at that block
    /// position. Pixels before the global offset or beyond the 64x64 table
    /// are dropped.
    pub fn mask(&self) -> [u64; PDAF_MASK_ROWS] {
        let mut mask = [0_u64; PDAF_MASK_ROWS];
        if self.block_width == 0 || self.block_height == 0 {
            return mask;
        }
        let mut dropped = 0_usize;
        for &(x, y) in &self.pixel_coords {
            let offset = x
                .checked_sub(self.global_offset_x)
                .zip(y.checked_sub(self.global_offset_y));
            let Some((dx, dy)) = offset else {
                dropped += 1;
                continue;
            };
            let col = dx % self.block_width;
            let row = dy % self.block_height;
            if col >= 64 || row as usize >= PDAF_MASK_ROWS {
                dropped += 1;
                continue;
            }
            mask[row as usize] |= 1_u64 << col;
        }
        if dropped > 0 {
            warn!(dropped, "PDAF pixels outside the mask table");
        }
        mask
    }
}

/// Everything the defect pixel block reads per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PdpcInput {
    pub triggers: TriggerSnapshot,
    /// Pedestal from the black level stage
    pub black_level_offset: u32,
    pub wb_gains: WhiteBalanceGains,
    pub zz_hdr_enable: bool,
    pub zz_hdr_pattern: u32,
    pub zz_hdr_first_exposure: ZzHdrFirstExposure,
    pub bayer_pattern: BayerPattern,
    pub hot_pixel_mode: HotPixelMode,
    pub image_width: u32,
    pub image_height: u32,
    pub pdaf: PdafLayout,
}

impl TriggerSet for PdpcInput {
    fn differs_from(&self, cached: &Self) -> bool {
        self.triggers.differs_from(&cached.triggers)
            || floats_differ(&self.wb_gains.as_array(), &cached.wb_gains.as_array())
            || self.black_level_offset != cached.black_level_offset
            || self.zz_hdr_enable != cached.zz_hdr_enable
            || self.zz_hdr_pattern != cached.zz_hdr_pattern
            || self.zz_hdr_first_exposure != cached.zz_hdr_first_exposure
            || self.bayer_pattern != cached.bayer_pattern
            || self.hot_pixel_mode != cached.hot_pixel_mode
            || self.image_width != cached.image_width
            || self.image_height != cached.image_height
            || self.pdaf != cached.pdaf
    }
}

/// Per-session defect pixel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdpcSettings {
    pub module_enable: bool,
}

impl Default for PdpcSettings {
    fn default() -> Self {
        Self {
            module_enable: true,
        }
    }
}

/// Sub-block enables after combining calibration, sensor and request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PdpcEnables {
    pub enable: bool,
    pub pdpc: bool,
    pub bpc: bool,
    pub directional_bpc: bool,
    pub gic: bool,
}

impl PdpcEnables {
    /// Phase-detection correction needs PD pixels on the sensor, and a hot
    /// pixel mode of `Off` turns bad pixel correction off. The block runs
    /// when `module_enable` holds and any sub-block remains.
    ///
    /// Directional correction is only allowed here; the merged record has
    /// the final say through [`PdpcEnables::with_record`].
    pub fn resolve(module_enable: bool, section: &PdpcEnableSection, input: &PdpcInput) -> Self {
        let pdpc = section.pdpc_enable && input.pdaf.pixel_count() > 0;
        let hot_pixels_off = input.hot_pixel_mode == HotPixelMode::Off;
        let bpc = section.bpc_enable && !hot_pixels_off;
        let directional_bpc = !hot_pixels_off;
        let gic = section.gic_enable;
        Self {
            enable: module_enable && (pdpc || bpc || gic),
            pdpc,
            bpc,
            directional_bpc,
            gic,
        }
    }

    /// Apply the merged record's directional correction switch.
    pub fn with_record(self, record: &PdpcRecord) -> Self {
        Self {
            directional_bpc: self.directional_bpc && record.directional_bpc_enable,
            ..self
        }
    }
}

/// Packed defect pixel register settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdpcRegisters {
    pub enables: PdpcEnables,
    pub use_same_channel_only: bool,
    pub single_bpc_only: bool,
    pub flat_detection_enable: bool,
    pub bayer_pattern: u32,
    pub pdaf_hdr_selection: u32,
    pub pdaf_zz_hdr_first_rb_exp: u32,
    pub black_level: u32,
    /// Q10 long/short exposure ratio
    pub exp_ratio: u32,
    /// Q8 reciprocal of the exposure ratio
    pub exp_ratio_recip: u32,
    pub fmax: u32,
    pub fmin: u32,
    pub bpc_offset: u32,
    pub bcc_offset: u32,
    /// Q12 channel gain ratios used to equalize PD pixels
    pub rg_wb_gain: u32,
    pub bg_wb_gain: u32,
    pub gr_wb_gain: u32,
    pub gb_wb_gain: u32,
    pub pdaf_global_offset_x: u32,
    pub pdaf_global_offset_y: u32,
    pub pdaf_x_end: u32,
    pub pdaf_y_end: u32,
    pub pdaf_table_offset_x: u32,
    pub pdaf_table_offset_y: u32,
    pub fmax_flat: u32,
    pub fmin_flat: u32,
    pub bpc_offset_flat: u32,
    pub bcc_offset_flat: u32,
    pub saturation_threshold: u32,
    pub dir_tk: u32,
    pub dir_offset: u32,
    /// Q12 reciprocal of the flatness threshold
    pub flat_th_recip: u32,
    pub fmax_gic: u32,
    pub bpc_offset_gic: u32,
    pub gic_thin_line_noise_offset: u32,
    /// Q8 filter strength
    pub gic_filter_strength: u32,
    pub lut_bank_select: u32,
    #[serde(with = "lut_serde")]
    pub pdaf_mask: [u64; PDAF_MASK_ROWS],
    #[serde(with = "lut_serde")]
    pub noise_std_lut: [u16; NOISE_LUT_LEN],
}

impl Default for PdpcRegisters {
    /// All sub-blocks off and every field zero.
    fn default() -> Self {
        Self {
            enables: PdpcEnables::default(),
            use_same_channel_only: false,
            single_bpc_only: false,
            flat_detection_enable: false,
            bayer_pattern: 0,
            pdaf_hdr_selection: 0,
            pdaf_zz_hdr_first_rb_exp: 0,
            black_level: 0,
            exp_ratio: 0,
            exp_ratio_recip: 0,
            fmax: 0,
            fmin: 0,
            bpc_offset: 0,
            bcc_offset: 0,
            rg_wb_gain: 0,
            bg_wb_gain: 0,
            gr_wb_gain: 0,
            gb_wb_gain: 0,
            pdaf_global_offset_x: 0,
            pdaf_global_offset_y: 0,
            pdaf_x_end: 0,
            pdaf_y_end: 0,
            pdaf_table_offset_x: 0,
            pdaf_table_offset_y: 0,
            fmax_flat: 0,
            fmin_flat: 0,
            bpc_offset_flat: 0,
            bcc_offset_flat: 0,
            saturation_threshold: 0,
            dir_tk: 0,
            dir_offset: 0,
            flat_th_recip: 0,
            fmax_gic: 0,
            bpc_offset_gic: 0,
            gic_thin_line_noise_offset: 0,
            gic_filter_strength: 0,
            lut_bank_select: 0,
            pdaf_mask: [0; PDAF_MASK_ROWS],
            noise_std_lut: [0; NOISE_LUT_LEN],
        }
    }
}

/// Quantize a merged defect pixel record with this frame's sensor inputs.
pub fn pack(
    record: &PdpcRecord,
    enables: PdpcEnables,
    input: &PdpcInput,
    lut_bank: u32,
) -> PdpcRegisters {
    let exposure_ratio = if input.zz_hdr_enable {
        input.triggers.exposure_gain_ratio
    } else {
        1.0
    };
    let wb = input.wb_gains;
    let last_column = input.image_width.saturating_sub(1) as f32;
    let last_row = input.image_height.saturating_sub(1) as f32;

    PdpcRegisters {
        enables,
        use_same_channel_only: record.use_same_channel_only,
        single_bpc_only: record.single_bpc_only,
        flat_detection_enable: record.flat_detection_enable,
        bayer_pattern: input.bayer_pattern.bits(),
        pdaf_hdr_selection: if input.zz_hdr_enable {
            quantize(input.zz_hdr_pattern as f32, UINT2)
        } else {
            0
        },
        pdaf_zz_hdr_first_rb_exp: input.zz_hdr_first_exposure.bit(),
        black_level: quantize(input.black_level_offset as f32, UINT12),
        exp_ratio: quantize_q(exposure_ratio, 10, UINT15),
        exp_ratio_recip: reciprocal_q(exposure_ratio, 8, UINT9),
        fmax: quantize(record.fmax, UINT7),
        fmin: quantize(record.fmin, UINT7),
        bpc_offset: quantize(record.bpc_offset, UINT14),
        bcc_offset: quantize(record.bcc_offset, UINT14),
        rg_wb_gain: ratio_q(wb.r, wb.g, 12, UINT17),
        bg_wb_gain: ratio_q(wb.b, wb.g, 12, UINT17),
        gr_wb_gain: ratio_q(wb.g, wb.r, 12, UINT17),
        gb_wb_gain: ratio_q(wb.g, wb.b, 12, UINT17),
        pdaf_global_offset_x: quantize(input.pdaf.global_offset_x as f32, UINT14),
        pdaf_global_offset_y: quantize(input.pdaf.global_offset_y as f32, UINT14),
        pdaf_x_end: quantize(last_column, UINT14),
        pdaf_y_end: quantize(last_row, UINT14),
        pdaf_table_offset_x: quantize(input.pdaf.table_offset_x as f32, UINT14),
        pdaf_table_offset_y: quantize(input.pdaf.table_offset_y as f32, UINT14),
        fmax_flat: quantize(record.fmax_flat, UINT7),
        fmin_flat: quantize(record.fmin_flat, UINT7),
        bpc_offset_flat: quantize(record.bpc_offset_flat, UINT14),
        bcc_offset_flat: quantize(record.bcc_offset_flat, UINT14),
        saturation_threshold: quantize(record.saturation_threshold, UINT14),
        dir_tk: quantize(record.dir_tk, DIR_TK_RANGE),
        dir_offset: quantize(record.dir_offset, UINT14),
        flat_th_recip: reciprocal_q(record.flat_threshold, 12, UINT13),
        fmax_gic: quantize(record.fmax_gic, UINT7),
        bpc_offset_gic: quantize(record.bpc_offset_gic, UINT14),
        gic_thin_line_noise_offset: quantize(record.gic_thin_line_noise_offset, UINT14),
        gic_filter_strength: quantize_q(record.gic_filter_strength, 8, STRENGTH_RANGE),
        lut_bank_select: lut_bank & UINT1.max as u32,
        pdaf_mask: input.pdaf.mask(),
        noise_std_lut: record
            .noise_std_lut
            .map(|v| quantize(v, UINT14) as u16),
    }
}

/// Defect pixel block bound to its calibration dataset.
#[derive(Debug, Clone)]
pub struct DefectPixelModule<'d> {
    dataset: &'d PdpcDataset,
    settings: PdpcSettings,
    lut_bank: u32,
    /// Dynamic enable state left by the last recomputed frame
    dynamic_state: bool,
}

impl<'d> DefectPixelModule<'d> {
    pub fn new(dataset: &'d PdpcDataset, settings: PdpcSettings) -> Self {
        Self {
            dataset,
            settings,
            lut_bank: 0,
            dynamic_state: true,
        }
    }

    pub fn lut_bank(&self) -> u32 {
        self.lut_bank
    }

    pub fn interpolate(&self, snapshot: &TriggerSnapshot) -> Result<PdpcRecord, TuningError> {
        let triggers = PdpcTriggers::resolve(snapshot, self.dataset.control);
        let root = PdpcNode::Root(self.dataset);
        let tree = build::<_, _, _, TREE_CAPACITY>(&LEVELS, root, &triggers)?;
        merge(&tree, leaf_record)
    }
}

impl IqModule for DefectPixelModule<'_> {
    const NAME: &'static str = "PDPC";
    type Input = PdpcInput;
    type Registers = PdpcRegisters;

    fn calculate(&mut self, input: &PdpcInput) -> Result<PdpcRegisters, TuningError> {
        self.dynamic_state = self
            .dataset
            .dynamic_enable
            .evaluate(&input.triggers, self.dynamic_state);
        let module_enable = self.settings.module_enable && self.dynamic_state;
        let enables = PdpcEnables::resolve(module_enable, &self.dataset.enable_section, input);
        if !enables.enable {
            debug!(
                module_enable = self.settings.module_enable,
                dynamic = self.dynamic_state,
                "Defect pixel block disabled"
            );
            return Ok(PdpcRegisters::default());
        }

        let record = self.interpolate(&input.triggers)?;
        let enables = enables.with_record(&record);

        // Double-buffered tables: program the bank the hardware is not reading
        let bank = self.lut_bank;
        self.lut_bank ^= 1;
        debug!(
            enable = enables.enable,
            pdpc = enables.pdpc,
            bpc = enables.bpc,
            gic = enables.gic,
            bank,
            "Defect pixel registers packed"
        );
        Ok(pack(&record, enables, input, bank))
    }
}
