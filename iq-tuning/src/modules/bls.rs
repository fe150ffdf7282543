//! Black level subtraction.
//!
//! The calibration data nests five trigger dimensions:
//!
//! ```text
//! DRC gain -> HDR-AEC -> LED -> AEC -> CCT -> record
//! ```
//!
//! The LED level is special. Its zones carry no trigger regions; zone 0 is
//! the LED-off calibration, zone 1 the single-LED calibration and zone 2 the
//! second-LED calibration. The dataset-wide LED sensitivity range decides
//! the blend between zones 0 and 1, and when two LEDs fire the first-entry
//! ratio mixes zone 2 in as a third child.
//!
//! The packed offset is also published for downstream blocks that need the
//! pedestal already removed by this stage.

use iq_math::quantize::{UINT12, UINT15};
use iq_math::{
    feq, interpolation_ratio, lerp, quantize, reciprocal_q, LocateError, LocateResult, Region,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{bracket, AecRegion, HdrAecRegion, IqModule, Zone};
use crate::error::TuningError;
use crate::interpolate::FieldInterpolate;
use crate::trigger::{AecAxis, ControlMethod, HdrAecAxis, TriggerSnapshot};
use crate::tree::{build, merge, tree_capacity, Expansion, Level, LevelSearch, MAX_CHILD_NODES};

/// Largest pixel value of the 14-bit pipeline.
pub const PIPELINE_MAX: f32 = 16383.0;

/// Calibration record of the black level block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlsRecord {
    /// Pedestal subtracted from every channel
    pub offset: f32,
    pub threshold_r: f32,
    pub threshold_gr: f32,
    pub threshold_gb: f32,
    pub threshold_b: f32,
}

impl FieldInterpolate for BlsRecord {
    fn blend(a: &Self, b: &Self, ratio: f32) -> Self {
        Self {
            offset: lerp(a.offset, b.offset, ratio),
            threshold_r: lerp(a.threshold_r, b.threshold_r, ratio),
            threshold_gr: lerp(a.threshold_gr, b.threshold_gr, ratio),
            threshold_gb: lerp(a.threshold_gb, b.threshold_gb, ratio),
            threshold_b: lerp(a.threshold_b, b.threshold_b, ratio),
        }
    }
}

pub type CctTable = Vec<Zone<Region, BlsRecord>>;
pub type AecTable = Vec<Zone<AecRegion, CctTable>>;
/// Indexed by illuminant configuration: LED off, first LED, second LED
pub type LedTable = Vec<AecTable>;
pub type HdrAecTable = Vec<Zone<HdrAecRegion, LedTable>>;

/// Complete black level calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlsDataset {
    pub enable: bool,
    pub control: ControlMethod,
    /// Sensitivity range over which the first LED calibration fades in
    pub led_sensitivity_trigger: Region,
    pub drc_zones: Vec<Zone<Region, HdrAecTable>>,
}

impl BlsDataset {
    /// Dataset with a single zone per level, every path ending at `record`.
    pub fn uniform(record: BlsRecord) -> Self {
        let all = Region::new(0.0, f32::MAX);
        let cct: CctTable = vec![Zone::new(all, record)];
        let aec: AecTable = vec![Zone::new(AecRegion::new(all, all), cct)];
        let hdr_aec: HdrAecTable = vec![Zone::new(HdrAecRegion::uniform(all), vec![aec])];
        Self {
            enable: true,
            control: ControlMethod::default(),
            led_sensitivity_trigger: Region::new(0.0, 1.0),
            drc_zones: vec![Zone::new(all, hdr_aec)],
        }
    }
}

/// Typed view of the table each tree level searches.
#[derive(Debug, Clone, Copy)]
pub enum BlsNode<'a> {
    Root(&'a BlsDataset),
    HdrAec(&'a HdrAecTable),
    Led(&'a LedTable),
    Aec(&'a AecTable),
    Cct(&'a CctTable),
    Leaf(&'a BlsRecord),
}

impl BlsNode<'_> {
    fn kind(&self) -> &'static str {
        match self {
            BlsNode::Root(_) => "root",
            BlsNode::HdrAec(_) => "hdr-aec",
            BlsNode::Led(_) => "led",
            BlsNode::Aec(_) => "aec",
            BlsNode::Cct(_) => "cct",
            BlsNode::Leaf(_) => "leaf",
        }
    }
}

fn leaf_record<'a>(node: &BlsNode<'a>) -> Option<&'a BlsRecord> {
    match *node {
        BlsNode::Leaf(record) => Some(record),
        _ => None,
    }
}

/// LED state resolved for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedTrigger {
    pub sensitivity: f32,
    pub count: u32,
    pub first_entry_ratio: f32,
    pub sensitivity_range: Region,
}

/// Trigger values on each black level axis for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlsTriggers {
    pub drc_gain: f32,
    pub hdr_aec: HdrAecAxis,
    pub led: LedTrigger,
    pub aec: AecAxis,
    pub cct: f32,
}

impl BlsTriggers {
    pub fn resolve(snapshot: &TriggerSnapshot, dataset: &BlsDataset) -> Self {
        Self {
            drc_gain: snapshot.drc_gain,
            hdr_aec: snapshot.hdr_aec_axis(dataset.control.hdr_aec),
            led: LedTrigger {
                sensitivity: snapshot.led_sensitivity,
                count: snapshot.led_count,
                first_entry_ratio: snapshot.led_first_entry_ratio,
                sensitivity_range: dataset.led_sensitivity_trigger,
            },
            aec: snapshot.aec_axis(dataset.control.aec),
            cct: snapshot.color_temperature,
        }
    }
}

/// Search strategy of each black level dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlsLevel {
    DrcGain,
    HdrAec,
    Led,
    Aec,
    Cct,
}

impl BlsLevel {
    pub const fn table() -> [Level<BlsLevel>; 5] {
        [
            Level::new(BlsLevel::DrcGain, 2),
            Level::new(BlsLevel::HdrAec, 2),
            Level::new(BlsLevel::Led, 3),
            Level::new(BlsLevel::Aec, 2),
            Level::new(BlsLevel::Cct, 2),
        ]
    }
}

const LEVELS: [Level<BlsLevel>; 5] = BlsLevel::table();

/// Nodes in the largest black level tree.
pub const TREE_CAPACITY: usize = tree_capacity(&LEVELS);

impl<'a> LevelSearch<BlsNode<'a>, BlsTriggers> for BlsLevel {
    fn expand(
        &self,
        level: usize,
        node: &BlsNode<'a>,
        triggers: &BlsTriggers,
    ) -> Result<Expansion<BlsNode<'a>>, TuningError> {
        match (self, *node) {
            (BlsLevel::DrcGain, BlsNode::Root(dataset)) => {
                Ok(bracket(level, &dataset.drc_zones, triggers.drc_gain, |r| *r)?
                    .map(BlsNode::HdrAec))
            }
            (BlsLevel::HdrAec, BlsNode::HdrAec(zones)) => {
                let axis = triggers.hdr_aec;
                Ok(bracket(level, zones, axis.value, |r| r.select(axis.control))?
                    .map(BlsNode::Led))
            }
            (BlsLevel::Led, BlsNode::Led(zones)) => {
                Ok(led_expansion(level, zones, &triggers.led)?.map(BlsNode::Aec))
            }
            (BlsLevel::Aec, BlsNode::Aec(zones)) => {
                let axis = triggers.aec;
                Ok(bracket(level, zones, axis.value, |r| r.select(axis.control))?
                    .map(BlsNode::Cct))
            }
            (BlsLevel::Cct, BlsNode::Cct(zones)) => {
                Ok(bracket(level, zones, triggers.cct, |r| *r)?.map(BlsNode::Leaf))
            }
            (_, other) => Err(TuningError::UnexpectedNode {
                level,
                found: other.kind(),
            }),
        }
    }
}

/// Expand the LED level.
///
/// Zone 1 fades in over the sensitivity range when one or two LEDs fire.
/// With two LEDs the first-entry ratio `q` mixes zone 2 in at weight `1 - q`,
/// placed in the ratio slot of the last child already attached.
fn led_expansion<'a>(
    level: usize,
    zones: &'a [AecTable],
    led: &LedTrigger,
) -> Result<Expansion<&'a AecTable>, TuningError> {
    if zones.is_empty() {
        return Err(TuningError::Locate {
            level,
            source: LocateError::NoRegions,
        });
    }

    let count = zones.len();
    let mut second_led_ratio = 0.0;
    let hit = if led.count == 0 || count == 1 {
        LocateResult::single(0)
    } else if led.count == 1 || led.count == 2 {
        if led.count == 2 {
            second_led_ratio = led.first_entry_ratio;
        }
        let range = led.sensitivity_range;
        if led.sensitivity >= range.end {
            LocateResult::single(1)
        } else if led.sensitivity <= range.start {
            LocateResult::single(0)
        } else {
            LocateResult {
                start_index: 0,
                end_index: 1,
                ratio: interpolation_ratio(led.sensitivity, range.start, range.end),
            }
        }
    } else {
        warn!(led_count = led.count, "Unsupported LED count, using LED-off calibration");
        LocateResult::single(0)
    };

    let hit = LocateResult {
        start_index: hit.start_index.min(count - 1),
        end_index: hit.end_index.min(count - 1),
        ratio: hit.ratio,
    };
    let mut expansion = Expansion::from_locate(hit, |i| &zones[i]);

    if !feq(second_led_ratio, 0.0) && count >= 3 {
        if expansion
            .try_push_mixed(&zones[2], 1.0 - second_led_ratio)
            .is_err()
        {
            return Err(TuningError::TooManyChildren {
                level,
                count: MAX_CHILD_NODES + 1,
                max: MAX_CHILD_NODES,
            });
        }
    }
    Ok(expansion)
}

/// Per-session black level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlsSettings {
    /// Platform override; the block runs only when both this and the
    /// calibration enable are set
    pub module_enable: bool,
}

impl Default for BlsSettings {
    fn default() -> Self {
        Self {
            module_enable: true,
        }
    }
}

/// Packed black level register settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlsRegisters {
    pub enable: bool,
    /// 12-bit pedestal
    pub offset: u32,
    /// Q9 rescale restoring full range after subtraction
    pub scale: u32,
    pub threshold_r: u32,
    pub threshold_gr: u32,
    pub threshold_gb: u32,
    pub threshold_b: u32,
    /// Pedestal removed by this stage, zero while disabled
    pub black_level_offset: u32,
}

/// Quantize a merged black level record.
///
/// `scale` is `2^9 / ((max - offset) / max)` for the 14-bit pipeline maximum;
/// the reciprocal falls back to the field maximum when the offset consumes
/// the whole range.
pub fn pack(record: &BlsRecord, enable: bool) -> BlsRegisters {
    let offset = quantize(record.offset, UINT12);
    let headroom = (PIPELINE_MAX - offset as f32) / PIPELINE_MAX;
    BlsRegisters {
        enable,
        offset,
        scale: reciprocal_q(headroom, 9, UINT15),
        threshold_r: quantize(record.threshold_r, UINT12),
        threshold_gr: quantize(record.threshold_gr, UINT12),
        threshold_gb: quantize(record.threshold_gb, UINT12),
        threshold_b: quantize(record.threshold_b, UINT12),
        black_level_offset: if enable { offset } else { 0 },
    }
}

/// Black level block bound to its calibration dataset.
#[derive(Debug, Clone)]
pub struct BlackLevelModule<'d> {
    dataset: &'d BlsDataset,
    settings: BlsSettings,
}

impl<'d> BlackLevelModule<'d> {
    pub fn new(dataset: &'d BlsDataset, settings: BlsSettings) -> Self {
        Self {
            dataset,
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.module_enable && self.dataset.enable
    }

    /// Merged calibration record for `snapshot`.
    pub fn interpolate(&self, snapshot: &TriggerSnapshot) -> Result<BlsRecord, TuningError> {
        let triggers = BlsTriggers::resolve(snapshot, self.dataset);
        let root = BlsNode::Root(self.dataset);
        let tree = build::<_, _, _, TREE_CAPACITY>(&LEVELS, root, &triggers)?;
        merge(&tree, leaf_record)
    }
}

impl IqModule for BlackLevelModule<'_> {
    const NAME: &'static str = "BLS";
    type Input = TriggerSnapshot;
    type Registers = BlsRegisters;

    fn calculate(&mut self, input: &TriggerSnapshot) -> Result<BlsRegisters, TuningError> {
        if !self.is_enabled() {
            debug!("Black level block disabled");
            return Ok(BlsRegisters::default());
        }
        let record = self.interpolate(input)?;
        Ok(pack(&record, true))
    }
}
