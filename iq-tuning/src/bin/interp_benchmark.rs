//! Timing harness for the per-frame calibration path.
//!
//! Sweeps the lux index across a synthetic calibration for the selected
//! block, times build + merge + pack per frame and optionally writes the
//! last register record as JSON.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use iq_math::Region;
use iq_tuning::modules::bls::{self, BlsDataset, BlsRecord};
use iq_tuning::modules::hdr::{self, HdrDataset, HdrInput, HdrRecord};
use iq_tuning::modules::pdpc::{
    self, BayerPattern, HotPixelMode, PdafLayout, PdpcDataset, PdpcEnableSection, PdpcInput,
    PdpcRecord,
};
use iq_tuning::modules::{AecRegion, HdrAecRegion, WhiteBalanceGains, Zone, ZzHdrFirstExposure};
use iq_tuning::trigger::{ControlMethod, DynamicEnable};
use iq_tuning::{
    BlackLevelModule, DefectPixelModule, EngineConfig, HdrMergeModule, IqModule, TriggerSnapshot,
};
use serde::Serialize;
use tracing::info;

const WARMUP_FRAMES: usize = 100;
const LUX_MAX: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Block {
    Hdr,
    Pdpc,
    Bls,
}

/// Calibration interpolation timing benchmark
#[derive(Parser, Debug)]
#[command(name = "interp_benchmark")]
#[command(about = "Time calibration tree build, merge and pack per frame")]
#[command(version)]
struct Args {
    /// Block to exercise
    #[arg(short, long, value_enum, default_value = "bls")]
    module: Block,

    /// Frames in the timed sweep
    #[arg(short, long, default_value = "10000")]
    iterations: usize,

    /// Engine configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the last register record to this JSON file
    #[arg(long)]
    dump: Option<PathBuf>,
}

struct Timings {
    sorted: Vec<Duration>,
}

impl Timings {
    fn new(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        Self { sorted: samples }
    }

    fn micros_at(&self, fraction: f64) -> f64 {
        let last = self.sorted.len().saturating_sub(1);
        let index = ((self.sorted.len() as f64 * fraction) as usize).min(last);
        self.sorted
            .get(index)
            .map_or(0.0, |d| d.as_nanos() as f64 / 1000.0)
    }

    fn mean_micros(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let total: u128 = self.sorted.iter().map(|d| d.as_nanos()).sum();
        total as f64 / self.sorted.len() as f64 / 1000.0
    }

    fn report(&self, name: &str) {
        println!("\n========== {name} INTERPOLATION BENCHMARK ==========");
        println!("  Frames: {}", self.sorted.len());
        println!("  Mean:   {:>8.2} µs", self.mean_micros());
        println!("  Median: {:>8.2} µs", self.micros_at(0.5));
        println!("  Min:    {:>8.2} µs", self.micros_at(0.0));
        println!("  Max:    {:>8.2} µs", self.micros_at(1.0));
        println!("  P95:    {:>8.2} µs", self.micros_at(0.95));
        println!("  P99:    {:>8.2} µs", self.micros_at(0.99));
        println!("===================================================\n");
    }
}

fn lux_sweep(iterations: usize) -> impl Iterator<Item = TriggerSnapshot> {
    (0..iterations).map(move |i| TriggerSnapshot {
        lux_index: LUX_MAX * i as f32 / iterations.max(1) as f32,
        real_gain: 1.0 + 15.0 * i as f32 / iterations.max(1) as f32,
        exposure_time: 4.0,
        exposure_gain_ratio: 4.0,
        color_temperature: 4500.0,
        drc_gain: 1.5,
        ..Default::default()
    })
}

/// Time `calculate` over `inputs` and return the final register record.
fn run<M: IqModule>(module: &mut M, inputs: &[M::Input]) -> Result<(Timings, M::Registers)> {
    let first = inputs.first().context("no frames to run")?;
    for _ in 0..WARMUP_FRAMES {
        module.calculate(first)?;
    }

    let mut samples = Vec::with_capacity(inputs.len());
    let mut last = None;
    for input in inputs {
        let start = Instant::now();
        let registers = module.calculate(input)?;
        samples.push(start.elapsed());
        last = Some(registers);
    }
    let last = last.context("no frames were timed")?;
    Ok((Timings::new(samples), last))
}

fn lux_aec<T>(low: T, high: T) -> Vec<Zone<AecRegion, T>> {
    vec![
        Zone::new(
            AecRegion::new(Region::new(0.0, 200.0), Region::new(1.0, 4.0)),
            low,
        ),
        Zone::new(
            AecRegion::new(Region::new(600.0, LUX_MAX), Region::new(8.0, 16.0)),
            high,
        ),
    ]
}

fn split_hdr_aec<T>(short: T, long: T) -> Vec<Zone<HdrAecRegion, T>> {
    vec![
        Zone::new(HdrAecRegion::uniform(Region::new(1.0, 2.0)), short),
        Zone::new(HdrAecRegion::uniform(Region::new(8.0, 16.0)), long),
    ]
}

fn split_drc<T>(low: T, high: T) -> Vec<Zone<Region, T>> {
    vec![
        Zone::new(Region::new(1.0, 1.0), low),
        Zone::new(Region::new(2.0, 4.0), high),
    ]
}

fn bls_dataset() -> BlsDataset {
    let record = |offset: f32| BlsRecord {
        offset,
        threshold_r: offset + 8.0,
        threshold_gr: offset + 8.0,
        threshold_gb: offset + 8.0,
        threshold_b: offset + 8.0,
    };
    let cct = |offset: f32| -> bls::CctTable {
        vec![
            Zone::new(Region::new(2500.0, 3500.0), record(offset)),
            Zone::new(Region::new(5500.0, 7000.0), record(offset + 4.0)),
        ]
    };
    let led = |offset: f32| -> bls::LedTable {
        vec![
            lux_aec(cct(offset), cct(offset + 16.0)),
            lux_aec(cct(offset + 2.0), cct(offset + 18.0)),
            lux_aec(cct(offset + 3.0), cct(offset + 19.0)),
        ]
    };
    BlsDataset {
        enable: true,
        control: ControlMethod::default(),
        led_sensitivity_trigger: Region::new(100.0, 400.0),
        drc_zones: split_drc(
            split_hdr_aec(led(64.0), led(72.0)),
            split_hdr_aec(led(80.0), led(88.0)),
        ),
    }
}

fn hdr_dataset() -> HdrDataset {
    let record = |th1: f32| HdrRecord {
        rec_first_field: true,
        rec_hedge_threshold: 2000.0,
        rec_edge_lpf_tap0: 3.0,
        mac_motion0_th1: th1,
        mac_motion0_th2: th1 + 512.0,
        mac_motion_strength: 0.5,
        mac_low_light_th1: 256.0,
        mac_low_light_strength: 0.75,
        mac_high_light_th1: 12000.0,
        mac_smooth_enable: true,
        mac_smooth_th1: 64.0,
        mac_smooth_dt: 6.0,
        mac_motion_dilation: 2.0,
        exp_ratio_max: 16.0,
    };
    HdrDataset {
        enable: true,
        control: ControlMethod::default(),
        hdr_aec_zones: split_hdr_aec(
            lux_aec(record(128.0), record(384.0)),
            lux_aec(record(256.0), record(768.0)),
        ),
    }
}

fn pdpc_dataset() -> PdpcDataset {
    let record = |scale: f32| PdpcRecord {
        fmax: 40.0 * scale,
        fmin: 30.0 * scale,
        bpc_offset: 64.0 * scale,
        bcc_offset: 32.0 * scale,
        fmax_flat: 48.0 * scale,
        fmin_flat: 36.0 * scale,
        bpc_offset_flat: 96.0 * scale,
        bcc_offset_flat: 48.0 * scale,
        dir_tk: 3.0,
        dir_offset: 128.0 * scale,
        flat_threshold: 0.25,
        fmax_gic: 12.0 * scale,
        bpc_offset_gic: 24.0 * scale,
        gic_thin_line_noise_offset: 40.0 * scale,
        gic_filter_strength: 0.5,
        saturation_threshold: 15000.0,
        use_same_channel_only: false,
        single_bpc_only: false,
        flat_detection_enable: true,
        directional_bpc_enable: true,
        noise_std_lut: std::array::from_fn(|i| (i as f32).sqrt() * 16.0 * scale),
    };
    let aec = |scale: f32| lux_aec(record(scale), record(scale * 1.5));
    PdpcDataset {
        enable_section: PdpcEnableSection {
            pdpc_enable: true,
            bpc_enable: true,
            gic_enable: true,
        },
        dynamic_enable: DynamicEnable::default(),
        control: ControlMethod::default(),
        drc_zones: split_drc(
            split_hdr_aec(aec(1.0), aec(1.1)),
            split_hdr_aec(aec(1.2), aec(1.3)),
        ),
    }
}

fn pdaf_layout() -> PdafLayout {
    PdafLayout {
        global_offset_x: 24,
        global_offset_y: 24,
        block_width: 16,
        block_height: 16,
        table_offset_x: 0,
        table_offset_y: 0,
        pixel_coords: (0..8).map(|i| (24 + 2 * i, 24 + 4 * i)).collect(),
    }
}

fn dump<R: Serialize>(path: &Path, registers: &R) -> Result<()> {
    let json = serde_json::to_string_pretty(registers)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("Register record written to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    info!(
        "Benchmarking {:?} over {} frames",
        args.module, args.iterations
    );

    let wb_gains = WhiteBalanceGains {
        r: 1.9,
        g: 1.0,
        b: 1.6,
    };

    match args.module {
        Block::Bls => {
            let dataset = bls_dataset();
            let mut module = BlackLevelModule::new(&dataset, config.bls.clone());
            let inputs: Vec<_> = lux_sweep(args.iterations).collect();
            let (timings, registers) = run(&mut module, &inputs)?;
            timings.report(BlackLevelModule::NAME);
            if let Some(path) = &args.dump {
                dump(path, &registers)?;
            }
        }
        Block::Hdr => {
            let dataset = hdr_dataset();
            let mut module = HdrMergeModule::new(&dataset, config.hdr.clone());
            let inputs: Vec<HdrInput> = lux_sweep(args.iterations)
                .map(|triggers| HdrInput {
                    triggers,
                    exposure_ratio: triggers.exposure_time,
                    black_level_offset: 64,
                    wb_gains,
                    zz_hdr_first_exposure: ZzHdrFirstExposure::Long,
                    zz_hdr_pattern: 0,
                })
                .collect();
            let (timings, registers) = run(&mut module, &inputs)?;
            timings.report(HdrMergeModule::NAME);
            if let Some(path) = &args.dump {
                dump::<hdr::HdrRegisters>(path, &registers)?;
            }
        }
        Block::Pdpc => {
            let dataset = pdpc_dataset();
            let mut module = DefectPixelModule::new(&dataset, config.pdpc.clone());
            let pdaf = pdaf_layout();
            let inputs: Vec<PdpcInput> = lux_sweep(args.iterations)
                .map(|triggers| PdpcInput {
                    triggers,
                    black_level_offset: 64,
                    wb_gains,
                    zz_hdr_enable: false,
                    zz_hdr_pattern: 0,
                    zz_hdr_first_exposure: ZzHdrFirstExposure::Long,
                    bayer_pattern: BayerPattern::Rggb,
                    hot_pixel_mode: HotPixelMode::Fast,
                    image_width: 4032,
                    image_height: 3024,
                    pdaf: pdaf.clone(),
                })
                .collect();
            let (timings, registers) = run(&mut module, &inputs)?;
            timings.report(DefectPixelModule::NAME);
            if let Some(path) = &args.dump {
                dump::<pdpc::PdpcRegisters>(path, &registers)?;
            }
        }
    }

    Ok(())
}
