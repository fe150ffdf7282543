//! Common calibration fixtures for iq-tuning integration tests

#![allow(dead_code)]

use iq_math::Region;
use iq_tuning::modules::bls::{BlsDataset, BlsRecord, CctTable};
use iq_tuning::modules::hdr::{HdrDataset, HdrInput, HdrRecord};
use iq_tuning::modules::pdpc::{
    BayerPattern, HotPixelMode, PdafLayout, PdpcDataset, PdpcEnableSection, PdpcInput, PdpcRecord,
};
use iq_tuning::modules::{AecRegion, HdrAecRegion, WhiteBalanceGains, Zone, ZzHdrFirstExposure};
use iq_tuning::trigger::{ControlMethod, DynamicEnable};
use iq_tuning::TriggerSnapshot;

/// Route engine logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn everywhere() -> Region {
    Region::new(0.0, f32::MAX)
}

pub fn snapshot(lux_index: f32) -> TriggerSnapshot {
    TriggerSnapshot {
        lux_index,
        real_gain: 1.0,
        exposure_time: 2.0,
        exposure_gain_ratio: 2.0,
        color_temperature: 5000.0,
        drc_gain: 1.0,
        ..Default::default()
    }
}

fn bls_record(offset: f32) -> BlsRecord {
    BlsRecord {
        offset,
        threshold_r: offset,
        threshold_gr: offset,
        threshold_gb: offset,
        threshold_b: offset,
    }
}

/// Black level calibration with touching lux zones `[0, 50]` and `[50, 100]`
/// at offsets 48 and 80.
pub fn bls_dataset() -> BlsDataset {
    let all = everywhere();
    let cct = |offset: f32| -> CctTable { vec![Zone::new(all, bls_record(offset))] };
    let aec = vec![
        Zone::new(AecRegion::new(Region::new(0.0, 50.0), all), cct(48.0)),
        Zone::new(AecRegion::new(Region::new(50.0, 100.0), all), cct(80.0)),
    ];
    BlsDataset {
        enable: true,
        control: ControlMethod::default(),
        led_sensitivity_trigger: Region::new(0.0, 1.0),
        drc_zones: vec![Zone::new(
            all,
            vec![Zone::new(HdrAecRegion::uniform(all), vec![aec])],
        )],
    }
}

pub fn hdr_record(strength: f32) -> HdrRecord {
    HdrRecord {
        rec_first_field: false,
        rec_hedge_threshold: 800.0,
        rec_edge_lpf_tap0: 1.0,
        mac_motion0_th1: 64.0,
        mac_motion0_th2: 128.0,
        mac_motion_strength: strength,
        mac_low_light_th1: 100.0,
        mac_low_light_strength: 0.5,
        mac_high_light_th1: 10000.0,
        mac_smooth_enable: true,
        mac_smooth_th1: 32.0,
        mac_smooth_dt: 3.0,
        mac_motion_dilation: 1.0,
        exp_ratio_max: 8.0,
    }
}

/// HDR calibration whose second exposure-ratio zone carries no AEC zones;
/// ratios at or beyond 16 cannot be resolved.
pub fn hdr_dataset_with_hole() -> HdrDataset {
    let aec = vec![
        Zone::new(
            AecRegion::new(Region::new(0.0, 100.0), everywhere()),
            hdr_record(0.25),
        ),
        Zone::new(
            AecRegion::new(Region::new(200.0, 300.0), everywhere()),
            hdr_record(0.75),
        ),
    ];
    HdrDataset {
        enable: true,
        control: ControlMethod::default(),
        hdr_aec_zones: vec![
            Zone::new(HdrAecRegion::uniform(Region::new(0.0, 8.0)), aec),
            Zone::new(HdrAecRegion::uniform(Region::new(16.0, 32.0)), Vec::new()),
        ],
    }
}

pub fn hdr_input(triggers: TriggerSnapshot, black_level_offset: u32) -> HdrInput {
    HdrInput {
        triggers,
        exposure_ratio: triggers.exposure_time,
        black_level_offset,
        wb_gains: WhiteBalanceGains::default(),
        zz_hdr_first_exposure: ZzHdrFirstExposure::Long,
        zz_hdr_pattern: 0,
    }
}

pub fn pdpc_record(bpc_offset: f32) -> PdpcRecord {
    PdpcRecord {
        fmax: 32.0,
        fmin: 24.0,
        bpc_offset,
        bcc_offset: bpc_offset / 2.0,
        fmax_flat: 40.0,
        fmin_flat: 30.0,
        bpc_offset_flat: bpc_offset,
        bcc_offset_flat: bpc_offset / 2.0,
        dir_tk: 4.0,
        dir_offset: 64.0,
        flat_threshold: 0.125,
        fmax_gic: 8.0,
        bpc_offset_gic: 16.0,
        gic_thin_line_noise_offset: 20.0,
        gic_filter_strength: 0.5,
        saturation_threshold: 16000.0,
        use_same_channel_only: false,
        single_bpc_only: true,
        flat_detection_enable: true,
        directional_bpc_enable: true,
        noise_std_lut: [bpc_offset; 64],
    }
}

pub fn pdpc_dataset() -> PdpcDataset {
    let all = everywhere();
    let aec = vec![
        Zone::new(AecRegion::new(Region::new(0.0, 50.0), all), pdpc_record(100.0)),
        Zone::new(AecRegion::new(Region::new(50.0, 100.0), all), pdpc_record(200.0)),
    ];
    PdpcDataset {
        enable_section: PdpcEnableSection {
            pdpc_enable: true,
            bpc_enable: true,
            gic_enable: true,
        },
        dynamic_enable: DynamicEnable::default(),
        control: ControlMethod::default(),
        drc_zones: vec![Zone::new(
            all,
            vec![Zone::new(HdrAecRegion::uniform(all), aec)],
        )],
    }
}

pub fn pdpc_input(triggers: TriggerSnapshot, black_level_offset: u32) -> PdpcInput {
    PdpcInput {
        triggers,
        black_level_offset,
        wb_gains: WhiteBalanceGains::default(),
        zz_hdr_enable: false,
        zz_hdr_pattern: 0,
        zz_hdr_first_exposure: ZzHdrFirstExposure::Long,
        bayer_pattern: BayerPattern::Rggb,
        hot_pixel_mode: HotPixelMode::HighQuality,
        image_width: 1920,
        image_height: 1080,
        pdaf: PdafLayout {
            global_offset_x: 0,
            global_offset_y: 0,
            block_width: 8,
            block_height: 8,
            table_offset_x: 0,
            table_offset_y: 0,
            pixel_coords: vec![(1, 1), (5, 3)],
        },
    }
}
