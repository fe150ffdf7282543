//! Frame-by-frame runs of the calibration blocks through their runners

mod common;

use common::{
    bls_dataset, hdr_dataset_with_hole, hdr_input, init_tracing, pdpc_dataset, pdpc_input,
    snapshot,
};
use iq_tuning::modules::bls::BlsSettings;
use iq_tuning::modules::hdr::HdrSettings;
use iq_tuning::modules::pdpc::PdpcSettings;
use iq_tuning::{
    BlackLevelModule, DefectPixelModule, EngineConfig, FailurePolicy, FrameOutcome,
    HdrMergeModule, ModuleRunner, TuningError,
};
use tempfile::TempDir;

#[test]
fn test_black_level_feeds_downstream_blocks() {
    init_tracing();
    let bls_data = bls_dataset();
    let pdpc_data = pdpc_dataset();
    let mut bls = ModuleRunner::new(
        BlackLevelModule::new(&bls_data, BlsSettings::default()),
        FailurePolicy::default(),
    );
    let mut pdpc = ModuleRunner::new(
        DefectPixelModule::new(&pdpc_data, PdpcSettings::default()),
        FailurePolicy::default(),
    );

    let triggers = snapshot(75.0);
    assert_eq!(bls.run_frame(&triggers), FrameOutcome::Recomputed);
    let bls_regs = bls.registers().unwrap().clone();
    // Touching zones [0, 50] and [50, 100]: lux 75 blends 48 and 80 evenly
    assert_eq!(bls_regs.offset, 64);
    assert_eq!(bls_regs.black_level_offset, 64);

    let input = pdpc_input(triggers, bls_regs.black_level_offset);
    assert_eq!(pdpc.run_frame(&input), FrameOutcome::Recomputed);
    let pdpc_regs = pdpc.registers().unwrap();
    assert_eq!(pdpc_regs.black_level, 64);
    assert_eq!(pdpc_regs.bpc_offset, 150);
    assert_eq!(pdpc_regs.noise_std_lut[0], 150);
    assert!(pdpc_regs.enables.enable);
}

#[test]
fn test_unchanged_triggers_reuse_registers() {
    init_tracing();
    let data = bls_dataset();
    let mut runner = ModuleRunner::new(
        BlackLevelModule::new(&data, BlsSettings::default()),
        FailurePolicy::default(),
    );

    assert_eq!(runner.run_frame(&snapshot(75.0)), FrameOutcome::Recomputed);
    assert_eq!(runner.run_frame(&snapshot(75.0)), FrameOutcome::Reused);
    assert_eq!(runner.registers().unwrap().offset, 64);

    assert_eq!(runner.run_frame(&snapshot(80.0)), FrameOutcome::Recomputed);
    // 48 + 32 * 0.6
    assert_eq!(runner.registers().unwrap().offset, 67);
}

#[test]
fn test_lut_bank_toggles_only_on_recompute() {
    let data = pdpc_dataset();
    let mut runner = ModuleRunner::new(
        DefectPixelModule::new(&data, PdpcSettings::default()),
        FailurePolicy::default(),
    );
    let frame = pdpc_input(snapshot(20.0), 0);

    runner.run_frame(&frame);
    let first = runner.registers().unwrap().lut_bank_select;
    assert_eq!(runner.run_frame(&frame), FrameOutcome::Reused);
    assert_eq!(runner.registers().unwrap().lut_bank_select, first);

    runner.run_frame(&pdpc_input(snapshot(30.0), 0));
    assert_ne!(runner.registers().unwrap().lut_bank_select, first);
}

#[test]
fn test_failed_frame_keeps_previous_registers() {
    init_tracing();
    let data = hdr_dataset_with_hole();
    let mut runner = ModuleRunner::new(
        HdrMergeModule::new(&data, HdrSettings::default()),
        FailurePolicy::KeepPrevious,
    );

    let good = hdr_input(snapshot(50.0), 64);
    assert_eq!(runner.run_frame(&good), FrameOutcome::Recomputed);
    let before = runner.registers().unwrap().clone();
    assert_eq!(before.exp_ratio, 2048);

    let mut bad_triggers = snapshot(50.0);
    bad_triggers.exposure_time = 20.0;
    let bad = hdr_input(bad_triggers, 64);
    assert_eq!(runner.run_frame(&bad), FrameOutcome::KeptPrevious);
    assert_eq!(runner.registers(), Some(&before));
    assert!(matches!(
        runner.last_error(),
        Some(TuningError::Locate { level: 1, .. })
    ));

    // The cache was cleared by the failure, so returning to the good
    // triggers recomputes rather than reusing
    assert_eq!(runner.run_frame(&good), FrameOutcome::Recomputed);
    assert!(runner.last_error().is_none());
}

#[test]
fn test_disable_policy_turns_block_off() {
    let data = hdr_dataset_with_hole();
    let mut runner = ModuleRunner::new(
        HdrMergeModule::new(&data, HdrSettings::default()),
        FailurePolicy::DisableBlock,
    );
    runner.run_frame(&hdr_input(snapshot(50.0), 0));

    let mut triggers = snapshot(50.0);
    // Between the zones: the blend needs the empty second zone
    triggers.exposure_time = 12.0;
    assert_eq!(
        runner.run_frame(&hdr_input(triggers, 0)),
        FrameOutcome::Disabled
    );
    assert!(runner.registers().is_none());
}

#[test]
fn test_engine_config_file_drives_runners() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(
        &path,
        r#"{ "failure_policy": "disable_block", "bls": { "module_enable": false } }"#,
    )
    .unwrap();
    let config = EngineConfig::load_from_file(&path).unwrap();

    let data = bls_dataset();
    let mut runner = ModuleRunner::new(
        BlackLevelModule::new(&data, config.bls.clone()),
        config.failure_policy,
    );
    assert_eq!(runner.policy(), FailurePolicy::DisableBlock);
    assert_eq!(runner.run_frame(&snapshot(75.0)), FrameOutcome::Recomputed);

    let regs = runner.registers().unwrap();
    assert!(!regs.enable);
    assert_eq!(regs.black_level_offset, 0);
}

#[test]
fn test_disabled_defect_pixel_block_ignores_calibration() {
    init_tracing();
    let mut data = pdpc_dataset();
    data.drc_zones.clear();
    let settings = PdpcSettings {
        module_enable: false,
    };
    let mut runner = ModuleRunner::new(
        DefectPixelModule::new(&data, settings),
        FailurePolicy::DisableBlock,
    );

    assert_eq!(
        runner.run_frame(&pdpc_input(snapshot(20.0), 0)),
        FrameOutcome::Recomputed
    );
    assert_eq!(
        runner.run_frame(&pdpc_input(snapshot(30.0), 0)),
        FrameOutcome::Recomputed
    );
    let regs = runner.registers().unwrap();
    assert!(!regs.enables.enable);
    assert_eq!(regs.lut_bank_select, 0);
    assert!(runner.last_error().is_none());
}

#[test]
fn test_register_dump_json() {
    let data = pdpc_dataset();
    let mut runner = ModuleRunner::new(
        DefectPixelModule::new(&data, PdpcSettings::default()),
        FailurePolicy::default(),
    );
    runner.run_frame(&pdpc_input(snapshot(25.0), 32));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pdpc.json");
    let json = serde_json::to_string_pretty(runner.registers().unwrap()).unwrap();
    std::fs::write(&path, json).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["black_level"], 32);
    assert_eq!(value["enables"]["pdpc"], true);
    assert_eq!(value["noise_std_lut"].as_array().unwrap().len(), 64);
    // (1, 1) and (5, 3) in 8x8 blocks
    assert_eq!(value["pdaf_mask"][1], 1 << 1);
    assert_eq!(value["pdaf_mask"][3], 1 << 5);
}
