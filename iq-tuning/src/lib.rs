//! iq-tuning - calibration-tree interpolation for ISP register settings
//!
//! For every frame, each hardware block walks its nested calibration tables
//! with the current trigger values, blends the bracketing records and packs
//! the result into register fields.
//!
//! - **Tree** - level-driven tree build and bottom-up merge
//! - **Trigger** - per-frame signals and change detection
//! - **Modules** - HDR merge, defect pixel and black level blocks
//! - **Runner** - reuse, recompute and failure fallback per frame
//! - **Config** - JSON session configuration

pub mod config;
pub mod error;
pub mod interpolate;
pub mod modules;
pub mod runner;
pub mod tree;
pub mod trigger;

pub use config::EngineConfig;
pub use error::TuningError;
pub use interpolate::{interpolate, FieldInterpolate};
pub use modules::bls::BlackLevelModule;
pub use modules::hdr::HdrMergeModule;
pub use modules::pdpc::DefectPixelModule;
pub use modules::IqModule;
pub use runner::{FailurePolicy, FrameOutcome, ModuleRunner};
pub use trigger::{ChangeDetector, TriggerSet, TriggerSnapshot};
