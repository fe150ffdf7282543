//! Per-frame driver for one module instance.
//!
//! [`ModuleRunner`] pairs a module with its change detector and the last
//! register record it produced. Each frame either reuses that record, runs
//! the full build/merge/pack path, or applies the configured
//! [`FailurePolicy`] when the calculation fails.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::TuningError;
use crate::modules::IqModule;
use crate::trigger::ChangeDetector;

/// What to emit when a frame's calculation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep programming the last good registers
    #[default]
    KeepPrevious,
    /// Drop the cached registers and turn the block off
    DisableBlock,
}

/// How the registers of a frame were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameOutcome {
    /// Triggers moved; the record was rebuilt
    Recomputed,
    /// Triggers unchanged; the cached record stands
    Reused,
    /// Calculation failed; the previous record stands
    KeptPrevious,
    /// Calculation failed; the block is off until a frame succeeds
    Disabled,
}

impl FrameOutcome {
    /// True when the frame's registers are the product of a failure fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(self, FrameOutcome::KeptPrevious | FrameOutcome::Disabled)
    }
}

/// Drives a module for one camera session.
pub struct ModuleRunner<M: IqModule> {
    module: M,
    detector: ChangeDetector<M::Input>,
    registers: Option<M::Registers>,
    policy: FailurePolicy,
    last_error: Option<TuningError>,
}

impl<M: IqModule> ModuleRunner<M> {
    pub fn new(module: M, policy: FailurePolicy) -> Self {
        Self {
            module,
            detector: ChangeDetector::new(),
            registers: None,
            policy,
            last_error: None,
        }
    }

    /// Produce the register record for one frame.
    ///
    /// A failed calculation invalidates the trigger cache, so the following
    /// frame recomputes even if its inputs match the failed ones.
    pub fn run_frame(&mut self, input: &M::Input) -> FrameOutcome {
        if !self.detector.update(input) && self.registers.is_some() {
            debug!(module = M::NAME, "Triggers unchanged, reusing registers");
            return FrameOutcome::Reused;
        }

        match self.module.calculate(input) {
            Ok(registers) => {
                self.registers = Some(registers);
                self.last_error = None;
                debug!(module = M::NAME, "Registers recomputed");
                FrameOutcome::Recomputed
            }
            Err(e) => {
                error!(module = M::NAME, "Register calculation failed: {e}");
                self.detector.invalidate();
                self.last_error = Some(e);
                self.fallback()
            }
        }
    }

    fn fallback(&mut self) -> FrameOutcome {
        match self.policy {
            FailurePolicy::KeepPrevious if self.registers.is_some() => {
                warn!(module = M::NAME, "Keeping previous registers");
                FrameOutcome::KeptPrevious
            }
            FailurePolicy::KeepPrevious => {
                warn!(module = M::NAME, "No previous registers, disabling block");
                FrameOutcome::Disabled
            }
            FailurePolicy::DisableBlock => {
                warn!(module = M::NAME, "Disabling block");
                self.registers = None;
                FrameOutcome::Disabled
            }
        }
    }

    /// Registers to program this frame; `None` while the block is disabled.
    pub fn registers(&self) -> Option<&M::Registers> {
        self.registers.as_ref()
    }

    /// Error from the most recent frame, cleared by the next success.
    pub fn last_error(&self) -> Option<&TuningError> {
        self.last_error.as_ref()
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    /// Force the next frame to recompute.
    pub fn reset(&mut self) {
        self.detector.invalidate();
    }
}
