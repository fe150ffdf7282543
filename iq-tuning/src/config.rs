use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TuningError;
use crate::modules::bls::BlsSettings;
use crate::modules::hdr::HdrSettings;
use crate::modules::pdpc::PdpcSettings;
use crate::runner::FailurePolicy;

/// Session-wide engine configuration.
///
/// Missing keys take their defaults, so a partial file overrides only what
/// it names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fallback applied by every module runner when a frame fails
    pub failure_policy: FailurePolicy,
    pub hdr: HdrSettings,
    pub pdpc: PdpcSettings,
    pub bls: BlsSettings,
}

impl EngineConfig {
    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), TuningError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, TuningError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
