//! Save/load of a cavern's runtime state
//!
//! The snapshot holds everything the controller needs to resume exactly
//! where it stopped: instability, phase, every cache and cursor, all timers,
//! the detection results and the RNG stream. Configuration and the host
//! environment are supplied again on restore.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::collapse::{StabilityInputs, StabilityStateMachine};
use crate::core::error::Result;
use crate::core::types::{HostId, Tick};
use crate::spawning::SpawnScalingEngine;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CavernSnapshot {
    pub host: HostId,
    pub stability: StabilityStateMachine,
    pub spawning: SpawnScalingEngine,
    pub rng: ChaCha8Rng,
    pub detection: StabilityInputs,
    pub next_detection: Tick,
}

impl CavernSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
