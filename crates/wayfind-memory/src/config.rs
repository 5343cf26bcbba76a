//! Tunables of the evidence model.

use serde::{Deserialize, Serialize};
use wayfind_types::NavError;

/// Every numeric threshold used by [`RouteMemory`][crate::RouteMemory].
///
/// Deserializes from a TOML `[memory]` table; any field left out keeps its
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Per-tick multiplicative decay applied to all evidence (default `0.90`).
    pub momentum: f32,
    /// Lower clip bound for evidence, also the value a consumed match resets
    /// to (default `-1.0`).
    pub evidence_floor: f32,
    /// Upper clip bound for evidence after decay (default `0.30`).
    pub evidence_ceiling: f32,
    /// Evidence must strictly exceed this to declare a match (default `0.99`).
    pub match_threshold: f32,
    /// Evidence added per passed outlier test per image (default `0.1`).
    pub criterion_weight: f32,
    /// Weight of the unclipped nearest-image bonus (default `1.1`).
    pub bonus_weight: f32,
    /// Added to the mean distance before dividing by it (default `1e-6`).
    pub epsilon: f32,
    /// Consistency constant for the median absolute deviation
    /// (default `1.4826`).
    pub mad_scale: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            momentum: 0.90,
            evidence_floor: -1.0,
            evidence_ceiling: 0.30,
            match_threshold: 0.99,
            criterion_weight: 0.1,
            bonus_weight: 1.1,
            epsilon: 1e-6,
            mad_scale: 1.4826,
        }
    }
}

impl MemoryConfig {
    /// Reject settings the evidence model cannot run with.
    pub fn validate(&self) -> Result<(), NavError> {
        if !(self.evidence_floor <= self.evidence_ceiling) {
            return Err(NavError::Config(format!(
                "memory.evidence_floor ({}) must not exceed memory.evidence_ceiling ({})",
                self.evidence_floor, self.evidence_ceiling
            )));
        }
        if !(self.momentum > 0.0 && self.momentum <= 1.0) {
            return Err(NavError::Config(format!(
                "memory.momentum ({}) must be in (0, 1]",
                self.momentum
            )));
        }
        Ok(())
    }
}
