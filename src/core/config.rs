//! Cavern configuration with documented constants
//!
//! All tunables are collected here with explanations of their purpose
//! and how they interact with each other. Every section defaults, so a
//! TOML file only needs to name the values it overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::{CavernError, Result};
use crate::spawning::rule::SpawnRule;

/// Instability accrual and phase thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Ticks of loss that correspond to a fraction of 1.0
    ///
    /// At the default (900_000), an unattended cavern reaches partial
    /// collapse after 450_000 ticks and full collapse after 900_000.
    pub duration_ticks: u64,

    /// Extra accrual per occupant (1 + occupants * factor)
    pub occupant_factor: f64,

    /// Amount subtracted from the per-tick delta while a powered
    /// stabilizer is present
    pub stabilizer_reduction: f64,

    /// Fraction of the duration after which a stabilizer can only freeze
    /// accrual instead of rolling it back
    pub stabilizer_lock_fraction: f64,

    /// Fraction at which partial collapse begins
    pub partial_threshold: f32,

    /// Fraction at which full collapse begins
    pub full_threshold: f32,

    /// Fraction above which occupants no longer protect a collapsing cell
    pub forced_collapse_fraction: f32,

    /// Loss added every time a mining job completes inside the cavern
    pub mining_burst_ticks: u64,

    /// Probability that a completed mining job shows a flavor effect
    pub mining_flavor_chance: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            duration_ticks: 900_000,
            occupant_factor: 0.25,
            stabilizer_reduction: 3.0,
            stabilizer_lock_fraction: 1.0 / 3.0,
            partial_threshold: 0.5,
            full_threshold: 1.0,
            forced_collapse_fraction: 1.5,
            mining_burst_ticks: 250,
            mining_flavor_chance: 0.3,
        }
    }
}

/// Budgets and cadences of the collapse process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseConfig {
    /// Cells classified per refresh step
    ///
    /// A 250x250 cavern (62_500 cells) is fully covered after 125 steps.
    pub refresh_budget: usize,

    /// Working-set members re-checked per validation step
    pub validate_budget: usize,

    /// Budget multiplier applied while in full collapse
    pub full_collapse_budget_multiplier: usize,

    /// Ticks between obstruction placements during partial collapse
    pub partial_interval: u64,

    /// Placement interval when full collapse begins
    pub full_interval_max: u64,

    /// Placement interval once the forced-collapse fraction is reached
    pub full_interval_min: u64,

    /// Cells obstructed per invocation during full collapse
    pub full_collapse_batch: usize,

    /// A cell with at most this many obstructed neighbors counts as "open"
    pub open_neighbor_limit: usize,

    /// Working-set members sampled per full-collapse invocation
    pub sample_size: usize,

    /// Picks attempted before an invocation gives up
    pub max_pick_attempts: usize,

    /// Ticks an adjacency memo stays valid before a refresh drops it
    pub adjacency_lifetime: u64,

    /// Ticks between coverage checks during partial collapse
    pub coverage_check_interval: u64,

    /// Ticks between coverage checks during full collapse
    pub full_coverage_check_interval: u64,

    /// Remaining walkable share below which the cavern is destroyed
    pub min_walkable_coverage: f32,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            refresh_budget: 500,
            validate_budget: 200,
            full_collapse_budget_multiplier: 3,
            partial_interval: 120,
            full_interval_max: 30,
            full_interval_min: 15,
            full_collapse_batch: 5,
            open_neighbor_limit: 3,
            sample_size: 48,
            max_pick_attempts: 8,
            adjacency_lifetime: 2_500,
            coverage_check_interval: 600,
            full_coverage_check_interval: 120,
            min_walkable_coverage: 0.2,
        }
    }
}

/// Anchor the collapse keeps its distance from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvoidanceMode {
    /// Keep the area around the exit open
    Exit,
    /// Keep the area around the grid center open
    Center,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    pub mode: AvoidanceMode,
    /// Radius in cells; zero disables avoidance
    pub radius: f32,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            mode: AvoidanceMode::Exit,
            radius: 6.0,
        }
    }
}

/// One ambient-effect bracket: active from `min_fraction` up to the next
/// bracket's threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectBracket {
    pub min_fraction: f32,
    /// Ticks between effects while the bracket is active
    pub interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Brackets ordered by ascending `min_fraction`
    pub brackets: Vec<EffectBracket>,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            brackets: vec![
                EffectBracket { min_fraction: 0.25, interval: 3_000 },
                EffectBracket { min_fraction: 0.5, interval: 1_500 },
                EffectBracket { min_fraction: 0.75, interval: 700 },
                EffectBracket { min_fraction: 1.0, interval: 250 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Ticks between structure/occupant detection polls
    pub interval: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { interval: 300 }
    }
}

/// Spawn engine settings and the rule list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawningConfig {
    /// Ticks between valid-spawn-cell sweeps
    pub refresh_interval: u64,
    /// Cells classified per tick while a sweep is running
    pub refresh_budget: usize,
    pub exit_avoid_radius: f32,
    pub center_avoid_radius: f32,
    pub colonist_avoid_radius: f32,
    /// Placement attempts near the batch leader before falling back
    pub cluster_attempts: usize,
    pub rules: Vec<SpawnRule>,
}

impl Default for SpawningConfig {
    fn default() -> Self {
        Self {
            refresh_interval: 600,
            refresh_budget: 500,
            exit_avoid_radius: 10.0,
            center_avoid_radius: 0.0,
            colonist_avoid_radius: 12.0,
            cluster_attempts: 12,
            rules: Vec::new(),
        }
    }
}

/// Complete cavern configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CavernConfig {
    pub stability: StabilityConfig,
    pub collapse: CollapseConfig,
    pub avoidance: AvoidanceConfig,
    pub effects: EffectsConfig,
    pub detection: DetectionConfig,
    pub spawning: SpawningConfig,
}

impl CavernConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CavernConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let s = &self.stability;
        if s.duration_ticks == 0 {
            return Err(CavernError::InvalidConfig("duration_ticks must be positive".into()));
        }
        if !(s.partial_threshold > 0.0 && s.partial_threshold < s.full_threshold) {
            return Err(CavernError::InvalidConfig(format!(
                "partial_threshold ({}) must be in (0, full_threshold ({}))",
                s.partial_threshold, s.full_threshold
            )));
        }
        if s.forced_collapse_fraction < s.full_threshold {
            return Err(CavernError::InvalidConfig(format!(
                "forced_collapse_fraction ({}) should be >= full_threshold ({})",
                s.forced_collapse_fraction, s.full_threshold
            )));
        }
        if s.stabilizer_lock_fraction < 0.0
            || s.stabilizer_lock_fraction > s.partial_threshold as f64
        {
            return Err(CavernError::InvalidConfig(format!(
                "stabilizer_lock_fraction ({:.3}) must be in [0, partial_threshold]",
                s.stabilizer_lock_fraction
            )));
        }
        if !(0.0..=1.0).contains(&s.mining_flavor_chance) {
            return Err(CavernError::InvalidConfig("mining_flavor_chance must be in [0, 1]".into()));
        }

        let c = &self.collapse;
        if c.refresh_budget == 0 || c.validate_budget == 0 {
            return Err(CavernError::InvalidConfig("collapse budgets must be positive".into()));
        }
        if c.partial_interval == 0 || c.full_interval_min == 0 {
            return Err(CavernError::InvalidConfig("collapse intervals must be positive".into()));
        }
        if c.full_interval_min > c.full_interval_max {
            return Err(CavernError::InvalidConfig(format!(
                "full_interval_min ({}) should be <= full_interval_max ({})",
                c.full_interval_min, c.full_interval_max
            )));
        }
        if !(0.0..=1.0).contains(&c.min_walkable_coverage) {
            return Err(CavernError::InvalidConfig("min_walkable_coverage must be in [0, 1]".into()));
        }

        if self
            .effects
            .brackets
            .windows(2)
            .any(|w| w[0].min_fraction >= w[1].min_fraction)
        {
            return Err(CavernError::InvalidConfig(
                "effect brackets must have ascending min_fraction".into(),
            ));
        }
        if self.effects.brackets.iter().any(|b| b.interval == 0) {
            return Err(CavernError::InvalidConfig("effect intervals must be positive".into()));
        }

        if self.detection.interval == 0 || self.spawning.refresh_budget == 0 {
            return Err(CavernError::InvalidConfig(
                "detection interval and spawn refresh budget must be positive".into(),
            ));
        }

        let mut ids = std::collections::BTreeSet::new();
        for rule in &self.spawning.rules {
            rule.validate()?;
            if !ids.insert(rule.id.as_str()) {
                return Err(CavernError::InvalidConfig(format!(
                    "duplicate spawn rule id '{}'",
                    rule.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CavernConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CavernConfig::from_toml_str(
            r#"
            [stability]
            duration_ticks = 36000

            [avoidance]
            mode = "center"
            "#,
        )
        .expect("valid config");
        assert_eq!(config.stability.duration_ticks, 36_000);
        assert_eq!(config.stability.partial_threshold, 0.5);
        assert_eq!(config.avoidance.mode, AvoidanceMode::Center);
        assert_eq!(config.collapse.full_collapse_batch, 5);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = CavernConfig::default();
        config.stability.partial_threshold = 1.2;
        assert!(matches!(config.validate(), Err(CavernError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unordered_brackets() {
        let mut config = CavernConfig::default();
        config.effects.brackets.swap(0, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = CavernConfig::from_toml_str(include_str!("../../data/cavern.toml"))
            .expect("shipped config is valid");
        assert_eq!(config.stability.duration_ticks, 120_000);
        assert_eq!(config.effects.brackets.len(), 4);
        let ids: Vec<&str> = config.spawning.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["insects", "cave_fauna"]);
        assert_eq!(config.spawning.rules[0].pool.len(), 3);
    }

    #[test]
    fn test_rejects_zero_duration() {
        let mut config = CavernConfig::default();
        config.stability.duration_ticks = 0;
        assert!(config.validate().is_err());
    }
}
