//! Spawn rules loaded from configuration
//!
//! A rule is one independently timed spawn policy. Its timer lives in the
//! engine keyed by `id`, so editing any other field of a rule between saves
//! keeps the schedule intact.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::error::{CavernError, Result};
use crate::core::types::CreatureKind;

/// One entry of a rule's creature pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedCreature {
    pub kind: CreatureKind,
    #[serde(default = "default_one")]
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRule {
    /// Stable key for the rule's timer
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub pool: Vec<WeightedCreature>,
    /// Baseline [min, max] individuals per batch at fraction 0.5
    #[serde(default = "default_count")]
    pub count: [u32; 2],
    /// Baseline ticks between checks at fraction 0.5
    pub baseline_interval: u64,
    /// Curve exponent; 1.0 is linear in the fraction
    #[serde(default = "default_one")]
    pub scaling_factor: f32,
    /// Inclusive [min, max] fraction window in which the rule can fire
    #[serde(default = "default_activation")]
    pub activation: [f32; 2],
    /// Probability that a due check spawns at all
    #[serde(default = "default_one")]
    pub spawn_chance: f32,
    /// Followers land within this many cells of the batch's first spawn
    #[serde(default)]
    pub spawn_radius: f32,
    /// Per-individual chance to spawn hostile (kinds that support it)
    #[serde(default)]
    pub hostile_chance: f32,
}

fn default_one() -> f32 {
    1.0
}

fn default_count() -> [u32; 2] {
    [1, 1]
}

fn default_activation() -> [f32; 2] {
    [0.0, f32::MAX]
}

impl SpawnRule {
    pub fn new(id: impl Into<String>, baseline_interval: u64) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            pool: Vec::new(),
            count: default_count(),
            baseline_interval,
            scaling_factor: 1.0,
            activation: default_activation(),
            spawn_chance: 1.0,
            spawn_radius: 0.0,
            hostile_chance: 0.0,
        }
    }

    pub fn with_creature(mut self, kind: impl Into<String>, weight: f32) -> Self {
        self.pool.push(WeightedCreature {
            kind: CreatureKind::new(kind),
            weight,
        });
        self
    }

    pub fn with_count(mut self, min: u32, max: u32) -> Self {
        self.count = [min, max];
        self
    }

    pub fn with_activation(mut self, min: f32, max: f32) -> Self {
        self.activation = [min, max];
        self
    }

    pub fn with_scaling_factor(mut self, factor: f32) -> Self {
        self.scaling_factor = factor;
        self
    }

    pub fn with_spawn_chance(mut self, chance: f32) -> Self {
        self.spawn_chance = chance;
        self
    }

    pub fn with_spawn_radius(mut self, radius: f32) -> Self {
        self.spawn_radius = radius;
        self
    }

    pub fn with_hostile_chance(mut self, chance: f32) -> Self {
        self.hostile_chance = chance;
        self
    }

    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// True when the fraction lies inside the activation window
    pub fn is_active(&self, fraction: f32) -> bool {
        fraction >= self.activation[0] && fraction <= self.activation[1]
    }

    /// Weighted draw from the pool; None if the pool is empty or weightless
    pub fn pick_kind<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&CreatureKind> {
        let weights = self.pool.iter().map(|c| c.weight.max(0.0));
        let index = WeightedIndex::new(weights).ok()?;
        Some(&self.pool[index.sample(rng)].kind)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(CavernError::InvalidConfig(format!("rule '{}': {}", self.id, msg)));
        if self.id.is_empty() {
            return Err(CavernError::InvalidConfig("spawn rule id must not be empty".into()));
        }
        if self.baseline_interval == 0 {
            return fail("baseline_interval must be positive".into());
        }
        if self.count[0] > self.count[1] {
            return fail(format!("count min {} exceeds max {}", self.count[0], self.count[1]));
        }
        if self.activation[0] > self.activation[1] {
            return fail("activation window is inverted".into());
        }
        if !(self.scaling_factor > 0.0) {
            return fail("scaling_factor must be positive".into());
        }
        for (name, p) in [("spawn_chance", self.spawn_chance), ("hostile_chance", self.hostile_chance)] {
            if !(0.0..=1.0).contains(&p) {
                return fail(format!("{} must be in [0, 1]", name));
            }
        }
        if self.pool.iter().any(|c| c.weight < 0.0) {
            return fail("pool weights must not be negative".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_activation_window_inclusive() {
        let rule = SpawnRule::new("r", 100).with_activation(0.3, 0.9);
        assert!(!rule.is_active(0.29));
        assert!(rule.is_active(0.3));
        assert!(rule.is_active(0.9));
        assert!(!rule.is_active(0.91));
    }

    #[test]
    fn test_pick_kind_respects_weights() {
        let rule = SpawnRule::new("r", 100)
            .with_creature("never", 0.0)
            .with_creature("always", 2.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(rule.pick_kind(&mut rng).unwrap().as_str(), "always");
        }
    }

    #[test]
    fn test_empty_pool_picks_nothing() {
        let rule = SpawnRule::new("r", 100);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(rule.pick_kind(&mut rng).is_none());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        assert!(SpawnRule::new("r", 100).with_count(3, 1).validate().is_err());
        assert!(SpawnRule::new("r", 0).validate().is_err());
        assert!(SpawnRule::new("r", 10).with_spawn_chance(1.5).validate().is_err());
        assert!(SpawnRule::new("r", 10).with_scaling_factor(0.0).validate().is_err());
        assert!(SpawnRule::new("r", 10).validate().is_ok());
    }

    #[test]
    fn test_rule_from_toml() {
        let rule: SpawnRule = toml::from_str(
            r#"
            id = "insects"
            label = "Insect swarm"
            count = [2, 4]
            baseline_interval = 5000
            activation = [0.2, 1.5]
            pool = [
                { kind = "megaspider", weight = 1.0 },
                { kind = "spelopede", weight = 3.0 },
            ]
            "#,
        )
        .expect("valid rule");
        assert_eq!(rule.count, [2, 4]);
        assert_eq!(rule.pool.len(), 2);
        assert_eq!(rule.scaling_factor, 1.0);
        assert_eq!(rule.display_name(), "Insect swarm");
        assert!(rule.validate().is_ok());
    }
}
