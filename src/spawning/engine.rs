//! Instability-scaled spawn scheduling
//!
//! Every rule owns a timer keyed by its id. When a timer comes due the rule
//! is checked once: inside its activation window a Bernoulli trial decides
//! whether a batch spawns, and the batch size scales with instability.
//! Whatever the outcome, the timer is rescheduled from the current fraction.
//!
//! Timers are created lazily on the first tick the grid is ready, one
//! scaled interval ahead, so a freshly opened cavern never spawns at once.
//! Timers of rules no longer in the configuration are dropped.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::config::CavernConfig;
use crate::core::types::{CellCoord, CreatureKind, EntityId, Tick};
use crate::environment::{CavernGrid, CreatureSpawner, Occupants};
use crate::spawning::rule::SpawnRule;
use crate::spawning::scaling::{count_multiplier, next_interval, sample_count};
use crate::spawning::spawn_cells::{SpawnCellFilter, ValidSpawnCellCache};

/// Picks tried from the cell cache before a placement gives up
const CACHE_PICK_ATTEMPTS: usize = 8;

/// A creature the engine placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnedEntity {
    pub rule_id: String,
    pub id: EntityId,
    pub kind: CreatureKind,
    pub cell: CellCoord,
    pub hostile: bool,
}

/// Outcome of one due rule check
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCheck {
    pub rule_id: String,
    /// Batch size requested; zero when the rule did not fire
    pub requested: u32,
    pub next_check: Tick,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnReport {
    pub checks: Vec<RuleCheck>,
    pub spawned: Vec<SpawnedEntity>,
    /// Individual spawns that failed (unknown kind, service error, no cell)
    pub failures: usize,
}

/// Per-tick working state shared by the due rules
struct SpawnPass {
    filter: SpawnCellFilter,
    cluster_attempts: usize,
    report: SpawnReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnScalingEngine {
    timers: BTreeMap<String, Tick>,
    cells: ValidSpawnCellCache,
    exit: Option<CellCoord>,
    exit_resolved: bool,
}

impl SpawnScalingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_check(&self, rule_id: &str) -> Option<Tick> {
        self.timers.get(rule_id).copied()
    }

    pub fn timers(&self) -> &BTreeMap<String, Tick> {
        &self.timers
    }

    pub fn spawn_cells(&self) -> &ValidSpawnCellCache {
        &self.cells
    }

    /// Advance the cell sweep and check every due rule in config order
    pub fn tick<E, R>(
        &mut self,
        now: Tick,
        fraction: f32,
        config: &CavernConfig,
        env: &mut E,
        rng: &mut R,
    ) -> SpawnReport
    where
        E: CavernGrid + Occupants + CreatureSpawner + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = SpawnReport::default();
        if !env.is_ready() {
            return report;
        }

        let rules = &config.spawning.rules;
        self.timers
            .retain(|id, _| rules.iter().any(|rule| rule.id == *id));
        for rule in rules {
            self.timers
                .entry(rule.id.clone())
                .or_insert_with(|| now + next_interval(rule.baseline_interval, fraction, rule.scaling_factor));
        }

        let any_due = rules.iter().any(|r| self.timers.get(&r.id).is_some_and(|t| now >= *t));
        if !any_due && !self.cells.is_due(now) {
            return report;
        }

        self.resolve_exit(&*env);
        let filter = SpawnCellFilter::from_env(&config.spawning, self.exit, &*env);
        self.cells.update(now, &config.spawning, &filter, &*env);

        if any_due {
            let mut pass = SpawnPass {
                filter,
                cluster_attempts: config.spawning.cluster_attempts,
                report,
            };
            for rule in rules {
                if self.timers.get(&rule.id).is_some_and(|t| now >= *t) {
                    let check = self.check_rule(rule, now, fraction, &mut pass, env, rng);
                    pass.report.checks.push(check);
                }
            }
            report = pass.report;
        }
        report
    }

    fn check_rule<E, R>(
        &mut self,
        rule: &SpawnRule,
        now: Tick,
        fraction: f32,
        pass: &mut SpawnPass,
        env: &mut E,
        rng: &mut R,
    ) -> RuleCheck
    where
        E: CavernGrid + Occupants + CreatureSpawner + ?Sized,
        R: Rng + ?Sized,
    {
        let mut requested = 0;
        if rule.is_active(fraction) && rng.gen_bool(rule.spawn_chance.clamp(0.0, 1.0) as f64) {
            requested = sample_count(rng, rule.count, count_multiplier(fraction, rule.scaling_factor));
            self.spawn_batch(rule, requested, pass, env, rng);
        }

        let next_check = now + next_interval(rule.baseline_interval, fraction, rule.scaling_factor);
        self.timers.insert(rule.id.clone(), next_check);
        tracing::debug!(
            "Spawn rule '{}' checked at {} (fraction {:.3}): {} requested, next at {}",
            rule.display_name(),
            now,
            fraction,
            requested,
            next_check
        );
        RuleCheck {
            rule_id: rule.id.clone(),
            requested,
            next_check,
        }
    }

    fn spawn_batch<E, R>(
        &mut self,
        rule: &SpawnRule,
        count: u32,
        pass: &mut SpawnPass,
        env: &mut E,
        rng: &mut R,
    ) where
        E: CavernGrid + Occupants + CreatureSpawner + ?Sized,
        R: Rng + ?Sized,
    {
        let mut placed: Vec<CellCoord> = Vec::new();
        for _ in 0..count {
            let Some(kind) = rule.pick_kind(rng) else {
                tracing::debug!("Spawn rule '{}' has no weighted creatures", rule.display_name());
                return;
            };
            let profile = match env.creature_profile(kind) {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!("Skipping spawn for rule '{}': {}", rule.display_name(), e);
                    pass.report.failures += 1;
                    continue;
                }
            };

            let clustered = placed.first().and_then(|&leader| {
                Self::pick_near(leader, rule.spawn_radius, &placed, pass, &*env, rng)
            });
            let Some(cell) =
                clustered.or_else(|| self.cells.pick(&pass.filter, &*env, rng, CACHE_PICK_ATTEMPTS))
            else {
                tracing::debug!("No valid spawn cell left for rule '{}'", rule.display_name());
                pass.report.failures += 1;
                return;
            };

            let hostile = profile.can_be_hostile
                && rule.hostile_chance > 0.0
                && rng.gen_bool(rule.hostile_chance.clamp(0.0, 1.0) as f64);

            match env.spawn_creature(kind, cell, hostile) {
                Ok(id) => {
                    placed.push(cell);
                    self.cells.evict(cell);
                    pass.report.spawned.push(SpawnedEntity {
                        rule_id: rule.id.clone(),
                        id,
                        kind: kind.clone(),
                        cell,
                        hostile,
                    });
                }
                Err(e) => {
                    tracing::warn!("Spawn of {} at {} failed: {}", kind, cell, e);
                    pass.report.failures += 1;
                }
            }
        }
    }

    /// Random free cell within `radius` of the batch leader
    fn pick_near<E, R>(
        leader: CellCoord,
        radius: f32,
        placed: &[CellCoord],
        pass: &SpawnPass,
        env: &E,
        rng: &mut R,
    ) -> Option<CellCoord>
    where
        E: CavernGrid + Occupants + ?Sized,
        R: Rng + ?Sized,
    {
        if radius < 1.0 {
            return None;
        }
        let reach = radius.floor() as i32;
        for _ in 0..pass.cluster_attempts {
            let cell = CellCoord::new(
                leader.x + rng.gen_range(-reach..=reach),
                leader.y + rng.gen_range(-reach..=reach),
            );
            if cell.within_radius(&leader, radius)
                && !placed.contains(&cell)
                && pass.filter.accepts(env, cell)
            {
                return Some(cell);
            }
        }
        None
    }

    fn resolve_exit<E: CavernGrid + ?Sized>(&mut self, env: &E) {
        if self.exit_resolved {
            return;
        }
        match env.find_exit() {
            Ok(exit) => {
                self.exit = exit;
                self.exit_resolved = true;
            }
            Err(e) => tracing::warn!("Exit lookup failed for spawn placement: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemoryCavern;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config_with(rule: SpawnRule) -> CavernConfig {
        let mut config = CavernConfig::default();
        config.spawning.exit_avoid_radius = 0.0;
        config.spawning.colonist_avoid_radius = 0.0;
        config.spawning.refresh_budget = 10_000;
        config.spawning.rules.push(rule);
        config
    }

    fn cavern() -> MemoryCavern {
        let mut env = MemoryCavern::new(24, 24);
        env.register_creature("spider", true);
        env.register_creature("rat", false);
        env
    }

    #[test]
    fn test_timer_created_one_interval_ahead() {
        let config = config_with(SpawnRule::new("rats", 1_000).with_creature("rat", 1.0));
        let mut env = cavern();
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let report = engine.tick(100, 0.5, &config, &mut env, &mut rng);
        assert!(report.checks.is_empty());
        assert_eq!(engine.next_check("rats"), Some(1_100));
    }

    #[test]
    fn test_due_rule_spawns_and_reschedules() {
        let config = config_with(
            SpawnRule::new("rats", 1_000)
                .with_creature("rat", 1.0)
                .with_count(1, 3),
        );
        let mut env = cavern();
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        engine.tick(0, 1.0, &config, &mut env, &mut rng);
        assert_eq!(engine.next_check("rats"), Some(500));
        let report = engine.tick(500, 1.0, &config, &mut env, &mut rng);
        assert_eq!(report.checks.len(), 1);
        let requested = report.checks[0].requested;
        assert!((2..=6).contains(&requested));
        assert_eq!(report.spawned.len(), requested as usize);
        assert_eq!(env.creatures().len(), requested as usize);
        assert_eq!(engine.next_check("rats"), Some(1_000));
    }

    #[test]
    fn test_inactive_rule_still_reschedules() {
        let config = config_with(
            SpawnRule::new("late", 100)
                .with_creature("rat", 1.0)
                .with_activation(0.8, 2.0),
        );
        let mut env = cavern();
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        engine.tick(0, 0.5, &config, &mut env, &mut rng);
        let report = engine.tick(100, 0.5, &config, &mut env, &mut rng);
        assert_eq!(report.checks[0].requested, 0);
        assert!(report.spawned.is_empty());
        assert_eq!(engine.next_check("late"), Some(200));
    }

    #[test]
    fn test_unknown_creature_is_skipped() {
        let config = config_with(
            SpawnRule::new("ghosts", 10)
                .with_creature("ghost", 1.0)
                .with_count(2, 2),
        );
        let mut env = cavern();
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        engine.tick(0, 0.5, &config, &mut env, &mut rng);
        let report = engine.tick(10, 0.5, &config, &mut env, &mut rng);
        assert_eq!(report.failures, 2);
        assert!(env.creatures().is_empty());
        assert_eq!(engine.next_check("ghosts"), Some(20));
    }

    #[test]
    fn test_hostility_only_for_capable_kinds() {
        let config = config_with(
            SpawnRule::new("mixed", 10)
                .with_creature("rat", 1.0)
                .with_creature("spider", 1.0)
                .with_count(20, 20)
                .with_hostile_chance(1.0),
        );
        let mut env = cavern();
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        engine.tick(0, 0.5, &config, &mut env, &mut rng);
        engine.tick(10, 0.5, &config, &mut env, &mut rng);
        assert!(!env.creatures().is_empty());
        for creature in env.creatures() {
            assert_eq!(creature.hostile, creature.kind.as_str() == "spider");
        }
    }

    #[test]
    fn test_followers_cluster_around_leader() {
        let config = config_with(
            SpawnRule::new("pack", 10)
                .with_creature("rat", 1.0)
                .with_count(5, 5)
                .with_spawn_radius(3.0),
        );
        let mut env = cavern();
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(6);

        engine.tick(0, 0.5, &config, &mut env, &mut rng);
        let report = engine.tick(10, 0.5, &config, &mut env, &mut rng);
        assert_eq!(report.spawned.len(), 5);
        let leader = report.spawned[0].cell;
        let near = report.spawned[1..]
            .iter()
            .filter(|s| s.cell.within_radius(&leader, 3.0))
            .count();
        assert!(near >= 3, "only {} followers near the leader", near);
    }

    #[test]
    fn test_removed_rule_timer_is_dropped() {
        let mut config = config_with(SpawnRule::new("rats", 1_000).with_creature("rat", 1.0));
        config
            .spawning
            .rules
            .push(SpawnRule::new("spiders", 2_000).with_creature("spider", 1.0));
        let mut env = cavern();
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        engine.tick(0, 0.5, &config, &mut env, &mut rng);
        assert_eq!(engine.timers().len(), 2);

        config.spawning.rules.retain(|r| r.id == "spiders");
        engine.tick(1, 0.5, &config, &mut env, &mut rng);
        assert_eq!(engine.next_check("rats"), None);
        assert_eq!(engine.next_check("spiders"), Some(2_000));
        assert_eq!(engine.timers().len(), 1);
    }

    #[test]
    fn test_not_ready_does_nothing() {
        let config = config_with(SpawnRule::new("rats", 10).with_creature("rat", 1.0));
        let mut env = cavern();
        env.set_ready(false);
        let mut engine = SpawnScalingEngine::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for now in 0..100 {
            engine.tick(now, 1.0, &config, &mut env, &mut rng);
        }
        assert!(engine.timers().is_empty());
        assert!(env.creatures().is_empty());
    }
}
