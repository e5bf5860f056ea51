//! Instability counter and collapse phase state machine
//!
//! Per tick, in order:
//! 1. accrue instability (occupants speed it up, a powered stabilizer holds it back)
//! 2. fire ambient effects for the active fraction bracket
//! 3. advance the phase (transitions may cascade within one tick)
//! 4. on the collapse cadence: validate, refresh, pick and obstruct
//! 5. on the coverage cadence: destroy the cavern once it has closed up
//!
//! The phase only moves forward. `reset_stabilized` is the single way back
//! to `Stable`, and `Destroyed` is final.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::collapse::cell_cache::{AvoidanceZone, GridCellCache};
use crate::collapse::phase::CollapsePhase;
use crate::collapse::strategy::{CollapseOutcome, CollapseStrategy};
use crate::core::config::{AvoidanceMode, CavernConfig};
use crate::core::types::{CellCoord, EntityId, Tick};
use crate::environment::{CavernGrid, Occupants, PocketLifecycle, PresentationService};

/// Detection results that feed the instability delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityInputs {
    pub occupants: usize,
    pub stabilized: bool,
}

/// Why a cavern was destroyed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DestructionCause {
    /// Walkable area fell below the configured share of the original
    LowCoverage { coverage: f32 },
    /// A full sweep found nothing left to obstruct
    NoBlockableCells,
    /// Requested by the host
    External,
}

/// Everything a single tick changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StabilityReport {
    pub phase_changes: Vec<(CollapsePhase, CollapsePhase)>,
    pub effects: Vec<usize>,
    pub collapse: Option<CollapseOutcome>,
    pub destroyed: Option<DestructionCause>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityStateMachine {
    ticks_lost: u64,
    /// Fractional part of accrued deltas not yet committed to `ticks_lost`
    carry: f64,
    phase: CollapsePhase,
    cell_cache: GridCellCache,
    exit_position: Option<CellCoord>,
    exit_resolved: bool,
    next_collapse_tick: Tick,
    next_coverage_check: Tick,
    effect_next: Vec<Tick>,
    walkable_baseline: Option<usize>,
    /// Occupants already given the forced-collapse lethal effect
    notified: BTreeSet<EntityId>,
    destroyed: bool,
}

impl StabilityStateMachine {
    pub fn new(config: &CavernConfig) -> Self {
        Self {
            ticks_lost: 0,
            carry: 0.0,
            phase: CollapsePhase::Stable,
            cell_cache: GridCellCache::new(config.collapse.adjacency_lifetime),
            exit_position: None,
            exit_resolved: false,
            next_collapse_tick: 0,
            next_coverage_check: 0,
            effect_next: vec![0; config.effects.brackets.len()],
            walkable_baseline: None,
            notified: BTreeSet::new(),
            destroyed: false,
        }
    }

    /// Net per-tick change before the stabilizer policy is applied
    pub fn instability_delta(config: &CavernConfig, inputs: StabilityInputs) -> f64 {
        let s = &config.stability;
        let mut delta = 1.0 * (1.0 + inputs.occupants as f64 * s.occupant_factor);
        if inputs.stabilized {
            delta -= s.stabilizer_reduction;
        }
        delta
    }

    pub fn fraction(&self, config: &CavernConfig) -> f32 {
        (self.ticks_lost as f64 / config.stability.duration_ticks.max(1) as f64) as f32
    }

    pub fn ticks_lost(&self) -> u64 {
        self.ticks_lost
    }

    pub fn phase(&self) -> CollapsePhase {
        self.phase
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn cell_cache(&self) -> &GridCellCache {
        &self.cell_cache
    }

    pub fn exit_position(&self) -> Option<CellCoord> {
        self.exit_position
    }

    pub fn notified(&self) -> &BTreeSet<EntityId> {
        &self.notified
    }

    /// Walkable share relative to when the cavern opened
    pub fn coverage<G: CavernGrid + ?Sized>(&self, grid: &G) -> Option<f32> {
        match self.walkable_baseline {
            Some(base) if base > 0 => Some(grid.walkable_count() as f32 / base as f32),
            _ => None,
        }
    }

    /// Fixed burst of loss (mining, scripted events)
    pub fn add_instability(&mut self, ticks: u64) {
        if self.destroyed {
            return;
        }
        self.ticks_lost = self.ticks_lost.saturating_add(ticks);
    }

    /// Forget a structural change made outside the collapse process
    pub fn notify_terrain_changed(&mut self, cell: CellCoord) {
        self.cell_cache.invalidate_around(cell);
    }

    pub fn tick<E, P, R>(
        &mut self,
        now: Tick,
        config: &CavernConfig,
        inputs: StabilityInputs,
        env: &mut E,
        presentation: &mut P,
        rng: &mut R,
    ) -> StabilityReport
    where
        E: CavernGrid + Occupants + PocketLifecycle + ?Sized,
        P: PresentationService + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = StabilityReport::default();
        if self.destroyed || !env.is_ready() {
            return report;
        }
        if self.walkable_baseline.is_none() {
            self.walkable_baseline = Some(env.walkable_count());
        }

        self.accrue(Self::instability_delta(config, inputs), config);
        let fraction = self.fraction(config);

        self.trigger_effects(now, fraction, config, presentation, &mut report);
        self.advance_phase(now, config, env, presentation, &mut report);

        if self.phase.is_collapsing() && now >= self.next_collapse_tick {
            report.collapse = Some(self.run_collapse(now, config, env, presentation, rng));
        }

        if self.phase.is_collapsing() && now >= self.next_coverage_check {
            self.check_coverage(now, config, env, presentation, &mut report);
        }

        report
    }

    /// Force partial collapse now (tooling)
    pub fn begin_collapse<E, P>(
        &mut self,
        now: Tick,
        config: &CavernConfig,
        env: &mut E,
        presentation: &mut P,
    ) -> StabilityReport
    where
        E: CavernGrid + ?Sized,
        P: PresentationService + ?Sized,
    {
        self.force_threshold(config.stability.partial_threshold, now, config, env, presentation)
    }

    /// Force full collapse now (tooling)
    pub fn collapse<E, P>(
        &mut self,
        now: Tick,
        config: &CavernConfig,
        env: &mut E,
        presentation: &mut P,
    ) -> StabilityReport
    where
        E: CavernGrid + ?Sized,
        P: PresentationService + ?Sized,
    {
        self.force_threshold(config.stability.full_threshold, now, config, env, presentation)
    }

    /// The only phase regression: back to a pristine stable cavern.
    /// Returns false once destroyed.
    pub fn reset_stabilized(&mut self, config: &CavernConfig) -> bool {
        if self.destroyed {
            return false;
        }
        tracing::info!("Cavern stabilized: resetting from {}", self.phase);
        self.ticks_lost = 0;
        self.carry = 0.0;
        self.phase = CollapsePhase::Stable;
        self.cell_cache = GridCellCache::new(config.collapse.adjacency_lifetime);
        self.next_collapse_tick = 0;
        self.next_coverage_check = 0;
        self.effect_next = vec![0; config.effects.brackets.len()];
        true
    }

    /// Terminal destruction; side effects run at most once
    pub fn destroy<E, P>(
        &mut self,
        cause: DestructionCause,
        env: &mut E,
        presentation: &mut P,
    ) -> bool
    where
        E: Occupants + PocketLifecycle + ?Sized,
        P: PresentationService + ?Sized,
    {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        let from = self.phase;
        self.phase = CollapsePhase::Destroyed;
        tracing::info!("Cavern destroyed ({:?}) from {}", cause, from);

        for id in env.all_occupants() {
            if let Err(e) = env.apply_lethal(id) {
                tracing::warn!("Lethal effect on {:?} failed: {}", id, e);
            }
        }
        if let Err(e) = env.tear_down_pocket() {
            tracing::warn!("Pocket teardown failed: {}", e);
        }
        if let Err(e) = env.remove_host_structure() {
            tracing::warn!("Host structure removal failed: {}", e);
        }
        if let Err(e) = presentation.phase_changed(from, CollapsePhase::Destroyed) {
            tracing::warn!("Phase change presentation failed: {}", e);
        }
        if let Err(e) = presentation.cavern_destroyed() {
            tracing::warn!("Destruction presentation failed: {}", e);
        }
        true
    }

    /// Commit a delta under the stabilizer policy: a negative delta rolls loss
    /// back only below the lock point; past it the stabilizer freezes accrual.
    fn accrue(&mut self, delta: f64, config: &CavernConfig) {
        if delta < 0.0 {
            let lock = config.stability.duration_ticks as f64 * config.stability.stabilizer_lock_fraction;
            if self.ticks_lost as f64 >= lock {
                return;
            }
        }
        self.carry += delta;

        if self.carry >= 1.0 {
            let whole = self.carry.floor();
            self.ticks_lost = self.ticks_lost.saturating_add(whole as u64);
            self.carry -= whole;
        } else if self.carry <= -1.0 {
            let whole = (-self.carry).floor();
            self.ticks_lost = self.ticks_lost.saturating_sub(whole as u64);
            self.carry += whole;
        }
        if self.ticks_lost == 0 && self.carry < 0.0 {
            self.carry = 0.0;
        }
    }

    fn trigger_effects<P>(
        &mut self,
        now: Tick,
        fraction: f32,
        config: &CavernConfig,
        presentation: &mut P,
        report: &mut StabilityReport,
    ) where
        P: PresentationService + ?Sized,
    {
        let brackets = &config.effects.brackets;
        if self.effect_next.len() != brackets.len() {
            self.effect_next.resize(brackets.len(), 0);
        }
        let Some(active) = brackets.iter().rposition(|b| fraction >= b.min_fraction) else {
            return;
        };
        if now < self.effect_next[active] {
            return;
        }
        self.effect_next[active] = now + brackets[active].interval;
        if let Err(e) = presentation.ambient_effect(active, fraction) {
            tracing::warn!("Ambient effect for bracket {} failed: {}", active, e);
            return;
        }
        report.effects.push(active);
    }

    fn advance_phase<E, P>(
        &mut self,
        now: Tick,
        config: &CavernConfig,
        env: &mut E,
        presentation: &mut P,
        report: &mut StabilityReport,
    ) where
        E: CavernGrid + ?Sized,
        P: PresentationService + ?Sized,
    {
        let fraction = self.fraction(config);
        loop {
            let next = match self.phase {
                CollapsePhase::Stable if fraction >= config.stability.partial_threshold => {
                    CollapsePhase::PartialCollapse
                }
                CollapsePhase::PartialCollapse if fraction >= config.stability.full_threshold => {
                    CollapsePhase::FullCollapse
                }
                _ => break,
            };
            self.enter_phase(next, now, fraction, config, env);
            let from = self.phase;
            self.phase = next;
            tracing::info!("Cavern phase {} -> {} at fraction {:.3}", from, next, fraction);
            if let Err(e) = presentation.phase_changed(from, next) {
                tracing::warn!("Phase change presentation failed: {}", e);
            }
            report.phase_changes.push((from, next));
        }
    }

    fn enter_phase<E>(
        &mut self,
        next: CollapsePhase,
        now: Tick,
        fraction: f32,
        config: &CavernConfig,
        env: &mut E,
    ) where
        E: CavernGrid + ?Sized,
    {
        match next {
            CollapsePhase::PartialCollapse => {
                let zone = self.avoidance_zone(config, env);
                self.cell_cache.begin_refresh(now, zone);
                self.next_collapse_tick = now + config.collapse.partial_interval;
                self.next_coverage_check = now + config.collapse.coverage_check_interval;
            }
            CollapsePhase::FullCollapse => {
                let interval = full_collapse_interval(config, fraction);
                self.next_collapse_tick = self.next_collapse_tick.min(now + interval);
                self.next_coverage_check = self
                    .next_coverage_check
                    .min(now + config.collapse.full_coverage_check_interval);
            }
            CollapsePhase::Stable | CollapsePhase::Destroyed => {}
        }
    }

    fn avoidance_zone<E: CavernGrid + ?Sized>(
        &mut self,
        config: &CavernConfig,
        env: &E,
    ) -> Option<AvoidanceZone> {
        if config.avoidance.radius <= 0.0 {
            return None;
        }
        let anchor = match config.avoidance.mode {
            AvoidanceMode::Center => env.center(),
            AvoidanceMode::Exit => self.resolve_exit(env).unwrap_or_else(|| env.center()),
        };
        Some(AvoidanceZone {
            anchor,
            radius: config.avoidance.radius,
        })
    }

    fn resolve_exit<E: CavernGrid + ?Sized>(&mut self, env: &E) -> Option<CellCoord> {
        if self.exit_resolved {
            return self.exit_position;
        }
        match env.find_exit() {
            Ok(exit) => {
                if exit.is_none() {
                    tracing::debug!("Cavern has no exit; avoiding grid center instead");
                }
                self.exit_position = exit;
                self.exit_resolved = true;
                exit
            }
            Err(e) => {
                tracing::warn!("Exit lookup failed, falling back to center: {}", e);
                None
            }
        }
    }

    fn run_collapse<E, P, R>(
        &mut self,
        now: Tick,
        config: &CavernConfig,
        env: &mut E,
        presentation: &mut P,
        rng: &mut R,
    ) -> CollapseOutcome
    where
        E: CavernGrid + Occupants + ?Sized,
        P: PresentationService + ?Sized,
        R: Rng + ?Sized,
    {
        let c = &config.collapse;
        let fraction = self.fraction(config);
        let multiplier = if self.phase == CollapsePhase::FullCollapse {
            c.full_collapse_budget_multiplier.max(1)
        } else {
            1
        };

        self.cell_cache.expire_adjacency(now);
        let evicted = self.cell_cache.step_validate(&*env, c.validate_budget * multiplier);
        let added = self.cell_cache.step_refresh(&*env, c.refresh_budget * multiplier);

        let strategy = CollapseStrategy::new(c, config.stability.forced_collapse_fraction);
        let outcome = strategy.execute(
            self.phase,
            fraction,
            &mut self.cell_cache,
            env,
            presentation,
            &mut self.notified,
            rng,
        );

        self.next_collapse_tick = now
            + match self.phase {
                CollapsePhase::FullCollapse => full_collapse_interval(config, fraction),
                _ => c.partial_interval,
            };

        tracing::debug!(
            "Collapse step at {}: +{} -{} cached, {} obstructed, {} blockable",
            now,
            added,
            evicted,
            outcome.obstructed.len(),
            self.cell_cache.blockable().len()
        );
        outcome
    }

    fn check_coverage<E, P>(
        &mut self,
        now: Tick,
        config: &CavernConfig,
        env: &mut E,
        presentation: &mut P,
        report: &mut StabilityReport,
    ) where
        E: CavernGrid + Occupants + PocketLifecycle + ?Sized,
        P: PresentationService + ?Sized,
    {
        let c = &config.collapse;
        self.next_coverage_check = now
            + match self.phase {
                CollapsePhase::FullCollapse => c.full_coverage_check_interval,
                _ => c.coverage_check_interval,
            };

        let cause = match self.coverage(&*env) {
            Some(coverage) if coverage < c.min_walkable_coverage => {
                Some(DestructionCause::LowCoverage { coverage })
            }
            _ if self.phase == CollapsePhase::FullCollapse && self.cell_cache.is_exhausted() => {
                Some(DestructionCause::NoBlockableCells)
            }
            _ => None,
        };

        if let Some(cause) = cause {
            if self.destroy(cause, env, presentation) {
                report.destroyed = Some(cause);
            }
        }
    }

    fn force_threshold<E, P>(
        &mut self,
        threshold: f32,
        now: Tick,
        config: &CavernConfig,
        env: &mut E,
        presentation: &mut P,
    ) -> StabilityReport
    where
        E: CavernGrid + ?Sized,
        P: PresentationService + ?Sized,
    {
        let mut report = StabilityReport::default();
        if self.destroyed {
            return report;
        }
        let needed = (threshold as f64 * config.stability.duration_ticks as f64).ceil() as u64;
        self.ticks_lost = self.ticks_lost.max(needed);
        self.advance_phase(now, config, env, presentation, &mut report);
        report
    }
}

/// Placement interval during full collapse: shrinks linearly from
/// `full_interval_max` at the full threshold to `full_interval_min` at the
/// forced-collapse fraction
pub fn full_collapse_interval(config: &CavernConfig, fraction: f32) -> u64 {
    let c = &config.collapse;
    let s = &config.stability;
    let span = s.forced_collapse_fraction - s.full_threshold;
    let t = if span <= 0.0 {
        1.0
    } else {
        ((fraction - s.full_threshold) / span).clamp(0.0, 1.0)
    };
    let max = c.full_interval_max as f32;
    let min = c.full_interval_min as f32;
    ((max - (max - min) * t).round() as u64).max(1)
}
