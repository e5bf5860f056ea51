//! Composition root for one cavern
//!
//! The controller owns the stability state machine, the spawn engine and the
//! RNG, and wires them to the host's environment services. Each tick runs,
//! in order:
//! 1. instability update and collapse processing
//! 2. structure/occupant detection (every `detection.interval` ticks)
//! 3. spawn evaluation in rule order
//!
//! Destruction is the only thing that cuts a tick short.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::cavern::events::CavernEvent;
use crate::cavern::registry::RegistryHandle;
use crate::cavern::snapshot::CavernSnapshot;
use crate::collapse::{
    CollapsePhase, DestructionCause, StabilityInputs, StabilityReport, StabilityStateMachine,
};
use crate::core::config::CavernConfig;
use crate::core::error::Result;
use crate::core::types::{CellCoord, HostId, Tick};
use crate::environment::{CavernEnvironment, PresentationService};
use crate::spawning::SpawnScalingEngine;

pub struct CavernController<E: CavernEnvironment, P: PresentationService> {
    config: CavernConfig,
    host: HostId,
    env: E,
    presentation: P,
    stability: StabilityStateMachine,
    spawning: SpawnScalingEngine,
    rng: ChaCha8Rng,
    detection: StabilityInputs,
    next_detection: Tick,
    registry: Option<RegistryHandle>,
}

impl<E: CavernEnvironment, P: PresentationService> CavernController<E, P> {
    pub fn new(config: CavernConfig, host: HostId, env: E, presentation: P, seed: u64) -> Result<Self> {
        config.validate()?;
        let stability = StabilityStateMachine::new(&config);
        Ok(Self {
            config,
            host,
            env,
            presentation,
            stability,
            spawning: SpawnScalingEngine::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            detection: StabilityInputs::default(),
            next_detection: 0,
            registry: None,
        })
    }

    /// Rebuild a controller from saved state; no timer is reset
    pub fn restore(
        config: CavernConfig,
        env: E,
        presentation: P,
        snapshot: CavernSnapshot,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            host: snapshot.host,
            env,
            presentation,
            stability: snapshot.stability,
            spawning: snapshot.spawning,
            rng: snapshot.rng,
            detection: snapshot.detection,
            next_detection: snapshot.next_detection,
            registry: None,
        })
    }

    pub fn with_registry(mut self, registry: RegistryHandle) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn snapshot(&self) -> CavernSnapshot {
        CavernSnapshot {
            host: self.host,
            stability: self.stability.clone(),
            spawning: self.spawning.clone(),
            rng: self.rng.clone(),
            detection: self.detection,
            next_detection: self.next_detection,
        }
    }

    pub fn tick(&mut self, now: Tick) -> Vec<CavernEvent> {
        let mut events = Vec::new();
        if self.stability.is_destroyed() || !self.env.is_ready() {
            return events;
        }
        self.heartbeat(now);

        let report = self.stability.tick(
            now,
            &self.config,
            self.detection,
            &mut self.env,
            &mut self.presentation,
            &mut self.rng,
        );
        self.record_stability(now, report, &mut events);
        if self.stability.is_destroyed() {
            return events;
        }

        if now >= self.next_detection {
            self.detect(now, &mut events);
        }

        let fraction = self.stability.fraction(&self.config);
        let report = self
            .spawning
            .tick(now, fraction, &self.config, &mut self.env, &mut self.rng);
        events.extend(report.spawned.into_iter().map(|s| CavernEvent::CreatureSpawned {
            tick: now,
            rule_id: s.rule_id,
            id: s.id,
            kind: s.kind,
            cell: s.cell,
            hostile: s.hostile,
        }));
        events
    }

    /// A mining job finished inside the cavern
    pub fn on_mining_completed(&mut self, now: Tick, cell: Option<CellCoord>) -> Option<CavernEvent> {
        if self.stability.is_destroyed() {
            return None;
        }
        self.stability.add_instability(self.config.stability.mining_burst_ticks);
        if let Some(cell) = cell {
            self.stability.notify_terrain_changed(cell);
        }
        if self.rng.gen_bool(self.config.stability.mining_flavor_chance) {
            if let Err(e) = self.presentation.mining_flavor(cell) {
                tracing::warn!("Mining flavor presentation failed: {}", e);
            }
        }
        tracing::debug!(
            "Mining burst at {}: {} ticks lost",
            now,
            self.stability.ticks_lost()
        );
        Some(CavernEvent::MiningBurst {
            tick: now,
            ticks_lost: self.stability.ticks_lost(),
        })
    }

    /// Jump straight to partial collapse
    pub fn begin_collapse(&mut self, now: Tick) -> Vec<CavernEvent> {
        let report = self
            .stability
            .begin_collapse(now, &self.config, &mut self.env, &mut self.presentation);
        let mut events = Vec::new();
        self.record_stability(now, report, &mut events);
        events
    }

    /// Jump straight to full collapse
    pub fn collapse(&mut self, now: Tick) -> Vec<CavernEvent> {
        let report = self
            .stability
            .collapse(now, &self.config, &mut self.env, &mut self.presentation);
        let mut events = Vec::new();
        self.record_stability(now, report, &mut events);
        events
    }

    pub fn reset_stabilized(&mut self) -> bool {
        self.stability.reset_stabilized(&self.config)
    }

    /// Destroy the cavern on the host's request
    pub fn destroy(&mut self, now: Tick) -> Option<CavernEvent> {
        let cause = DestructionCause::External;
        if !self
            .stability
            .destroy(cause, &mut self.env, &mut self.presentation)
        {
            return None;
        }
        self.deregister();
        Some(CavernEvent::Destroyed { tick: now, cause })
    }

    pub fn stability_fraction(&self) -> f32 {
        self.stability.fraction(&self.config)
    }

    pub fn phase(&self) -> CollapsePhase {
        self.stability.phase()
    }

    pub fn ticks_lost(&self) -> u64 {
        self.stability.ticks_lost()
    }

    pub fn is_destroyed(&self) -> bool {
        self.stability.is_destroyed()
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    pub fn config(&self) -> &CavernConfig {
        &self.config
    }

    pub fn detection(&self) -> StabilityInputs {
        self.detection
    }

    pub fn stability(&self) -> &StabilityStateMachine {
        &self.stability
    }

    pub fn spawning(&self) -> &SpawnScalingEngine {
        &self.spawning
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    fn record_stability(&mut self, now: Tick, report: StabilityReport, events: &mut Vec<CavernEvent>) {
        let fraction = self.stability.fraction(&self.config);
        for (from, to) in report.phase_changes {
            events.push(CavernEvent::PhaseChanged {
                tick: now,
                from,
                to,
                fraction,
            });
        }
        for bracket in report.effects {
            events.push(CavernEvent::AmbientEffect { tick: now, bracket });
        }
        if let Some(outcome) = report.collapse {
            for id in outcome.crushed {
                events.push(CavernEvent::OccupantCrushed { tick: now, id });
            }
            if !outcome.obstructed.is_empty() {
                events.push(CavernEvent::CellsObstructed {
                    tick: now,
                    cells: outcome.obstructed,
                });
            }
        }
        if let Some(cause) = report.destroyed {
            self.deregister();
            events.push(CavernEvent::Destroyed { tick: now, cause });
        }
    }

    fn detect(&mut self, now: Tick, events: &mut Vec<CavernEvent>) {
        self.next_detection = now + self.config.detection.interval;
        let stabilized = match self.env.scan_structures() {
            Ok(scan) => scan.stabilized(),
            Err(e) => {
                tracing::warn!("Structure scan failed, keeping previous result: {}", e);
                self.detection.stabilized
            }
        };
        let inputs = StabilityInputs {
            occupants: self.env.occupant_count(),
            stabilized,
        };
        if inputs != self.detection {
            tracing::debug!(
                "Detection at {}: {} occupants, stabilized: {}",
                now,
                inputs.occupants,
                inputs.stabilized
            );
            self.detection = inputs;
            events.push(CavernEvent::Detection {
                tick: now,
                occupants: inputs.occupants,
                stabilized: inputs.stabilized,
            });
        }
    }

    fn heartbeat(&self, now: Tick) {
        let Some(registry) = &self.registry else {
            return;
        };
        match registry.try_borrow_mut() {
            Ok(mut registry) => {
                registry.heartbeat(self.host, now);
                registry.maybe_refresh(now);
            }
            Err(_) => tracing::debug!("Registry busy; skipping heartbeat for {:?}", self.host),
        }
    }

    fn deregister(&self) {
        let Some(registry) = &self.registry else {
            return;
        };
        match registry.try_borrow_mut() {
            Ok(mut registry) => {
                registry.mark_inactive(self.host);
            }
            Err(_) => tracing::warn!("Registry busy; {:?} left for the stale sweep", self.host),
        }
    }
}
