//! Events a cavern emits while it ticks
//!
//! These are returned by `CavernController::tick` in the order they happened,
//! for logging and for the simulator's summary.

use serde::{Deserialize, Serialize};

use crate::collapse::{CollapsePhase, DestructionCause};
use crate::core::types::{CellCoord, CreatureKind, EntityId, Tick};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CavernEvent {
    PhaseChanged {
        tick: Tick,
        from: CollapsePhase,
        to: CollapsePhase,
        fraction: f32,
    },
    /// Ambient effect fired for a fraction bracket
    AmbientEffect { tick: Tick, bracket: usize },
    /// Cells turned to rock by one collapse step
    CellsObstructed { tick: Tick, cells: Vec<CellCoord> },
    /// An occupant was caught under a forced collapse
    OccupantCrushed { tick: Tick, id: EntityId },
    /// Detection poll results
    Detection {
        tick: Tick,
        occupants: usize,
        stabilized: bool,
    },
    CreatureSpawned {
        tick: Tick,
        rule_id: String,
        id: EntityId,
        kind: CreatureKind,
        cell: CellCoord,
        hostile: bool,
    },
    /// Mining finished inside the cavern
    MiningBurst { tick: Tick, ticks_lost: u64 },
    Destroyed { tick: Tick, cause: DestructionCause },
}

impl CavernEvent {
    pub fn tick(&self) -> Tick {
        match self {
            CavernEvent::PhaseChanged { tick, .. }
            | CavernEvent::AmbientEffect { tick, .. }
            | CavernEvent::CellsObstructed { tick, .. }
            | CavernEvent::OccupantCrushed { tick, .. }
            | CavernEvent::Detection { tick, .. }
            | CavernEvent::CreatureSpawned { tick, .. }
            | CavernEvent::MiningBurst { tick, .. }
            | CavernEvent::Destroyed { tick, .. } => *tick,
        }
    }

    /// Short label for summaries
    pub fn kind(&self) -> &'static str {
        match self {
            CavernEvent::PhaseChanged { .. } => "phase_changed",
            CavernEvent::AmbientEffect { .. } => "ambient_effect",
            CavernEvent::CellsObstructed { .. } => "cells_obstructed",
            CavernEvent::OccupantCrushed { .. } => "occupant_crushed",
            CavernEvent::Detection { .. } => "detection",
            CavernEvent::CreatureSpawned { .. } => "creature_spawned",
            CavernEvent::MiningBurst { .. } => "mining_burst",
            CavernEvent::Destroyed { .. } => "destroyed",
        }
    }
}
