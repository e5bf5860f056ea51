//! Creature spawning scaled by cavern instability

pub mod engine;
pub mod rule;
pub mod scaling;
pub mod spawn_cells;

pub use engine::{RuleCheck, SpawnReport, SpawnScalingEngine, SpawnedEntity};
pub use rule::{SpawnRule, WeightedCreature};
pub use spawn_cells::{SpawnCellFilter, ValidSpawnCellCache};
