//! Structural collapse of the cavern grid
//!
//! Architecture:
//! - `StabilityStateMachine` owns the instability counter and phase
//! - `GridCellCache` classifies blockable cells under a per-call budget
//! - `CollapseStrategy` decides which cached cells become rock

pub mod adjacency;
pub mod cell_cache;
pub mod phase;
pub mod stability;
pub mod strategy;

pub use adjacency::AdjacencyCache;
pub use cell_cache::{AvoidanceZone, GridCellCache};
pub use phase::CollapsePhase;
pub use stability::{DestructionCause, StabilityInputs, StabilityReport, StabilityStateMachine};
pub use strategy::{CollapseOutcome, CollapseStrategy};
