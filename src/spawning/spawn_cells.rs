//! Cells creatures may appear on
//!
//! The cache sweeps the grid in row-major order, `refresh_budget` cells per
//! tick, inserting cells that pass the placement filter and removing those
//! that no longer do. A new sweep starts `refresh_interval` ticks after the
//! previous one finished. Picks re-check the filter and evict stale members.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::SpawningConfig;
use crate::core::types::{CellCoord, Tick};
use crate::environment::{CavernGrid, Occupants};
use crate::spatial::grid::index_to_cell;
use crate::spatial::IndexedCellSet;

/// Placement constraints for one tick
#[derive(Debug, Clone, Default)]
pub struct SpawnCellFilter {
    pub exit: Option<CellCoord>,
    pub exit_radius: f32,
    pub center: CellCoord,
    pub center_radius: f32,
    pub colonists: Vec<CellCoord>,
    pub colonist_radius: f32,
}

impl SpawnCellFilter {
    pub fn from_env<E>(config: &SpawningConfig, exit: Option<CellCoord>, env: &E) -> Self
    where
        E: CavernGrid + Occupants + ?Sized,
    {
        Self {
            exit,
            exit_radius: config.exit_avoid_radius,
            center: env.center(),
            center_radius: config.center_avoid_radius,
            colonists: env.occupant_positions(),
            colonist_radius: config.colonist_avoid_radius,
        }
    }

    pub fn accepts<E>(&self, env: &E, cell: CellCoord) -> bool
    where
        E: CavernGrid + Occupants + ?Sized,
    {
        if !env.in_bounds(cell) || !env.is_walkable(cell) || env.has_structure(cell) {
            return false;
        }
        if !env.occupants_at(cell).is_empty() {
            return false;
        }
        if let Some(exit) = self.exit {
            if cell.within_radius(&exit, self.exit_radius) {
                return false;
            }
        }
        if cell.within_radius(&self.center, self.center_radius) {
            return false;
        }
        !self
            .colonists
            .iter()
            .any(|c| cell.within_radius(c, self.colonist_radius))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidSpawnCellCache {
    cells: IndexedCellSet,
    cursor: usize,
    sweeping: bool,
    next_sweep: Tick,
    sweeps_completed: u64,
}

impl ValidSpawnCellCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this tick classifies any cells
    pub fn is_due(&self, now: Tick) -> bool {
        self.sweeping || now >= self.next_sweep
    }

    /// Classify up to `refresh_budget` cells; returns how many were looked at
    pub fn update<E>(
        &mut self,
        now: Tick,
        config: &SpawningConfig,
        filter: &SpawnCellFilter,
        env: &E,
    ) -> usize
    where
        E: CavernGrid + Occupants + ?Sized,
    {
        if !self.sweeping {
            if now < self.next_sweep {
                return 0;
            }
            self.sweeping = true;
            self.cursor = 0;
        }

        let (width, _) = env.dimensions();
        let total = env.cell_count();
        let mut classified = 0;
        while classified < config.refresh_budget && self.cursor < total {
            let cell = index_to_cell(self.cursor, width);
            if filter.accepts(env, cell) {
                self.cells.insert(cell);
            } else {
                self.cells.remove(cell);
            }
            self.cursor += 1;
            classified += 1;
        }

        if self.cursor >= total {
            self.sweeping = false;
            self.cursor = 0;
            self.next_sweep = now + config.refresh_interval.max(1);
            self.sweeps_completed += 1;
            tracing::debug!(
                "Spawn cell sweep {} finished: {} valid cells",
                self.sweeps_completed,
                self.cells.len()
            );
        }
        classified
    }

    /// Random cached cell that still passes the filter
    pub fn pick<E, R>(
        &mut self,
        filter: &SpawnCellFilter,
        env: &E,
        rng: &mut R,
        attempts: usize,
    ) -> Option<CellCoord>
    where
        E: CavernGrid + Occupants + ?Sized,
        R: Rng + ?Sized,
    {
        for _ in 0..attempts.max(1) {
            let cell = self.cells.choose(rng)?;
            if filter.accepts(env, cell) {
                return Some(cell);
            }
            self.cells.remove(cell);
        }
        None
    }

    pub fn evict(&mut self, cell: CellCoord) -> bool {
        self.cells.remove(cell)
    }

    pub fn cells(&self) -> &IndexedCellSet {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps_completed
    }
}
