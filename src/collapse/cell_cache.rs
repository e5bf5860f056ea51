//! Budgeted classification of blockable cells
//!
//! A cavern can hold tens of thousands of cells, far too many to classify in
//! one tick. The cache sweeps the grid in row-major order, `budget` cells per
//! call, and keeps the passing cells in an `IndexedCellSet`. A second cursor
//! walks the set itself and evicts members that stopped qualifying.
//!
//! Sweep lifecycle:
//! - `begin_refresh` empties the set and rewinds the sweep
//! - `step_refresh` advances it; reaching the end marks the sweep complete
//! - a placed obstruction clears the completion flag so a further sweep picks
//!   up neighbors that just became eligible
//! - a drained set after a sweep that found cells starts a confirming sweep

use serde::{Deserialize, Serialize};

use crate::collapse::adjacency::AdjacencyCache;
use crate::core::types::{CellCoord, Tick};
use crate::environment::CavernGrid;
use crate::spatial::grid::index_to_cell;
use crate::spatial::IndexedCellSet;

/// Area around an anchor that never collapses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvoidanceZone {
    pub anchor: CellCoord,
    pub radius: f32,
}

impl AvoidanceZone {
    pub fn contains(&self, cell: CellCoord) -> bool {
        self.anchor.within_radius(&cell, self.radius)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridCellCache {
    blockable: IndexedCellSet,
    refresh_cursor: usize,
    validate_cursor: usize,
    refresh_complete: bool,
    /// Cells newly added during the current sweep
    found_this_sweep: usize,
    /// Last completed sweep found nothing
    exhausted: bool,
    avoidance: Option<AvoidanceZone>,
    adjacency: AdjacencyCache,
}

impl GridCellCache {
    pub fn new(adjacency_lifetime: u64) -> Self {
        Self {
            blockable: IndexedCellSet::new(),
            refresh_cursor: 0,
            validate_cursor: 0,
            refresh_complete: false,
            found_this_sweep: 0,
            exhausted: false,
            avoidance: None,
            adjacency: AdjacencyCache::new(adjacency_lifetime),
        }
    }

    /// Restart classification from the first cell with an empty working set
    pub fn begin_refresh(&mut self, now: Tick, avoidance: Option<AvoidanceZone>) {
        self.blockable.clear();
        self.refresh_cursor = 0;
        self.validate_cursor = 0;
        self.refresh_complete = false;
        self.found_this_sweep = 0;
        self.exhausted = false;
        self.avoidance = avoidance;
        self.adjacency.expire_if_stale(now);
    }

    /// Validity predicate, cheapest checks first
    pub fn is_blockable<G: CavernGrid + ?Sized>(&mut self, grid: &G, cell: CellCoord) -> bool {
        if !grid.in_bounds(cell) || !grid.is_walkable(cell) || grid.has_structure(cell) {
            return false;
        }
        if let Some(zone) = &self.avoidance {
            if zone.contains(cell) {
                return false;
            }
        }
        self.adjacency.has_adjacent_rock(grid, cell)
    }

    /// Classify up to `budget` cells; returns how many were newly added
    pub fn step_refresh<G: CavernGrid + ?Sized>(&mut self, grid: &G, budget: usize) -> usize {
        if self.refresh_complete {
            if self.exhausted || !self.blockable.is_empty() {
                return 0;
            }
            // Drained since the last sweep finished; sweep again to confirm
            self.refresh_complete = false;
        }
        let total = grid.cell_count();
        let (width, _) = grid.dimensions();
        if total == 0 {
            self.finish_sweep();
            return 0;
        }
        if self.refresh_cursor == 0 {
            self.found_this_sweep = 0;
        }

        let mut added = 0;
        for _ in 0..budget {
            let cell = index_to_cell(self.refresh_cursor, width);
            if self.is_blockable(grid, cell) && self.blockable.insert(cell) {
                added += 1;
            }
            self.refresh_cursor += 1;
            if self.refresh_cursor >= total {
                self.found_this_sweep += added;
                self.finish_sweep();
                return added;
            }
        }
        self.found_this_sweep += added;
        added
    }

    /// Re-check up to `budget` members; returns how many were evicted
    pub fn step_validate<G: CavernGrid + ?Sized>(&mut self, grid: &G, budget: usize) -> usize {
        let mut removed = 0;
        for _ in 0..budget {
            if self.blockable.is_empty() {
                self.validate_cursor = 0;
                break;
            }
            if self.validate_cursor >= self.blockable.len() {
                self.validate_cursor = 0;
            }
            let Some(cell) = self.blockable.get(self.validate_cursor) else {
                break;
            };
            if self.is_blockable(grid, cell) {
                self.validate_cursor += 1;
            } else {
                // swap_remove pulls an unchecked member into this slot
                self.blockable.remove(cell);
                removed += 1;
            }
        }
        removed
    }

    pub fn invalidate_around(&mut self, cell: CellCoord) {
        self.adjacency.invalidate_around(cell);
    }

    /// Bookkeeping after the cell became rock
    pub fn on_obstruction_placed(&mut self, cell: CellCoord) {
        self.blockable.remove(cell);
        self.invalidate_around(cell);
        self.refresh_complete = false;
        self.exhausted = false;
    }

    /// Drop a member that failed lazy revalidation
    pub fn evict(&mut self, cell: CellCoord) -> bool {
        self.blockable.remove(cell)
    }

    pub fn expire_adjacency(&mut self, now: Tick) {
        self.adjacency.expire_if_stale(now);
    }

    pub fn blockable(&self) -> &IndexedCellSet {
        &self.blockable
    }

    pub fn is_refresh_complete(&self) -> bool {
        self.refresh_complete
    }

    /// A completed sweep found nothing and the working set is empty
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.blockable.is_empty()
    }

    pub fn refresh_cursor(&self) -> usize {
        self.refresh_cursor
    }

    pub fn avoidance(&self) -> Option<AvoidanceZone> {
        self.avoidance
    }

    fn finish_sweep(&mut self) {
        self.refresh_cursor = 0;
        self.refresh_complete = true;
        self.exhausted = self.found_this_sweep == 0;
    }
}
