//! Memo of "has at least one rock neighbor" per cell
//!
//! Entries are only correct as long as no rock appears or disappears in the
//! cell's 3x3 neighborhood, so every structural change must go through
//! `invalidate_around`. The whole memo also expires after `lifetime` ticks
//! to bound drift from changes the cavern never hears about.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{CellCoord, Tick};
use crate::environment::CavernGrid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdjacencyCache {
    #[serde(with = "sorted_entries")]
    entries: AHashMap<CellCoord, bool>,
    created_at: Tick,
    lifetime: u64,
}

impl AdjacencyCache {
    pub fn new(lifetime: u64) -> Self {
        Self {
            entries: AHashMap::new(),
            created_at: 0,
            lifetime,
        }
    }

    /// Drop everything if the memo is older than its lifetime
    pub fn expire_if_stale(&mut self, now: Tick) -> bool {
        if now.saturating_sub(self.created_at) < self.lifetime {
            return false;
        }
        self.entries.clear();
        self.created_at = now;
        true
    }

    pub fn has_adjacent_rock<G: CavernGrid + ?Sized>(&mut self, grid: &G, cell: CellCoord) -> bool {
        if let Some(&known) = self.entries.get(&cell) {
            return known;
        }
        let result = cell.neighbors().any(|n| grid.in_bounds(n) && grid.is_rock(n));
        self.entries.insert(cell, result);
        result
    }

    /// Forget the cell and its eight neighbors
    pub fn invalidate_around(&mut self, cell: CellCoord) {
        for c in cell.neighborhood() {
            self.entries.remove(&c);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// JSON maps need string keys; store the memo as cell-ordered pairs
mod sorted_entries {
    use ahash::AHashMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::core::types::CellCoord;

    pub fn serialize<S: Serializer>(
        entries: &AHashMap<CellCoord, bool>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut pairs: Vec<(CellCoord, bool)> = entries.iter().map(|(c, v)| (*c, *v)).collect();
        pairs.sort_unstable_by_key(|(c, _)| *c);
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<AHashMap<CellCoord, bool>, D::Error> {
        let pairs = Vec::<(CellCoord, bool)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
