//! Ordered cell set with O(1) membership and O(1) random pick
//!
//! Members live in a dense `Vec` (for indexed and random access) with an
//! `AHashMap` from cell to slot. Removal swaps the last member into the
//! vacated slot, so iteration order is insertion order until the first
//! removal and arbitrary afterwards.

use ahash::AHashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::types::CellCoord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<CellCoord>", into = "Vec<CellCoord>")]
pub struct IndexedCellSet {
    cells: Vec<CellCoord>,
    slots: AHashMap<CellCoord, usize>,
}

impl IndexedCellSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell; returns false if it was already present
    pub fn insert(&mut self, cell: CellCoord) -> bool {
        if self.slots.contains_key(&cell) {
            return false;
        }
        self.slots.insert(cell, self.cells.len());
        self.cells.push(cell);
        true
    }

    /// Remove a cell; returns false if it was not present
    pub fn remove(&mut self, cell: CellCoord) -> bool {
        let Some(slot) = self.slots.remove(&cell) else {
            return false;
        };
        self.cells.swap_remove(slot);
        if let Some(&moved) = self.cells.get(slot) {
            self.slots.insert(moved, slot);
        }
        true
    }

    #[inline]
    pub fn contains(&self, cell: CellCoord) -> bool {
        self.slots.contains_key(&cell)
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<CellCoord> {
        self.cells.get(index).copied()
    }

    /// Uniformly random member
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<CellCoord> {
        if self.cells.is_empty() {
            None
        } else {
            Some(self.cells[rng.gen_range(0..self.cells.len())])
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.slots.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.cells.iter().copied()
    }
}

impl From<Vec<CellCoord>> for IndexedCellSet {
    fn from(cells: Vec<CellCoord>) -> Self {
        let mut set = IndexedCellSet::new();
        for cell in cells {
            set.insert(cell);
        }
        set
    }
}

impl From<IndexedCellSet> for Vec<CellCoord> {
    fn from(set: IndexedCellSet) -> Self {
        set.cells
    }
}

impl PartialEq for IndexedCellSet {
    /// Order-sensitive: two sets are equal when they would pick identically
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}
