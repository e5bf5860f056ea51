//! Generic dense grid for per-cell data

use serde::{Deserialize, Serialize};

use crate::core::types::CellCoord;

/// Generic 2D grid addressed by cell coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid<T: Clone + Default> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }

    #[inline]
    pub fn in_bounds(&self, cell: CellCoord) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < self.width && (cell.y as usize) < self.height
    }

    #[inline]
    fn offset(&self, cell: CellCoord) -> Option<usize> {
        if self.in_bounds(cell) {
            Some(cell.y as usize * self.width + cell.x as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn get(&self, cell: CellCoord) -> Option<&T> {
        self.offset(cell).map(|i| &self.data[i])
    }

    #[inline]
    pub fn get_mut(&mut self, cell: CellCoord) -> Option<&mut T> {
        self.offset(cell).map(move |i| &mut self.data[i])
    }
}

/// Row-major cell for a linear index in a grid of `width` columns
#[inline]
pub fn index_to_cell(index: usize, width: usize) -> CellCoord {
    let width = width.max(1);
    CellCoord::new((index % width) as i32, (index / width) as i32)
}
