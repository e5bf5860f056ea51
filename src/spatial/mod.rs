//! Grid storage and cell collections

pub mod grid;
pub mod indexed_set;

pub use grid::Grid;
pub use indexed_set::IndexedCellSet;
