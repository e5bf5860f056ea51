//! Environment services consumed by the cavern
//!
//! Architecture: trait seams around everything the host owns
//! - `CavernGrid`: cell geometry, terrain and structure queries, rock placement
//! - `Occupants`: living occupants and lethal effects
//! - `CreatureSpawner`: creature catalog lookups and instantiation
//! - `StructureSurvey`: powered stabilizer detection
//! - `PocketLifecycle`: terminal teardown of the pocket and its host structure
//!
//! `CavernEnvironment` bundles them for the controller; individual components
//! only bound on the traits they use.

pub mod memory;
pub mod presentation;

pub use memory::MemoryCavern;
pub use presentation::{NullPresentation, PresentationService};

use crate::core::error::Result;
use crate::core::types::{CellCoord, CreatureKind, EntityId};

/// Cell geometry and terrain of the pocket map
pub trait CavernGrid {
    /// False until the pocket map exists; all processing short-circuits
    fn is_ready(&self) -> bool;

    /// Grid dimensions in cells (width, height)
    fn dimensions(&self) -> (usize, usize);

    fn in_bounds(&self, cell: CellCoord) -> bool {
        let (w, h) = self.dimensions();
        cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < w && (cell.y as usize) < h
    }

    fn cell_count(&self) -> usize {
        let (w, h) = self.dimensions();
        w * h
    }

    fn center(&self) -> CellCoord {
        let (w, h) = self.dimensions();
        CellCoord::new((w / 2) as i32, (h / 2) as i32)
    }

    fn is_walkable(&self, cell: CellCoord) -> bool;

    /// A building or other structure stands on the cell
    fn has_structure(&self, cell: CellCoord) -> bool;

    /// Natural rock or a placed collapse obstruction
    fn is_rock(&self, cell: CellCoord) -> bool;

    /// Turn the cell into collapsed rock
    fn place_rock(&mut self, cell: CellCoord) -> Result<()>;

    /// Locate the pocket exit; `Ok(None)` when the map has no exit
    fn find_exit(&self) -> Result<Option<CellCoord>>;

    /// Number of walkable cells currently in the grid
    fn walkable_count(&self) -> usize;
}

/// Living occupants of the pocket (colonists and other pawns)
pub trait Occupants {
    fn occupant_count(&self) -> usize;

    /// Positions of occupants the spawn cache keeps its distance from
    fn occupant_positions(&self) -> Vec<CellCoord>;

    /// Living occupants standing on `cell`
    fn occupants_at(&self, cell: CellCoord) -> Vec<EntityId>;

    /// Every living occupant
    fn all_occupants(&self) -> Vec<EntityId>;

    fn apply_lethal(&mut self, id: EntityId) -> Result<()>;
}

/// Catalog data the spawn engine needs about a creature kind
#[derive(Debug, Clone, PartialEq)]
pub struct CreatureProfile {
    /// Whether the kind can be turned hostile at all
    pub can_be_hostile: bool,
}

pub trait CreatureSpawner {
    /// Resolve a creature kind; `CavernError::UnknownCreature` when missing
    fn creature_profile(&self, kind: &CreatureKind) -> Result<CreatureProfile>;

    fn spawn_creature(&mut self, kind: &CreatureKind, cell: CellCoord, hostile: bool)
        -> Result<EntityId>;
}

/// Result of a structure detection poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructureScan {
    pub powered_stabilizers: usize,
}

impl StructureScan {
    pub fn stabilized(&self) -> bool {
        self.powered_stabilizers > 0
    }
}

pub trait StructureSurvey {
    fn scan_structures(&self) -> Result<StructureScan>;
}

pub trait PocketLifecycle {
    /// Destroy the pocket map itself
    fn tear_down_pocket(&mut self) -> Result<()>;

    /// Remove the entrance structure on the host map
    fn remove_host_structure(&mut self) -> Result<()>;
}

/// Everything the controller needs from its host
pub trait CavernEnvironment:
    CavernGrid + Occupants + CreatureSpawner + StructureSurvey + PocketLifecycle
{
}

impl<T> CavernEnvironment for T where
    T: CavernGrid + Occupants + CreatureSpawner + StructureSurvey + PocketLifecycle
{
}
