//! In-memory cavern environment
//!
//! A self-contained implementation of every environment service, used by the
//! headless simulator and the test suite. Entity ids are handed out from a
//! counter so two clones of the same cavern replay identically.

use ahash::AHashMap;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::error::{CavernError, Result};
use crate::core::types::{CellCoord, CreatureKind, EntityId};
use crate::environment::{
    CavernGrid, CreatureProfile, CreatureSpawner, Occupants, PocketLifecycle, StructureScan,
    StructureSurvey,
};
use crate::spatial::Grid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terrain {
    #[default]
    Floor,
    Rock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellState {
    pub terrain: Terrain,
    pub structure: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    pub cell: CellCoord,
    pub alive: bool,
}

/// A creature the environment has instantiated
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnedCreature {
    pub id: EntityId,
    pub kind: CreatureKind,
    pub cell: CellCoord,
    pub hostile: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryCavern {
    grid: Grid<CellState>,
    walkable: usize,
    ready: bool,
    exit: Option<CellCoord>,
    exit_lookup_fails: bool,
    occupants: BTreeMap<EntityId, Occupant>,
    catalog: AHashMap<CreatureKind, CreatureProfile>,
    creatures: Vec<SpawnedCreature>,
    next_entity: u64,
    stabilizers: usize,
    lethal_log: Vec<EntityId>,
    pocket_teardowns: u32,
    host_removals: u32,
}

impl MemoryCavern {
    /// Open floor surrounded by a one-cell rock border
    pub fn new(width: usize, height: usize) -> Self {
        let mut cavern = Self {
            grid: Grid::new(width, height),
            walkable: width * height,
            ready: true,
            exit: None,
            exit_lookup_fails: false,
            occupants: BTreeMap::new(),
            catalog: AHashMap::new(),
            creatures: Vec::new(),
            next_entity: 0,
            stabilizers: 0,
            lethal_log: Vec::new(),
            pocket_teardowns: 0,
            host_removals: 0,
        };
        for x in 0..width as i32 {
            cavern.set_rock(CellCoord::new(x, 0));
            cavern.set_rock(CellCoord::new(x, height as i32 - 1));
        }
        for y in 0..height as i32 {
            cavern.set_rock(CellCoord::new(0, y));
            cavern.set_rock(CellCoord::new(width as i32 - 1, y));
        }
        cavern
    }

    /// Bordered cavern with scattered rock pillars
    pub fn scattered(width: usize, height: usize, seed: u64, rock_density: f64) -> Self {
        let mut cavern = Self::new(width, height);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let density = rock_density.clamp(0.0, 1.0);
        for y in 1..height.saturating_sub(1) as i32 {
            for x in 1..width.saturating_sub(1) as i32 {
                if rng.gen_bool(density) {
                    cavern.set_rock(CellCoord::new(x, y));
                }
            }
        }
        let exit = CellCoord::new(width as i32 / 2, height as i32 - 2);
        cavern.clear_rock(exit);
        cavern.exit = Some(exit);
        cavern
    }

    pub fn set_rock(&mut self, cell: CellCoord) {
        if let Some(state) = self.grid.get_mut(cell) {
            if state.terrain == Terrain::Floor {
                self.walkable -= 1;
            }
            state.terrain = Terrain::Rock;
            state.structure = false;
        }
    }

    /// Mine a cell back to floor
    pub fn clear_rock(&mut self, cell: CellCoord) {
        if let Some(state) = self.grid.get_mut(cell) {
            if state.terrain == Terrain::Rock {
                self.walkable += 1;
            }
            state.terrain = Terrain::Floor;
        }
    }

    pub fn set_structure(&mut self, cell: CellCoord, present: bool) {
        if let Some(state) = self.grid.get_mut(cell) {
            state.structure = present;
        }
    }

    pub fn set_exit(&mut self, exit: Option<CellCoord>) {
        self.exit = exit;
    }

    /// Make `find_exit` fail, simulating a broken lookup service
    pub fn set_exit_lookup_fails(&mut self, fails: bool) {
        self.exit_lookup_fails = fails;
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_stabilizers(&mut self, count: usize) {
        self.stabilizers = count;
    }

    pub fn register_creature(&mut self, kind: impl Into<String>, can_be_hostile: bool) {
        self.catalog
            .insert(CreatureKind::new(kind), CreatureProfile { can_be_hostile });
    }

    pub fn add_occupant(&mut self, cell: CellCoord) -> EntityId {
        let id = self.allocate_id();
        self.occupants.insert(id, Occupant { cell, alive: true });
        id
    }

    pub fn move_occupant(&mut self, id: EntityId, cell: CellCoord) {
        if let Some(occupant) = self.occupants.get_mut(&id) {
            occupant.cell = cell;
        }
    }

    pub fn occupant(&self, id: EntityId) -> Option<&Occupant> {
        self.occupants.get(&id)
    }

    pub fn cell(&self, cell: CellCoord) -> Option<CellState> {
        self.grid.get(cell).copied()
    }

    pub fn creatures(&self) -> &[SpawnedCreature] {
        &self.creatures
    }

    /// Every lethal effect applied, in order (duplicates included)
    pub fn lethal_log(&self) -> &[EntityId] {
        &self.lethal_log
    }

    pub fn pocket_teardowns(&self) -> u32 {
        self.pocket_teardowns
    }

    pub fn host_removals(&self) -> u32 {
        self.host_removals
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId::from_index(self.next_entity);
        self.next_entity += 1;
        id
    }
}

impl CavernGrid for MemoryCavern {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.grid.width, self.grid.height)
    }

    fn is_walkable(&self, cell: CellCoord) -> bool {
        matches!(self.grid.get(cell), Some(state) if state.terrain == Terrain::Floor)
    }

    fn has_structure(&self, cell: CellCoord) -> bool {
        matches!(self.grid.get(cell), Some(state) if state.structure)
    }

    fn is_rock(&self, cell: CellCoord) -> bool {
        matches!(self.grid.get(cell), Some(state) if state.terrain == Terrain::Rock)
    }

    fn place_rock(&mut self, cell: CellCoord) -> Result<()> {
        if !self.ready {
            return Err(CavernError::GridUnavailable);
        }
        if !self.grid.in_bounds(cell) {
            return Err(CavernError::Service(format!("cell {} out of bounds", cell)));
        }
        self.set_rock(cell);
        Ok(())
    }

    fn find_exit(&self) -> Result<Option<CellCoord>> {
        if self.exit_lookup_fails {
            return Err(CavernError::Service("exit lookup failed".into()));
        }
        Ok(self.exit)
    }

    fn walkable_count(&self) -> usize {
        self.walkable
    }
}

impl Occupants for MemoryCavern {
    fn occupant_count(&self) -> usize {
        self.occupants.values().filter(|o| o.alive).count()
    }

    fn occupant_positions(&self) -> Vec<CellCoord> {
        self.occupants
            .values()
            .filter(|o| o.alive)
            .map(|o| o.cell)
            .collect()
    }

    fn occupants_at(&self, cell: CellCoord) -> Vec<EntityId> {
        self.occupants
            .iter()
            .filter(|(_, o)| o.alive && o.cell == cell)
            .map(|(id, _)| *id)
            .collect()
    }

    fn all_occupants(&self) -> Vec<EntityId> {
        self.occupants
            .iter()
            .filter(|(_, o)| o.alive)
            .map(|(id, _)| *id)
            .collect()
    }

    fn apply_lethal(&mut self, id: EntityId) -> Result<()> {
        let occupant = self
            .occupants
            .get_mut(&id)
            .ok_or_else(|| CavernError::Service(format!("no occupant {:?}", id)))?;
        occupant.alive = false;
        self.lethal_log.push(id);
        Ok(())
    }
}

impl CreatureSpawner for MemoryCavern {
    fn creature_profile(&self, kind: &CreatureKind) -> Result<CreatureProfile> {
        self.catalog
            .get(kind)
            .cloned()
            .ok_or_else(|| CavernError::UnknownCreature(kind.clone()))
    }

    fn spawn_creature(
        &mut self,
        kind: &CreatureKind,
        cell: CellCoord,
        hostile: bool,
    ) -> Result<EntityId> {
        self.creature_profile(kind)?;
        if !self.is_walkable(cell) {
            return Err(CavernError::SpawnFailed {
                kind: kind.clone(),
                reason: format!("cell {} is not walkable", cell),
            });
        }
        let id = self.allocate_id();
        self.creatures.push(SpawnedCreature {
            id,
            kind: kind.clone(),
            cell,
            hostile,
        });
        Ok(id)
    }
}

impl StructureSurvey for MemoryCavern {
    fn scan_structures(&self) -> Result<StructureScan> {
        Ok(StructureScan {
            powered_stabilizers: self.stabilizers,
        })
    }
}

impl PocketLifecycle for MemoryCavern {
    fn tear_down_pocket(&mut self) -> Result<()> {
        self.pocket_teardowns += 1;
        self.ready = false;
        Ok(())
    }

    fn remove_host_structure(&mut self) -> Result<()> {
        self.host_removals += 1;
        Ok(())
    }
}
