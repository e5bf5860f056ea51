//! Selection of the next cells to obstruct
//!
//! Partial collapse drops single cells at random. Full collapse drops small
//! batches and prefers "open" cells (few obstructed neighbors) so the cavern
//! caves in from the ceiling rather than eroding inward from its walls.

use rand::Rng;
use std::collections::BTreeSet;

use crate::collapse::cell_cache::GridCellCache;
use crate::collapse::phase::CollapsePhase;
use crate::core::config::CollapseConfig;
use crate::core::types::{CellCoord, EntityId};
use crate::environment::{CavernGrid, Occupants, PresentationService};

/// What a single strategy invocation did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollapseOutcome {
    pub obstructed: Vec<CellCoord>,
    /// Occupants killed by a forced collapse during this invocation
    pub crushed: Vec<EntityId>,
    /// Picks skipped because a living occupant stood there
    pub skipped_occupied: usize,
    /// Picks evicted by lazy revalidation
    pub evicted: usize,
}

enum Placement {
    Placed,
    Occupied,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CollapseStrategy {
    full_batch: usize,
    open_neighbor_limit: usize,
    sample_size: usize,
    max_pick_attempts: usize,
    forced_collapse_fraction: f32,
}

impl CollapseStrategy {
    pub fn new(config: &CollapseConfig, forced_collapse_fraction: f32) -> Self {
        Self {
            full_batch: config.full_collapse_batch.max(1),
            open_neighbor_limit: config.open_neighbor_limit,
            sample_size: config.sample_size.max(1),
            max_pick_attempts: config.max_pick_attempts.max(1),
            forced_collapse_fraction,
        }
    }

    /// Pick and obstruct cells for `phase`; a no-op outside collapse phases
    pub fn execute<E, P, R>(
        &self,
        phase: CollapsePhase,
        fraction: f32,
        cache: &mut GridCellCache,
        env: &mut E,
        presentation: &mut P,
        notified: &mut BTreeSet<EntityId>,
        rng: &mut R,
    ) -> CollapseOutcome
    where
        E: CavernGrid + Occupants + ?Sized,
        P: PresentationService + ?Sized,
        R: Rng + ?Sized,
    {
        let mut pass = Pass {
            fraction,
            cache,
            env,
            presentation,
            notified,
            outcome: CollapseOutcome::default(),
        };
        match phase {
            CollapsePhase::PartialCollapse => self.collapse_single(&mut pass, rng),
            CollapsePhase::FullCollapse => self.collapse_batch(&mut pass, rng),
            CollapsePhase::Stable | CollapsePhase::Destroyed => {}
        }
        pass.outcome
    }

    /// Number of the eight neighbors that are rock or off-grid
    pub fn obstructed_neighbors<G: CavernGrid + ?Sized>(grid: &G, cell: CellCoord) -> usize {
        cell.neighbors()
            .filter(|&n| !grid.in_bounds(n) || grid.is_rock(n))
            .count()
    }

    fn collapse_single<E, P, R>(&self, pass: &mut Pass<'_, E, P>, rng: &mut R)
    where
        E: CavernGrid + Occupants + ?Sized,
        P: PresentationService + ?Sized,
        R: Rng + ?Sized,
    {
        for _ in 0..self.max_pick_attempts {
            let Some(cell) = pass.cache.blockable().choose(rng) else {
                return;
            };
            if !pass.still_blockable(cell) {
                continue;
            }
            match self.try_obstruct(pass, cell) {
                Placement::Placed | Placement::Failed => return,
                Placement::Occupied => continue,
            }
        }
    }

    fn collapse_batch<E, P, R>(&self, pass: &mut Pass<'_, E, P>, rng: &mut R)
    where
        E: CavernGrid + Occupants + ?Sized,
        P: PresentationService + ?Sized,
        R: Rng + ?Sized,
    {
        let mut sample: Vec<CellCoord> = Vec::with_capacity(self.sample_size);
        for _ in 0..self.sample_size {
            match pass.cache.blockable().choose(rng) {
                Some(cell) if !sample.contains(&cell) => sample.push(cell),
                Some(_) => {}
                None => break,
            }
        }

        let mut open = Vec::new();
        let mut fallback = Vec::new();
        for cell in sample {
            if !pass.still_blockable(cell) {
                continue;
            }
            if Self::obstructed_neighbors(&*pass.env, cell) <= self.open_neighbor_limit {
                open.push(cell);
            } else {
                fallback.push(cell);
            }
        }

        let candidates = if open.is_empty() { fallback } else { open };
        let mut placed = 0;
        for cell in candidates {
            if placed >= self.full_batch {
                break;
            }
            match self.try_obstruct(pass, cell) {
                Placement::Placed => placed += 1,
                Placement::Occupied => {}
                Placement::Failed => break,
            }
        }
    }

    fn try_obstruct<E, P>(&self, pass: &mut Pass<'_, E, P>, cell: CellCoord) -> Placement
    where
        E: CavernGrid + Occupants + ?Sized,
        P: PresentationService + ?Sized,
    {
        let occupants = pass.env.occupants_at(cell);
        if !occupants.is_empty() {
            if pass.fraction <= self.forced_collapse_fraction {
                pass.outcome.skipped_occupied += 1;
                return Placement::Occupied;
            }
            for id in occupants {
                // One lethal effect and one notice per occupant, ever
                if !pass.notified.insert(id) {
                    continue;
                }
                if let Err(e) = pass.env.apply_lethal(id) {
                    tracing::warn!("Lethal effect on {:?} failed: {}", id, e);
                }
                if let Err(e) = pass.presentation.occupant_crushed(id, cell) {
                    tracing::warn!("Crush notice for {:?} failed: {}", id, e);
                }
                tracing::info!("Occupant {:?} crushed by forced collapse at {}", id, cell);
                pass.outcome.crushed.push(id);
            }
        }

        match pass.env.place_rock(cell) {
            Ok(()) => {
                pass.cache.on_obstruction_placed(cell);
                pass.outcome.obstructed.push(cell);
                Placement::Placed
            }
            Err(e) => {
                tracing::warn!("Failed to obstruct {}: {}", cell, e);
                Placement::Failed
            }
        }
    }
}

/// Borrowed state for one strategy invocation
struct Pass<'a, E: ?Sized, P: ?Sized> {
    fraction: f32,
    cache: &'a mut GridCellCache,
    env: &'a mut E,
    presentation: &'a mut P,
    notified: &'a mut BTreeSet<EntityId>,
    outcome: CollapseOutcome,
}

impl<E: CavernGrid + ?Sized, P: ?Sized> Pass<'_, E, P> {
    /// Lazy revalidation of a picked member; evicts it when stale
    fn still_blockable(&mut self, cell: CellCoord) -> bool {
        if self.cache.is_blockable(&*self.env, cell) {
            return true;
        }
        self.cache.evict(cell);
        self.outcome.evicted += 1;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::presentation::FailingPresentation;
    use crate::environment::{MemoryCavern, NullPresentation};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn strategy() -> CollapseStrategy {
        CollapseStrategy::new(&CollapseConfig::default(), 1.5)
    }

    fn primed_cache(grid: &MemoryCavern) -> GridCellCache {
        let mut cache = GridCellCache::new(10_000);
        cache.begin_refresh(0, None);
        cache.step_refresh(grid, grid.cell_count());
        cache
    }

    #[test]
    fn test_partial_places_exactly_one() {
        let mut grid = MemoryCavern::new(12, 12);
        let mut cache = primed_cache(&grid);
        let before = cache.blockable().len();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut notified = BTreeSet::new();

        let outcome = strategy().execute(
            CollapsePhase::PartialCollapse,
            0.6,
            &mut cache,
            &mut grid,
            &mut NullPresentation,
            &mut notified,
            &mut rng,
        );
        assert_eq!(outcome.obstructed.len(), 1);
        let cell = outcome.obstructed[0];
        assert!(grid.is_rock(cell));
        assert!(!cache.blockable().contains(cell));
        assert_eq!(cache.blockable().len(), before - 1);
    }

    #[test]
    fn test_full_places_batch() {
        let mut grid = MemoryCavern::new(30, 30);
        let mut cache = primed_cache(&grid);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut notified = BTreeSet::new();

        let outcome = strategy().execute(
            CollapsePhase::FullCollapse,
            1.1,
            &mut cache,
            &mut grid,
            &mut NullPresentation,
            &mut notified,
            &mut rng,
        );
        assert_eq!(outcome.obstructed.len(), 5);
    }

    #[test]
    fn test_stable_does_nothing() {
        let mut grid = MemoryCavern::new(12, 12);
        let mut cache = primed_cache(&grid);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let outcome = strategy().execute(
            CollapsePhase::Stable,
            0.1,
            &mut cache,
            &mut grid,
            &mut NullPresentation,
            &mut BTreeSet::new(),
            &mut rng,
        );
        assert_eq!(outcome, CollapseOutcome::default());
    }

    #[test]
    fn test_occupied_cell_is_skipped_below_threshold() {
        // 3x3 room: only the center is floor, and it touches rock
        let mut grid = MemoryCavern::new(3, 3);
        let center = CellCoord::new(1, 1);
        let id = grid.add_occupant(center);
        let mut cache = primed_cache(&grid);
        assert_eq!(cache.blockable().len(), 1);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut notified = BTreeSet::new();

        let outcome = strategy().execute(
            CollapsePhase::FullCollapse,
            1.2,
            &mut cache,
            &mut grid,
            &mut NullPresentation,
            &mut notified,
            &mut rng,
        );
        assert!(outcome.obstructed.is_empty());
        assert!(outcome.skipped_occupied >= 1);
        assert!(grid.is_walkable(center));
        assert!(grid.occupant(id).unwrap().alive);
    }

    #[test]
    fn test_forced_collapse_kills_once_and_obstructs() {
        let mut grid = MemoryCavern::new(3, 3);
        let center = CellCoord::new(1, 1);
        let id = grid.add_occupant(center);
        let mut cache = primed_cache(&grid);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut notified = BTreeSet::new();

        let outcome = strategy().execute(
            CollapsePhase::FullCollapse,
            1.6,
            &mut cache,
            &mut grid,
            &mut NullPresentation,
            &mut notified,
            &mut rng,
        );
        assert_eq!(outcome.obstructed, vec![center]);
        assert_eq!(outcome.crushed, vec![id]);
        assert!(grid.is_rock(center));
        assert_eq!(grid.lethal_log(), &[id]);
        assert!(notified.contains(&id));
    }

    #[test]
    fn test_failed_crush_notice_still_kills_and_obstructs() {
        let mut grid = MemoryCavern::new(3, 3);
        let center = CellCoord::new(1, 1);
        let id = grid.add_occupant(center);
        let mut cache = primed_cache(&grid);
        let mut presentation = FailingPresentation::default();
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let outcome = strategy().execute(
            CollapsePhase::PartialCollapse,
            1.6,
            &mut cache,
            &mut grid,
            &mut presentation,
            &mut BTreeSet::new(),
            &mut rng,
        );
        assert_eq!(presentation.calls, 1);
        assert_eq!(outcome.crushed, vec![id]);
        assert_eq!(outcome.obstructed, vec![center]);
        assert_eq!(grid.lethal_log(), &[id]);
    }

    #[test]
    fn test_prefers_open_cells() {
        // Edge cells of an open room have three rock neighbors, corners five
        let mut grid = MemoryCavern::new(20, 20);
        let mut cache = primed_cache(&grid);
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let outcome = strategy().execute(
            CollapsePhase::FullCollapse,
            1.0,
            &mut cache,
            &mut grid,
            &mut NullPresentation,
            &mut BTreeSet::new(),
            &mut rng,
        );
        assert!(!outcome.obstructed.is_empty());
        for cell in &outcome.obstructed {
            // Each placed cell was open at selection time; at most it has
            // gained rock neighbors from the same batch
            let now = CollapseStrategy::obstructed_neighbors(&grid, *cell);
            let same_batch = outcome
                .obstructed
                .iter()
                .filter(|o| *o != cell && o.within_radius(cell, 1.5))
                .count();
            assert!(now - same_batch <= 3);
        }
    }

    #[test]
    fn test_stale_members_are_evicted() {
        let mut grid = MemoryCavern::new(3, 3);
        let mut cache = primed_cache(&grid);
        grid.set_structure(CellCoord::new(1, 1), true);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let outcome = strategy().execute(
            CollapsePhase::PartialCollapse,
            0.7,
            &mut cache,
            &mut grid,
            &mut NullPresentation,
            &mut BTreeSet::new(),
            &mut rng,
        );
        assert!(outcome.obstructed.is_empty());
        assert_eq!(outcome.evicted, 1);
        assert!(cache.blockable().is_empty());
    }
}
