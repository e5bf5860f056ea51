//! Property tests for the spawn scaling law and the blockable-cell sweep

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use cavern_collapse::collapse::GridCellCache;
use cavern_collapse::core::types::CellCoord;
use cavern_collapse::environment::{CavernGrid, MemoryCavern};
use cavern_collapse::spawning::scaling::{
    count_multiplier, frequency_multiplier, next_interval, sample_count, scaling_multiplier,
    MAX_FREQUENCY_MULTIPLIER, MIN_FREQUENCY_MULTIPLIER,
};

/// Cells a complete sweep must find: open floor touching rock
fn expected_blockable(grid: &MemoryCavern) -> Vec<CellCoord> {
    let (w, h) = grid.dimensions();
    let mut cells = Vec::new();
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let cell = CellCoord::new(x, y);
            if grid.is_walkable(cell)
                && !grid.has_structure(cell)
                && cell.neighbors().any(|n| grid.in_bounds(n) && grid.is_rock(n))
            {
                cells.push(cell);
            }
        }
    }
    cells
}

proptest! {
    #[test]
    fn property_baseline_fraction_is_identity(factor in 0.01_f32..10.0) {
        prop_assert_eq!(scaling_multiplier(0.5, factor), 1.0);
        prop_assert_eq!(frequency_multiplier(0.5, factor), 1.0);
    }

    #[test]
    fn property_frequency_stays_clamped(fraction in 0.0_f32..5.0, factor in 0.01_f32..10.0) {
        let m = frequency_multiplier(fraction, factor);
        prop_assert!((MIN_FREQUENCY_MULTIPLIER..=MAX_FREQUENCY_MULTIPLIER).contains(&m));
    }

    #[test]
    fn property_frequency_monotonic(a in 0.0_f32..3.0, b in 0.0_f32..3.0, factor in 0.1_f32..5.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(frequency_multiplier(lo, factor) <= frequency_multiplier(hi, factor));
    }

    #[test]
    fn property_count_at_least_one(
        fraction in 0.0001_f32..3.0,
        factor in 0.1_f32..5.0,
        min in 0_u32..10,
        extra in 0_u32..10,
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let count = sample_count(&mut rng, [min, min + extra], count_multiplier(fraction, factor));
        prop_assert!(count >= 1);
    }

    #[test]
    fn property_count_within_scaled_range(
        fraction in 0.01_f32..2.0,
        min in 1_u32..10,
        extra in 0_u32..10,
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let m = count_multiplier(fraction, 1.0);
        let max = min + extra;
        let count = sample_count(&mut rng, [min, max], m);
        let lo = ((min as f32 * m).round() as u32).max(1);
        let hi = ((max as f32 * m).round() as u32).max(1);
        prop_assert!(count >= lo && count <= hi, "{} not in [{}, {}]", count, lo, hi);
    }

    #[test]
    fn property_interval_positive_and_baseline_near_zero(
        baseline in 1_u64..100_000,
        fraction in 0.0_f32..3.0,
        factor in 0.1_f32..5.0,
    ) {
        let interval = next_interval(baseline, fraction, factor);
        prop_assert!(interval >= 1);
        if fraction <= 0.01 {
            prop_assert_eq!(interval, baseline);
        }
    }

    #[test]
    fn property_sweep_finds_exactly_the_blockable_cells(
        width in 3_usize..24,
        height in 3_usize..24,
        density in 0.0_f64..0.6,
        seed in any::<u64>(),
        budget in 1_usize..64,
    ) {
        let grid = MemoryCavern::scattered(width, height, seed, density);
        let mut cache = GridCellCache::new(10_000);
        cache.begin_refresh(0, None);

        let calls = grid.cell_count().div_ceil(budget);
        for _ in 0..calls {
            prop_assert!(!cache.is_refresh_complete());
            cache.step_refresh(&grid, budget);
        }
        prop_assert!(cache.is_refresh_complete());

        let mut found: Vec<CellCoord> = cache.blockable().iter().collect();
        found.sort();
        let mut expected = expected_blockable(&grid);
        expected.sort();
        prop_assert_eq!(found, expected);
    }
}
