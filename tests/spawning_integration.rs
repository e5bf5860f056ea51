//! Integration tests for instability-scaled spawning
//!
//! - rules fire on their own timers and spawn onto valid cells only
//! - higher instability shortens intervals and grows batches
//! - timers survive rule reordering because they are keyed by rule id

use cavern_collapse::cavern::{CavernController, CavernEvent};
use cavern_collapse::core::config::CavernConfig;
use cavern_collapse::core::types::{CellCoord, HostId};
use cavern_collapse::environment::{CavernGrid, MemoryCavern, NullPresentation};
use cavern_collapse::spawning::SpawnRule;

fn spawn_config(rules: Vec<SpawnRule>) -> CavernConfig {
    let mut config = CavernConfig::default();
    config.stability.duration_ticks = 100_000;
    config.spawning.refresh_budget = 400;
    config.spawning.refresh_interval = 200;
    config.spawning.rules = rules;
    config
}

fn cavern() -> MemoryCavern {
    let mut cavern = MemoryCavern::new(40, 40);
    cavern.register_creature("megaspider", true);
    cavern.register_creature("cave_rat", false);
    cavern
}

fn spawned(events: &[CavernEvent]) -> Vec<(String, CellCoord, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            CavernEvent::CreatureSpawned {
                kind, cell, hostile, ..
            } => Some((kind.as_str().to_string(), *cell, *hostile)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_spawns_respect_placement_rules() {
    let mut config = spawn_config(vec![SpawnRule::new("spiders", 500)
        .with_creature("megaspider", 1.0)
        .with_count(2, 3)
        .with_spawn_radius(3.0)
        .with_hostile_chance(0.5)]);
    config.spawning.colonist_avoid_radius = 8.0;
    config.spawning.exit_avoid_radius = 5.0;

    let mut cavern = cavern();
    let colonist = CellCoord::new(10, 10);
    let exit = CellCoord::new(30, 30);
    cavern.add_occupant(colonist);
    cavern.set_exit(Some(exit));
    cavern.set_structure(CellCoord::new(20, 20), true);

    let mut controller =
        CavernController::new(config, HostId(3), cavern, NullPresentation, 11).expect("valid config");

    let mut all = Vec::new();
    for now in 1..=5_000 {
        all.extend(spawned(&controller.tick(now)));
    }

    assert!(!all.is_empty(), "nothing spawned");
    for (_, cell, _) in &all {
        assert!(controller.env().is_walkable(*cell));
        assert!(!cell.within_radius(&colonist, 8.0), "{} too close to colonist", cell);
        assert!(!cell.within_radius(&exit, 5.0), "{} too close to exit", cell);
        assert_ne!(*cell, CellCoord::new(20, 20));
    }
    assert_eq!(controller.env().creatures().len(), all.len());
}

#[test]
fn test_higher_instability_spawns_more() {
    let rule = SpawnRule::new("rats", 2_000)
        .with_creature("cave_rat", 1.0)
        .with_count(1, 2);

    let run = |burst_ticks: u64| {
        let mut config = spawn_config(vec![rule.clone()]);
        // Long enough that the fraction barely moves during the run
        config.stability.duration_ticks = 1_000_000;
        config.stability.mining_burst_ticks = burst_ticks;
        let mut controller =
            CavernController::new(config, HostId(1), cavern(), NullPresentation, 5).expect("valid config");
        if burst_ticks > 0 {
            controller.on_mining_completed(0, None);
        }
        let mut total = 0;
        for now in 1..=20_000 {
            total += spawned(&controller.tick(now)).len();
        }
        total
    };

    // 0.1 of the duration versus 0.9: intervals shrink and batches grow
    let calm = run(100_000);
    let unstable = run(900_000);
    assert!(
        unstable > calm * 2,
        "unstable cavern spawned {} vs calm {}",
        unstable,
        calm
    );
}

#[test]
fn test_non_hostile_kinds_never_turn_hostile() {
    let config = spawn_config(vec![SpawnRule::new("rats", 100)
        .with_creature("cave_rat", 1.0)
        .with_count(3, 3)
        .with_hostile_chance(1.0)]);
    let mut controller =
        CavernController::new(config, HostId(1), cavern(), NullPresentation, 2).expect("valid config");

    for now in 1..=1_000 {
        controller.tick(now);
    }
    assert!(!controller.env().creatures().is_empty());
    assert!(controller.env().creatures().iter().all(|c| !c.hostile));
}

#[test]
fn test_timers_keyed_by_rule_id_survive_reordering() {
    let a = SpawnRule::new("a", 700).with_creature("cave_rat", 1.0);
    let b = SpawnRule::new("b", 1_300).with_creature("megaspider", 1.0);

    let mut controller = CavernController::new(
        spawn_config(vec![a.clone(), b.clone()]),
        HostId(1),
        cavern(),
        NullPresentation,
        9,
    )
    .expect("valid config");
    for now in 1..=2_000 {
        controller.tick(now);
    }
    let before_a = controller.spawning().next_check("a");
    let before_b = controller.spawning().next_check("b");
    assert!(before_a.is_some() && before_b.is_some());

    let snapshot = controller.snapshot();
    let env = controller.env().clone();
    let restored = CavernController::restore(
        spawn_config(vec![b, a]),
        env,
        NullPresentation,
        snapshot,
    )
    .expect("valid config");

    assert_eq!(restored.spawning().next_check("a"), before_a);
    assert_eq!(restored.spawning().next_check("b"), before_b);
}

#[test]
fn test_unknown_creature_does_not_stop_other_rules() {
    let config = spawn_config(vec![
        SpawnRule::new("ghosts", 300).with_creature("ghost", 1.0),
        SpawnRule::new("rats", 300).with_creature("cave_rat", 1.0),
    ]);
    let mut controller =
        CavernController::new(config, HostId(1), cavern(), NullPresentation, 4).expect("valid config");

    let mut kinds = Vec::new();
    for now in 1..=3_000 {
        kinds.extend(spawned(&controller.tick(now)).into_iter().map(|(k, _, _)| k));
    }
    assert!(!kinds.is_empty());
    assert!(kinds.iter().all(|k| k == "cave_rat"));
    assert!(controller.spawning().next_check("ghosts").is_some_and(|t| t > 3_000));
}
