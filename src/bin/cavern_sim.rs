//! Headless Cavern Simulator
//!
//! Opens an in-memory cavern, runs it until it collapses (or the tick limit
//! is reached) and prints a summary of everything that happened.

use std::collections::BTreeMap;
use std::path::PathBuf;

use cavern_collapse::cavern::{ActiveCavernRegistry, CavernController, CavernEvent};
use cavern_collapse::collapse::CollapsePhase;
use cavern_collapse::core::config::CavernConfig;
use cavern_collapse::core::error::Result;
use cavern_collapse::core::types::{CellCoord, HostId};
use cavern_collapse::environment::{CavernGrid, MemoryCavern, NullPresentation, Occupants};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Headless Cavern Simulator - run a pocket cavern to destruction
#[derive(Parser, Debug)]
#[command(name = "cavern_sim")]
#[command(about = "Run an unstable cavern headlessly and report what happened")]
struct Args {
    /// Cavern width in cells
    #[arg(long, default_value_t = 80)]
    width: usize,

    /// Cavern height in cells
    #[arg(long, default_value_t = 60)]
    height: usize,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum ticks to run
    #[arg(long, default_value_t = 2_000_000)]
    ticks: u64,

    /// Occupants placed at random floor cells
    #[arg(long, default_value_t = 0)]
    occupants: usize,

    /// Power a stabilizer for the whole run
    #[arg(long)]
    stabilizer: bool,

    /// Share of interior cells that start as rock
    #[arg(long, default_value_t = 0.08)]
    rock_density: f64,

    /// Complete a mining job every N ticks
    #[arg(long)]
    mining_interval: Option<u64>,

    /// TOML configuration file (see data/cavern.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override stability.duration_ticks from the configuration
    #[arg(long)]
    duration: Option<u64>,

    /// Write the final cavern state to this JSON file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Ticks between progress lines
    #[arg(long, default_value_t = 10_000)]
    report_interval: u64,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Tracing filter directive
    #[arg(long, default_value = "cavern_collapse=info")]
    log: String,
}

#[derive(Serialize)]
struct SimSummary {
    seed: u64,
    ticks_run: u64,
    final_phase: CollapsePhase,
    fraction: f32,
    ticks_lost: u64,
    walkable_cells: usize,
    occupants_alive: usize,
    creatures_spawned: usize,
    phase_changes: Vec<(u64, CollapsePhase)>,
    events: BTreeMap<&'static str, usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log.as_str())
        .init();

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut config = match &args.config {
        Some(path) => CavernConfig::load(path)?,
        None => CavernConfig::default(),
    };
    if let Some(duration) = args.duration {
        config.stability.duration_ticks = duration;
        config.validate()?;
    }

    let mut cavern = MemoryCavern::scattered(args.width, args.height, seed, args.rock_density);
    for rule in &config.spawning.rules {
        for creature in &rule.pool {
            cavern.register_creature(creature.kind.as_str(), true);
        }
    }
    if args.stabilizer {
        cavern.set_stabilizers(1);
    }
    place_occupants(&mut cavern, args.occupants, &mut rng);

    let registry = ActiveCavernRegistry::default().shared();
    let host = HostId(1);
    let mut controller = CavernController::new(config, host, cavern, NullPresentation, seed)?
        .with_registry(registry.clone());

    tracing::info!(
        "Cavern {}x{} opened (seed {}, {} walkable cells, {} occupants)",
        args.width,
        args.height,
        seed,
        controller.env().walkable_count(),
        args.occupants
    );

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut phase_changes = Vec::new();
    let mut ticks_run = 0;

    for now in 1..=args.ticks {
        ticks_run = now;

        if let Some(every) = args.mining_interval {
            if every > 0 && now % every == 0 {
                let cell = random_floor(controller.env(), &mut rng);
                if let Some(event) = controller.on_mining_completed(now, cell) {
                    *counts.entry(event.kind()).or_default() += 1;
                }
            }
        }

        for event in controller.tick(now) {
            *counts.entry(event.kind()).or_default() += 1;
            match &event {
                CavernEvent::PhaseChanged { to, fraction, .. } => {
                    tracing::info!("Tick {}: entered {} at fraction {:.3}", now, to, fraction);
                    phase_changes.push((now, *to));
                }
                CavernEvent::Destroyed { cause, .. } => {
                    tracing::info!("Tick {}: cavern destroyed ({:?})", now, cause);
                    phase_changes.push((now, CollapsePhase::Destroyed));
                }
                _ => {}
            }
        }

        if args.report_interval > 0 && now % args.report_interval == 0 {
            tracing::info!(
                "Tick {}: fraction {:.3}, phase {}, {} walkable",
                now,
                controller.stability_fraction(),
                controller.phase(),
                controller.env().walkable_count()
            );
        }

        if controller.is_destroyed() {
            break;
        }
    }

    if let Some(path) = &args.snapshot {
        controller.snapshot().save(path)?;
        tracing::info!("Snapshot written to {}", path.display());
    }

    let summary = SimSummary {
        seed,
        ticks_run,
        final_phase: controller.phase(),
        fraction: controller.stability_fraction(),
        ticks_lost: controller.ticks_lost(),
        walkable_cells: controller.env().walkable_count(),
        occupants_alive: controller.env().occupant_count(),
        creatures_spawned: controller.env().creatures().len(),
        phase_changes,
        events: counts,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, registry.borrow().is_active(host, ticks_run));
    }
    Ok(())
}

fn place_occupants(cavern: &mut MemoryCavern, count: usize, rng: &mut ChaCha8Rng) {
    for _ in 0..count {
        match random_floor(cavern, rng) {
            Some(cell) => {
                cavern.add_occupant(cell);
            }
            None => {
                tracing::warn!("No floor left for occupants");
                return;
            }
        }
    }
}

fn random_floor(cavern: &MemoryCavern, rng: &mut ChaCha8Rng) -> Option<CellCoord> {
    let (width, height) = cavern.dimensions();
    for _ in 0..256 {
        let cell = CellCoord::new(
            rng.gen_range(0..width.max(1)) as i32,
            rng.gen_range(0..height.max(1)) as i32,
        );
        if cavern.is_walkable(cell) {
            return Some(cell);
        }
    }
    None
}

fn print_summary(summary: &SimSummary, still_registered: bool) {
    println!("\n=== CAVERN SUMMARY ===");
    println!("Seed:              {}", summary.seed);
    println!("Ticks run:         {}", summary.ticks_run);
    println!("Final phase:       {}", summary.final_phase);
    println!("Fraction:          {:.3}", summary.fraction);
    println!("Ticks lost:        {}", summary.ticks_lost);
    println!("Walkable cells:    {}", summary.walkable_cells);
    println!("Occupants alive:   {}", summary.occupants_alive);
    println!("Creatures spawned: {}", summary.creatures_spawned);
    println!("Still registered:  {}", still_registered);
    println!("\nPhase changes:");
    for (tick, phase) in &summary.phase_changes {
        println!("  {:>9}  {}", tick, phase);
    }
    println!("\nEvents:");
    for (kind, count) in &summary.events {
        println!("  {:<18} {}", kind, count);
    }
}
