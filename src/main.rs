#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use rand::RngCore;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use turbo_stencil::stencil::{
    Boundary, EngineConfig, Grid, LifeRule, Opt, Rule, RuleEngine, SimulationState,
};

const CHECK_INTERVAL: u64 = 100;

struct MainArgs {
    config: EngineConfig,
    size: usize,
    density: f64,
    steps: u64,
    boundary: Boundary,
    life: LifeRule,
}

fn parse_args() -> MainArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = MainArgs {
        config: EngineConfig::default(),
        size: 1024,
        density: 0.08,
        steps: 500,
        boundary: Boundary::Remove,
        life: LifeRule::conway(),
    };
    let next_arg = |i: usize, flag: &str| -> &str {
        args.get(i)
            .map(String::as_str)
            .unwrap_or_else(|| panic!("{flag} requires a value"))
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--threads" => {
                i += 1;
                let n: usize = next_arg(i, "--threads")
                    .parse()
                    .expect("--threads requires a positive integer");
                parsed.config = parsed.config.thread_count(n);
            }
            "--max-threads" => {
                i += 1;
                let n: usize = next_arg(i, "--max-threads")
                    .parse()
                    .expect("--max-threads requires a positive integer");
                parsed.config = parsed.config.max_threads(n);
            }
            "--size" => {
                i += 1;
                parsed.size = next_arg(i, "--size")
                    .parse()
                    .expect("--size requires a positive integer");
            }
            "--density" => {
                i += 1;
                parsed.density = next_arg(i, "--density")
                    .parse::<f64>()
                    .expect("--density requires a number in [0, 1]")
                    .clamp(0.0, 1.0);
            }
            "--steps" => {
                i += 1;
                parsed.steps = next_arg(i, "--steps")
                    .parse()
                    .expect("--steps requires a positive integer");
            }
            "--rule" => {
                i += 1;
                parsed.life = LifeRule::parse(next_arg(i, "--rule"))
                    .unwrap_or_else(|err| panic!("{err}"));
            }
            "--wrap" => {
                parsed.boundary = Boundary::Wrap;
            }
            other => panic!(
                "unknown argument: {other}\nusage: turbo-stencil [--threads N] [--max-threads N] [--size N] [--density F] [--steps N] [--rule B3/S23] [--wrap]"
            ),
        }
        i += 1;
    }
    parsed
}

/// Random soup in the middle quarter of the world, dead elsewhere, so the
/// sparse scheduler has quiet blocks to skip.
fn seed_random_world(size: usize, density: f64, boundary: Boundary) -> Grid<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED_1234_ABCD_EF01);
    let threshold = (u64::MAX as f64 * density) as u64;
    let (lo, hi) = (size / 4, size - size / 4);
    Grid::from_fn(size, size, boundary, |i, j| {
        let inside = (lo..hi).contains(&i) && (lo..hi).contains(&j);
        u8::from(inside && rng.next_u64() <= threshold)
    })
}

fn main() {
    let args = parse_args();
    let rules: Vec<Rule<u8>> = vec![args.life.clone().into_rule("life")];
    let world = seed_random_world(args.size, args.density, args.boundary);
    let mut sparse_state = SimulationState::builder()
        .grid("life", world.clone())
        .build_for(&rules)
        .expect("failed to build sparse state");
    let mut dense_state = SimulationState::builder()
        .grid("life", world)
        .build_for(&rules)
        .expect("failed to build dense state");

    let mut sparse = RuleEngine::with_config(args.config.clone().opt(Opt::SparseBlocks));
    let mut dense = RuleEngine::with_config(args.config.opt(Opt::NoOpt));
    println!(
        "{} on {}x{} ({:?}), density {}, {} threads",
        args.life,
        args.size,
        args.size,
        args.boundary,
        args.density,
        sparse.thread_count()
    );

    let mut sparse_total = Duration::ZERO;
    let mut dense_total = Duration::ZERO;
    let mut done = 0;
    while done < args.steps {
        let chunk = CHECK_INTERVAL.min(args.steps - done);
        done += chunk;

        let start = Instant::now();
        sparse_state = sparse.run(sparse_state, &rules, chunk).expect("sparse step failed");
        let sparse_phase = start.elapsed();
        sparse_total += sparse_phase;

        let start = Instant::now();
        dense_state = dense.run(dense_state, &rules, chunk).expect("dense step failed");
        let dense_phase = start.elapsed();
        dense_total += dense_phase;

        let sparse_grid = sparse_state.grid("life").expect("life grid");
        let dense_grid = dense_state.grid("life").expect("life grid");
        let match_status = if sparse_grid.iter_logical().eq(dense_grid.iter_logical()) {
            "MATCH"
        } else {
            "MISMATCH"
        };
        let stats = sparse.last_stats();
        println!(
            "Frame {}: sparse pop = {}, dense pop = {} [{match_status}] | blocks visited {} skipped {}",
            sparse_state.frame(),
            sparse_grid.population(),
            dense_grid.population(),
            stats.blocks_visited,
            stats.blocks_skipped,
        );
        println!(
            "  Sparse: {:.3} ms/step | Dense: {:.3} ms/step",
            sparse_phase.as_secs_f64() * 1000.0 / chunk as f64,
            dense_phase.as_secs_f64() * 1000.0 / chunk as f64,
        );
    }

    let sparse_ms = sparse_total.as_secs_f64() * 1000.0;
    let dense_ms = dense_total.as_secs_f64() * 1000.0;
    println!("\n--- Summary ({} steps) ---", args.steps);
    println!("Sparse: {sparse_ms:.3} ms total");
    println!("Dense:  {dense_ms:.3} ms total");
    if sparse_ms > 0.0 {
        println!("Speedup (dense / sparse): {:.2}x", dense_ms / sparse_ms);
    }
}
