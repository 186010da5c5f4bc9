#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use rand::RngCore;
use rand::SeedableRng;
use std::time::Instant;
use turbo_stencil::stencil::{
    Boundary, EngineConfig, Grid, LifeRule, Opt, Rule, RuleEngine, SimulationState,
};

/// `fill` is the side fraction of the seeded square; the rest stays dead.
fn seeded_state(size: usize, fill: f64, density: f64, rules: &[Rule<u8>]) -> SimulationState<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xBEEF_CAFE);
    let threshold = (u64::MAX as f64 * density) as u64;
    let side = ((size as f64) * fill) as usize;
    let grid = Grid::from_fn(size, size, Boundary::Remove, |i, j| {
        u8::from(i < side && j < side && rng.next_u64() <= threshold)
    });
    SimulationState::builder()
        .grid("life", grid)
        .build_for(rules)
        .expect("valid state")
}

fn bench(label: &str, size: usize, fill: f64, radius: usize, iterations: u64) {
    let rules = [LifeRule::conway().with_radius(radius).into_rule("life")];
    for opt in [Opt::SparseBlocks, Opt::NoOpt] {
        let mut engine = RuleEngine::with_config(EngineConfig::default().opt(opt));
        let mut state = seeded_state(size, fill, 0.3, &rules);

        // Warm up: 2 steps to settle the status bitmaps
        state = engine.run(state, &rules, 2).expect("warm-up");

        let start = Instant::now();
        state = engine.run(state, &rules, iterations).expect("bench run");
        let elapsed = start.elapsed();

        let total_ms = elapsed.as_secs_f64() * 1000.0;
        let avg_us = total_ms * 1000.0 / iterations as f64;
        let stats = engine.last_stats();
        let pop = state.grid("life").map_or(0, Grid::population);
        println!(
            "{:<28} {:<12} {:>5} iters  {:>9.1} ms total  {:>9.1} us/step  skipped={:<6} pop={}",
            label,
            format!("{opt:?}"),
            iterations,
            total_ms,
            avg_us,
            stats.blocks_skipped,
            pop
        );
    }
}

fn main() {
    println!("=== Stencil Activity Benchmark ===\n");

    bench("small 128 full r=1", 128, 1.0, 1, 200);
    bench("medium 512 corner r=1", 512, 0.1, 1, 100);
    bench("medium 512 full r=1", 512, 1.0, 1, 50);
    bench("large 2048 corner r=1", 2048, 0.05, 1, 20);
    bench("large 2048 corner r=2", 2048, 0.05, 2, 10);
}
