use proptest::prelude::*;
use rand::RngCore;
use rand::SeedableRng;

use turbo_stencil::stencil::{
    Boundary, EngineConfig, Grid, LifeRule, Opt, Rule, RuleEngine, SimulationState,
};

/// Reference step straight from the definition: count every Moore neighbor,
/// folding or dropping out-of-range ones per the boundary.
fn step_naive(
    cells: &[u8],
    (rows, cols): (usize, usize),
    boundary: Boundary,
    rule: &LifeRule,
    mask: Option<&[bool]>,
) -> Vec<u8> {
    let r = rule.radius() as isize;
    let (rows_i, cols_i) = (rows as isize, cols as isize);
    let mut out = cells.to_vec();
    for i in 0..rows_i {
        for j in 0..cols_i {
            let idx = (i * cols_i + j) as usize;
            if mask.is_some_and(|m| !m[idx]) {
                continue;
            }
            let mut count = 0;
            for di in -r..=r {
                for dj in -r..=r {
                    if di == 0 && dj == 0 {
                        continue;
                    }
                    let (mut a, mut b) = (i + di, j + dj);
                    match boundary {
                        Boundary::Wrap => {
                            a = a.rem_euclid(rows_i);
                            b = b.rem_euclid(cols_i);
                        }
                        Boundary::Remove => {
                            if a < 0 || b < 0 || a >= rows_i || b >= cols_i {
                                continue;
                            }
                        }
                    }
                    count += usize::from(cells[(a * cols_i + b) as usize] != 0);
                }
            }
            out[idx] = u8::from(rule.next(cells[idx] != 0, count));
        }
    }
    out
}

fn random_cells(rows: usize, cols: usize, density: f64, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let threshold = (u64::MAX as f64 * density) as u64;
    (0..rows * cols)
        .map(|_| u8::from(rng.next_u64() <= threshold))
        .collect()
}

fn to_grid(cells: &[u8], (rows, cols): (usize, usize), boundary: Boundary) -> Grid<u8> {
    Grid::from_fn(rows, cols, boundary, |i, j| cells[i * cols + j])
}

fn from_grid(grid: &Grid<u8>) -> Vec<u8> {
    grid.iter_logical().map(|(_, v)| v).collect()
}

fn engine(threads: usize, opt: Opt) -> RuleEngine {
    RuleEngine::with_config(EngineConfig::default().thread_count(threads).opt(opt))
}

fn life_for(radius: usize) -> LifeRule {
    match radius {
        1 => LifeRule::conway(),
        // A quiescent radius-2 rule that keeps soups busy for a while.
        _ => LifeRule::new([7, 8], [6, 7, 8, 9]).with_radius(radius),
    }
}

struct ParityCase {
    shape: (usize, usize),
    boundary: Boundary,
    radius: usize,
    density: f64,
    steps: u64,
    seed: u64,
}

fn run_parity_case(case: ParityCase) {
    let ParityCase {
        shape,
        boundary,
        radius,
        density,
        steps,
        seed,
    } = case;
    let life = life_for(radius);
    let rules: Vec<Rule<u8>> = vec![life.clone().into_rule("life")];
    let initial = random_cells(shape.0, shape.1, density, seed);
    let build = || {
        SimulationState::builder()
            .grid("life", to_grid(&initial, shape, boundary))
            .build_for(&rules)
            .unwrap()
    };

    let mut sparse_engine = engine(1, Opt::SparseBlocks);
    let mut dense_engine = engine(1, Opt::NoOpt);
    let mut sparse = build();
    let mut dense = build();
    let mut naive = initial.clone();

    for generation in 1..=steps {
        sparse = sparse_engine.step(sparse, &rules).unwrap();
        dense = dense_engine.step(dense, &rules).unwrap();
        naive = step_naive(&naive, shape, boundary, &life, None);

        let sparse_cells = from_grid(sparse.grid("life").unwrap());
        let dense_cells = from_grid(dense.grid("life").unwrap());
        assert_eq!(
            sparse_cells, dense_cells,
            "sparse/dense mismatch at generation {generation} ({boundary:?}, r={radius}, density {density}, seed {seed})"
        );
        assert_eq!(
            dense_cells, naive,
            "dense/naive mismatch at generation {generation} ({boundary:?}, r={radius}, density {density}, seed {seed})"
        );
    }
}

#[test]
fn parity_radius_one_removed_edges() {
    for (density, seed) in [(0.05, 0xA1), (0.35, 0xB2), (0.8, 0xC3)] {
        run_parity_case(ParityCase {
            shape: (48, 53),
            boundary: Boundary::Remove,
            radius: 1,
            density,
            steps: 8,
            seed,
        });
    }
}

#[test]
fn parity_radius_one_wrapped_edges() {
    for seed in [11u64, 22, 33] {
        run_parity_case(ParityCase {
            shape: (37, 40),
            boundary: Boundary::Wrap,
            radius: 1,
            density: 0.3,
            steps: 8,
            seed,
        });
    }
}

#[test]
fn parity_radius_two() {
    for boundary in [Boundary::Remove, Boundary::Wrap] {
        for (density, seed) in [(0.1, 0xD4), (0.45, 0xE5)] {
            run_parity_case(ParityCase {
                shape: (41, 30),
                boundary,
                radius: 2,
                density,
                steps: 6,
                seed,
            });
        }
    }
}

#[test]
fn parity_tiny_and_ragged_grids() {
    for (shape, radius) in [((1, 1), 1), ((3, 2), 1), ((5, 7), 2), ((2, 9), 2)] {
        for boundary in [Boundary::Remove, Boundary::Wrap] {
            run_parity_case(ParityCase {
                shape,
                boundary,
                radius,
                density: 0.5,
                steps: 4,
                seed: 0x51DE,
            });
        }
    }
}

#[test]
fn sparse_soup_in_empty_field_matches_naive() {
    // Activity confined to a corner; most blocks stay skipped.
    let shape = (64, 64);
    let life = LifeRule::conway();
    let rules = [life.clone().into_rule("life")];
    let mut naive = vec![0u8; 64 * 64];
    let soup = random_cells(12, 12, 0.4, 0x50);
    for i in 0..12 {
        for j in 0..12 {
            naive[(i + 2) * 64 + j + 2] = soup[i * 12 + j];
        }
    }
    let mut state = SimulationState::builder()
        .grid("life", to_grid(&naive, shape, Boundary::Remove))
        .build_for(&rules)
        .unwrap();
    let mut engine = engine(1, Opt::SparseBlocks);
    for _ in 0..30 {
        state = engine.step(state, &rules).unwrap();
        naive = step_naive(&naive, shape, Boundary::Remove, &life, None);
        assert_eq!(from_grid(state.grid("life").unwrap()), naive);
    }
    assert!(engine.last_stats().blocks_skipped > 0);
}

#[test]
fn birth_on_zero_matches_dense_under_default_config() {
    // B0 wakes every empty neighborhood, so quiet blocks cannot be skipped.
    let shape = (16, 16);
    let life = LifeRule::parse("B0/S").unwrap();
    let rules = [life.clone().into_rule("life")];
    let mut naive = vec![0u8; 16 * 16];
    naive[5 * 16 + 7] = 1;
    let build = |cells: &[u8]| {
        SimulationState::builder()
            .grid("life", to_grid(cells, shape, Boundary::Remove))
            .build_for(&rules)
            .unwrap()
    };
    let mut default_engine = RuleEngine::with_config(EngineConfig::default().thread_count(1));
    let mut dense_engine = engine(1, Opt::NoOpt);
    let mut sparse = build(&naive);
    let mut dense = build(&naive);
    for generation in 1..=3 {
        sparse = default_engine.step(sparse, &rules).unwrap();
        dense = dense_engine.step(dense, &rules).unwrap();
        naive = step_naive(&naive, shape, Boundary::Remove, &life, None);
        let sparse_cells = from_grid(sparse.grid("life").unwrap());
        assert_eq!(sparse_cells, from_grid(dense.grid("life").unwrap()), "generation {generation}");
        assert_eq!(sparse_cells, naive, "generation {generation}");
    }
}

#[test]
fn masked_parity_against_naive() {
    let shape = (30, 34);
    let life = LifeRule::conway();
    let rules = [life.clone().into_rule("life")];
    let mask: Vec<bool> = random_cells(shape.0, shape.1, 0.85, 0x3A5C)
        .into_iter()
        .map(|v| v != 0)
        .collect();
    let initial = random_cells(shape.0, shape.1, 0.3, 0x77);

    for opt in [Opt::SparseBlocks, Opt::NoOpt] {
        let mut cells = initial.clone();
        let mut state = SimulationState::builder()
            .grid("life", to_grid(&cells, shape, Boundary::Remove))
            .mask(Grid::from_fn(shape.0, shape.1, Boundary::Remove, |i, j| mask[i * shape.1 + j]))
            .build_for(&rules)
            .unwrap();
        let mut engine = engine(1, opt);
        for generation in 1..=6 {
            state = engine.step(state, &rules).unwrap();
            cells = step_naive(&cells, shape, Boundary::Remove, &life, Some(mask.as_slice()));
            assert_eq!(
                from_grid(state.grid("life").unwrap()),
                cells,
                "{opt:?} generation {generation}"
            );
        }
    }
}

#[test]
fn deterministic_across_thread_counts() {
    // Large enough to split into bands.
    let shape = (192, 160);
    let initial = random_cells(shape.0, shape.1, 0.3, 0xA55A);
    for radius in [1, 2] {
        let rules = [life_for(radius).into_rule("life")];
        let mut results = Vec::new();
        for (threads, opt) in [(1, Opt::SparseBlocks), (4, Opt::SparseBlocks), (4, Opt::NoOpt)] {
            let state = SimulationState::builder()
                .grid("life", to_grid(&initial, shape, Boundary::Remove))
                .build_for(&rules)
                .unwrap();
            let mut engine = engine(threads, opt);
            let state = engine.run(state, &rules, 5).unwrap();
            if threads > 1 {
                assert!(engine.last_stats().bands > 1);
            }
            results.push(from_grid(state.grid("life").unwrap()));
        }
        assert_eq!(results[0], results[1], "radius {radius}: 1 vs 4 threads");
        assert_eq!(results[1], results[2], "radius {radius}: sparse vs dense");
    }
}

#[test]
fn multi_grid_cell_rule_parity_across_threads() {
    let shape = (150, 130);
    let a = random_cells(shape.0, shape.1, 0.5, 1);
    let b = random_cells(shape.0, shape.1, 0.5, 2);
    let rule = Rule::cell(["a", "b"], "sum", |_, s: &[u8]| s[0] * 2 + s[1]);
    let mut outputs = Vec::new();
    for threads in [1, 3] {
        let state = SimulationState::builder()
            .grid("a", to_grid(&a, shape, Boundary::Remove))
            .grid("b", to_grid(&b, shape, Boundary::Wrap))
            .grid("sum", Grid::new(shape.0, shape.1, Boundary::Remove))
            .build()
            .unwrap();
        let state = engine(threads, Opt::SparseBlocks).apply_step(state, &rule).unwrap();
        outputs.push(from_grid(state.grid("sum").unwrap()));
    }
    assert_eq!(outputs[0], outputs[1]);
    let expected: Vec<u8> = a.iter().zip(&b).map(|(x, y)| x * 2 + y).collect();
    assert_eq!(outputs[0], expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn sparse_matches_dense_on_random_soups(
        rows in 1usize..40,
        cols in 1usize..40,
        radius in 1usize..=2,
        wrap in any::<bool>(),
        density in 0.0f64..0.9,
        seed in any::<u64>(),
    ) {
        let boundary = if wrap { Boundary::Wrap } else { Boundary::Remove };
        let shape = (rows, cols);
        let life = life_for(radius);
        let rules = [life.clone().into_rule("life")];
        let initial = random_cells(rows, cols, density, seed);
        let build = || {
            SimulationState::builder()
                .grid("life", to_grid(&initial, shape, boundary))
                .build_for(&rules)
                .unwrap()
        };
        let mut sparse = engine(1, Opt::SparseBlocks);
        let mut dense = engine(1, Opt::NoOpt);
        let mut naive = initial.clone();
        let mut sparse_state = build();
        let mut dense_state = build();
        for _ in 0..4 {
            sparse_state = sparse.step(sparse_state, &rules).unwrap();
            dense_state = dense.step(dense_state, &rules).unwrap();
            naive = step_naive(&naive, shape, boundary, &life, None);
            let sparse_cells = from_grid(sparse_state.grid("life").unwrap());
            prop_assert_eq!(&sparse_cells, &from_grid(dense_state.grid("life").unwrap()));
            prop_assert_eq!(&sparse_cells, &naive);
        }
    }
}
