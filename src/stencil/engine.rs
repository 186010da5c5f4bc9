use std::sync::OnceLock;

use tracing::{debug, trace, warn};

use super::boundary;
use super::cell::Cell;
use super::error::{Error, Result};
use super::grid::{Boundary, Grid};
use super::grid_data::GridData;
use super::rule::{Access, Rule, RuleContext, RuleKind, WriteGrids};
use super::scheduler::{self, HoodInput, Program, SweepStats, Target};
use super::state::{GridKey, SimulationState};

static PHYSICAL_CORES: OnceLock<usize> = OnceLock::new();

/// Block scheduling policy for neighborhood rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Opt {
    /// Skip blocks whose surroundings are inactive. Rules that map an
    /// all-inactive neighborhood to an active cell visit every block anyway.
    #[default]
    SparseBlocks,
    /// Visit every block.
    NoOpt,
}

/// How one rule application visits the grid. Logged per application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Schedule {
    Cells,
    SparseBlocks,
    DenseBlocks,
    SetCell,
}

#[inline]
fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Default policy: sparse unless `TURBOSTENCIL_SPARSE=0`.
#[inline]
fn detect_opt() -> Opt {
    let sparse = std::env::var("TURBOSTENCIL_SPARSE")
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(true);
    if sparse { Opt::SparseBlocks } else { Opt::NoOpt }
}

#[inline]
fn physical_core_count() -> usize {
    *PHYSICAL_CORES.get_or_init(|| num_cpus::get_physical().max(1))
}

#[inline]
fn auto_pool_thread_count_for_physical(physical: usize) -> usize {
    let physical = physical.max(1);
    if physical <= 8 {
        physical
    } else {
        physical.div_ceil(2).max(6)
    }
}

#[inline]
fn auto_pool_thread_count() -> usize {
    auto_pool_thread_count_for_physical(physical_core_count())
}

fn resolve_thread_count(config: &EngineConfig) -> usize {
    let mut threads = config.thread_count.unwrap_or_else(auto_pool_thread_count);
    if let Some(cap) = config.max_threads {
        threads = threads.min(cap);
    }
    threads.max(1)
}

fn resolve_opt(config: &EngineConfig) -> Opt {
    config.opt.unwrap_or_else(detect_opt)
}

/// A single thread needs no pool; sweeps then run inline.
fn build_pool(threads: usize) -> Option<rayon::ThreadPool> {
    if threads <= 1 {
        return None;
    }
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!(%err, threads, "failed to build rayon pool, sweeping serially");
            None
        }
    }
}

/// Configuration for a [`RuleEngine`].
///
/// `EngineConfig::default()` auto-tunes every knob; the builder methods
/// override individual ones.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Worker threads for band-parallel sweeps.
    /// `None` means auto-detect from physical cores.
    pub thread_count: Option<usize>,
    /// Hard upper bound on threads regardless of auto-detection.
    pub max_threads: Option<usize>,
    /// Block scheduling policy.
    /// `None` reads `TURBOSTENCIL_SPARSE` (`0`/`false` disables sparse
    /// blocks) and defaults to [`Opt::SparseBlocks`].
    pub opt: Option<Opt>,
}

impl EngineConfig {
    pub fn thread_count(mut self, n: usize) -> Self {
        self.thread_count = Some(n.max(1));
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n.max(1));
        self
    }

    pub fn opt(mut self, opt: Opt) -> Self {
        self.opt = Some(opt);
        self
    }
}

/// Validated bindings of one rule application, as state indices.
struct Plan {
    /// State index of each binding slot.
    slots: Vec<usize>,
    /// Slots bound with `Access::Write`, in binding order.
    writes: Vec<usize>,
    hood: Option<usize>,
    shape: (usize, usize),
}

fn index_of<T: Cell>(state: &SimulationState<T>, key: &GridKey) -> Result<usize> {
    state
        .position(key)
        .ok_or_else(|| Error::UnknownGridKey(key.clone()))
}

/// Check everything a rule needs before any cell is touched.
fn plan<T: Cell>(state: &SimulationState<T>, rule: &Rule<T>) -> Result<Plan> {
    let bindings = rule.bindings();
    let slots = bindings
        .iter()
        .map(|binding| index_of(state, binding.key))
        .collect::<Result<Vec<_>>>()?;
    let writes = bindings
        .iter()
        .zip(&slots)
        .filter(|(binding, _)| binding.access == Access::Write)
        .map(|(_, &g)| g)
        .collect();

    let shape = match (slots.first(), state.mask()) {
        (Some(&first), _) => state.data_at(first).shape(),
        (None, Some(mask)) => mask.shape(),
        (None, None) => (0, 0),
    };
    for &g in &slots {
        let found = state.data_at(g).shape();
        if found != shape {
            return Err(Error::ShapeMismatch {
                key: state.key_at(g).clone(),
                expected: shape,
                found,
            });
        }
    }
    if let Some(mask) = state.mask() {
        if mask.shape() != shape {
            return Err(Error::ShapeMismatch {
                key: GridKey::from("mask"),
                expected: shape,
                found: mask.shape(),
            });
        }
    }

    let hood = match rule.hood_key() {
        Some(key) => {
            let h = index_of(state, key)?;
            let padding = state.data_at(h).radius();
            if padding < rule.radius() {
                return Err(Error::InsufficientPadding {
                    key: key.clone(),
                    padding,
                    radius: rule.radius(),
                });
            }
            Some(h)
        }
        None => None,
    };

    for &g in &slots {
        if let Some((expected, found)) = state.data_at(g).status_shapes() {
            if expected != found {
                return Err(Error::StatusShape {
                    key: state.key_at(g).clone(),
                    expected,
                    found,
                });
            }
        }
    }

    Ok(Plan {
        slots,
        writes,
        hood,
        shape,
    })
}

/// Applies rules to a [`SimulationState`].
///
/// Owns the worker pool used for band-parallel sweeps. Each application
/// reads only source buffers, writes only destination buffers, and swaps the
/// written grids at the end.
pub struct RuleEngine {
    pool: Option<rayon::ThreadPool>,
    threads: usize,
    opt: Opt,
    last_stats: SweepStats,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let threads = resolve_thread_count(&config);
        let opt = resolve_opt(&config);
        debug!(threads, ?opt, "rule engine ready");
        Self {
            pool: build_pool(threads),
            threads,
            opt,
            last_stats: SweepStats::default(),
        }
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    #[inline]
    pub fn opt(&self) -> Opt {
        self.opt
    }

    /// Block counts of the most recent application.
    #[inline]
    pub fn last_stats(&self) -> SweepStats {
        self.last_stats
    }

    /// Apply one rule and return the updated state.
    pub fn apply_step<T: Cell>(
        &mut self,
        mut state: SimulationState<T>,
        rule: &Rule<T>,
    ) -> Result<SimulationState<T>> {
        self.apply(&mut state, rule)?;
        Ok(state)
    }

    /// Apply one rule in place.
    ///
    /// Validation runs before any buffer is modified, so on error `state`
    /// is exactly as it was.
    pub fn apply<T: Cell>(&mut self, state: &mut SimulationState<T>, rule: &Rule<T>) -> Result<()> {
        let derived;
        let rule = match rule.precalc() {
            Some(precalc) => {
                derived = precalc(rule, &state.context());
                &derived
            }
            None => rule,
        };

        let plan = plan(state, rule)?;
        let bindings = rule.bindings();
        let program = Program::compile(rule.kind(), &bindings)?;

        let schedule = match &program {
            None => Schedule::SetCell,
            Some(program) if program.radius() == 0 => Schedule::Cells,
            Some(program) => {
                let sparse_ok = self.opt == Opt::SparseBlocks
                    && plan.slots.len() == 1
                    && plan.hood.is_some_and(|h| {
                        plan.writes == [h] && state.data_at(h).source_status().is_some()
                    });
                if !sparse_ok {
                    Schedule::DenseBlocks
                } else if program.is_quiescent(&state.context()) {
                    Schedule::SparseBlocks
                } else {
                    debug!(
                        kind = rule.kind_name(),
                        "rule wakes quiet neighborhoods, visiting every block"
                    );
                    Schedule::DenseBlocks
                }
            }
        };
        debug!(
            kind = rule.kind_name(),
            writes = ?rule.write_keys(),
            ?schedule,
            frame = state.frame(),
            "applying rule"
        );

        // Cells a sweep does not visit must keep their source value.
        if schedule == Schedule::SetCell || state.mask().is_some() {
            for &g in &plan.writes {
                state.data_at_mut(g).copy_source_to_dest();
            }
        }
        if let Some(h) = plan.hood {
            boundary::condition(state.data_at_mut(h));
        }

        let stats = {
            let (ctx, grids) = state.sweep_parts();
            self.sweep(&ctx, rule, program.as_ref(), schedule, &plan, grids)
        };
        trace!(
            bands = stats.bands,
            visited = stats.blocks_visited,
            skipped = stats.blocks_skipped,
            "sweep finished"
        );
        self.last_stats = stats;

        for &g in &plan.writes {
            let data = state.data_at_mut(g);
            if schedule == Schedule::SetCell {
                data.rebuild_dest_status();
            } else if let Some(status) = data.status_mut() {
                status.commit_next();
            }
            let radius = data.radius();
            if radius > 0 && data.source().boundary() == Boundary::Remove {
                boundary::clear_margin(data.dest_mut(), radius);
            }
            data.swap();
        }
        Ok(())
    }

    fn sweep<T: Cell>(
        &self,
        ctx: &RuleContext<'_, T>,
        rule: &Rule<T>,
        program: Option<&Program<'_, T>>,
        schedule: Schedule,
        plan: &Plan,
        grids: &mut [(GridKey, GridData<T>)],
    ) -> SweepStats {
        let pool = self.pool.as_ref();
        let positions = |keys: &[GridKey]| -> Vec<usize> {
            keys.iter()
                .filter_map(|key| grids.iter().position(|(k, _)| k == key))
                .collect()
        };
        let (set_cell_reads, set_cell_writes) = match rule.kind() {
            RuleKind::SetCell(set_cell) => (positions(set_cell.reads()), positions(set_cell.writes())),
            _ => (Vec::new(), Vec::new()),
        };
        let mut splits: Vec<_> = grids
            .iter_mut()
            .map(|(key, data)| Some((&*key, data.split())))
            .collect();

        let program = match (rule.kind(), program) {
            (RuleKind::SetCell(set_cell), _) => {
                let sources: Vec<&Grid<T>> = set_cell_reads
                    .iter()
                    .filter_map(|&g| splits[g].as_ref().map(|(_, split)| split.source))
                    .collect();
                // Declared order, so `writes[n]` is the n-th declared grid.
                let mut writes = WriteGrids::new(
                    set_cell_writes
                        .iter()
                        .filter_map(|&g| splits[g].take())
                        .map(|(key, split)| (key, split.dest))
                        .collect(),
                );
                scheduler::sweep_set_cells(ctx, set_cell, &sources, plan.shape, &mut writes);
                return SweepStats::default();
            }
            (_, Some(program)) => program,
            (_, None) => return SweepStats::default(),
        };

        let sources: Vec<&Grid<T>> = plan
            .slots
            .iter()
            .filter_map(|&g| splits[g].as_ref().map(|(_, split)| split.source))
            .collect();
        let hood = plan.hood.and_then(|h| {
            splits[h].as_ref().map(|(_, split)| HoodInput {
                radius: split.radius,
                source_status: if schedule == Schedule::SparseBlocks {
                    split.source_status
                } else {
                    None
                },
                stale_status: split.stale_status,
                self_target: plan.writes.iter().position(|&g| g == h),
            })
        });
        let mut targets: Vec<Target<'_, T>> = plan
            .writes
            .iter()
            .filter_map(|&g| splits[g].take())
            .map(|(_, split)| Target {
                dest: split.dest,
                status: split.next_status.map(|next| (split.radius, next)),
            })
            .collect();

        match (schedule, hood) {
            (Schedule::SparseBlocks | Schedule::DenseBlocks, Some(hood)) => scheduler::sweep_blocks(
                pool,
                self.threads,
                ctx,
                program,
                &sources,
                plan.shape,
                &hood,
                &mut targets,
            ),
            _ => scheduler::sweep_cells(pool, self.threads, ctx, program, &sources, plan.shape, &mut targets),
        }
    }

    /// Apply every rule in order, then advance the frame and time.
    pub fn step<T: Cell>(&mut self, mut state: SimulationState<T>, rules: &[Rule<T>]) -> Result<SimulationState<T>> {
        for rule in rules {
            self.apply(&mut state, rule)?;
        }
        state.advance_frame();
        Ok(state)
    }

    pub fn run<T: Cell>(
        &mut self,
        mut state: SimulationState<T>,
        rules: &[Rule<T>],
        steps: u64,
    ) -> Result<SimulationState<T>> {
        for _ in 0..steps {
            state = self.step(state, rules)?;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineConfig, Opt, RuleEngine, auto_pool_thread_count_for_physical, parse_flag, plan};
    use crate::stencil::error::Error;
    use crate::stencil::grid::{Boundary, Grid};
    use crate::stencil::hood::Stencil;
    use crate::stencil::rule::Rule;
    use crate::stencil::state::SimulationState;

    fn count_rule() -> Rule<u8> {
        Rule::neighborhood("a", Stencil::moore(1), |_, state, hood| {
            match hood.count_active(&Stencil::moore(1)) {
                3 => 1,
                2 => state,
                _ => 0,
            }
        })
    }

    #[test]
    fn auto_pool_thread_count_targets_bandwidth_sweet_spot() {
        assert_eq!(auto_pool_thread_count_for_physical(0), 1);
        assert_eq!(auto_pool_thread_count_for_physical(4), 4);
        assert_eq!(auto_pool_thread_count_for_physical(8), 8);
        assert_eq!(auto_pool_thread_count_for_physical(12), 6);
        assert_eq!(auto_pool_thread_count_for_physical(24), 12);
    }

    #[test]
    fn flags_parse_like_env_switches() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn config_clamps_and_caps_threads() {
        let engine = RuleEngine::with_config(EngineConfig::default().thread_count(0).opt(Opt::NoOpt));
        assert_eq!(engine.thread_count(), 1);
        assert_eq!(engine.opt(), Opt::NoOpt);
        assert!(engine.pool.is_none());

        let engine = RuleEngine::with_config(EngineConfig::default().thread_count(16).max_threads(2));
        assert_eq!(engine.thread_count(), 2);
    }

    #[test]
    fn sparse_sweep_skips_quiet_blocks() {
        let mut grid = Grid::new(32, 32, Boundary::Remove);
        for j in 10..13 {
            grid[(10, j)] = 1u8;
        }
        let rules = [count_rule()];
        let state = SimulationState::builder().grid("a", grid).build_for(&rules).unwrap();

        let mut engine = RuleEngine::with_config(EngineConfig::default().thread_count(1).opt(Opt::SparseBlocks));
        let state = engine.apply_step(state, &rules[0]).unwrap();
        let stats = engine.last_stats();
        assert_eq!(stats.blocks_visited + stats.blocks_skipped, 16 * 16);
        assert!(stats.blocks_visited <= 9, "visited {}", stats.blocks_visited);
        assert_eq!(state.grid("a").unwrap().population(), 3);

        let mut dense = RuleEngine::with_config(EngineConfig::default().thread_count(1).opt(Opt::NoOpt));
        let _ = dense.apply_step(state, &rules[0]).unwrap();
        assert_eq!(dense.last_stats().blocks_skipped, 0);
    }

    #[test]
    fn rule_waking_quiet_cells_visits_every_block() {
        let mut grid = Grid::new(16, 16, Boundary::Remove);
        grid[(8, 8)] = 1u8;
        let born_alone: Rule<u8> =
            Rule::neighborhood("a", Stencil::moore(1), |_, _, hood| u8::from(hood.count_active(&Stencil::moore(1)) == 0));
        let rules = [born_alone];
        let state = SimulationState::builder().grid("a", grid).build_for(&rules).unwrap();

        let mut engine = RuleEngine::with_config(EngineConfig::default().thread_count(1).opt(Opt::SparseBlocks));
        let state = engine.apply_step(state, &rules[0]).unwrap();
        assert_eq!(engine.last_stats().blocks_skipped, 0);
        assert_eq!(state.grid("a").unwrap().population(), 16 * 16 - 8);
    }

    #[test]
    fn plan_writes_follow_write_bindings() {
        let state = SimulationState::<u8>::builder()
            .grid("a", Grid::new(2, 2, Boundary::Remove))
            .grid("b", Grid::new(2, 2, Boundary::Remove))
            .grid("c", Grid::new(2, 2, Boundary::Remove))
            .build()
            .unwrap();
        // "c" is read first, so its write binding comes before "a".
        let rule: Rule<u8> = Rule::set_cell(["c", "b"], ["a", "c"], |_, _, _, _| {});
        let plan = plan(&state, &rule).unwrap();
        assert_eq!(plan.slots, vec![2, 1, 0]);
        assert_eq!(plan.writes, vec![2, 0]);
    }

    #[test]
    fn failed_validation_reports_configuration_error() {
        let state = SimulationState::<u8>::builder()
            .grid("a", Grid::new(4, 4, Boundary::Remove))
            .build()
            .unwrap();
        let mut engine = RuleEngine::with_config(EngineConfig::default().thread_count(1));
        let err = engine.apply_step(state, &count_rule()).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientPadding {
                key: "a".into(),
                padding: 0,
                radius: 1,
            }
        );
    }
}
