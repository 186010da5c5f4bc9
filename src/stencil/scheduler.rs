//! Sweeps: how a rule application visits cells.
//!
//! Every rule except `SetCell` is compiled into a [`Program`]: a short list
//! of links evaluated per cell over a slot array holding one value per bound
//! grid. Two sweeps drive programs:
//!
//! - the cell sweep (radius 0) walks every logical cell in row bands;
//! - the block sweep (radius > 0) walks `2r x 2r` blocks of the neighborhood
//!   grid, skipping blocks whose 2x2 status window is inactive when running
//!   sparse, and slides one neighborhood buffer per in-block row across the
//!   block row.
//!
//! Both split the grid into row bands that own disjoint destination rows and
//! a band-local status bitmap, so bands can run on the rayon pool and be
//! merged with an OR reduction afterwards.

use std::ops::Range;

use rayon::prelude::*;

use super::cell::Cell;
use super::error::{Error, Result};
use super::grid::Grid;
use super::hood::Neighborhood;
use super::rule::{Access, Binding, CellRule, ChainLink, NeighborhoodRule, RuleContext, RuleKind, SetCellRule, WriteGrids};
use super::state::GridKey;
use super::status::BlockStatus;

/// Below this many cells a sweep runs as a single band.
const PARALLEL_MIN_CELLS: usize = 16_384;
/// Bands handed to the pool per worker thread, for load balance.
const BANDS_PER_THREAD: usize = 4;

#[inline]
pub(crate) fn band_count(cells: usize, threads: usize) -> usize {
    if threads <= 1 || cells < PARALLEL_MIN_CELLS {
        1
    } else {
        threads * BANDS_PER_THREAD
    }
}

/// Split `rows` into at most `bands` contiguous ranges whose boundaries fall
/// on multiples of `unit`.
pub(crate) fn band_ranges(rows: usize, unit: usize, bands: usize) -> Vec<Range<usize>> {
    let unit = unit.max(1);
    let units = rows.div_ceil(unit).max(1);
    let per_band = units.div_ceil(bands.clamp(1, units));
    (0..units)
        .step_by(per_band)
        .map(|u| (u * unit).min(rows)..((u + per_band) * unit).min(rows))
        .collect()
}

enum Link<'r, T> {
    Cell {
        rule: &'r CellRule<T>,
        reads: Vec<usize>,
        write: usize,
    },
    Hood {
        rule: &'r NeighborhoodRule<T>,
        state: usize,
        write: usize,
    },
}

/// A rule lowered onto binding slots.
pub(crate) struct Program<'r, T> {
    links: Vec<Link<'r, T>>,
    slot_count: usize,
    /// Slots that must be loaded from the source before the links run.
    inputs: Vec<usize>,
    /// Slot holding the final value of each write target, in binding order.
    outputs: Vec<usize>,
    hood: Option<usize>,
    radius: usize,
    max_reads: usize,
}

fn slot_of(bindings: &[Binding<'_>], key: &GridKey) -> Result<usize> {
    bindings
        .iter()
        .position(|b| b.key == key)
        .ok_or_else(|| Error::UnknownGridKey(key.clone()))
}

impl<'r, T: Cell> Program<'r, T> {
    /// Lower a rule. `SetCell` rules are not programs and yield `None`.
    ///
    /// Write targets are the `Access::Write` bindings, in binding order.
    pub(crate) fn compile(kind: &'r RuleKind<T>, bindings: &[Binding<'_>]) -> Result<Option<Self>> {
        let mut links = Vec::new();
        let lower_cell = |rule: &'r CellRule<T>, links: &mut Vec<Link<'r, T>>| -> Result<()> {
            let reads = rule
                .reads()
                .iter()
                .map(|key| slot_of(bindings, key))
                .collect::<Result<Vec<_>>>()?;
            links.push(Link::Cell {
                rule,
                reads,
                write: slot_of(bindings, rule.write())?,
            });
            Ok(())
        };
        let lower_hood = |rule: &'r NeighborhoodRule<T>, links: &mut Vec<Link<'r, T>>| -> Result<()> {
            links.push(Link::Hood {
                rule,
                state: slot_of(bindings, rule.read())?,
                write: slot_of(bindings, rule.write())?,
            });
            Ok(())
        };

        match kind {
            RuleKind::SetCell(_) => return Ok(None),
            RuleKind::Cell(rule) => lower_cell(rule, &mut links)?,
            RuleKind::Neighborhood(rule) => lower_hood(rule, &mut links)?,
            RuleKind::Chain(chain) => {
                for link in chain.links() {
                    match link {
                        ChainLink::Cell(rule) => lower_cell(rule, &mut links)?,
                        ChainLink::Neighborhood(rule) => lower_hood(rule, &mut links)?,
                    }
                }
            }
        }

        let mut inputs: Vec<usize> = Vec::new();
        let mut hood = None;
        let mut radius = 0;
        let mut max_reads = 0;
        for link in &links {
            match link {
                Link::Cell { reads, .. } => {
                    max_reads = max_reads.max(reads.len());
                    inputs.extend(reads.iter().copied());
                }
                Link::Hood { rule, state, .. } => {
                    hood = Some(*state);
                    radius = radius.max(rule.radius());
                    inputs.push(*state);
                }
            }
        }
        inputs.sort_unstable();
        inputs.dedup();

        let outputs = bindings
            .iter()
            .enumerate()
            .filter(|(_, binding)| binding.access == Access::Write)
            .map(|(slot, _)| slot)
            .collect();

        Ok(Some(Self {
            links,
            slot_count: bindings.len(),
            inputs,
            outputs,
            hood,
            radius,
            max_reads,
        }))
    }

    #[inline]
    pub(crate) fn radius(&self) -> usize {
        self.radius
    }

    /// Slot of the grid read as a neighborhood.
    #[inline]
    pub(crate) fn hood_slot(&self) -> Option<usize> {
        self.hood
    }

    /// Whether an all-zero neighborhood maps to inactive outputs.
    ///
    /// Transforms never see the cell index, so within one application the
    /// answer holds for every cell. Skipping quiet blocks is exact only
    /// when this is `true`.
    pub(crate) fn is_quiescent(&self, ctx: &RuleContext<'_, T>) -> bool {
        let mut scratch = Scratch::for_program(self);
        let hood = Neighborhood::new(self.radius);
        self.run_links(ctx, &hood, &mut scratch);
        scratch.out.iter().all(|value| !value.is_active())
    }

    /// Evaluate every link for cell `(i, j)` and leave one value per write
    /// target in `out`.
    #[inline(always)]
    fn eval(
        &self,
        ctx: &RuleContext<'_, T>,
        sources: &[&Grid<T>],
        (i, j): (usize, usize),
        hood: &Neighborhood<T>,
        scratch: &mut Scratch<T>,
    ) {
        for &slot in &self.inputs {
            scratch.vals[slot] = sources[slot].padded_get(i as isize, j as isize);
        }
        self.run_links(ctx, hood, scratch);
    }

    #[inline(always)]
    fn run_links(&self, ctx: &RuleContext<'_, T>, hood: &Neighborhood<T>, scratch: &mut Scratch<T>) {
        for link in &self.links {
            match link {
                Link::Cell { rule, reads, write } => {
                    scratch.args.clear();
                    scratch.args.extend(reads.iter().map(|&s| scratch.vals[s]));
                    scratch.vals[*write] = rule.apply(ctx, &scratch.args);
                }
                Link::Hood { rule, state, write } => {
                    scratch.vals[*write] = rule.apply(ctx, scratch.vals[*state], hood);
                }
            }
        }
        for (out, &slot) in scratch.out.iter_mut().zip(&self.outputs) {
            *out = scratch.vals[slot];
        }
    }
}

struct Scratch<T> {
    vals: Vec<T>,
    args: Vec<T>,
    out: Vec<T>,
}

impl<T: Cell> Scratch<T> {
    fn for_program(program: &Program<'_, T>) -> Self {
        Self {
            vals: vec![T::default(); program.slot_count],
            args: Vec::with_capacity(program.max_reads),
            out: vec![T::default(); program.outputs.len()],
        }
    }
}

/// A written grid handed to a sweep.
pub(crate) struct Target<'a, T> {
    pub dest: &'a mut Grid<T>,
    /// Grid radius and the zeroed bitmap to accumulate into, when the grid
    /// carries status.
    pub status: Option<(usize, &'a mut BlockStatus)>,
}

/// The destination rows of one target owned by one band.
struct BandDest<'a, T> {
    cells: &'a mut [T],
    first_row: usize,
    stride: usize,
    pad: usize,
    status_radius: Option<usize>,
}

impl<T: Cell> BandDest<'_, T> {
    #[inline(always)]
    fn index(&self, i: usize, j: usize) -> usize {
        (i - self.first_row) * self.stride + self.pad + j
    }

    #[inline(always)]
    fn get(&self, i: usize, j: usize) -> T {
        self.cells[self.index(i, j)]
    }

    #[inline(always)]
    fn set(&mut self, i: usize, j: usize, value: T) {
        let idx = self.index(i, j);
        self.cells[idx] = value;
    }

    fn clear_span(&mut self, i: usize, cols: Range<usize>) {
        let start = self.index(i, cols.start);
        self.cells[start..start + cols.len()].fill(T::default());
    }
}

fn split_bands<'a, T: Cell>(
    grid: &'a mut Grid<T>,
    bands: &[Range<usize>],
    status_radius: Option<usize>,
) -> Vec<BandDest<'a, T>> {
    let stride = grid.stride();
    let pad = grid.padding();
    let mut rest = grid.logical_rows_mut();
    let mut out = Vec::with_capacity(bands.len());
    for band in bands {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(band.len() * stride);
        out.push(BandDest {
            cells: head,
            first_row: band.start,
            stride,
            pad,
            status_radius,
        });
        rest = tail;
    }
    out
}

struct BandJob<'a, T> {
    rows: Range<usize>,
    dests: Vec<BandDest<'a, T>>,
}

struct BandOutput {
    status: Vec<Option<BlockStatus>>,
    visited: usize,
    skipped: usize,
}

/// Block visit counts of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub bands: usize,
    pub blocks_visited: usize,
    pub blocks_skipped: usize,
}

/// Split every target into bands and regroup the pieces per band.
fn make_jobs<'a, T: Cell>(
    targets: &'a mut [Target<'_, T>],
    ranges: &[Range<usize>],
) -> (Vec<BandJob<'a, T>>, Vec<Option<(usize, usize)>>) {
    let mut jobs: Vec<BandJob<'a, T>> = ranges
        .iter()
        .map(|rows| BandJob {
            rows: rows.clone(),
            dests: Vec::with_capacity(targets.len()),
        })
        .collect();
    let mut shapes = Vec::with_capacity(targets.len());
    for target in targets.iter_mut() {
        let radius = target.status.as_ref().map(|(radius, _)| *radius);
        shapes.push(target.status.as_ref().map(|(_, status)| status.shape()));
        for (job, dest) in jobs.iter_mut().zip(split_bands(target.dest, ranges, radius)) {
            job.dests.push(dest);
        }
    }
    (jobs, shapes)
}

fn run_bands<'a, T, F>(pool: Option<&rayon::ThreadPool>, jobs: Vec<BandJob<'a, T>>, f: F) -> Vec<BandOutput>
where
    T: Cell,
    F: Fn(BandJob<'a, T>) -> BandOutput + Sync + Send,
{
    match pool {
        Some(pool) if jobs.len() > 1 => pool.install(|| jobs.into_par_iter().map(&f).collect()),
        _ => jobs.into_iter().map(f).collect(),
    }
}

/// OR every band's bitmap into the targets' accumulation bitmaps.
fn merge_status<T: Cell>(targets: &mut [Target<'_, T>], outputs: &[BandOutput]) -> SweepStats {
    for (t, target) in targets.iter_mut().enumerate() {
        if let Some((_, status)) = target.status.as_mut() {
            status.clear();
            for band in outputs {
                if let Some(local) = &band.status[t] {
                    status.union_with(local);
                }
            }
        }
    }
    SweepStats {
        bands: outputs.len(),
        blocks_visited: outputs.iter().map(|o| o.visited).sum(),
        blocks_skipped: outputs.iter().map(|o| o.skipped).sum(),
    }
}

#[inline(always)]
fn mark(local: &mut Option<BlockStatus>, radius: Option<usize>, i: usize, j: usize, value: bool) {
    if let (Some(status), Some(radius)) = (local.as_mut(), radius) {
        let block = 2 * radius;
        status.or((i + radius) / block, (j + radius) / block, value);
    }
}

fn local_bitmaps(shapes: &[Option<(usize, usize)>]) -> Vec<Option<BlockStatus>> {
    shapes
        .iter()
        .map(|shape| shape.map(|(rows, cols)| BlockStatus::new(rows, cols)))
        .collect()
}

/// Radius-0 sweep: every logical cell, row bands.
pub(crate) fn sweep_cells<T: Cell>(
    pool: Option<&rayon::ThreadPool>,
    threads: usize,
    ctx: &RuleContext<'_, T>,
    program: &Program<'_, T>,
    sources: &[&Grid<T>],
    shape: (usize, usize),
    targets: &mut [Target<'_, T>],
) -> SweepStats {
    let (rows, cols) = shape;
    let ranges = band_ranges(rows, 1, band_count(rows * cols, threads));
    let (jobs, shapes) = make_jobs(targets, &ranges);
    // A zero-radius stencil still gets its one-cell window.
    let hood_grid = program.hood_slot().map(|slot| sources[slot]);

    let outputs = run_bands(pool, jobs, |job| {
        let mut scratch = Scratch::for_program(program);
        let mut local = local_bitmaps(&shapes);
        let mut hood = Neighborhood::new(0);
        let mut dests = job.dests;
        for i in job.rows {
            for j in 0..cols {
                if ctx.is_masked(i, j) {
                    for (t, dest) in dests.iter().enumerate() {
                        mark(&mut local[t], dest.status_radius, i, j, dest.get(i, j).is_active());
                    }
                    continue;
                }
                if let Some(grid) = hood_grid {
                    hood.rebuild(grid, i, j);
                }
                program.eval(ctx, sources, (i, j), &hood, &mut scratch);
                for (t, dest) in dests.iter_mut().enumerate() {
                    let value = scratch.out[t];
                    dest.set(i, j, value);
                    mark(&mut local[t], dest.status_radius, i, j, value.is_active());
                }
            }
        }
        BandOutput {
            status: local,
            visited: 0,
            skipped: 0,
        }
    });
    merge_status(targets, &outputs)
}

/// The neighborhood grid of a block sweep.
pub(crate) struct HoodInput<'a> {
    /// Radius the grid is tracked at; blocks are `2 * radius` wide.
    pub radius: usize,
    /// Source status; blocks are skipped only when this is `Some`.
    pub source_status: Option<&'a BlockStatus>,
    /// Status of what the destination array currently holds. Skipped
    /// blocks flagged here are zeroed.
    pub stale_status: Option<&'a BlockStatus>,
    /// Target whose status is tracked with quadrant accumulators: the
    /// neighborhood grid itself, when written.
    pub self_target: Option<usize>,
}

/// Radius > 0 sweep over `2r x 2r` blocks of the neighborhood grid.
#[allow(clippy::too_many_arguments)]
pub(crate) fn sweep_blocks<T: Cell>(
    pool: Option<&rayon::ThreadPool>,
    threads: usize,
    ctx: &RuleContext<'_, T>,
    program: &Program<'_, T>,
    sources: &[&Grid<T>],
    shape: (usize, usize),
    hood: &HoodInput<'_>,
    targets: &mut [Target<'_, T>],
) -> SweepStats {
    let (rows, cols) = shape;
    let tracked = hood.radius;
    let block = 2 * tracked;
    let hood_grid = match program.hood_slot() {
        Some(slot) => sources[slot],
        None => return SweepStats::default(),
    };
    let ranges = band_ranges(rows, block, band_count(rows * cols, threads));
    let (jobs, shapes) = make_jobs(targets, &ranges);
    let block_cols = cols.div_ceil(block);

    let outputs = run_bands(pool, jobs, |job| {
        let mut scratch = Scratch::for_program(program);
        let mut local = local_bitmaps(&shapes);
        let mut buffers: Vec<Neighborhood<T>> =
            (0..block).map(|_| Neighborhood::new(program.radius())).collect();
        let mut dests = job.dests;
        let mut visited = 0;
        let mut skipped = 0;

        let first_block_row = job.rows.start / block;
        let last_block_row = job.rows.end.div_ceil(block);
        for bi in first_block_row..last_block_row {
            let i0 = bi * block;
            let i1 = (i0 + block).min(rows);
            // Whether every buffer is centred one column left of the next block.
            let mut contiguous = false;

            for bj in 0..block_cols {
                let j0 = bj * block;
                let j1 = (j0 + block).min(cols);

                let active = hood
                    .source_status
                    .is_none_or(|status| status.any_in_window(bi, bj));
                if !active {
                    skipped += 1;
                    contiguous = false;
                    if hood.stale_status.is_none_or(|status| status.any_in_window(bi, bj)) {
                        for dest in dests.iter_mut() {
                            for i in i0..i1 {
                                dest.clear_span(i, j0..j1);
                            }
                        }
                    }
                    continue;
                }
                visited += 1;

                // quad[row half][col half]: activity of the four r x r
                // quadrants, each feeding a different status cell.
                let mut quad = [[false; 2]; 2];
                for i in i0..i1 {
                    let k = i - i0;
                    let buffer = &mut buffers[k];
                    for j in j0..j1 {
                        if j == j0 && !contiguous {
                            buffer.rebuild(hood_grid, i, j);
                        } else {
                            buffer.shift_to(hood_grid, i, j);
                        }

                        let masked = ctx.is_masked(i, j);
                        if !masked {
                            program.eval(ctx, sources, (i, j), buffer, &mut scratch);
                        }
                        for (t, dest) in dests.iter_mut().enumerate() {
                            let value = if masked {
                                dest.get(i, j)
                            } else {
                                let value = scratch.out[t];
                                dest.set(i, j, value);
                                value
                            };
                            if hood.self_target == Some(t) {
                                quad[(k >= tracked) as usize][(j - j0 >= tracked) as usize] |=
                                    value.is_active();
                            } else {
                                mark(&mut local[t], dest.status_radius, i, j, value.is_active());
                            }
                        }
                    }
                }
                contiguous = true;

                if let Some(status) = hood.self_target.and_then(|t| local[t].as_mut()) {
                    status.or(bi, bj, quad[0][0]);
                    status.or(bi, bj + 1, quad[0][1]);
                    status.or(bi + 1, bj, quad[1][0]);
                    // No earlier block in this band touches the diagonal slot.
                    status.set(bi + 1, bj + 1, quad[1][1]);
                }
            }
        }

        BandOutput {
            status: local,
            visited,
            skipped,
        }
    });
    merge_status(targets, &outputs)
}

/// Serial sweep for manual-write rules.
pub(crate) fn sweep_set_cells<T: Cell>(
    ctx: &RuleContext<'_, T>,
    rule: &SetCellRule<T>,
    sources: &[&Grid<T>],
    shape: (usize, usize),
    writes: &mut WriteGrids<'_, T>,
) {
    let (rows, cols) = shape;
    let mut states = vec![T::default(); sources.len()];
    for i in 0..rows {
        for j in 0..cols {
            if ctx.is_masked(i, j) {
                continue;
            }
            for (state, source) in states.iter_mut().zip(sources) {
                *state = source.padded_get(i as isize, j as isize);
            }
            rule.apply(ctx, writes, &states, (i, j));
        }
    }
}
