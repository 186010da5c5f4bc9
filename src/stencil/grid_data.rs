//! Double-buffered grid state.
//!
//! A step reads only `source` and writes only `destination`; afterwards the
//! two swap roles. Each status bitmap travels with its array, so after a swap
//! `dest_status` still describes what the destination array holds. The
//! sparse scheduler relies on that to know which skipped blocks still carry
//! stale non-zero values.

use super::cell::Cell;
use super::grid::Grid;
use super::status::BlockStatus;

#[derive(Clone, Debug)]
pub(crate) struct StatusPair {
    pub source: BlockStatus,
    pub dest: BlockStatus,
    /// Accumulation target for the sweep in progress, swapped into `dest`
    /// when the sweep finishes.
    pub next: BlockStatus,
}

#[derive(Clone, Debug)]
pub struct GridData<T> {
    source: Grid<T>,
    dest: Grid<T>,
    radius: usize,
    status: Option<StatusPair>,
}

/// Disjoint borrows of one `GridData` for the duration of a sweep.
pub(crate) struct GridSplit<'a, T> {
    pub source: &'a Grid<T>,
    pub dest: &'a mut Grid<T>,
    pub radius: usize,
    pub source_status: Option<&'a BlockStatus>,
    /// Status of what `dest` holds before the sweep writes it.
    pub stale_status: Option<&'a BlockStatus>,
    pub next_status: Option<&'a mut BlockStatus>,
}

impl<T: Cell> GridData<T> {
    /// Wrap `grid` with `radius` cells of padding. Status bitmaps exist only
    /// for `radius > 0`.
    pub fn new(grid: Grid<T>, radius: usize) -> Self {
        let source = if grid.padding() == radius {
            grid
        } else {
            grid.padded(radius)
        };
        let dest = source.clone();
        let status = (radius > 0).then(|| {
            let mut current = BlockStatus::for_grid(source.rows(), source.cols(), radius);
            current.rebuild_from(&source, radius);
            StatusPair {
                source: current.clone(),
                dest: current.clone(),
                next: BlockStatus::new(current.shape().0, current.shape().1),
            }
        });
        Self {
            source,
            dest,
            radius,
            status,
        }
    }

    /// Rebuild for a different radius. Padding and bitmaps are recomputed
    /// from the current source.
    pub fn with_radius(self, radius: usize) -> Self {
        if radius == self.radius {
            return self;
        }
        Self::new(self.source, radius)
    }

    #[inline]
    pub fn source(&self) -> &Grid<T> {
        &self.source
    }

    #[inline]
    pub fn destination(&self) -> &Grid<T> {
        &self.dest
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Side of an activity block, `2 * radius`. Zero when untracked.
    #[inline]
    pub fn block_size(&self) -> usize {
        2 * self.radius
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.source.shape()
    }

    pub fn source_status(&self) -> Option<&BlockStatus> {
        self.status.as_ref().map(|s| &s.source)
    }

    pub fn dest_status(&self) -> Option<&BlockStatus> {
        self.status.as_ref().map(|s| &s.dest)
    }

    /// Expected status shape versus the one actually held, if tracked.
    pub(crate) fn status_shapes(&self) -> Option<((usize, usize), (usize, usize))> {
        self.status.as_ref().map(|s| {
            let expected = BlockStatus::shape_for(self.source.rows(), self.source.cols(), self.radius);
            let found = if s.source.shape() != expected {
                s.source.shape()
            } else {
                s.dest.shape()
            };
            (expected, found)
        })
    }

    pub(crate) fn source_mut(&mut self) -> &mut Grid<T> {
        &mut self.source
    }

    pub(crate) fn dest_mut(&mut self) -> &mut Grid<T> {
        &mut self.dest
    }

    pub(crate) fn status_mut(&mut self) -> Option<&mut StatusPair> {
        self.status.as_mut()
    }

    pub(crate) fn split(&mut self) -> GridSplit<'_, T> {
        let (source_status, stale_status, next_status) = match self.status.as_mut() {
            Some(StatusPair { source, dest, next }) => {
                (Some(&*source), Some(&*dest), Some(next))
            }
            None => (None, None, None),
        };
        GridSplit {
            source: &self.source,
            dest: &mut self.dest,
            radius: self.radius,
            source_status,
            stale_status,
            next_status,
        }
    }

    /// Make the destination a faithful copy of the source, status included.
    pub(crate) fn copy_source_to_dest(&mut self) {
        self.dest.copy_from(&self.source);
        if let Some(status) = self.status.as_mut() {
            status.dest.clone_from(&status.source);
        }
    }

    /// Recompute the destination status from its cells.
    pub(crate) fn rebuild_dest_status(&mut self) {
        let radius = self.radius;
        if let Some(status) = self.status.as_mut() {
            status.dest.rebuild_from(&self.dest, radius);
        }
    }

    /// Exchange source and destination. Arrays and bitmaps move together.
    pub(crate) fn swap(&mut self) {
        std::mem::swap(&mut self.source, &mut self.dest);
        if let Some(status) = self.status.as_mut() {
            std::mem::swap(&mut status.source, &mut status.dest);
        }
    }
}

impl StatusPair {
    /// Install the accumulated `next` bitmap as the destination status.
    pub(crate) fn commit_next(&mut self) {
        std::mem::swap(&mut self.dest, &mut self.next);
    }
}
