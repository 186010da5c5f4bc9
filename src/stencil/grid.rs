//! Padded 2D grid storage.
//!
//! Cells live in a row-major backing array of `(rows + 2p) x (cols + 2p)`
//! with the logical region offset by `p` on every side. The margin lets
//! neighborhood reads up to `p` cells past the edge go straight to memory:
//! the boundary handler fills it with wrapped values or keeps it zeroed.

use std::ops::{BitAnd, BitOr, BitXor, Index, IndexMut};

use super::cell::{Cell, CellArith};
use super::error::OutOfBounds;

/// What lies beyond the logical edge of a grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// Torus: coordinates past one edge continue from the opposite edge.
    Wrap,
    /// Fixed edge: everything outside is zero and writes there are dropped.
    #[default]
    Remove,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    pad: usize,
    stride: usize,
    boundary: Boundary,
    cells: Vec<T>,
}

impl<T: Cell> Grid<T> {
    /// An all-zero grid without padding.
    pub fn new(rows: usize, cols: usize, boundary: Boundary) -> Self {
        Self::with_layout(rows, cols, 0, boundary)
    }

    pub fn from_fn<F>(rows: usize, cols: usize, boundary: Boundary, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let mut grid = Self::new(rows, cols, boundary);
        for i in 0..rows {
            for (j, cell) in grid.row_mut(i).iter_mut().enumerate() {
                *cell = f(i, j);
            }
        }
        grid
    }

    fn with_layout(rows: usize, cols: usize, pad: usize, boundary: Boundary) -> Self {
        let stride = cols + 2 * pad;
        Self {
            rows,
            cols,
            pad,
            stride,
            boundary,
            cells: vec![T::default(); stride * (rows + 2 * pad)],
        }
    }

    /// Copy of this grid re-laid out with `pad` margin cells per side.
    /// The new margin is zero.
    pub fn padded(&self, pad: usize) -> Self {
        let mut out = Self::with_layout(self.rows, self.cols, pad, self.boundary);
        for i in 0..self.rows {
            out.row_mut(i).copy_from_slice(self.row(i));
        }
        out
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn padding(&self) -> usize {
        self.pad
    }

    #[inline]
    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    #[inline]
    pub(crate) fn stride(&self) -> usize {
        self.stride
    }

    /// Backing-array index of a coordinate, which may sit in the margin.
    #[inline(always)]
    pub(crate) fn offset(&self, i: isize, j: isize) -> usize {
        debug_assert!(i >= -(self.pad as isize) && i < (self.rows + self.pad) as isize);
        debug_assert!(j >= -(self.pad as isize) && j < (self.cols + self.pad) as isize);
        (i + self.pad as isize) as usize * self.stride + (j + self.pad as isize) as usize
    }

    /// Read a cell, margin included. No boundary folding is applied.
    #[inline(always)]
    pub fn padded_get(&self, i: isize, j: isize) -> T {
        self.cells[self.offset(i, j)]
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        if i < self.rows && j < self.cols {
            Some(self.cells[self.offset(i as isize, j as isize)])
        } else {
            None
        }
    }

    /// The logical cells of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        let start = self.offset(i as isize, 0);
        &self.cells[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        let start = self.offset(i as isize, 0);
        &mut self.cells[start..start + self.cols]
    }

    #[inline]
    pub(crate) fn raw(&self) -> &[T] {
        &self.cells
    }

    #[inline]
    pub(crate) fn raw_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    /// Backing rows that hold logical rows `0..rows`, margins of those rows included.
    pub(crate) fn logical_rows_mut(&mut self) -> &mut [T] {
        let start = self.pad * self.stride;
        let end = start + self.rows * self.stride;
        &mut self.cells[start..end]
    }

    pub fn iter_logical(&self) -> impl Iterator<Item = ((usize, usize), T)> + '_ {
        (0..self.rows).flat_map(move |i| {
            self.row(i)
                .iter()
                .enumerate()
                .map(move |(j, &value)| ((i, j), value))
        })
    }

    /// Number of active cells in the logical region.
    pub fn population(&self) -> usize {
        (0..self.rows)
            .map(|i| self.row(i).iter().filter(|cell| cell.is_active()).count())
            .sum()
    }

    /// Same shape, padding and boundary, so the backing arrays line up.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self.pad == other.pad
            && self.boundary == other.boundary
    }

    /// Copy every cell of `other`, margins included. Layouts must match.
    pub(crate) fn copy_from(&mut self, other: &Self) {
        debug_assert!(self.same_layout(other));
        self.cells.copy_from_slice(&other.cells);
    }

    /// Boundary-aware coordinate check.
    ///
    /// Returns the coordinate to write to and whether the write may happen.
    /// `Wrap` folds any coordinate into range and is always valid; `Remove`
    /// passes the coordinate through and is valid only inside the grid.
    pub fn inbounds(&self, (i, j): (isize, isize)) -> ((isize, isize), bool) {
        match self.boundary {
            Boundary::Wrap => {
                if self.rows == 0 || self.cols == 0 {
                    return ((i, j), false);
                }
                let folded = (
                    i.rem_euclid(self.rows as isize),
                    j.rem_euclid(self.cols as isize),
                );
                (folded, true)
            }
            Boundary::Remove => ((i, j), self.is_inbounds((i, j))),
        }
    }

    /// Boundary-agnostic check against the logical extent.
    #[inline]
    pub fn is_inbounds(&self, (i, j): (isize, isize)) -> bool {
        i >= 0 && j >= 0 && (i as usize) < self.rows && (j as usize) < self.cols
    }

    /// Combine `value` into the cell at `coord` with `op`, honouring the
    /// boundary policy.
    pub fn update_at<F>(&mut self, coord: (isize, isize), op: F) -> Result<(), OutOfBounds>
    where
        F: FnOnce(T) -> T,
    {
        let ((i, j), valid) = self.inbounds(coord);
        if !valid {
            return Err(OutOfBounds {
                row: coord.0,
                col: coord.1,
            });
        }
        let idx = self.offset(i, j);
        self.cells[idx] = op(self.cells[idx]);
        Ok(())
    }

    pub fn set_at(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds> {
        self.update_at(coord, |_| value)
    }

    /// Integer cells wrap on overflow.
    pub fn add(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds>
    where
        T: CellArith,
    {
        self.update_at(coord, |cur| cur.cell_add(value))
    }

    pub fn sub(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds>
    where
        T: CellArith,
    {
        self.update_at(coord, |cur| cur.cell_sub(value))
    }

    pub fn min(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds>
    where
        T: PartialOrd,
    {
        self.update_at(coord, |cur| if value < cur { value } else { cur })
    }

    pub fn max(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds>
    where
        T: PartialOrd,
    {
        self.update_at(coord, |cur| if value > cur { value } else { cur })
    }

    pub fn and(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds>
    where
        T: BitAnd<Output = T>,
    {
        self.update_at(coord, |cur| cur & value)
    }

    pub fn or(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds>
    where
        T: BitOr<Output = T>,
    {
        self.update_at(coord, |cur| cur | value)
    }

    pub fn xor(&mut self, coord: (isize, isize), value: T) -> Result<(), OutOfBounds>
    where
        T: BitXor<Output = T>,
    {
        self.update_at(coord, |cur| cur ^ value)
    }
}

impl<T: Cell> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(i < self.rows && j < self.cols, "cell ({i}, {j}) out of range");
        &self.cells[self.offset(i as isize, j as isize)]
    }
}

impl<T: Cell> IndexMut<(usize, usize)> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(i < self.rows && j < self.cols, "cell ({i}, {j}) out of range");
        let idx = self.offset(i as isize, j as isize);
        &mut self.cells[idx]
    }
}
