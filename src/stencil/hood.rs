//! Stencils and the sliding neighborhood buffer.
//!
//! The buffer holds a `(2r+1) x (2r+1)` window copied out of the padded
//! source. It is stored column-major so that advancing the window one column
//! to the right is one `copy_within` plus `2r+1` fresh reads, instead of
//! re-reading the whole window.

use std::ops::Add;

use super::cell::Cell;
use super::grid::Grid;

/// Offset pattern read around the visited cell, as `(di, dj)` pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stencil {
    radius: usize,
    offsets: Vec<(isize, isize)>,
}

impl Stencil {
    /// Radius is the largest offset magnitude in either axis.
    pub fn from_offsets<I>(offsets: I) -> Self
    where
        I: IntoIterator<Item = (isize, isize)>,
    {
        let offsets: Vec<_> = offsets.into_iter().collect();
        let radius = offsets
            .iter()
            .map(|&(di, dj)| di.unsigned_abs().max(dj.unsigned_abs()))
            .max()
            .unwrap_or(0);
        Self { radius, offsets }
    }

    /// Square neighborhood of the given radius, center excluded.
    pub fn moore(radius: usize) -> Self {
        let r = radius as isize;
        Self::from_offsets(
            (-r..=r)
                .flat_map(|di| (-r..=r).map(move |dj| (di, dj)))
                .filter(|&offset| offset != (0, 0)),
        )
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    #[inline]
    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Neighborhood<T> {
    radius: usize,
    side: usize,
    /// Column-major: column `c` occupies `cells[c * side..(c + 1) * side]`.
    cells: Vec<T>,
}

impl<T: Cell> Neighborhood<T> {
    pub fn new(radius: usize) -> Self {
        let side = 2 * radius + 1;
        Self {
            radius,
            side,
            cells: vec![T::default(); side * side],
        }
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Value at offset `(di, dj)` from the center. Offsets are bounded by
    /// the buffer radius.
    #[inline(always)]
    pub fn get(&self, di: isize, dj: isize) -> T {
        let r = self.radius as isize;
        debug_assert!(di.abs() <= r && dj.abs() <= r);
        self.cells[(dj + r) as usize * self.side + (di + r) as usize]
    }

    #[inline(always)]
    pub fn center(&self) -> T {
        self.get(0, 0)
    }

    pub fn values<'a>(&'a self, stencil: &'a Stencil) -> impl Iterator<Item = T> + 'a {
        stencil.offsets().iter().map(move |&(di, dj)| self.get(di, dj))
    }

    #[inline]
    pub fn count_active(&self, stencil: &Stencil) -> usize {
        stencil
            .offsets()
            .iter()
            .filter(|&&(di, dj)| self.get(di, dj).is_active())
            .count()
    }

    pub fn sum_over(&self, stencil: &Stencil) -> T
    where
        T: Add<Output = T>,
    {
        self.values(stencil).fold(T::default(), |acc, v| acc + v)
    }

    /// Copy the whole window centred on logical cell `(i, j)`.
    pub(crate) fn rebuild(&mut self, grid: &Grid<T>, i: usize, j: usize) {
        let r = self.radius as isize;
        let stride = grid.stride();
        let base = grid.offset(i as isize - r, j as isize - r);
        let raw = grid.raw();
        for c in 0..self.side {
            let column = &mut self.cells[c * self.side..(c + 1) * self.side];
            for (row, slot) in column.iter_mut().enumerate() {
                *slot = raw[base + row * stride + c];
            }
        }
    }

    /// Slide the window one column right so it is centred on `(i, j)`.
    /// The window must currently be centred on `(i, j - 1)`.
    #[inline]
    pub(crate) fn shift_to(&mut self, grid: &Grid<T>, i: usize, j: usize) {
        let side = self.side;
        self.cells.copy_within(side.., 0);
        let r = self.radius as isize;
        let stride = grid.stride();
        let base = grid.offset(i as isize - r, j as isize + r);
        let raw = grid.raw();
        let column = &mut self.cells[(side - 1) * side..];
        for (row, slot) in column.iter_mut().enumerate() {
            *slot = raw[base + row * stride];
        }
    }
}
