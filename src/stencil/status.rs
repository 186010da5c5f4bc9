//! Block activity bitmaps.
//!
//! A grid of radius `r` is tracked in blocks of side `B = 2r`. The status
//! grid is shifted by `r` cells against the cell grid: status cell `(I, J)`
//! covers rows `[I*B - r, I*B + r)` and columns `[J*B - r, J*B + r)`. With
//! that offset every neighborhood read by computational block `(bi, bj)` lies
//! inside the 2x2 status window `(bi..=bi+1, bj..=bj+1)`, which is why the
//! bitmap carries one extra row and column.
//!
//! Bits are packed 64 to a word.

use super::cell::Cell;
use super::grid::Grid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockStatus {
    rows: usize,
    cols: usize,
    words: Vec<u64>,
}

impl BlockStatus {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            words: vec![0; (rows * cols).div_ceil(64)],
        }
    }

    /// Status shape for a `grid_rows x grid_cols` grid tracked at `radius`.
    pub fn shape_for(grid_rows: usize, grid_cols: usize, radius: usize) -> (usize, usize) {
        debug_assert!(radius > 0);
        let block = 2 * radius;
        (grid_rows.div_ceil(block) + 1, grid_cols.div_ceil(block) + 1)
    }

    pub fn for_grid(grid_rows: usize, grid_cols: usize, radius: usize) -> Self {
        let (rows, cols) = Self::shape_for(grid_rows, grid_cols, radius);
        Self::new(rows, cols)
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline(always)]
    fn locate(&self, r: usize, c: usize) -> (usize, u64) {
        debug_assert!(r < self.rows && c < self.cols);
        let bit = r * self.cols + c;
        (bit >> 6, 1u64 << (bit & 63))
    }

    #[inline(always)]
    pub fn get(&self, r: usize, c: usize) -> bool {
        let (word, mask) = self.locate(r, c);
        self.words[word] & mask != 0
    }

    #[inline(always)]
    pub fn set(&mut self, r: usize, c: usize, active: bool) {
        let (word, mask) = self.locate(r, c);
        if active {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    #[inline(always)]
    pub fn or(&mut self, r: usize, c: usize, active: bool) {
        let (word, mask) = self.locate(r, c);
        self.words[word] |= mask & (active as u64).wrapping_neg();
    }

    /// Whether any bit of the 2x2 window anchored at `(r, c)` is set.
    #[inline(always)]
    pub fn any_in_window(&self, r: usize, c: usize) -> bool {
        self.get(r, c) || self.get(r, c + 1) || self.get(r + 1, c) || self.get(r + 1, c + 1)
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    pub fn fill_active(&mut self) {
        self.words.fill(u64::MAX);
        let used = self.rows * self.cols;
        if used % 64 != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1u64 << (used % 64)) - 1;
            }
        }
    }

    pub fn union_with(&mut self, other: &Self) {
        debug_assert_eq!(self.shape(), other.shape());
        for (dst, src) in self.words.iter_mut().zip(&other.words) {
            *dst |= *src;
        }
    }

    pub fn count_active(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_all_inactive(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Recompute the bitmap exactly from the logical cells of `grid`.
    pub fn rebuild_from<T: Cell>(&mut self, grid: &Grid<T>, radius: usize) {
        debug_assert_eq!(self.shape(), Self::shape_for(grid.rows(), grid.cols(), radius));
        self.clear();
        let block = 2 * radius;
        for i in 0..grid.rows() {
            let sr = (i + radius) / block;
            for (j, cell) in grid.row(i).iter().enumerate() {
                if cell.is_active() {
                    self.set(sr, (j + radius) / block, true);
                }
            }
        }
    }
}
