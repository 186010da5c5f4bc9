//! Boundary conditioning of the padding margin.

use super::cell::Cell;
use super::grid::{Boundary, Grid};
use super::grid_data::GridData;

/// Prepare the source margin of `data` for neighborhood reads.
///
/// `Wrap` copies the opposite edges (corners included) into the margin and
/// then marks every block active: a wrapped edge can wake any block along
/// the far side, and tracking exactly which ones is not attempted.
/// `Remove` margins are kept zero by [`clear_margin`], so nothing is needed.
pub(crate) fn condition<T: Cell>(data: &mut GridData<T>) {
    let radius = data.radius();
    if radius == 0 {
        return;
    }
    match data.source().boundary() {
        Boundary::Wrap => {
            wrap_margin(data.source_mut(), radius);
            if let Some(status) = data.status_mut() {
                status.source.fill_active();
            }
        }
        Boundary::Remove => {}
    }
}

/// Fill the `radius`-wide margin of `grid` with values wrapped around from
/// the opposite edges.
pub(crate) fn wrap_margin<T: Cell>(grid: &mut Grid<T>, radius: usize) {
    let (rows, cols) = grid.shape();
    if radius == 0 || rows == 0 || cols == 0 {
        return;
    }
    debug_assert!(radius <= grid.padding());
    let r = radius as isize;
    let (rows_i, cols_i) = (rows as isize, cols as isize);

    // Left and right margins of every logical row.
    for i in 0..rows_i {
        for j in -r..0 {
            let from = grid.offset(i, j.rem_euclid(cols_i));
            let to = grid.offset(i, j);
            let cells = grid.raw_mut();
            cells[to] = cells[from];
        }
        for j in cols_i..cols_i + r {
            let from = grid.offset(i, j.rem_euclid(cols_i));
            let to = grid.offset(i, j);
            let cells = grid.raw_mut();
            cells[to] = cells[from];
        }
    }

    // Top and bottom margin rows copy whole wrapped rows, side margins
    // included, which fills the corners.
    let width = cols + 2 * radius;
    let top_rows = (-r..0).chain(rows_i..rows_i + r);
    for i in top_rows {
        let from = grid.offset(i.rem_euclid(rows_i), -r);
        let to = grid.offset(i, -r);
        grid.raw_mut().copy_within(from..from + width, to);
    }
}

/// Zero the `radius`-wide margin around the logical region of `grid`.
pub(crate) fn clear_margin<T: Cell>(grid: &mut Grid<T>, radius: usize) {
    if radius == 0 {
        return;
    }
    debug_assert!(radius <= grid.padding());
    let (rows, cols) = grid.shape();
    let r = radius as isize;
    let (rows_i, cols_i) = (rows as isize, cols as isize);
    let width = cols + 2 * radius;

    for i in (-r..0).chain(rows_i..rows_i + r) {
        let start = grid.offset(i, -r);
        grid.raw_mut()[start..start + width].fill(T::default());
    }
    for i in 0..rows_i {
        let left = grid.offset(i, -r);
        grid.raw_mut()[left..left + radius].fill(T::default());
        let right = grid.offset(i, cols_i);
        grid.raw_mut()[right..right + radius].fill(T::default());
    }
}
