//! Cell value contract shared by grids, rules and the scheduler.

/// A value stored in a grid cell.
///
/// `Default` is the zero value used for padding and for regions the sparse
/// scheduler skips. `is_active` drives the block status bitmaps: a block is
/// active while any of its cells reports `true`.
pub trait Cell: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    fn is_active(&self) -> bool;
}

impl Cell for bool {
    #[inline(always)]
    fn is_active(&self) -> bool {
        *self
    }
}

/// Arithmetic behind [`Grid::add`](super::grid::Grid::add) and
/// [`Grid::sub`](super::grid::Grid::sub).
///
/// Integers wrap on overflow in every build profile. Floats use plain IEEE
/// arithmetic.
pub trait CellArith: Cell {
    fn cell_add(self, rhs: Self) -> Self;
    fn cell_sub(self, rhs: Self) -> Self;
}

macro_rules! impl_cell_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Cell for $ty {
                #[inline(always)]
                fn is_active(&self) -> bool {
                    *self != 0
                }
            }

            impl CellArith for $ty {
                #[inline(always)]
                fn cell_add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                #[inline(always)]
                fn cell_sub(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }
            }
        )*
    };
}

macro_rules! impl_cell_float {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Cell for $ty {
                #[inline(always)]
                fn is_active(&self) -> bool {
                    *self != 0.0
                }
            }

            impl CellArith for $ty {
                #[inline(always)]
                fn cell_add(self, rhs: Self) -> Self {
                    self + rhs
                }

                #[inline(always)]
                fn cell_sub(self, rhs: Self) -> Self {
                    self - rhs
                }
            }
        )*
    };
}

impl_cell_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);
impl_cell_float!(f32, f64);
