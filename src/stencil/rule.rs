//! Rules: what a timestep computes.
//!
//! A [`Rule`] is an immutable value wrapping one [`RuleKind`]. The engine
//! picks a sweep with a single `match` on the kind, so the per-cell path
//! never re-dispatches on the variant.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use super::cell::Cell;
use super::error::{Error, Result};
use super::grid::Grid;
use super::hood::{Neighborhood, Stencil};
use super::state::{AuxData, GridKey};

pub type CellFn<T> = dyn Fn(&RuleContext<'_, T>, &[T]) -> T + Send + Sync;
pub type NeighborhoodFn<T> = dyn Fn(&RuleContext<'_, T>, T, &Neighborhood<T>) -> T + Send + Sync;
pub type SetCellFn<T> =
    dyn Fn(&RuleContext<'_, T>, &mut WriteGrids<'_, T>, &[T], (usize, usize)) + Send + Sync;
pub type PrecalcFn<T> = dyn Fn(&Rule<T>, &RuleContext<'_, T>) -> Rule<T> + Send + Sync;

/// Read-only simulation context handed to every transform.
#[derive(Clone, Copy)]
pub struct RuleContext<'a, T> {
    pub(crate) frame: u64,
    pub(crate) time: f64,
    pub(crate) timestep: f64,
    pub(crate) mask: Option<&'a Grid<bool>>,
    pub(crate) aux: &'a AuxData<T>,
}

impl<'a, T: Cell> RuleContext<'a, T> {
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    #[inline]
    pub fn mask(&self) -> Option<&'a Grid<bool>> {
        self.mask
    }

    /// `true` when the mask marks `(i, j)` permanently inactive.
    #[inline(always)]
    pub fn is_masked(&self, i: usize, j: usize) -> bool {
        match self.mask {
            Some(mask) => !mask.padded_get(i as isize, j as isize),
            None => false,
        }
    }

    pub fn aux(&self, key: &str) -> Option<&'a Grid<T>> {
        self.aux.get(key)
    }
}

/// Plain per-cell rule: reads every read grid at the visited cell and writes
/// one grid at the same cell.
#[derive(Clone)]
pub struct CellRule<T> {
    reads: Vec<GridKey>,
    write: GridKey,
    f: Arc<CellFn<T>>,
}

impl<T: Cell> CellRule<T> {
    pub fn new<R, K, F>(reads: R, write: impl Into<GridKey>, f: F) -> Self
    where
        R: IntoIterator<Item = K>,
        K: Into<GridKey>,
        F: Fn(&RuleContext<'_, T>, &[T]) -> T + Send + Sync + 'static,
    {
        Self {
            reads: reads.into_iter().map(Into::into).collect(),
            write: write.into(),
            f: Arc::new(f),
        }
    }

    pub fn reads(&self) -> &[GridKey] {
        &self.reads
    }

    pub fn write(&self) -> &GridKey {
        &self.write
    }

    #[inline(always)]
    pub(crate) fn apply(&self, ctx: &RuleContext<'_, T>, states: &[T]) -> T {
        (self.f)(ctx, states)
    }
}

/// Stencil rule: reads a neighborhood of one grid and writes one grid.
#[derive(Clone)]
pub struct NeighborhoodRule<T> {
    read: GridKey,
    write: GridKey,
    stencil: Stencil,
    f: Arc<NeighborhoodFn<T>>,
}

impl<T: Cell> NeighborhoodRule<T> {
    pub fn new<F>(read: impl Into<GridKey>, write: impl Into<GridKey>, stencil: Stencil, f: F) -> Self
    where
        F: Fn(&RuleContext<'_, T>, T, &Neighborhood<T>) -> T + Send + Sync + 'static,
    {
        Self {
            read: read.into(),
            write: write.into(),
            stencil,
            f: Arc::new(f),
        }
    }

    pub fn read(&self) -> &GridKey {
        &self.read
    }

    pub fn write(&self) -> &GridKey {
        &self.write
    }

    pub fn stencil(&self) -> &Stencil {
        &self.stencil
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.stencil.radius()
    }

    #[inline(always)]
    pub(crate) fn apply(&self, ctx: &RuleContext<'_, T>, state: T, hood: &Neighborhood<T>) -> T {
        (self.f)(ctx, state, hood)
    }
}

/// Manual-write rule. Visits every unmasked cell and may write any cell of
/// its write grids through the bounds-checked primitives on [`Grid`].
#[derive(Clone)]
pub struct SetCellRule<T> {
    reads: Vec<GridKey>,
    writes: Vec<GridKey>,
    f: Arc<SetCellFn<T>>,
}

impl<T: Cell> SetCellRule<T> {
    pub fn new<R, RK, W, WK, F>(reads: R, writes: W, f: F) -> Self
    where
        R: IntoIterator<Item = RK>,
        RK: Into<GridKey>,
        W: IntoIterator<Item = WK>,
        WK: Into<GridKey>,
        F: Fn(&RuleContext<'_, T>, &mut WriteGrids<'_, T>, &[T], (usize, usize)) + Send + Sync + 'static,
    {
        Self {
            reads: reads.into_iter().map(Into::into).collect(),
            writes: writes.into_iter().map(Into::into).collect(),
            f: Arc::new(f),
        }
    }

    pub fn reads(&self) -> &[GridKey] {
        &self.reads
    }

    pub fn writes(&self) -> &[GridKey] {
        &self.writes
    }

    #[inline(always)]
    pub(crate) fn apply(
        &self,
        ctx: &RuleContext<'_, T>,
        writes: &mut WriteGrids<'_, T>,
        states: &[T],
        index: (usize, usize),
    ) {
        (self.f)(ctx, writes, states, index)
    }
}

#[derive(Clone)]
pub enum ChainLink<T> {
    Cell(CellRule<T>),
    Neighborhood(NeighborhoodRule<T>),
}

impl<T: Cell> ChainLink<T> {
    pub fn write(&self) -> &GridKey {
        match self {
            ChainLink::Cell(rule) => rule.write(),
            ChainLink::Neighborhood(rule) => rule.write(),
        }
    }

    fn radius(&self) -> usize {
        match self {
            ChainLink::Cell(_) => 0,
            ChainLink::Neighborhood(rule) => rule.radius(),
        }
    }
}

impl<T> From<CellRule<T>> for ChainLink<T> {
    fn from(rule: CellRule<T>) -> Self {
        ChainLink::Cell(rule)
    }
}

impl<T> From<NeighborhoodRule<T>> for ChainLink<T> {
    fn from(rule: NeighborhoodRule<T>) -> Self {
        ChainLink::Neighborhood(rule)
    }
}

/// Ordered links sharing one read pass over the grid.
///
/// For each cell, a link sees the values earlier links produced for that
/// cell; neighborhoods always come from the source. When several links write
/// the same grid the last one wins.
#[derive(Clone)]
pub struct Chain<T> {
    links: Vec<ChainLink<T>>,
}

impl<T: Cell> Chain<T> {
    pub fn new<I>(links: I) -> Result<Self>
    where
        I: IntoIterator<Item = ChainLink<T>>,
    {
        let links: Vec<_> = links.into_iter().collect();
        if links.is_empty() {
            return Err(Error::InvalidChain("a chain needs at least one link"));
        }
        let mut hood_key: Option<&GridKey> = None;
        for link in &links {
            if let ChainLink::Neighborhood(rule) = link {
                match hood_key {
                    Some(key) if key != rule.read() => {
                        return Err(Error::InvalidChain(
                            "neighborhood links must read the same grid",
                        ));
                    }
                    _ => hood_key = Some(rule.read()),
                }
            }
        }
        Ok(Self { links })
    }

    pub fn links(&self) -> &[ChainLink<T>] {
        &self.links
    }

    pub fn radius(&self) -> usize {
        self.links.iter().map(ChainLink::radius).max().unwrap_or(0)
    }

    pub fn hood_key(&self) -> Option<&GridKey> {
        self.links.iter().find_map(|link| match link {
            ChainLink::Neighborhood(rule) => Some(rule.read()),
            ChainLink::Cell(_) => None,
        })
    }
}

#[derive(Clone)]
pub enum RuleKind<T> {
    Cell(CellRule<T>),
    Neighborhood(NeighborhoodRule<T>),
    SetCell(SetCellRule<T>),
    Chain(Chain<T>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A grid a rule touches and how.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding<'a> {
    pub key: &'a GridKey,
    pub access: Access,
}

/// Merge read and write keys into one ordered binding list.
///
/// Order is first appearance, reads before writes. A key that is both read
/// and written is bound once with `Access::Write`: the rule still reads its
/// source, but the grid is part of the written set.
pub fn merge_bindings<'a, R, W>(reads: R, writes: W) -> Vec<Binding<'a>>
where
    R: IntoIterator<Item = &'a GridKey>,
    W: IntoIterator<Item = &'a GridKey>,
{
    let mut out: Vec<Binding<'a>> = Vec::new();
    for key in reads {
        if !out.iter().any(|b| b.key == key) {
            out.push(Binding {
                key,
                access: Access::Read,
            });
        }
    }
    for key in writes {
        match out.iter_mut().find(|b| b.key == key) {
            Some(binding) => binding.access = Access::Write,
            None => out.push(Binding {
                key,
                access: Access::Write,
            }),
        }
    }
    out
}

#[derive(Clone)]
pub struct Rule<T> {
    kind: RuleKind<T>,
    precalc: Option<Arc<PrecalcFn<T>>>,
}

impl<T: Cell> Rule<T> {
    pub fn cell<R, K, F>(reads: R, write: impl Into<GridKey>, f: F) -> Self
    where
        R: IntoIterator<Item = K>,
        K: Into<GridKey>,
        F: Fn(&RuleContext<'_, T>, &[T]) -> T + Send + Sync + 'static,
    {
        CellRule::new(reads, write, f).into()
    }

    /// Neighborhood rule that reads and writes the same grid.
    pub fn neighborhood<F>(key: impl Into<GridKey>, stencil: Stencil, f: F) -> Self
    where
        F: Fn(&RuleContext<'_, T>, T, &Neighborhood<T>) -> T + Send + Sync + 'static,
    {
        let key = key.into();
        NeighborhoodRule::new(key.clone(), key, stencil, f).into()
    }

    pub fn set_cell<R, RK, W, WK, F>(reads: R, writes: W, f: F) -> Self
    where
        R: IntoIterator<Item = RK>,
        RK: Into<GridKey>,
        W: IntoIterator<Item = WK>,
        WK: Into<GridKey>,
        F: Fn(&RuleContext<'_, T>, &mut WriteGrids<'_, T>, &[T], (usize, usize)) + Send + Sync + 'static,
    {
        SetCellRule::new(reads, writes, f).into()
    }

    pub fn chain<I>(links: I) -> Result<Self>
    where
        I: IntoIterator<Item = ChainLink<T>>,
    {
        Ok(Chain::new(links)?.into())
    }

    /// Attach a hook that derives the rule actually applied each step.
    ///
    /// The derived rule is used for one application and dropped; the next
    /// step starts again from `self`.
    pub fn with_precalc<F>(mut self, f: F) -> Self
    where
        F: Fn(&Rule<T>, &RuleContext<'_, T>) -> Rule<T> + Send + Sync + 'static,
    {
        self.precalc = Some(Arc::new(f));
        self
    }

    #[inline]
    pub fn kind(&self) -> &RuleKind<T> {
        &self.kind
    }

    pub(crate) fn precalc(&self) -> Option<&PrecalcFn<T>> {
        self.precalc.as_deref()
    }

    pub fn radius(&self) -> usize {
        match &self.kind {
            RuleKind::Cell(_) | RuleKind::SetCell(_) => 0,
            RuleKind::Neighborhood(rule) => rule.radius(),
            RuleKind::Chain(chain) => chain.radius(),
        }
    }

    /// The grid read as a neighborhood, if any.
    pub fn hood_key(&self) -> Option<&GridKey> {
        match &self.kind {
            RuleKind::Neighborhood(rule) => Some(rule.read()),
            RuleKind::Chain(chain) => chain.hood_key(),
            RuleKind::Cell(_) | RuleKind::SetCell(_) => None,
        }
    }

    pub fn read_keys(&self) -> Vec<&GridKey> {
        let mut keys: Vec<&GridKey> = Vec::new();
        match &self.kind {
            RuleKind::Cell(rule) => keys.extend(rule.reads()),
            RuleKind::Neighborhood(rule) => keys.push(rule.read()),
            RuleKind::SetCell(rule) => keys.extend(rule.reads()),
            RuleKind::Chain(chain) => {
                for link in chain.links() {
                    match link {
                        ChainLink::Cell(rule) => keys.extend(rule.reads()),
                        ChainLink::Neighborhood(rule) => keys.push(rule.read()),
                    }
                }
            }
        }
        dedup_keys(keys)
    }

    pub fn write_keys(&self) -> Vec<&GridKey> {
        let keys: Vec<&GridKey> = match &self.kind {
            RuleKind::Cell(rule) => vec![rule.write()],
            RuleKind::Neighborhood(rule) => vec![rule.write()],
            RuleKind::SetCell(rule) => rule.writes().iter().collect(),
            RuleKind::Chain(chain) => chain.links().iter().map(ChainLink::write).collect(),
        };
        dedup_keys(keys)
    }

    pub fn bindings(&self) -> Vec<Binding<'_>> {
        merge_bindings(self.read_keys(), self.write_keys())
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match &self.kind {
            RuleKind::Cell(_) => "cell",
            RuleKind::Neighborhood(_) => "neighborhood",
            RuleKind::SetCell(_) => "set_cell",
            RuleKind::Chain(_) => "chain",
        }
    }
}

fn dedup_keys(keys: Vec<&GridKey>) -> Vec<&GridKey> {
    let mut out: Vec<&GridKey> = Vec::with_capacity(keys.len());
    for key in keys {
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

impl<T> From<CellRule<T>> for Rule<T> {
    fn from(rule: CellRule<T>) -> Self {
        Self {
            kind: RuleKind::Cell(rule),
            precalc: None,
        }
    }
}

impl<T> From<NeighborhoodRule<T>> for Rule<T> {
    fn from(rule: NeighborhoodRule<T>) -> Self {
        Self {
            kind: RuleKind::Neighborhood(rule),
            precalc: None,
        }
    }
}

impl<T> From<SetCellRule<T>> for Rule<T> {
    fn from(rule: SetCellRule<T>) -> Self {
        Self {
            kind: RuleKind::SetCell(rule),
            precalc: None,
        }
    }
}

impl<T> From<Chain<T>> for Rule<T> {
    fn from(chain: Chain<T>) -> Self {
        Self {
            kind: RuleKind::Chain(chain),
            precalc: None,
        }
    }
}

impl<T: Cell> fmt::Debug for Rule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("kind", &self.kind_name())
            .field("reads", &self.read_keys())
            .field("writes", &self.write_keys())
            .field("radius", &self.radius())
            .field("precalc", &self.precalc.is_some())
            .finish()
    }
}

/// Destination grids a [`SetCellRule`] may write, in declared order.
pub struct WriteGrids<'a, T> {
    grids: Vec<(&'a GridKey, &'a mut Grid<T>)>,
}

impl<'a, T: Cell> WriteGrids<'a, T> {
    pub(crate) fn new(grids: Vec<(&'a GridKey, &'a mut Grid<T>)>) -> Self {
        Self { grids }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Grid<T>> {
        self.grids
            .iter_mut()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, grid)| &mut **grid)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

impl<T: Cell> Index<usize> for WriteGrids<'_, T> {
    type Output = Grid<T>;

    fn index(&self, index: usize) -> &Grid<T> {
        &*self.grids[index].1
    }
}

impl<T: Cell> IndexMut<usize> for WriteGrids<'_, T> {
    fn index_mut(&mut self, index: usize) -> &mut Grid<T> {
        &mut *self.grids[index].1
    }
}

#[cfg(test)]
mod tests {
    use super::{Access, ChainLink, CellRule, NeighborhoodRule, Rule, merge_bindings};
    use crate::stencil::error::Error;
    use crate::stencil::hood::Stencil;
    use crate::stencil::state::GridKey;

    #[test]
    fn write_overrides_read_in_bindings() {
        let a = GridKey::from("a");
        let b = GridKey::from("b");
        let c = GridKey::from("c");
        let bindings = merge_bindings([&a, &b, &a], [&b, &c]);
        let summary: Vec<_> = bindings.iter().map(|b| (b.key.as_str(), b.access)).collect();
        assert_eq!(
            summary,
            vec![("a", Access::Read), ("b", Access::Write), ("c", Access::Write)]
        );
    }

    #[test]
    fn rule_reports_keys_and_radius() {
        let rule: Rule<u8> = Rule::neighborhood("life", Stencil::moore(2), |_, s, _| s);
        assert_eq!(rule.radius(), 2);
        assert_eq!(rule.hood_key().map(GridKey::as_str), Some("life"));
        assert_eq!(rule.read_keys(), rule.write_keys());

        let cell: Rule<u8> = Rule::cell(["a", "b"], "c", |_, s| s[0] + s[1]);
        assert_eq!(cell.radius(), 0);
        assert_eq!(cell.bindings().len(), 3);
    }

    #[test]
    fn chain_rejects_mixed_neighborhood_grids() {
        let first = NeighborhoodRule::<u8>::new("a", "a", Stencil::moore(1), |_, s, _| s);
        let second = NeighborhoodRule::<u8>::new("b", "a", Stencil::moore(1), |_, s, _| s);
        let err = Rule::chain([ChainLink::from(first), second.into()]).unwrap_err();
        assert!(matches!(err, Error::InvalidChain(_)));
        assert!(matches!(
            Rule::<u8>::chain(Vec::new()),
            Err(Error::InvalidChain(_))
        ));
    }

    #[test]
    fn chain_radius_and_writes_merge() {
        let hood = NeighborhoodRule::<u8>::new("a", "a", Stencil::moore(2), |_, s, _| s);
        let post = CellRule::<u8>::new(["a"], "a", |_, s| s[0]);
        let side = CellRule::<u8>::new(["a"], "b", |_, s| s[0]);
        let rule = Rule::chain([hood.into(), post.into(), side.into()]).unwrap();
        assert_eq!(rule.radius(), 2);
        let writes: Vec<_> = rule.write_keys().iter().map(|k| k.as_str()).collect();
        assert_eq!(writes, vec!["a", "b"]);
    }
}
