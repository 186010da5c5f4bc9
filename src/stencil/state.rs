//! Simulation state: named double-buffered grids plus frame/time bookkeeping.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::cell::Cell;
use super::error::{Error, Result};
use super::grid::Grid;
use super::grid_data::GridData;
use super::rule::{Rule, RuleContext};

/// Identifier of a grid within a [`SimulationState`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey(Arc<str>);

impl GridKey {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GridKey {
    fn from(key: &str) -> Self {
        Self(Arc::from(key))
    }
}

impl From<String> for GridKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl From<&GridKey> for GridKey {
    fn from(key: &GridKey) -> Self {
        key.clone()
    }
}

impl Borrow<str> for GridKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// Read-only auxiliary grids, available to rules through [`RuleContext::aux`].
pub type AuxData<T> = BTreeMap<GridKey, Grid<T>>;

#[derive(Clone, Debug)]
pub struct SimulationState<T> {
    grids: Vec<(GridKey, GridData<T>)>,
    mask: Option<Grid<bool>>,
    aux: AuxData<T>,
    frame: u64,
    time: f64,
    timestep: f64,
}

impl<T: Cell> SimulationState<T> {
    pub fn builder() -> SimulationStateBuilder<T> {
        SimulationStateBuilder::default()
    }

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

    pub fn keys(&self) -> impl Iterator<Item = &GridKey> + '_ {
        self.grids.iter().map(|(key, _)| key)
    }

    /// Current values of a grid (its source buffer).
    pub fn grid(&self, key: &str) -> Option<&Grid<T>> {
        self.grid_data(key).map(GridData::source)
    }

    pub fn grid_data(&self, key: &str) -> Option<&GridData<T>> {
        self.grids
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, data)| data)
    }

    pub fn mask(&self) -> Option<&Grid<bool>> {
        self.mask.as_ref()
    }

    pub fn aux(&self, key: &str) -> Option<&Grid<T>> {
        self.aux.get(key)
    }

    pub fn context(&self) -> RuleContext<'_, T> {
        RuleContext {
            frame: self.frame,
            time: self.time,
            timestep: self.timestep,
            mask: self.mask.as_ref(),
            aux: &self.aux,
        }
    }

    pub(crate) fn position(&self, key: &GridKey) -> Option<usize> {
        self.grids.iter().position(|(k, _)| k == key)
    }

    pub(crate) fn key_at(&self, index: usize) -> &GridKey {
        &self.grids[index].0
    }

    pub(crate) fn data_at(&self, index: usize) -> &GridData<T> {
        &self.grids[index].1
    }

    pub(crate) fn data_at_mut(&mut self, index: usize) -> &mut GridData<T> {
        &mut self.grids[index].1
    }

    /// Everything a sweep needs at once: the context pieces borrowed shared,
    /// the grids borrowed mutably.
    pub(crate) fn sweep_parts(
        &mut self,
    ) -> (RuleContext<'_, T>, &mut [(GridKey, GridData<T>)]) {
        let ctx = RuleContext {
            frame: self.frame,
            time: self.time,
            timestep: self.timestep,
            mask: self.mask.as_ref(),
            aux: &self.aux,
        };
        (ctx, &mut self.grids)
    }

    pub(crate) fn advance_frame(&mut self) {
        self.frame += 1;
        self.time += self.timestep;
    }
}

pub struct SimulationStateBuilder<T> {
    grids: Vec<(GridKey, Grid<T>, Option<usize>)>,
    mask: Option<Grid<bool>>,
    aux: AuxData<T>,
    time: f64,
    timestep: f64,
}

impl<T> Default for SimulationStateBuilder<T> {
    fn default() -> Self {
        Self {
            grids: Vec::new(),
            mask: None,
            aux: BTreeMap::new(),
            time: 0.0,
            timestep: 1.0,
        }
    }
}

impl<T: Cell> SimulationStateBuilder<T> {
    /// Add a grid. Its radius is derived from the rules in
    /// [`build_for`](Self::build_for), or zero with [`build`](Self::build).
    pub fn grid(mut self, key: impl Into<GridKey>, grid: Grid<T>) -> Self {
        self.grids.push((key.into(), grid, None));
        self
    }

    /// Add a grid with an explicit radius.
    pub fn grid_with_radius(mut self, key: impl Into<GridKey>, grid: Grid<T>, radius: usize) -> Self {
        self.grids.push((key.into(), grid, Some(radius)));
        self
    }

    /// Cells where the mask is `false` are never evaluated.
    pub fn mask(mut self, mask: Grid<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn aux(mut self, key: impl Into<GridKey>, grid: Grid<T>) -> Self {
        self.aux.insert(key.into(), grid);
        self
    }

    pub fn time(mut self, start: f64) -> Self {
        self.time = start;
        self
    }

    pub fn timestep(mut self, dt: f64) -> Self {
        self.timestep = dt;
        self
    }

    pub fn build(self) -> Result<SimulationState<T>> {
        self.build_with(|_| 0)
    }

    /// Build with each grid padded for the widest neighborhood any of
    /// `rules` reads from it. Explicit radii win when larger.
    pub fn build_for(self, rules: &[Rule<T>]) -> Result<SimulationState<T>> {
        self.build_with(|key| {
            rules
                .iter()
                .filter(|rule| rule.hood_key() == Some(key))
                .map(Rule::radius)
                .max()
                .unwrap_or(0)
        })
    }

    fn build_with<F>(self, radius_for: F) -> Result<SimulationState<T>>
    where
        F: Fn(&GridKey) -> usize,
    {
        let mut grids: Vec<(GridKey, GridData<T>)> = Vec::with_capacity(self.grids.len());
        for (key, grid, explicit) in self.grids {
            if grids.iter().any(|(k, _)| *k == key) {
                return Err(Error::DuplicateGridKey(key));
            }
            let radius = explicit.unwrap_or(0).max(radius_for(&key));
            grids.push((key, GridData::new(grid, radius)));
        }
        Ok(SimulationState {
            grids,
            mask: self.mask.map(|mask| mask.padded(0)),
            aux: self.aux,
            frame: 0,
            time: self.time,
            timestep: self.timestep,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{GridKey, SimulationState};
    use crate::stencil::error::Error;
    use crate::stencil::grid::{Boundary, Grid};
    use crate::stencil::hood::Stencil;
    use crate::stencil::rule::Rule;

    #[test]
    fn build_for_derives_radius_from_neighborhood_rules() {
        let rules: Vec<Rule<u8>> = vec![
            Rule::neighborhood("a", Stencil::moore(2), |_, s, _| s),
            Rule::neighborhood("a", Stencil::moore(1), |_, s, _| s),
            Rule::cell(["a"], "b", |_, s| s[0]),
        ];
        let state = SimulationState::builder()
            .grid("a", Grid::new(8, 8, Boundary::Wrap))
            .grid("b", Grid::new(8, 8, Boundary::Remove))
            .build_for(&rules)
            .unwrap();
        assert_eq!(state.grid_data("a").unwrap().radius(), 2);
        assert_eq!(state.grid_data("b").unwrap().radius(), 0);
        let keys: Vec<_> = state.keys().map(GridKey::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = SimulationState::<u8>::builder()
            .grid("a", Grid::new(2, 2, Boundary::Remove))
            .grid("a", Grid::new(2, 2, Boundary::Remove))
            .build()
            .unwrap_err();
        assert_eq!(err, Error::DuplicateGridKey("a".into()));
    }

    #[test]
    fn context_exposes_time_and_aux() {
        let mut state = SimulationState::<f32>::builder()
            .grid("a", Grid::new(2, 2, Boundary::Remove))
            .aux("rain", Grid::from_fn(2, 2, Boundary::Remove, |_, _| 0.5))
            .time(10.0)
            .timestep(0.25)
            .build()
            .unwrap();
        state.advance_frame();
        let ctx = state.context();
        assert_eq!(ctx.frame(), 1);
        assert_eq!(ctx.time(), 10.25);
        assert_eq!(ctx.aux("rain").and_then(|g| g.get(1, 1)), Some(0.5));
        assert!(ctx.aux("snow").is_none());
    }
}
