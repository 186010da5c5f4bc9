//! Stencil rule engine internals and public API.

mod boundary;
mod cell;
mod engine;
mod error;
mod grid;
mod grid_data;
mod hood;
pub mod life;
mod rule;
mod scheduler;
mod state;
mod status;

pub use cell::{Cell, CellArith};
pub use engine::{EngineConfig, Opt, RuleEngine};
pub use error::{Error, ErrorKind, OutOfBounds, Result};
pub use grid::{Boundary, Grid};
pub use grid_data::GridData;
pub use hood::{Neighborhood, Stencil};
pub use life::LifeRule;
pub use rule::{
    Access, Binding, CellFn, CellRule, Chain, ChainLink, NeighborhoodFn, NeighborhoodRule, PrecalcFn, Rule,
    RuleContext, RuleKind, SetCellFn, SetCellRule, WriteGrids, merge_bindings,
};
pub use scheduler::SweepStats;
pub use state::{AuxData, GridKey, SimulationState, SimulationStateBuilder};
pub use status::BlockStatus;
