//! Double-buffered, block-sparse stencil rule engine for 2D grids.
//!
//! A [`SimulationState`] holds named grids, each with a source and a
//! destination buffer. A [`RuleEngine`] applies [`Rule`]s to it: per-cell
//! maps, neighborhood stencils, manual-write rules and chains of the first
//! two. Neighborhood rules skip blocks whose surroundings are inactive.

pub mod stencil;
pub use stencil::{
    Boundary, EngineConfig, Error, Grid, GridKey, LifeRule, Opt, Result, Rule, RuleContext, RuleEngine,
    SimulationState, Stencil,
};
