//! Error types for rule application.
//!
//! Configuration errors are raised before a rule touches any cell, so a
//! failed `apply_step` leaves the simulation state exactly as it was.

use thiserror::Error;

use super::state::GridKey;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The rule or the simulation state was set up inconsistently.
    Configuration,
    /// Engine bookkeeping went out of sync. Indicates a bug.
    Internal,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unknown grid key `{0}`")]
    UnknownGridKey(GridKey),

    #[error("grid key `{0}` is defined more than once")]
    DuplicateGridKey(GridKey),

    #[error("grid `{key}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        key: GridKey,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("grid `{key}` is padded for radius {padding}, rule needs radius {radius}")]
    InsufficientPadding {
        key: GridKey,
        padding: usize,
        radius: usize,
    },

    #[error("invalid chain: {0}")]
    InvalidChain(&'static str),

    #[error("invalid life rule string `{0}`")]
    InvalidRuleString(String),

    #[error("status bitmap of `{key}` has shape {found:?}, expected {expected:?}")]
    StatusShape {
        key: GridKey,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StatusShape { .. } => ErrorKind::Internal,
            _ => ErrorKind::Configuration,
        }
    }
}

/// A manual write targeted a coordinate outside a `Remove` grid.
///
/// Recoverable: the write is simply not applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("cell ({row}, {col}) is outside the grid")]
pub struct OutOfBounds {
    pub row: isize,
    pub col: isize,
}
