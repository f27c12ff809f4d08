//! Error type shared by every module of the crate.
//!
//! Errors are raised synchronously at the point of detection and are never retried internally. Any error
//! aborts the call that produced it; partial results (for example earlier filter steps) are discarded.

use thiserror::Error;

/// Errors produced while building a statespace, simulating movement, or running a particle filter.
#[derive(Debug, Error)]
pub enum MovementError {
    /// Malformed caller input: non-monotonic coordinates, mismatched lengths, too few grid points, etc.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Lookup of a grid index, state key, or direction that does not exist in the statespace.
    #[error("not found: {0}")]
    NotFound(String),
    /// A model parameter outside its valid range (e.g. a uniformized rate outside `[0, 1]`).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Every importance weight was zero (or undefined) at the given filter step.
    #[error("degenerate particle filter: no importance weight mass at step {step}")]
    DegenerateFilter { step: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Serialization or deserialization failure for configuration files.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MovementError>;
