//! Error types for the flow crate.
//!
//! Configuration and shape problems are reported eagerly, before any solver
//! iteration runs. Numeric degeneracies (sink rows, zero denominators) are
//! never errors; the solvers define those results as zero instead.

use crate::matrix::Representation;

/// Primary error type for flow model operations.
#[derive(Debug, thiserror::Error)]
pub enum McfError {
    /// A configuration option is missing, out of range, or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Two inputs that must agree on a dimension do not.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which input was inspected.
        what: String,
        /// Dimension implied by the graph or configuration.
        expected: usize,
        /// Dimension actually supplied.
        actual: usize,
    },

    /// Edge matrices were supplied in a representation the model was not
    /// configured for.
    #[error("representation mismatch: model configured for {expected}, got {actual}")]
    RepresentationMismatch {
        /// Representation selected by `McfConfig::sparse`.
        expected: Representation,
        /// Representation of the supplied matrices.
        actual: Representation,
    },

    /// The caller supplied structurally invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A value is NaN or infinite where a finite number is required.
    #[error("non-finite value detected: {0}")]
    NonFiniteValue(String),

    /// Sparse mode evaluates a single graph instance per call.
    #[error("sparse mode processes one graph instance at a time (batch size {batch_size})")]
    BatchNotSupported {
        /// Number of instances that were submitted.
        batch_size: usize,
    },

    /// JSON configuration could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McfError {
    /// Shorthand for a [`McfError::DimensionMismatch`].
    pub fn dimension_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Shorthand for a [`McfError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for a [`McfError::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Convenience result type for flow model operations.
pub type Result<T> = std::result::Result<T, McfError>;
