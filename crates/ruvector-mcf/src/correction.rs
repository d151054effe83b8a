//! Removal of reciprocal flow between mutual edges.
//!
//! For every pair `(u, v)`, `(v, u)` that both carry flow, the common part
//! `min(a, b)` is cancelled from both directions. With `cost(0) = 0` and a
//! non-decreasing cost this never raises the total cost and leaves every
//! node's net balance unchanged.

use tracing::debug;

use crate::error::Result;
use crate::matrix::EdgeMatrix;

/// Cancels back-and-forth flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCorrector;

impl CycleCorrector {
    pub fn new() -> Self {
        Self
    }

    /// `flow[u, v] - min(flow[u, v], flow[v, u])` on every edge.
    ///
    /// The minimum is written as `0.5 * (a + b - |a - b|)`, which has a
    /// subgradient on both arguments everywhere. Edges without a reverse
    /// edge are unchanged.
    pub fn correct<M: EdgeMatrix>(&self, flow: &M) -> Result<M> {
        let reverse = flow.reverse_values();
        let corrected = flow.zip_map(&reverse, |a, b| {
            let common = 0.5 * (a + b - (a - b).abs());
            (a - common).max(0.0)
        })?;
        debug!(
            removed = flow.sum_edges(|_, _, x| x) - corrected.sum_edges(|_, _, x| x),
            "cancelled reciprocal flow"
        );
        Ok(corrected)
    }
}
