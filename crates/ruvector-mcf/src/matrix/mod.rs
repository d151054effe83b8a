//! Edge-indexed matrix abstraction shared by every flow algorithm.
//!
//! Flow weights, flows, dual differences, capacities and neighborhood masks
//! all live on the sparsity pattern of some adjacency structure. The
//! [`EdgeMatrix`] trait captures the handful of operations the solvers need so
//! that each algorithm is written once and runs unchanged on either backing:
//!
//! | Backing | Storage | Used when |
//! |---------|---------|-----------|
//! | [`DenseMatrix`] | `V x V` ndarray values + boolean mask | `sparse = false` |
//! | [`CsrMatrix<f32>`] | compressed sparse rows, sorted columns | `sparse = true` |
//!
//! Entries outside the pattern are structurally zero. Every operation that
//! produces a new matrix preserves the pattern of its receiver.

mod dense;
mod sparse;

pub use dense::DenseMatrix;
pub use sparse::CsrMatrix;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Convenience alias for the sparse backing.
pub type SparseMatrix = CsrMatrix<f32>;

/// Which backing a matrix type uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    /// Full `V x V` storage.
    Dense,
    /// Edge list storage; never allocates `V x V`.
    Sparse,
}

impl std::fmt::Display for Representation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Representation::Dense => write!(f, "dense"),
            Representation::Sparse => write!(f, "sparse"),
        }
    }
}

/// Square matrix whose non-zero structure is a fixed set of directed edges.
pub trait EdgeMatrix: Clone + std::fmt::Debug + Send + Sync + Sized {
    /// Backing identifier, checked against the configured mode.
    const REPRESENTATION: Representation;

    /// Build a `num_nodes x num_nodes` matrix from `(src, dst, value)`
    /// triplets. Repeated positions keep the last value.
    ///
    /// # Errors
    ///
    /// Returns [`McfError::InvalidInput`](crate::McfError::InvalidInput) if an
    /// index is out of range or a value is not finite.
    fn from_edges<I>(num_nodes: usize, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f32)>;

    /// Number of nodes (rows == columns).
    fn num_nodes(&self) -> usize;

    /// Number of edges in the pattern.
    fn num_edges(&self) -> usize;

    /// `true` if `(u, v)` is part of the pattern.
    fn has_edge(&self, u: usize, v: usize) -> bool;

    /// Value stored at `(u, v)`, zero when the edge is absent.
    fn get(&self, u: usize, v: usize) -> f32;

    /// Number of pattern entries in row `u`.
    fn row_degree(&self, u: usize) -> usize;

    /// New matrix on the same pattern with `f(u, v, old)` at every edge.
    /// Edges are visited in row-major order.
    fn with_values<F>(&self, f: F) -> Self
    where
        F: FnMut(usize, usize, f32) -> f32;

    /// Element-wise transform over the pattern.
    fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(f32) -> f32,
    {
        self.with_values(|_, _, x| f(x))
    }

    /// Combine two matrices that share a pattern.
    ///
    /// # Errors
    ///
    /// Returns a dimension or input error if the patterns differ.
    fn zip_map<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: FnMut(f32, f32) -> f32;

    /// `out[u] = sum_v M[u, v]` (outflow when `M` is a flow).
    fn row_sums(&self) -> Array1<f32>;

    /// `out[v] = sum_u M[u, v]` (inflow when `M` is a flow).
    fn col_sums(&self) -> Array1<f32>;

    /// `M[u, v] * scale[u]` for every edge.
    fn scale_rows(&self, scale: ArrayView1<'_, f32>) -> Self {
        self.with_values(|u, _, x| x * scale[u])
    }

    /// Matrix on the same pattern holding `M[v, u]` at `(u, v)`, or zero when
    /// the reverse edge is absent.
    fn reverse_values(&self) -> Self;

    /// Row-local transform. `f(u, cols, vals)` sees only the pattern entries
    /// of row `u` and may overwrite `vals` in place. Empty rows are skipped.
    fn map_rows<F>(&self, f: F) -> Self
    where
        F: FnMut(usize, &[usize], &mut [f32]);

    /// Product with a dense node matrix: `out = M * x` where `x` is `V x D`.
    fn spmm(&self, x: ArrayView2<'_, f32>) -> Array2<f32>;

    /// Visit every edge in row-major order.
    fn for_each_edge<F>(&self, f: F)
    where
        F: FnMut(usize, usize, f32);

    /// Sum of `f(u, v, value)` over all edges.
    fn sum_edges<F>(&self, mut f: F) -> f32
    where
        F: FnMut(usize, usize, f32) -> f32,
    {
        let mut total = 0.0f32;
        self.for_each_edge(|u, v, x| total += f(u, v, x));
        total
    }

    /// All edges as `(src, dst, value)` triplets in row-major order.
    fn edges(&self) -> Vec<(usize, usize, f32)> {
        let mut out = Vec::with_capacity(self.num_edges());
        self.for_each_edge(|u, v, x| out.push((u, v, x)));
        out
    }

    /// Materialise as a dense `V x V` array (zeros off-pattern).
    fn to_dense(&self) -> Array2<f32>;

    /// `true` if both matrices have the same node count and edge set.
    fn same_pattern(&self, other: &Self) -> bool {
        if self.num_nodes() != other.num_nodes() || self.num_edges() != other.num_edges() {
            return false;
        }
        let mut same = true;
        self.for_each_edge(|u, v, _| same &= other.has_edge(u, v));
        same
    }
}

/// Error returned by `zip_map` when the operands' patterns differ.
pub(crate) fn pattern_mismatch(what: &str, a: usize, b: usize) -> crate::McfError {
    crate::McfError::dimension_mismatch(format!("{what} (edge pattern)"), a, b)
}
