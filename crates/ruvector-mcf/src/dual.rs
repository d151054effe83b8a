//! Momentum dual ascent on node potentials.
//!
//! Relaxing conservation with one potential `p[w]` per node gives the dual
//! function
//!
//! ```text
//! g(p) = sum_(u,v) min_{x >= 0} [cost(x) - (p[u] - p[v]) * x] - sum_w p[w] * consumption[w]
//! ```
//!
//! where `consumption = -demand` (demands are positive at sources). The inner
//! minimiser is `relu(inverse_derivative(p[u] - p[v]))`, so `g` is evaluated
//! exactly for any `p`, and weak duality gives `g(p) <= cost(f)` for every
//! feasible flow `f`. Its gradient is `inflow[w] - outflow[w] + demand[w]` at
//! the minimising flow, zero exactly when that flow conserves.
//!
//! Ascent uses heavy-ball momentum:
//!
//! ```text
//! velocity = momentum * velocity + step_size * grad
//! p       += velocity
//! ```

use ndarray::{Array1, ArrayView1};
use tracing::{debug, instrument, trace};

use crate::cost::CostFunction;
use crate::error::{McfError, Result};
use crate::matrix::EdgeMatrix;

/// Result of a dual solve.
#[derive(Debug, Clone)]
pub struct DualSolution<M> {
    /// Final potentials.
    pub potentials: Array1<f32>,
    /// `p[u] - p[v]` on every edge.
    pub dual_diff: M,
    /// Minimising flow for the final potentials.
    pub dual_flow: M,
    /// `g(p)` at the final potentials; a lower bound on the optimal cost.
    pub dual_cost: f32,
    /// L2 norm of the dual gradient at the final potentials.
    pub gradient_norm: f32,
    pub iterations: usize,
}

/// Fixed-iteration momentum ascent on `g`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualAscentSolver {
    cost: CostFunction,
    iterations: usize,
    step_size: f32,
    momentum: f32,
}

impl DualAscentSolver {
    pub fn new(cost: CostFunction, iterations: usize, step_size: f32, momentum: f32) -> Self {
        Self {
            cost,
            iterations,
            step_size,
            momentum,
        }
    }

    pub fn cost(&self) -> &CostFunction {
        &self.cost
    }

    /// Potential differences and the minimising flow on `adjacency`.
    pub fn dual_flow<M: EdgeMatrix>(
        &self,
        adjacency: &M,
        potentials: ArrayView1<'_, f32>,
    ) -> (M, M) {
        let diff = adjacency.with_values(|u, v, _| potentials[u] - potentials[v]);
        let flow = diff.map(|d| self.cost.inverse_derivative(d).max(0.0));
        (diff, flow)
    }

    /// `g(p)` for the given potentials.
    pub fn dual_cost<M: EdgeMatrix>(
        &self,
        adjacency: &M,
        demands: ArrayView1<'_, f32>,
        potentials: ArrayView1<'_, f32>,
    ) -> Result<f32> {
        check_lengths(adjacency.num_nodes(), demands, potentials)?;
        let (diff, flow) = self.dual_flow(adjacency, potentials);
        Ok(self.lagrangian(&diff, &flow, demands, potentials))
    }

    fn lagrangian<M: EdgeMatrix>(
        &self,
        diff: &M,
        flow: &M,
        demands: ArrayView1<'_, f32>,
        potentials: ArrayView1<'_, f32>,
    ) -> f32 {
        let edge_terms = flow.sum_edges(|u, v, x| self.cost.apply(x) - diff.get(u, v) * x);
        edge_terms + potentials.dot(&demands)
    }

    fn gradient<M: EdgeMatrix>(flow: &M, demands: ArrayView1<'_, f32>) -> Array1<f32> {
        &flow.col_sums() - &flow.row_sums() + &demands
    }

    /// Run `dual_iters` rounds of momentum ascent from `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`McfError::DimensionMismatch`] if `demands` or `initial` does
    /// not have one entry per node.
    #[instrument(
        skip(self, adjacency, demands, initial),
        fields(n = adjacency.num_nodes(), iterations = self.iterations)
    )]
    pub fn solve<M: EdgeMatrix>(
        &self,
        adjacency: &M,
        demands: ArrayView1<'_, f32>,
        initial: ArrayView1<'_, f32>,
    ) -> Result<DualSolution<M>> {
        check_lengths(adjacency.num_nodes(), demands, initial)?;

        let mut potentials = initial.to_owned();
        let mut velocity = Array1::<f32>::zeros(potentials.len());
        for iteration in 0..self.iterations {
            let (_, flow) = self.dual_flow(adjacency, potentials.view());
            let grad = Self::gradient(&flow, demands);
            velocity = self.momentum * &velocity + self.step_size * &grad;
            potentials += &velocity;
            trace!(
                iteration,
                grad_norm = grad.dot(&grad).sqrt(),
                "dual round"
            );
        }

        let (dual_diff, dual_flow) = self.dual_flow(adjacency, potentials.view());
        let grad = Self::gradient(&dual_flow, demands);
        let gradient_norm = grad.dot(&grad).sqrt();
        let dual_cost = self.lagrangian(&dual_diff, &dual_flow, demands, potentials.view());
        debug!(dual_cost, gradient_norm, "dual ascent finished");

        Ok(DualSolution {
            potentials,
            dual_diff,
            dual_flow,
            dual_cost,
            gradient_norm,
            iterations: self.iterations,
        })
    }
}

fn check_lengths(
    n: usize,
    demands: ArrayView1<'_, f32>,
    potentials: ArrayView1<'_, f32>,
) -> Result<()> {
    if demands.len() != n {
        return Err(McfError::dimension_mismatch("demands", n, demands.len()));
    }
    if potentials.len() != n {
        return Err(McfError::dimension_mismatch("potentials", n, potentials.len()));
    }
    Ok(())
}
