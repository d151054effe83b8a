//! Input validation for forward evaluation.
//!
//! Every check runs eagerly before the first solver iteration, so shape and
//! representation errors surface with a clear diagnostic instead of as a
//! panic deep inside an ndarray product. Legal but suspicious inputs (a
//! demand vector that does not balance) are reported through
//! [`tracing::warn`] and accepted.

use ndarray::{ArrayView1, ArrayView2};
use tracing::warn;

use crate::config::McfConfig;
use crate::error::{McfError, Result};
use crate::graph::GraphInstance;
use crate::matrix::{EdgeMatrix, Representation};

/// Relative imbalance above which a demand vector triggers a warning.
pub const DEMAND_BALANCE_TOLERANCE: f32 = 1e-3;

/// Check that the backing type matches the configured mode.
pub fn validate_representation<M: EdgeMatrix>(config: &McfConfig) -> Result<()> {
    let expected = if config.sparse {
        Representation::Sparse
    } else {
        Representation::Dense
    };
    if M::REPRESENTATION != expected {
        return Err(McfError::RepresentationMismatch {
            expected,
            actual: M::REPRESENTATION,
        });
    }
    Ok(())
}

/// Validate a demand vector against the node count.
///
/// Errors on a length mismatch or a non-finite entry. Warns (but accepts)
/// when the demands do not sum to approximately zero or are all zero.
pub fn validate_demands(demands: ArrayView1<'_, f32>, num_nodes: usize) -> Result<()> {
    if demands.len() != num_nodes {
        return Err(McfError::dimension_mismatch("demands", num_nodes, demands.len()));
    }
    if let Some((i, d)) = demands.iter().enumerate().find(|(_, d)| !d.is_finite()) {
        return Err(McfError::NonFiniteValue(format!("demand[{i}] = {d}")));
    }

    let total: f32 = demands.sum();
    let scale: f32 = demands.iter().map(|d| d.abs()).sum();
    if scale == 0.0 {
        warn!(num_nodes, "all demands are zero; the flow will be zero");
    } else if total.abs() > DEMAND_BALANCE_TOLERANCE * scale.max(1.0) {
        warn!(total, scale, "demands do not balance; conservation cannot hold");
    }
    Ok(())
}

/// Validate a dense node matrix: row count, column count, finiteness.
pub fn validate_node_matrix(
    what: &str,
    matrix: ArrayView2<'_, f32>,
    num_nodes: usize,
    width: usize,
) -> Result<()> {
    if matrix.nrows() != num_nodes {
        return Err(McfError::dimension_mismatch(
            format!("{what} rows"),
            num_nodes,
            matrix.nrows(),
        ));
    }
    if matrix.ncols() != width {
        return Err(McfError::dimension_mismatch(
            format!("{what} columns"),
            width,
            matrix.ncols(),
        ));
    }
    if let Some(((r, c), x)) = matrix.indexed_iter().find(|(_, x)| !x.is_finite()) {
        return Err(McfError::NonFiniteValue(format!("{what}[{r}, {c}] = {x}")));
    }
    Ok(())
}

/// Capacities must share the adjacency pattern and be positive and finite.
pub fn validate_capacities<M: EdgeMatrix>(capacities: &M, adjacency: &M) -> Result<()> {
    if !capacities.same_pattern(adjacency) {
        return Err(McfError::dimension_mismatch(
            "capacity edges",
            adjacency.num_edges(),
            capacities.num_edges(),
        ));
    }
    let mut bad = None;
    capacities.for_each_edge(|u, v, c| {
        if bad.is_none() && !(c.is_finite() && c > 0.0) {
            bad = Some((u, v, c));
        }
    });
    if let Some((u, v, c)) = bad {
        return Err(McfError::invalid_input(format!(
            "capacity of edge ({u}, {v}) must be positive, got {c}"
        )));
    }
    Ok(())
}

/// Validate a full instance against the configuration.
///
/// Performs the following checks in order:
///
/// 1. Matrix backing matches `config.sparse`.
/// 2. Demand length and finiteness.
/// 3. Neighborhood count equals `num_neighborhoods + 1` and node counts
///    agree.
/// 4. Embedding and node-feature shapes.
/// 5. Capacities are present and well formed when `use_capacities` is set.
pub fn validate_instance<M: EdgeMatrix>(
    config: &McfConfig,
    instance: &GraphInstance<M>,
) -> Result<()> {
    validate_representation::<M>(config)?;

    let n = instance.adjacency.num_nodes();
    validate_demands(instance.demands.view(), n)?;

    if instance.neighborhoods.len() != config.num_hops() {
        return Err(McfError::dimension_mismatch(
            "neighborhood hops",
            config.num_hops(),
            instance.neighborhoods.len(),
        ));
    }
    if instance.neighborhoods.num_nodes() != n {
        return Err(McfError::dimension_mismatch(
            "neighborhood nodes",
            n,
            instance.neighborhoods.num_nodes(),
        ));
    }

    validate_node_matrix("embeddings", instance.embeddings.view(), n, config.embedding_size)?;
    validate_node_matrix(
        "node features",
        instance.node_features.view(),
        n,
        config.num_node_features,
    )?;

    if config.use_capacities {
        let capacities = instance.capacities.as_ref().ok_or_else(|| {
            McfError::config("use_capacities is set but the instance has no capacities")
        })?;
        validate_capacities(capacities, &instance.adjacency)?;
    }
    Ok(())
}
