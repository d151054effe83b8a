//! Graph and per-instance input types.

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{McfError, Result};
use crate::matrix::EdgeMatrix;
use crate::neighborhood::{NeighborhoodBuilder, NeighborhoodSet};

/// Attributes carried by one directed road-network link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttributes {
    /// Tail node.
    pub src: usize,
    /// Head node.
    pub dst: usize,
    /// Link capacity, strictly positive.
    pub capacity: f32,
    /// Link length.
    #[serde(default)]
    pub length: f32,
    /// Free-flow travel time.
    #[serde(default)]
    pub free_flow_time: f32,
    /// BPR `b` coefficient.
    #[serde(default)]
    pub b: f32,
    /// BPR power.
    #[serde(default)]
    pub power: f32,
    #[serde(default)]
    pub speed_limit: f32,
    #[serde(default)]
    pub toll: f32,
    #[serde(default)]
    pub link_type: u32,
}

impl EdgeAttributes {
    /// Link with unit capacity and zeroed travel attributes.
    pub fn new(src: usize, dst: usize) -> Self {
        Self::with_capacity(src, dst, 1.0)
    }

    /// Link with the given capacity and zeroed travel attributes.
    pub fn with_capacity(src: usize, dst: usize, capacity: f32) -> Self {
        Self {
            src,
            dst,
            capacity,
            length: 0.0,
            free_flow_time: 0.0,
            b: 0.0,
            power: 0.0,
            speed_limit: 0.0,
            toll: 0.0,
            link_type: 0,
        }
    }
}

/// Directed graph with nodes numbered `0..num_nodes`.
///
/// Strong connectivity is assumed, not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    num_nodes: usize,
    edges: Vec<EdgeAttributes>,
}

impl FlowGraph {
    /// Build a graph, rejecting out-of-range endpoints, self-loops,
    /// duplicate links and non-positive capacities.
    pub fn new(num_nodes: usize, edges: Vec<EdgeAttributes>) -> Result<Self> {
        let mut seen = std::collections::HashSet::with_capacity(edges.len());
        for e in &edges {
            if e.src >= num_nodes || e.dst >= num_nodes {
                return Err(McfError::invalid_input(format!(
                    "edge ({}, {}) out of bounds for {num_nodes} nodes",
                    e.src, e.dst
                )));
            }
            if e.src == e.dst {
                return Err(McfError::invalid_input(format!("self-loop at node {}", e.src)));
            }
            if !seen.insert((e.src, e.dst)) {
                return Err(McfError::invalid_input(format!(
                    "duplicate edge ({}, {})",
                    e.src, e.dst
                )));
            }
            if !(e.capacity.is_finite() && e.capacity > 0.0) {
                return Err(McfError::invalid_input(format!(
                    "edge ({}, {}) has capacity {}",
                    e.src, e.dst, e.capacity
                )));
            }
        }
        Ok(Self { num_nodes, edges })
    }

    /// Graph from bare `(src, dst)` pairs with unit capacities.
    pub fn from_pairs(
        num_nodes: usize,
        pairs: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self> {
        Self::new(
            num_nodes,
            pairs.into_iter().map(|(u, v)| EdgeAttributes::new(u, v)).collect(),
        )
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[EdgeAttributes] {
        &self.edges
    }

    /// Adjacency with value 1 on every edge.
    pub fn adjacency<M: EdgeMatrix>(&self) -> Result<M> {
        M::from_edges(self.num_nodes, self.edges.iter().map(|e| (e.src, e.dst, 1.0)))
    }

    /// Capacities on the adjacency pattern.
    pub fn capacities<M: EdgeMatrix>(&self) -> Result<M> {
        M::from_edges(
            self.num_nodes,
            self.edges.iter().map(|e| (e.src, e.dst, e.capacity)),
        )
    }
}

/// Signed demand from two-column node features `[supply, consumption]`.
pub fn demands_from_node_features(features: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
    if features.ncols() != 2 {
        return Err(McfError::dimension_mismatch(
            "node feature columns",
            2,
            features.ncols(),
        ));
    }
    Ok(&features.column(0) - &features.column(1))
}

/// Inverse of [`demands_from_node_features`]: supplies go to column 0,
/// consumptions (as positive numbers) to column 1.
pub fn node_features_from_demands(demands: &Array1<f32>) -> Array2<f32> {
    let mut out = Array2::zeros((demands.len(), 2));
    for (i, &d) in demands.iter().enumerate() {
        if d >= 0.0 {
            out[[i, 0]] = d;
        } else {
            out[[i, 1]] = -d;
        }
    }
    out
}

/// Everything a forward pass needs for one graph.
#[derive(Debug, Clone)]
pub struct GraphInstance<M: EdgeMatrix> {
    /// Allowed edges, value 1 on the pattern.
    pub adjacency: M,
    /// Per-node demand, positive for supply.
    pub demands: Array1<f32>,
    /// Hops `0..=k`.
    pub neighborhoods: NeighborhoodSet<M>,
    /// Precomputed node embeddings, `V x embedding_size`.
    pub embeddings: Array2<f32>,
    /// Raw node features, `V x num_node_features`.
    pub node_features: Array2<f32>,
    /// Required when capacities are enabled; must share the adjacency
    /// pattern.
    pub capacities: Option<M>,
}

impl<M: EdgeMatrix> GraphInstance<M> {
    /// Assemble an instance from a graph, building its neighborhoods and
    /// deriving node features from the demands.
    pub fn from_graph(
        graph: &FlowGraph,
        demands: Array1<f32>,
        embeddings: Array2<f32>,
        hops: usize,
        unique: bool,
    ) -> Result<Self> {
        let adjacency: M = graph.adjacency()?;
        let neighborhoods = NeighborhoodBuilder::new(hops, unique).build(&adjacency)?;
        let node_features = node_features_from_demands(&demands);
        Ok(Self {
            adjacency,
            demands,
            neighborhoods,
            embeddings,
            node_features,
            capacities: Some(graph.capacities()?),
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.num_nodes()
    }
}
