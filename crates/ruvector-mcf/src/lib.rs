//! Neural minimum-cost-flow approximation for the ruvector ecosystem.
//!
//! A graph neural network encodes every node from its k-hop random-walk
//! neighborhoods, decodes outgoing flow proportions and node potentials, and
//! hands them to two bounded-iteration solvers:
//!
//! - a primal solver that pushes each node's excess along its proportions
//!   for a fixed number of rounds, producing a flow and its cost;
//! - a momentum dual ascent on node potentials, producing a Lagrangian lower
//!   bound on the optimal cost.
//!
//! `flow_cost - dual_cost` is a non-negative duality-gap proxy that a
//! training loop can minimise.
//!
//! # Representations
//!
//! | Mode | Edge matrix | Batching |
//! |------|-------------|----------|
//! | `sparse = false` | [`DenseMatrix`] (`V x V` + mask) | any number of instances |
//! | `sparse = true` | [`SparseMatrix`] (CSR) | one instance per call |
//!
//! Both run the same generic solver code through [`EdgeMatrix`], so they agree
//! up to floating-point summation order.
//!
//! # Example
//!
//! ```rust
//! use ndarray::{array, Array2};
//! use ruvector_mcf::{FlowCore, FlowGraph, GraphInstance, McfConfig, SparseMatrix};
//!
//! let config = McfConfig::from_json(r#"{
//!     "sparse": true,
//!     "flow_iters": 8,
//!     "dual_iters": 5,
//!     "node_encoding": 8,
//!     "num_heads": 2,
//!     "embedding_size": 2,
//!     "cost_fn": { "name": "quadratic", "constant": 1.0 }
//! }"#).unwrap();
//!
//! let graph = FlowGraph::from_pairs(4, [(0, 1), (1, 2), (2, 3), (3, 0)]).unwrap();
//! let instance = GraphInstance::<SparseMatrix>::from_graph(
//!     &graph,
//!     array![1.0, 0.0, 0.0, -1.0],
//!     Array2::zeros((4, 2)),
//!     config.num_neighborhoods,
//!     config.unique_neighborhoods,
//! ).unwrap();
//!
//! let model = FlowCore::new(config).unwrap();
//! let out = model.forward(&instance).unwrap();
//! assert!(out.dual_cost <= out.flow_cost + 1e-4);
//! ```

pub mod config;
pub mod correction;
pub mod cost;
pub mod dual;
pub mod error;
pub mod graph;
pub mod layer;
pub mod matrix;
pub mod model;
pub mod neighborhood;
pub mod normalize;
pub mod primal;
pub mod validation;

pub use config::{default_hop_count, HeadCombine, McfConfig, ScorePairing};
pub use correction::CycleCorrector;
pub use cost::{CostFunction, CostKind};
pub use dual::{DualAscentSolver, DualSolution};
pub use error::{McfError, Result};
pub use graph::{
    demands_from_node_features, node_features_from_demands, EdgeAttributes, FlowGraph,
    GraphInstance,
};
pub use matrix::{CsrMatrix, DenseMatrix, EdgeMatrix, Representation, SparseMatrix};
pub use model::{BatchOutput, FlowCore, FlowOutput};
pub use neighborhood::{NeighborhoodBuilder, NeighborhoodCache, NeighborhoodSet};
pub use normalize::{FlowWeightNormalizer, Normalization};
pub use primal::{FlowSolution, PrimalFlowSolver};
