//! Configuration for the flow model.
//!
//! The JSON form requires `sparse`, `flow_iters`, `dual_iters` and `cost_fn`;
//! every other option has a default. Unknown keys are rejected so that a typo
//! fails loudly instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

use crate::cost::CostFunction;
use crate::error::{McfError, Result};

/// How per-head attention outputs are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadCombine {
    /// Concatenate heads (each of width `node_encoding / num_heads`) and
    /// project back to `node_encoding`.
    Concat,
    /// Average full-width heads.
    Average,
}

/// How two endpoint scores are paired into an edge score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePairing {
    /// `s_u * s_v`
    Product,
    /// `s_u + s_v`
    Sum,
}

impl ScorePairing {
    /// Combine the scores of an edge's endpoints.
    #[inline]
    pub fn pair(self, src: f32, dst: f32) -> f32 {
        match self {
            ScorePairing::Product => src * dst,
            ScorePairing::Sum => src + dst,
        }
    }
}

/// Top-level configuration for [`FlowCore`](crate::FlowCore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McfConfig {
    /// Edge-list representation when `true`, dense `V x V` otherwise.
    pub sparse: bool,
    /// Number of attention + GRU message-passing rounds.
    #[serde(default = "defaults::graph_layers")]
    pub graph_layers: usize,
    /// Attention heads per hop.
    #[serde(default = "defaults::num_heads")]
    pub num_heads: usize,
    /// Head merge policy.
    #[serde(default = "defaults::head_combine")]
    pub head_combine: HeadCombine,
    /// Width of the node encoding.
    #[serde(default = "defaults::node_encoding")]
    pub node_encoding: usize,
    /// Hidden layer widths of the node encoder.
    #[serde(default = "defaults::hidden")]
    pub encoder_hidden: Vec<usize>,
    /// Hidden layer widths of both decoders.
    #[serde(default = "defaults::hidden")]
    pub decoder_hidden: Vec<usize>,
    /// Width of the precomputed node embeddings.
    #[serde(default = "defaults::embedding_size")]
    pub embedding_size: usize,
    /// Width of the raw node features.
    #[serde(default = "defaults::num_node_features")]
    pub num_node_features: usize,
    /// Hop count `k`; neighborhood sets hold `k + 1` entries.
    #[serde(default = "defaults::num_neighborhoods")]
    pub num_neighborhoods: usize,
    /// Remove nodes already present at shorter hops.
    #[serde(default = "defaults::unique_neighborhoods")]
    pub unique_neighborhoods: bool,
    /// Primal redistribution rounds.
    pub flow_iters: usize,
    /// Dual ascent rounds.
    pub dual_iters: usize,
    /// Dual ascent step size.
    #[serde(default = "defaults::dual_step_size")]
    pub dual_step_size: f32,
    /// Dual ascent momentum, in `[0, 1)`.
    #[serde(default = "defaults::dual_momentum")]
    pub dual_momentum: f32,
    /// Sparsemax instead of softmax for flow weights.
    #[serde(default)]
    pub use_sparsemax: bool,
    /// Sparsemax outputs below this are set to exactly zero.
    #[serde(default = "defaults::sparsemax_epsilon")]
    pub sparsemax_epsilon: f32,
    /// Edge score pairing.
    #[serde(default = "defaults::score_pairing")]
    pub score_pairing: ScorePairing,
    /// Clip flows to edge capacities and use the congestion-aware cost.
    #[serde(default)]
    pub use_capacities: bool,
    /// Remove reciprocal flow between mutual edges.
    #[serde(default)]
    pub should_correct_flows: bool,
    /// Edge cost function.
    pub cost_fn: CostFunction,
    /// Seed for parameter initialisation.
    #[serde(default = "defaults::seed")]
    pub seed: u64,
}

mod defaults {
    use super::{HeadCombine, ScorePairing};

    pub fn graph_layers() -> usize {
        3
    }
    pub fn num_heads() -> usize {
        4
    }
    pub fn head_combine() -> HeadCombine {
        HeadCombine::Concat
    }
    pub fn node_encoding() -> usize {
        32
    }
    pub fn hidden() -> Vec<usize> {
        vec![32]
    }
    pub fn embedding_size() -> usize {
        8
    }
    pub fn num_node_features() -> usize {
        2
    }
    pub fn num_neighborhoods() -> usize {
        2
    }
    pub fn unique_neighborhoods() -> bool {
        true
    }
    pub fn dual_step_size() -> f32 {
        0.01
    }
    pub fn dual_momentum() -> f32 {
        0.9
    }
    pub fn sparsemax_epsilon() -> f32 {
        1e-5
    }
    pub fn score_pairing() -> ScorePairing {
        ScorePairing::Product
    }
    pub fn seed() -> u64 {
        42
    }
}

impl Default for McfConfig {
    fn default() -> Self {
        Self {
            sparse: false,
            graph_layers: defaults::graph_layers(),
            num_heads: defaults::num_heads(),
            head_combine: defaults::head_combine(),
            node_encoding: defaults::node_encoding(),
            encoder_hidden: defaults::hidden(),
            decoder_hidden: defaults::hidden(),
            embedding_size: defaults::embedding_size(),
            num_node_features: defaults::num_node_features(),
            num_neighborhoods: defaults::num_neighborhoods(),
            unique_neighborhoods: defaults::unique_neighborhoods(),
            flow_iters: 20,
            dual_iters: 10,
            dual_step_size: defaults::dual_step_size(),
            dual_momentum: defaults::dual_momentum(),
            use_sparsemax: false,
            sparsemax_epsilon: defaults::sparsemax_epsilon(),
            score_pairing: defaults::score_pairing(),
            use_capacities: false,
            should_correct_flows: false,
            cost_fn: CostFunction::default(),
            seed: defaults::seed(),
        }
    }
}

impl McfConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// [`McfError::Json`] for malformed JSON, unknown keys or a missing
    /// required option; [`McfError::Config`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialise to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of entries every neighborhood set must contain.
    pub fn num_hops(&self) -> usize {
        self.num_neighborhoods + 1
    }

    /// Range and consistency checks, run before any model is built.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("graph_layers", self.graph_layers),
            ("num_heads", self.num_heads),
            ("node_encoding", self.node_encoding),
            ("embedding_size + num_node_features", self.embedding_size + self.num_node_features),
            ("flow_iters", self.flow_iters),
            ("dual_iters", self.dual_iters),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(McfError::config(format!("{name} must be positive")));
            }
        }
        if let Some(&zero) = self
            .encoder_hidden
            .iter()
            .chain(self.decoder_hidden.iter())
            .find(|&&w| w == 0)
        {
            return Err(McfError::config(format!("hidden layer width {zero} must be positive")));
        }
        if self.head_combine == HeadCombine::Concat && self.node_encoding % self.num_heads != 0 {
            return Err(McfError::config(format!(
                "node_encoding {} must be divisible by num_heads {} when heads are concatenated",
                self.node_encoding, self.num_heads
            )));
        }
        if !(self.dual_step_size.is_finite() && self.dual_step_size > 0.0) {
            return Err(McfError::config(format!(
                "dual_step_size must be positive, got {}",
                self.dual_step_size
            )));
        }
        if !(0.0..1.0).contains(&self.dual_momentum) {
            return Err(McfError::config(format!(
                "dual_momentum must lie in [0, 1), got {}",
                self.dual_momentum
            )));
        }
        if !(self.sparsemax_epsilon > 0.0 && self.sparsemax_epsilon < 1.0) {
            return Err(McfError::config(format!(
                "sparsemax_epsilon must lie in (0, 1), got {}",
                self.sparsemax_epsilon
            )));
        }
        self.cost_fn.validate()
    }
}

/// Default hop count for a graph with `num_nodes` nodes:
/// `max(2, floor(ln V))`.
pub fn default_hop_count(num_nodes: usize) -> usize {
    if num_nodes < 2 {
        return 2;
    }
    ((num_nodes as f64).ln().floor() as usize).max(2)
}
