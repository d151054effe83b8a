//! The flow model: neighborhood message passing feeding the primal and dual
//! solvers.
//!
//! One forward evaluation runs
//!
//! 1. encoder(concat(embeddings, node_features))
//! 2. `graph_layers` rounds of neighborhood attention + GRU update
//! 3. flow decoder -> node scores -> row-stochastic flow weights
//! 4. primal redistribution, optional reciprocal-flow cancellation, optional
//!    capacity clipping, flow cost
//! 5. dual decoder -> initial potentials -> momentum dual ascent -> dual cost
//!
//! Every step is a pure function of the instance and the model's parameters.

use ndarray::{concatenate, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, instrument};

use crate::config::McfConfig;
use crate::correction::CycleCorrector;
use crate::dual::DualAscentSolver;
use crate::error::{McfError, Result};
use crate::graph::GraphInstance;
use crate::layer::{GruCell, Mlp, NeighborhoodAttention};
use crate::matrix::EdgeMatrix;
use crate::normalize::FlowWeightNormalizer;
use crate::primal::{clip_to_capacity, PrimalFlowSolver};
use crate::validation::validate_instance;

/// Everything one forward evaluation produces.
#[derive(Debug, Clone)]
pub struct FlowOutput<M> {
    /// Final flow after correction and clipping.
    pub flow: M,
    /// Row-stochastic outgoing proportions.
    pub flow_weights: M,
    pub flow_cost: f32,
    /// Lagrangian lower bound at the final potentials.
    pub dual_cost: f32,
    pub dual_flow: M,
    pub potentials: Array1<f32>,
    /// Node encoding after the last message-passing round, `V x D`.
    pub node_encoding: Array2<f32>,
    /// Hop attention coefficients of the last round, `V x (k + 1)`.
    pub attention: Array2<f32>,
    /// Flow decoder output, one score per node.
    pub node_scores: Array1<f32>,
    /// `max_v |outflow - inflow - demand|` of the primal flow before
    /// clipping.
    pub conservation_residual: f32,
}

impl<M> FlowOutput<M> {
    /// `flow_cost - dual_cost`, the per-instance training loss.
    pub fn duality_gap(&self) -> f32 {
        self.flow_cost - self.dual_cost
    }
}

/// Per-instance outputs of a batch plus the mean loss.
#[derive(Debug, Clone)]
pub struct BatchOutput<M> {
    pub outputs: Vec<FlowOutput<M>>,
    /// Mean of `flow_cost - dual_cost` over the batch.
    pub loss: f32,
}

/// Owns every learned module and solver of the flow model.
#[derive(Debug, Clone)]
pub struct FlowCore {
    config: McfConfig,
    encoder: Mlp,
    attention: NeighborhoodAttention,
    gru: GruCell,
    flow_decoder: Mlp,
    dual_decoder: Mlp,
    normalizer: FlowWeightNormalizer,
    primal: PrimalFlowSolver,
    corrector: CycleCorrector,
    dual: DualAscentSolver,
}

impl FlowCore {
    /// Validate `config` and initialise all parameters from `config.seed`.
    pub fn new(config: McfConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let d = config.node_encoding;

        let encoder = Mlp::new(
            config.embedding_size + config.num_node_features,
            &config.encoder_hidden,
            d,
            true,
            &mut rng,
        );
        let attention =
            NeighborhoodAttention::new(d, config.num_heads, config.head_combine, &mut rng);
        let gru = GruCell::new(d, d, &mut rng);
        let flow_decoder = Mlp::new(d, &config.decoder_hidden, 1, false, &mut rng);
        let dual_decoder = Mlp::new(d, &config.decoder_hidden, 1, false, &mut rng);

        let normalizer = FlowWeightNormalizer::from_config(&config);
        let primal = PrimalFlowSolver::new(config.flow_iters);
        let dual = DualAscentSolver::new(
            config.cost_fn,
            config.dual_iters,
            config.dual_step_size,
            config.dual_momentum,
        );

        info!(
            sparse = config.sparse,
            node_encoding = d,
            graph_layers = config.graph_layers,
            hops = config.num_hops(),
            cost = %config.cost_fn.kind,
            "flow model initialised"
        );

        Ok(Self {
            config,
            encoder,
            attention,
            gru,
            flow_decoder,
            dual_decoder,
            normalizer,
            primal,
            corrector: CycleCorrector::new(),
            dual,
        })
    }

    pub fn config(&self) -> &McfConfig {
        &self.config
    }

    /// Node encodings after message passing, plus the last round's hop
    /// attention.
    pub fn encode<M: EdgeMatrix>(
        &self,
        instance: &GraphInstance<M>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        let inputs = concatenate(
            Axis(1),
            &[instance.embeddings.view(), instance.node_features.view()],
        )
        .map_err(|e| McfError::invalid_input(format!("cannot join node inputs: {e}")))?;

        let mut encoding = self.encoder.forward(inputs.view());
        let mut attention = Array2::zeros((instance.num_nodes(), instance.neighborhoods.len()));
        for round in 0..self.config.graph_layers {
            let (message, coefficients) =
                self.attention.forward(encoding.view(), &instance.neighborhoods);
            encoding = self.gru.forward(message.view(), encoding.view());
            attention = coefficients;
            debug!(round, "message passing round");
        }
        Ok((encoding, attention))
    }

    /// Evaluate one instance.
    ///
    /// # Errors
    ///
    /// Fails before any computation on a representation mismatch, a shape
    /// mismatch, a wrong neighborhood count, or missing capacities.
    #[instrument(
        skip_all,
        fields(n = instance.num_nodes(), edges = instance.adjacency.num_edges())
    )]
    pub fn forward<M: EdgeMatrix>(&self, instance: &GraphInstance<M>) -> Result<FlowOutput<M>> {
        validate_instance(&self.config, instance)?;
        let demands = instance.demands.view();

        let (node_encoding, attention) = self.encode(instance)?;

        let node_scores = self.flow_decoder.forward(node_encoding.view()).column(0).to_owned();
        let flow_weights = self.normalizer.weights(&instance.adjacency, node_scores.view())?;

        let solution = self.primal.solve(&flow_weights, demands)?;
        let mut flow = solution.flow;
        if self.config.should_correct_flows {
            flow = self.corrector.correct(&flow)?;
        }

        let cost = self.dual.cost();
        let flow_cost = match (&instance.capacities, self.config.use_capacities) {
            (Some(capacities), true) => {
                flow = clip_to_capacity(&flow, capacities)?;
                cost.total_with_capacities(&flow, capacities)?
            }
            _ => cost.total(&flow),
        };

        let initial = self.dual_decoder.forward(node_encoding.view()).column(0).to_owned();
        let dual = self.dual.solve(&instance.adjacency, demands, initial.view())?;

        info!(
            flow_cost,
            dual_cost = dual.dual_cost,
            gap = flow_cost - dual.dual_cost,
            residual = solution.conservation_residual,
            "forward pass complete"
        );

        Ok(FlowOutput {
            flow,
            flow_weights,
            flow_cost,
            dual_cost: dual.dual_cost,
            dual_flow: dual.dual_flow,
            potentials: dual.potentials,
            node_encoding,
            attention,
            node_scores,
            conservation_residual: solution.conservation_residual,
        })
    }

    /// Evaluate independent instances and average their duality gaps.
    ///
    /// # Errors
    ///
    /// An empty batch is invalid input. In sparse mode any batch other than
    /// a single instance is rejected with [`McfError::BatchNotSupported`].
    pub fn forward_batch<M: EdgeMatrix>(
        &self,
        instances: &[GraphInstance<M>],
    ) -> Result<BatchOutput<M>> {
        if self.config.sparse && instances.len() != 1 {
            return Err(McfError::BatchNotSupported {
                batch_size: instances.len(),
            });
        }
        if instances.is_empty() {
            return Err(McfError::invalid_input("empty batch"));
        }

        let outputs = instances
            .iter()
            .map(|instance| self.forward(instance))
            .collect::<Result<Vec<_>>>()?;
        let loss = outputs.iter().map(FlowOutput::duality_gap).sum::<f32>() / outputs.len() as f32;
        Ok(BatchOutput { outputs, loss })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowGraph;
    use crate::matrix::{DenseMatrix, SparseMatrix};
    use ndarray::array;

    fn small_config(sparse: bool) -> McfConfig {
        McfConfig {
            sparse,
            node_encoding: 8,
            num_heads: 2,
            encoder_hidden: vec![8],
            decoder_hidden: vec![8],
            embedding_size: 3,
            graph_layers: 2,
            flow_iters: 6,
            dual_iters: 5,
            ..McfConfig::default()
        }
    }

    fn instance<M: EdgeMatrix>() -> GraphInstance<M> {
        let graph = FlowGraph::from_pairs(4, [(0, 1), (1, 2), (2, 3), (3, 0), (1, 0)]).unwrap();
        let embeddings = Array2::from_shape_fn((4, 3), |(i, j)| (i as f32 - j as f32) * 0.2);
        let demands = array![1.0f32, 0.0, 0.5, -1.5];
        GraphInstance::from_graph(&graph, demands, embeddings, 2, true).unwrap()
    }

    #[test]
    fn forward_produces_consistent_shapes() {
        let model = FlowCore::new(small_config(true)).unwrap();
        let out = model.forward(&instance::<SparseMatrix>()).unwrap();
        assert_eq!(out.node_encoding.dim(), (4, 8));
        assert_eq!(out.attention.dim(), (4, 3));
        assert_eq!(out.node_scores.len(), 4);
        assert_eq!(out.potentials.len(), 4);
        assert!(out.flow.same_pattern(&out.flow_weights));
        assert!(out.flow_cost.is_finite() && out.dual_cost.is_finite());
    }

    #[test]
    fn wrong_representation_fails_fast() {
        let model = FlowCore::new(small_config(false)).unwrap();
        let err = model.forward(&instance::<SparseMatrix>()).unwrap_err();
        assert!(matches!(err, McfError::RepresentationMismatch { .. }));
    }

    #[test]
    fn sparse_batches_hold_one_instance() {
        let model = FlowCore::new(small_config(true)).unwrap();
        let batch = vec![instance::<SparseMatrix>(), instance::<SparseMatrix>()];
        let err = model.forward_batch(&batch).unwrap_err();
        assert!(matches!(err, McfError::BatchNotSupported { batch_size: 2 }));
        assert!(model.forward_batch(&batch[..1]).is_ok());
    }

    #[test]
    fn dense_batch_loss_is_mean_gap() {
        let model = FlowCore::new(small_config(false)).unwrap();
        let batch = vec![instance::<DenseMatrix>(), instance::<DenseMatrix>()];
        let out = model.forward_batch(&batch).unwrap();
        assert_eq!(out.outputs.len(), 2);
        assert!((out.loss - out.outputs[0].duality_gap()).abs() < 1e-5);
        assert!(model.forward_batch::<DenseMatrix>(&[]).is_err());
    }

    #[test]
    fn invalid_config_is_rejected_before_building() {
        let mut config = small_config(true);
        config.num_heads = 3;
        assert!(matches!(FlowCore::new(config), Err(McfError::Config(_))));
    }
}
