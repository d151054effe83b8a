//! Learned layers for the node encoder, neighborhood attention and decoders.
//!
//! All layers operate on node-row batches: an input of shape `V x D` is
//! transformed row by row in a single ndarray product. Parameters are owned
//! by the layer instance and drawn from a caller-provided RNG, so a model
//! built from a fixed seed is reproducible.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::config::HeadCombine;
use crate::matrix::EdgeMatrix;
use crate::neighborhood::NeighborhoodSet;
use crate::normalize::softmax_in_place;

/// Sigmoid activation with numerical stability
#[inline]
fn sigmoid(x: f32) -> f32 {
    if x > 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let ex = x.exp();
        ex / (1.0 + ex)
    }
}

/// Linear transformation layer (weight matrix multiplication)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    /// Create a new linear layer with Xavier/Glorot initialization
    pub fn new<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        // Xavier initialization: scale = sqrt(2.0 / (input_dim + output_dim))
        let scale = (2.0 / (input_dim + output_dim).max(1) as f32).sqrt();
        let weights = Array2::from_shape_fn((output_dim, input_dim), |_| {
            let z: f32 = rng.sample(StandardNormal);
            z * scale
        });
        let bias = Array1::zeros(output_dim);
        Self { weights, bias }
    }

    /// Forward pass over node rows: `Y = X W^T + b`
    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        input.dot(&self.weights.t()) + &self.bias
    }

    /// Get output dimension
    pub fn output_dim(&self) -> usize {
        self.weights.nrows()
    }
}

/// Stack of linear layers with `tanh` between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<Linear>,
    activate_final: bool,
}

impl Mlp {
    /// `input_dim -> hidden... -> output_dim`. `tanh` follows every hidden
    /// layer, and the output layer too when `activate_final` is set.
    pub fn new<R: Rng>(
        input_dim: usize,
        hidden: &[usize],
        output_dim: usize,
        activate_final: bool,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut width = input_dim;
        for &h in hidden.iter().chain(std::iter::once(&output_dim)) {
            layers.push(Linear::new(width, h, rng));
            width = h;
        }
        Self {
            layers,
            activate_final,
        }
    }

    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x.view());
            if i < last || self.activate_final {
                x.mapv_inplace(f32::tanh);
            }
        }
        x
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, Linear::output_dim)
    }
}

/// Multi-head attention over random-walk neighborhoods.
///
/// For each hop, every node attends to the nodes in that hop's pattern with
/// scaled dot-product scores, normalised over the real neighbors only. Head
/// outputs are concatenated and projected, or averaged. Hop messages are then
/// mixed by a learned per-node softmax over hops, and the result goes through
/// `tanh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodAttention {
    num_heads: usize,
    head_dim: usize,
    combine: HeadCombine,
    q_linear: Linear,
    k_linear: Linear,
    v_linear: Linear,
    out_linear: Option<Linear>,
    hop_score: Linear,
}

impl NeighborhoodAttention {
    /// `embed_dim` must be divisible by `num_heads` under
    /// [`HeadCombine::Concat`]; config validation guarantees it.
    pub fn new<R: Rng>(
        embed_dim: usize,
        num_heads: usize,
        combine: HeadCombine,
        rng: &mut R,
    ) -> Self {
        let head_dim = match combine {
            HeadCombine::Concat => embed_dim / num_heads,
            HeadCombine::Average => embed_dim,
        };
        let proj = num_heads * head_dim;
        Self {
            num_heads,
            head_dim,
            combine,
            q_linear: Linear::new(embed_dim, proj, rng),
            k_linear: Linear::new(embed_dim, proj, rng),
            v_linear: Linear::new(embed_dim, proj, rng),
            out_linear: match combine {
                HeadCombine::Concat => Some(Linear::new(proj, embed_dim, rng)),
                HeadCombine::Average => None,
            },
            hop_score: Linear::new(embed_dim, 1, rng),
        }
    }

    /// Aggregate messages for every node.
    ///
    /// Returns the `V x D` message and the `V x (k + 1)` hop attention
    /// coefficients.
    pub fn forward<M: EdgeMatrix>(
        &self,
        encoding: ArrayView2<'_, f32>,
        neighborhoods: &NeighborhoodSet<M>,
    ) -> (Array2<f32>, Array2<f32>) {
        let n = encoding.nrows();
        let q = self.q_linear.forward(encoding);
        let k = self.k_linear.forward(encoding);
        let v = self.v_linear.forward(encoding);

        let hop_messages: Vec<Array2<f32>> = neighborhoods
            .iter()
            .map(|mask| self.hop_message(mask, &q, &k, &v))
            .collect();

        // Per-node softmax over hops.
        let mut coefficients = Array2::zeros((n, hop_messages.len()));
        for (h, msg) in hop_messages.iter().enumerate() {
            let logits = self.hop_score.forward(msg.view());
            coefficients.column_mut(h).assign(&logits.column(0));
        }
        for mut row in coefficients.rows_mut() {
            if let Some(slice) = row.as_slice_mut() {
                softmax_in_place(slice);
            }
        }

        let mut message = Array2::zeros(encoding.raw_dim());
        for (h, msg) in hop_messages.iter().enumerate() {
            let weight = coefficients.column(h).insert_axis(Axis(1));
            message += &(msg * &weight);
        }
        message.mapv_inplace(f32::tanh);
        (message, coefficients)
    }

    /// Attention-weighted aggregation restricted to one hop's pattern.
    fn hop_message<M: EdgeMatrix>(
        &self,
        mask: &M,
        q: &Array2<f32>,
        k: &Array2<f32>,
        v: &Array2<f32>,
    ) -> Array2<f32> {
        let scale = (self.head_dim as f32).sqrt();
        let mut heads = Array2::zeros((q.nrows(), self.num_heads * self.head_dim));
        for h in 0..self.num_heads {
            let (lo, hi) = (h * self.head_dim, (h + 1) * self.head_dim);
            let q_h = q.slice(s![.., lo..hi]);
            let k_h = k.slice(s![.., lo..hi]);
            let scores = mask.with_values(|a, b, _| q_h.row(a).dot(&k_h.row(b)) / scale);
            let weights = scores.map_rows(|_, _, row| softmax_in_place(row));
            heads
                .slice_mut(s![.., lo..hi])
                .assign(&weights.spmm(v.slice(s![.., lo..hi])));
        }

        match (self.combine, &self.out_linear) {
            (HeadCombine::Concat, Some(out)) => out.forward(heads.view()),
            _ => {
                let mut sum = Array2::zeros((q.nrows(), self.head_dim));
                for head in heads.axis_chunks_iter(Axis(1), self.head_dim) {
                    sum += &head;
                }
                sum / self.num_heads as f32
            }
        }
    }
}

/// Gated Recurrent Unit (GRU) cell for state updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruCell {
    // Update gate
    w_z: Linear,
    u_z: Linear,

    // Reset gate
    w_r: Linear,
    u_r: Linear,

    // Candidate hidden state
    w_h: Linear,
    u_h: Linear,
}

impl GruCell {
    pub fn new<R: Rng>(input_dim: usize, hidden_dim: usize, rng: &mut R) -> Self {
        Self {
            w_z: Linear::new(input_dim, hidden_dim, rng),
            u_z: Linear::new(hidden_dim, hidden_dim, rng),
            w_r: Linear::new(input_dim, hidden_dim, rng),
            u_r: Linear::new(hidden_dim, hidden_dim, rng),
            w_h: Linear::new(input_dim, hidden_dim, rng),
            u_h: Linear::new(hidden_dim, hidden_dim, rng),
        }
    }

    /// Update every node's hidden state from its aggregated message.
    pub fn forward(&self, input: ArrayView2<'_, f32>, hidden: ArrayView2<'_, f32>) -> Array2<f32> {
        // z = sigmoid(W_z x + U_z h)
        let z = (self.w_z.forward(input) + self.u_z.forward(hidden)).mapv_into(sigmoid);
        // r = sigmoid(W_r x + U_r h)
        let r = (self.w_r.forward(input) + self.u_r.forward(hidden)).mapv_into(sigmoid);
        // h~ = tanh(W_h x + U_h (r * h))
        let reset_hidden = &r * &hidden;
        let candidate =
            (self.w_h.forward(input) + self.u_h.forward(reset_hidden.view())).mapv_into(f32::tanh);
        // h' = (1 - z) * h + z * h~
        let keep = z.mapv(|g| 1.0 - g);
        &keep * &hidden + &z * &candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::SparseMatrix;
    use crate::neighborhood::NeighborhoodBuilder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn linear_maps_rows() {
        let linear = Linear::new(4, 2, &mut rng());
        let out = linear.forward(Array2::ones((5, 4)).view());
        assert_eq!(out.dim(), (5, 2));
        // Identical rows give identical outputs.
        assert_eq!(out.row(0), out.row(4));
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let a = Linear::new(3, 3, &mut rng());
        let b = Linear::new(3, 3, &mut rng());
        let x = Array2::from_shape_fn((2, 3), |(i, j)| (i + j) as f32);
        assert_eq!(a.forward(x.view()), b.forward(x.view()));
    }

    #[test]
    fn mlp_final_activation() {
        let mut r = rng();
        let squashed = Mlp::new(3, &[8], 2, true, &mut r);
        let x = Array2::from_elem((4, 3), 50.0);
        assert!(squashed.forward(x.view()).iter().all(|v| v.abs() <= 1.0));
        assert_eq!(squashed.output_dim(), 2);
    }

    fn ring(n: usize) -> SparseMatrix {
        SparseMatrix::from_edges(n, (0..n).map(|i| (i, (i + 1) % n, 1.0))).unwrap()
    }

    #[test]
    fn attention_shapes_and_hop_coefficients() {
        let set = NeighborhoodBuilder::new(2, true).build(&ring(5)).unwrap();
        for combine in [HeadCombine::Concat, HeadCombine::Average] {
            let attn = NeighborhoodAttention::new(8, 2, combine, &mut rng());
            let enc = Array2::from_shape_fn((5, 8), |(i, j)| ((i * 8 + j) as f32 * 0.1).sin());
            let (msg, coef) = attn.forward(enc.view(), &set);
            assert_eq!(msg.dim(), (5, 8));
            assert_eq!(coef.dim(), (5, 3));
            for row in coef.rows() {
                assert!((row.sum() - 1.0).abs() < 1e-5);
            }
            assert!(msg.iter().all(|v| v.abs() <= 1.0));
        }
    }

    #[test]
    fn isolated_hop_contributes_zero_message() {
        // Hop 1 of a graph without edges is empty: no uniform fallback.
        let empty = SparseMatrix::from_edges(3, Vec::new()).unwrap();
        let set = NeighborhoodBuilder::new(1, true).build(&empty).unwrap();
        let attn = NeighborhoodAttention::new(4, 2, HeadCombine::Average, &mut rng());
        let enc = Array2::from_elem((3, 4), 0.5);
        let q = attn.q_linear.forward(enc.view());
        let k = attn.k_linear.forward(enc.view());
        let v = attn.v_linear.forward(enc.view());
        let hop = attn.hop_message(set.hop(1).unwrap(), &q, &k, &v);
        assert!(hop.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn identity_hop_passes_value_heads_through() {
        // On hop 0 every node attends only to itself with weight 1, so each
        // head block of the message is that head's value projection.
        let set = NeighborhoodBuilder::new(1, true).build(&ring(4)).unwrap();
        let eye = set.hop(0).unwrap();
        let enc = Array2::from_shape_fn((4, 6), |(i, j)| ((i * 6 + j) as f32 * 0.3).cos());

        let concat = NeighborhoodAttention::new(6, 3, HeadCombine::Concat, &mut rng());
        let q = concat.q_linear.forward(enc.view());
        let k = concat.k_linear.forward(enc.view());
        let v = concat.v_linear.forward(enc.view());
        let out = concat.out_linear.as_ref().unwrap();
        let expected = out.forward(v.view());
        let got = concat.hop_message(eye, &q, &k, &v);
        assert!(got.iter().zip(expected.iter()).all(|(a, b)| (a - b).abs() < 1e-6));

        let average = NeighborhoodAttention::new(6, 3, HeadCombine::Average, &mut rng());
        let q = average.q_linear.forward(enc.view());
        let k = average.k_linear.forward(enc.view());
        let v = average.v_linear.forward(enc.view());
        let got = average.hop_message(eye, &q, &k, &v);
        assert_eq!(got.dim(), (4, 6));
        let blocks: Vec<_> = v.axis_chunks_iter(Axis(1), 6).collect();
        let expected = (&blocks[0] + &blocks[1] + &blocks[2]) / 3.0;
        assert!(got.iter().zip(expected.iter()).all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn gru_keeps_hidden_width() {
        let gru = GruCell::new(4, 4, &mut rng());
        let input = Array2::ones((3, 4));
        let hidden = Array2::from_elem((3, 4), 0.5);
        let out = gru.forward(input.view(), hidden.view());
        assert_eq!(out.dim(), (3, 4));
        assert!(out.iter().all(|v| v.is_finite() && v.abs() <= 1.0));
    }
}
