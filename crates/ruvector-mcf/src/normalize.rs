//! Row normalisation of edge scores into outgoing flow proportions.
//!
//! Scores are paired per edge from per-node decoder outputs and normalised
//! over each row's allowed out-edges only. Disallowed entries never take
//! part: they are outside the pattern, which is the sparse equivalent of
//! masking to `-inf` before a dense softmax. A row without out-edges stays
//! all zero.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::config::{McfConfig, ScorePairing};
use crate::error::{McfError, Result};
use crate::matrix::EdgeMatrix;

/// Lower bound on a softmax denominator.
const SOFTMAX_GUARD: f32 = 1e-10;

/// Row normalisation policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    Softmax,
    /// Euclidean projection onto the simplex; outputs below `epsilon` are
    /// set to exactly zero and the row is renormalised.
    Sparsemax { epsilon: f32 },
}

/// Numerically stable softmax over a slice, in place.
///
/// Shared by flow normalisation and neighborhood attention.
pub fn softmax_in_place(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    let sum = sum.max(SOFTMAX_GUARD);
    values.iter_mut().for_each(|v| *v /= sum);
}

/// Sparsemax over a slice, in place.
///
/// Finds the threshold `tau` with `sum_i max(z_i - tau, 0) = 1`, keeps
/// `max(z - tau, 0)`, then zeroes entries below `epsilon` and renormalises.
pub fn sparsemax_in_place(values: &mut [f32], epsilon: f32) {
    if values.is_empty() {
        return;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0f32;
    let mut support = 0usize;
    let mut support_sum = 0.0f32;
    for (i, &z) in sorted.iter().enumerate() {
        cumulative += z;
        let k = (i + 1) as f32;
        if 1.0 + k * z > cumulative {
            support = i + 1;
            support_sum = cumulative;
        }
    }
    // support >= 1 always: the largest entry satisfies 1 + z > z.
    let tau = (support_sum - 1.0) / support.max(1) as f32;

    let projected: Vec<f32> = values.iter().map(|&z| (z - tau).max(0.0)).collect();
    let kept: f32 = projected.iter().filter(|&&p| p >= epsilon).sum();
    if kept > 0.0 {
        for (v, p) in values.iter_mut().zip(projected) {
            *v = if p >= epsilon { p / kept } else { 0.0 };
        }
    } else {
        let total: f32 = projected.iter().sum::<f32>().max(SOFTMAX_GUARD);
        for (v, p) in values.iter_mut().zip(projected) {
            *v = p / total;
        }
    }
}

/// Turns node scores into a row-stochastic flow weight matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowWeightNormalizer {
    pub normalization: Normalization,
    pub pairing: ScorePairing,
}

impl FlowWeightNormalizer {
    pub fn new(normalization: Normalization, pairing: ScorePairing) -> Self {
        Self {
            normalization,
            pairing,
        }
    }

    pub fn from_config(config: &McfConfig) -> Self {
        let normalization = if config.use_sparsemax {
            Normalization::Sparsemax {
                epsilon: config.sparsemax_epsilon,
            }
        } else {
            Normalization::Softmax
        };
        Self::new(normalization, config.score_pairing)
    }

    /// Pair endpoint scores on every allowed edge.
    pub fn edge_scores<M: EdgeMatrix>(&self, adjacency: &M, node_scores: ArrayView1<'_, f32>) -> M {
        adjacency.with_values(|u, v, _| self.pairing.pair(node_scores[u], node_scores[v]))
    }

    /// Normalise each row of `scores` over its allowed entries.
    pub fn normalize<M: EdgeMatrix>(&self, scores: &M) -> M {
        match self.normalization {
            Normalization::Softmax => scores.map_rows(|_, _, row| softmax_in_place(row)),
            Normalization::Sparsemax { epsilon } => {
                scores.map_rows(|_, _, row| sparsemax_in_place(row, epsilon))
            }
        }
    }

    /// Flow weights from per-node scores.
    ///
    /// # Errors
    ///
    /// Returns [`McfError::DimensionMismatch`] if `node_scores` does not have
    /// one entry per node.
    pub fn weights<M: EdgeMatrix>(
        &self,
        adjacency: &M,
        node_scores: ArrayView1<'_, f32>,
    ) -> Result<M> {
        if node_scores.len() != adjacency.num_nodes() {
            return Err(McfError::dimension_mismatch(
                "node scores",
                adjacency.num_nodes(),
                node_scores.len(),
            ));
        }
        Ok(self.normalize(&self.edge_scores(adjacency, node_scores)))
    }
}
