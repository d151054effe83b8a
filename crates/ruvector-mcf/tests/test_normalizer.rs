//! Integration tests for flow-weight normalisation.

mod helpers;

use ndarray::{array, Array1};
use proptest::prelude::*;
use ruvector_mcf::{
    DenseMatrix, EdgeMatrix, FlowWeightNormalizer, Normalization, ScorePairing, SparseMatrix,
};

use helpers::{max_abs_diff, random_ring_graph, with_unit_values};

fn all_normalizers() -> Vec<FlowWeightNormalizer> {
    let mut out = Vec::new();
    for normalization in [Normalization::Softmax, Normalization::Sparsemax { epsilon: 1e-5 }] {
        for pairing in [ScorePairing::Product, ScorePairing::Sum] {
            out.push(FlowWeightNormalizer::new(normalization, pairing));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Rows without out-edges
// ---------------------------------------------------------------------------

fn sink_row<M: EdgeMatrix>() {
    // Node 3 has no outgoing edge at all.
    let adj = M::from_edges(
        4,
        vec![(0, 1, 1.0), (0, 3, 1.0), (1, 2, 1.0), (2, 0, 1.0), (2, 3, 1.0)],
    )
    .unwrap();
    let scores = array![0.4f32, -0.2, 1.3, 5.0];
    for normalizer in all_normalizers() {
        let w = normalizer.weights(&adj, scores.view()).unwrap();
        let dense = w.to_dense();
        assert!(dense.row(3).iter().all(|&x| x == 0.0), "{normalizer:?}");
        assert!(dense.iter().all(|x| x.is_finite()));
        let sums = w.row_sums();
        for u in 0..3 {
            assert!((sums[u] - 1.0).abs() < 1e-5, "{normalizer:?} row {u}");
        }
    }
}

#[test]
fn sink_row_is_all_zero_dense() {
    sink_row::<DenseMatrix>();
}

#[test]
fn sink_row_is_all_zero_sparse() {
    sink_row::<SparseMatrix>();
}

#[test]
fn masked_entries_never_receive_weight() {
    let adj = DenseMatrix::from_edges(3, vec![(0, 1, 1.0), (1, 2, 1.0), (2, 0, 1.0), (2, 1, 1.0)])
        .unwrap();
    for normalizer in all_normalizers() {
        let w = normalizer.weights(&adj, array![3.0f32, 2.0, 1.0].view()).unwrap();
        let dense = w.to_dense();
        for ((u, v), &x) in dense.indexed_iter() {
            if !adj.has_edge(u, v) {
                assert_eq!(x, 0.0, "({u}, {v})");
            }
        }
    }
}

#[test]
fn sparsemax_concentrates_on_dominant_edge() {
    let adj = SparseMatrix::from_edges(3, vec![(0, 1, 1.0), (0, 2, 1.0), (1, 0, 1.0), (2, 0, 1.0)])
        .unwrap();
    let normalizer = FlowWeightNormalizer::new(
        Normalization::Sparsemax { epsilon: 1e-5 },
        ScorePairing::Sum,
    );
    let w = normalizer.weights(&adj, array![0.0f32, 3.0, -3.0].view()).unwrap();
    assert_eq!(w.get(0, 1), 1.0);
    assert_eq!(w.get(0, 2), 0.0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn weights_are_row_stochastic_and_backings_agree(
        n in 2usize..15,
        density in 0.0f32..0.7,
        seed in any::<u64>(),
        scores in prop::collection::vec(-3.0f32..3.0, 15),
    ) {
        let edges = with_unit_values(&random_ring_graph(n, density, seed));
        let dense_adj = DenseMatrix::from_edges(n, edges.clone()).unwrap();
        let sparse_adj = SparseMatrix::from_edges(n, edges).unwrap();
        let scores = Array1::from(scores[..n].to_vec());

        for normalizer in all_normalizers() {
            let dense = normalizer.weights(&dense_adj, scores.view()).unwrap();
            let sparse = normalizer.weights(&sparse_adj, scores.view()).unwrap();

            for (u, s) in sparse.row_sums().iter().enumerate() {
                prop_assert!((s - 1.0).abs() < 1e-5, "row {} sums to {}", u, s);
            }
            let mut min = f32::INFINITY;
            sparse.for_each_edge(|_, _, x| min = min.min(x));
            prop_assert!(min >= 0.0);
            prop_assert!(max_abs_diff(&dense.to_dense(), &sparse.to_dense()) < 1e-6);
        }
    }
}
