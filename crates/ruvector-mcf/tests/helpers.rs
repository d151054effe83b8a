//! Shared test helpers for the ruvector-mcf integration test suite.
//!
//! Provides deterministic random graph and demand generators, a feasible
//! reference flow, and comparison utilities used across the test modules.

#![allow(dead_code)]

use ndarray::{Array1, Array2};
use ruvector_mcf::EdgeMatrix;

/// Route crate logs to the test harness. Honours `RUST_LOG`; repeated calls
/// are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Random number generator (simple LCG for deterministic reproducibility)
// ---------------------------------------------------------------------------

/// A minimal linear congruential generator for deterministic test data.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Uniform f32 in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform f32 in [lo, hi).
    pub fn next_f32_range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Uniform index in [0, n).
    pub fn next_index(&mut self, n: usize) -> usize {
        ((self.next_u64() >> 33) % n as u64) as usize
    }
}

// ---------------------------------------------------------------------------
// Graph generators
// ---------------------------------------------------------------------------

/// Directed ring `0 -> 1 -> ... -> n-1 -> 0`.
pub fn ring_edges(n: usize) -> Vec<(usize, usize)> {
    (0..n).map(|i| (i, (i + 1) % n)).collect()
}

/// Strongly connected graph: the ring plus random extra edges, each
/// non-ring pair included with probability `density`.
pub fn random_ring_graph(n: usize, density: f32, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = Lcg::new(seed);
    let mut edges = ring_edges(n);
    for u in 0..n {
        for v in 0..n {
            if u == v || v == (u + 1) % n {
                continue;
            }
            if rng.next_f32() < density {
                edges.push((u, v));
            }
        }
    }
    edges
}

/// Random demands in `[-scale, scale]` that sum to zero.
pub fn balanced_demands(n: usize, scale: f32, seed: u64) -> Array1<f32> {
    let mut rng = Lcg::new(seed);
    let mut d: Array1<f32> = Array1::from_shape_fn(n, |_| rng.next_f32_range(-scale, scale));
    let rest: f32 = d.iter().take(n - 1).sum();
    d[n - 1] = -rest;
    d
}

/// Feasible flow routed around the ring of a graph from
/// [`random_ring_graph`]: ring edge `(i, i+1)` carries `S_i + C` where `S_i`
/// is the prefix sum of demands and `C = max(0, -min S)`. Other edges carry
/// zero.
pub fn ring_routed_flow(
    n: usize,
    edges: &[(usize, usize)],
    demands: &Array1<f32>,
) -> Vec<(usize, usize, f32)> {
    let mut prefix = Vec::with_capacity(n);
    let mut acc = 0.0f32;
    for &d in demands.iter() {
        acc += d;
        prefix.push(acc);
    }
    let shift = prefix.iter().copied().fold(0.0f32, |m, s| m.max(-s));
    edges
        .iter()
        .map(|&(u, v)| {
            let x = if v == (u + 1) % n { (prefix[u] + shift).max(0.0) } else { 0.0 };
            (u, v, x)
        })
        .collect()
}

pub fn with_unit_values(edges: &[(usize, usize)]) -> Vec<(usize, usize, f32)> {
    edges.iter().map(|&(u, v)| (u, v, 1.0)).collect()
}

/// Adjacency normalised to uniform outgoing proportions.
pub fn uniform_weights<M: EdgeMatrix>(adjacency: &M) -> M {
    adjacency.map_rows(|_, _, row| {
        let share = 1.0 / row.len() as f32;
        row.iter_mut().for_each(|x| *x = share);
    })
}

/// Random positive proportions on every row.
pub fn random_weights<M: EdgeMatrix>(adjacency: &M, seed: u64) -> M {
    let mut rng = Lcg::new(seed);
    adjacency.map_rows(|_, _, row| {
        row.iter_mut().for_each(|x| *x = rng.next_f32_range(0.1, 1.0));
        let total: f32 = row.iter().sum();
        row.iter_mut().for_each(|x| *x /= total);
    })
}

// ---------------------------------------------------------------------------
// Comparison utilities
// ---------------------------------------------------------------------------

pub fn max_abs_diff(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
    assert_eq!(a.dim(), b.dim());
    a.iter()
        .zip(b.iter())
        .fold(0.0f32, |m, (x, y)| m.max((x - y).abs()))
}
