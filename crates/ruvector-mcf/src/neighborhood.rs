//! Random-walk neighborhoods.
//!
//! Hop `i` of node `u` holds every node reachable from `u` by a directed walk
//! of exactly `i` steps. Hop 0 is `{u}`. With deduplication enabled, hop `i`
//! drops every node already present in hops `0..i`, so the hops partition
//! the at-most-`k` walk ball.
//!
//! Building is a pure function of `(adjacency, k, unique)`;
//! [`NeighborhoodCache`] memoises it for repeated calls on the same graph.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::error::{McfError, Result};
use crate::matrix::EdgeMatrix;

/// Ordered hop matrices `0..=k`, each with value 1 on its pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborhoodSet<M> {
    hops: Vec<M>,
}

impl<M: EdgeMatrix> NeighborhoodSet<M> {
    /// Wrap precomputed hop matrices. Hop 0 must be the identity pattern and
    /// all hops must agree on the node count.
    pub fn from_hops(hops: Vec<M>) -> Result<Self> {
        let first = hops
            .first()
            .ok_or_else(|| McfError::invalid_input("neighborhood set is empty"))?;
        let n = first.num_nodes();
        if first.num_edges() != n || (0..n).any(|i| !first.has_edge(i, i)) {
            return Err(McfError::invalid_input("hop 0 must be the identity"));
        }
        if let Some(bad) = hops.iter().find(|h| h.num_nodes() != n) {
            return Err(McfError::dimension_mismatch(
                "neighborhood nodes",
                n,
                bad.num_nodes(),
            ));
        }
        Ok(Self { hops })
    }

    /// Number of hop matrices (`k + 1`).
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Largest hop index `k`.
    pub fn max_hop(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }

    pub fn num_nodes(&self) -> usize {
        self.hops.first().map_or(0, |h| h.num_nodes())
    }

    pub fn hop(&self, i: usize) -> Option<&M> {
        self.hops.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, M> {
        self.hops.iter()
    }

    /// Largest row degree per hop; the width a padded neighbor list would
    /// need.
    pub fn max_degrees(&self) -> Vec<usize> {
        self.hops
            .iter()
            .map(|h| (0..h.num_nodes()).map(|u| h.row_degree(u)).max().unwrap_or(0))
            .collect()
    }
}

/// Builds [`NeighborhoodSet`]s from an adjacency pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborhoodBuilder {
    hops: usize,
    unique: bool,
}

impl NeighborhoodBuilder {
    /// `hops` is `k`; the result holds `k + 1` matrices.
    pub fn new(hops: usize, unique: bool) -> Self {
        Self { hops, unique }
    }

    pub fn build<M: EdgeMatrix>(&self, adjacency: &M) -> Result<NeighborhoodSet<M>> {
        let n = adjacency.num_nodes();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        adjacency.for_each_edge(|u, v, _| successors[u].push(v));

        let mut hops = Vec::with_capacity(self.hops + 1);
        hops.push(M::from_edges(n, (0..n).map(|i| (i, i, 1.0)))?);

        // Exact-length walk sets and the union of everything seen so far.
        let mut frontier: Vec<BTreeSet<usize>> = (0..n).map(|u| BTreeSet::from([u])).collect();
        let mut seen = frontier.clone();

        for hop in 1..=self.hops {
            frontier = frontier
                .iter()
                .map(|reach| {
                    reach
                        .iter()
                        .flat_map(|&w| successors[w].iter().copied())
                        .collect()
                })
                .collect();

            let mut entries = Vec::new();
            for (u, reach) in frontier.iter().enumerate() {
                for &v in reach {
                    if !(self.unique && seen[u].contains(&v)) {
                        entries.push((u, v, 1.0));
                    }
                }
            }
            for (u, reach) in frontier.iter().enumerate() {
                seen[u].extend(reach.iter().copied());
            }

            debug!(hop, entries = entries.len(), "built neighborhood hop");
            hops.push(M::from_edges(n, entries)?);
        }

        Ok(NeighborhoodSet { hops })
    }
}

/// Memoises neighborhood builds keyed by adjacency fingerprint, hop count and
/// the dedup flag. Each entry keeps the adjacency it was built from, and a hit
/// only counts when the stored pattern matches.
#[derive(Debug)]
pub struct NeighborhoodCache<M> {
    entries: HashMap<(u64, usize, bool), Vec<(M, NeighborhoodSet<M>)>>,
}

impl<M: EdgeMatrix> Default for NeighborhoodCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: EdgeMatrix> NeighborhoodCache<M> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Cached set for `adjacency`, building it on first use.
    pub fn get_or_build(
        &mut self,
        adjacency: &M,
        builder: NeighborhoodBuilder,
    ) -> Result<&NeighborhoodSet<M>> {
        let key = (fingerprint(adjacency), builder.hops, builder.unique);
        let bucket = self.entries.entry(key).or_default();
        if let Some(pos) = bucket
            .iter()
            .position(|(pattern, _)| pattern.same_pattern(adjacency))
        {
            return Ok(&bucket[pos].1);
        }

        let set = builder.build(adjacency)?;
        let slot = bucket.len();
        bucket.push((adjacency.clone(), set));
        Ok(&bucket[slot].1)
    }

    /// Number of cached sets.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Hash of the node count and edge pattern (values ignored).
fn fingerprint<M: EdgeMatrix>(adjacency: &M) -> u64 {
    let mut hasher = DefaultHasher::new();
    adjacency.num_nodes().hash(&mut hasher);
    adjacency.for_each_edge(|u, v, _| (u, v).hash(&mut hasher));
    hasher.finish()
}
