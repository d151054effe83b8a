//! Dense `V x V` backing for [`EdgeMatrix`].

use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::{pattern_mismatch, EdgeMatrix, Representation};
use crate::error::{McfError, Result};

/// Dense edge matrix: full value array plus an adjacency mask.
///
/// Values outside the mask are kept at exactly zero so that row and column
/// reductions can run over the whole array.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    values: Array2<f32>,
    mask: Array2<bool>,
}

impl DenseMatrix {
    /// Build from a dense adjacency array: every non-zero entry is an edge
    /// carrying its value.
    pub fn from_adjacency(adjacency: Array2<f32>) -> Result<Self> {
        let (rows, cols) = adjacency.dim();
        if rows != cols {
            return Err(McfError::dimension_mismatch("adjacency columns", rows, cols));
        }
        if let Some(bad) = adjacency.iter().find(|x| !x.is_finite()) {
            return Err(McfError::NonFiniteValue(format!("adjacency entry {bad}")));
        }
        let mask = adjacency.mapv(|x| x != 0.0);
        Ok(Self {
            values: adjacency,
            mask,
        })
    }

    /// Build from explicit values and mask. Values outside the mask are
    /// zeroed.
    pub fn from_parts(mut values: Array2<f32>, mask: Array2<bool>) -> Result<Self> {
        if values.dim() != mask.dim() {
            return Err(McfError::dimension_mismatch(
                "mask rows",
                values.nrows(),
                mask.nrows(),
            ));
        }
        let (rows, cols) = values.dim();
        if rows != cols {
            return Err(McfError::dimension_mismatch("matrix columns", rows, cols));
        }
        values.zip_mut_with(&mask, |x, &m| {
            if !m {
                *x = 0.0;
            }
        });
        Ok(Self { values, mask })
    }

    /// Raw value array (zeros off-pattern).
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Adjacency mask.
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }
}

impl EdgeMatrix for DenseMatrix {
    const REPRESENTATION: Representation = Representation::Dense;

    fn from_edges<I>(num_nodes: usize, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f32)>,
    {
        let mut values = Array2::zeros((num_nodes, num_nodes));
        let mut mask = Array2::from_elem((num_nodes, num_nodes), false);
        for (u, v, x) in edges {
            if u >= num_nodes || v >= num_nodes {
                return Err(McfError::invalid_input(format!(
                    "edge ({u}, {v}) out of bounds for {num_nodes} nodes"
                )));
            }
            if !x.is_finite() {
                return Err(McfError::NonFiniteValue(format!("edge ({u}, {v}) = {x}")));
            }
            values[[u, v]] = x;
            mask[[u, v]] = true;
        }
        Ok(Self { values, mask })
    }

    fn num_nodes(&self) -> usize {
        self.values.nrows()
    }

    fn num_edges(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    fn has_edge(&self, u: usize, v: usize) -> bool {
        self.mask[[u, v]]
    }

    fn get(&self, u: usize, v: usize) -> f32 {
        self.values[[u, v]]
    }

    fn row_degree(&self, u: usize) -> usize {
        self.mask.row(u).iter().filter(|&&m| m).count()
    }

    fn with_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(usize, usize, f32) -> f32,
    {
        let mut values = Array2::zeros(self.values.dim());
        for ((u, v), out) in values.indexed_iter_mut() {
            if self.mask[[u, v]] {
                *out = f(u, v, self.values[[u, v]]);
            }
        }
        Self {
            values,
            mask: self.mask.clone(),
        }
    }

    fn zip_map<F>(&self, other: &Self, mut f: F) -> Result<Self>
    where
        F: FnMut(f32, f32) -> f32,
    {
        if self.mask != other.mask {
            return Err(pattern_mismatch(
                "dense zip_map",
                self.num_edges(),
                other.num_edges(),
            ));
        }
        Ok(self.with_values(|u, v, x| f(x, other.values[[u, v]])))
    }

    fn row_sums(&self) -> Array1<f32> {
        self.values.sum_axis(Axis(1))
    }

    fn col_sums(&self) -> Array1<f32> {
        self.values.sum_axis(Axis(0))
    }

    fn reverse_values(&self) -> Self {
        let transposed = self.values.t();
        self.with_values(|u, v, _| transposed[[u, v]])
    }

    fn map_rows<F>(&self, mut f: F) -> Self
    where
        F: FnMut(usize, &[usize], &mut [f32]),
    {
        let mut values = self.values.clone();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for u in 0..self.num_nodes() {
            cols.clear();
            vals.clear();
            for (v, &m) in self.mask.row(u).iter().enumerate() {
                if m {
                    cols.push(v);
                    vals.push(self.values[[u, v]]);
                }
            }
            if cols.is_empty() {
                continue;
            }
            f(u, &cols, &mut vals);
            for (&v, &x) in cols.iter().zip(vals.iter()) {
                values[[u, v]] = x;
            }
        }
        Self {
            values,
            mask: self.mask.clone(),
        }
    }

    fn spmm(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        self.values.dot(&x)
    }

    fn for_each_edge<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, f32),
    {
        for ((u, v), &m) in self.mask.indexed_iter() {
            if m {
                f(u, v, self.values[[u, v]]);
            }
        }
    }

    fn to_dense(&self) -> Array2<f32> {
        self.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn adjacency_nonzeros_become_edges() {
        let m = DenseMatrix::from_adjacency(array![[0.0, 1.0], [2.0, 0.0]]).unwrap();
        assert_eq!(m.num_edges(), 2);
        assert!(m.has_edge(1, 0));
        assert!(!m.has_edge(0, 0));
    }

    #[test]
    fn from_parts_zeroes_off_mask_values() {
        let m = DenseMatrix::from_parts(
            array![[5.0, 1.0], [2.0, 7.0]],
            array![[false, true], [true, false]],
        )
        .unwrap();
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.row_sums()[1], 2.0);
    }

    #[test]
    fn non_square_adjacency_is_rejected() {
        assert!(DenseMatrix::from_adjacency(Array2::zeros((2, 3))).is_err());
    }
}
