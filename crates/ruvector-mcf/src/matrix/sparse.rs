//! Compressed sparse row backing for [`EdgeMatrix`].

use ndarray::{Array1, Array2, ArrayView2};

use super::{pattern_mismatch, EdgeMatrix, Representation};
use crate::error::{McfError, Result};

// ---------------------------------------------------------------------------
// CsrMatrix<T>
// ---------------------------------------------------------------------------

/// Compressed Sparse Row (CSR) matrix.
///
/// Stores only pattern entries, so every reduction runs in O(nnz) and no
/// `V x V` buffer is ever allocated.
///
/// # Layout
///
/// For a matrix with `m` rows and `nnz` entries:
/// - `row_ptr` has length `m + 1`
/// - `col_indices` and `values` each have length `nnz`
/// - Row `i` spans indices `row_ptr[i]..row_ptr[i+1]`
/// - Column indices are strictly increasing within a row
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T> {
    /// Row pointers: `row_ptr[i]` is the start index in `col_indices`/`values`
    /// for row `i`.
    pub row_ptr: Vec<usize>,
    /// Column indices for each entry.
    pub col_indices: Vec<usize>,
    /// Values for each entry.
    pub values: Vec<T>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl<T> CsrMatrix<T> {
    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over `(col_index, &value)` pairs for the given row.
    #[inline]
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, &T)> {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter())
    }

    /// Storage index of `(row, col)` if present. Binary search over the
    /// sorted columns of `row`.
    #[inline]
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_indices[start..end]
            .binary_search(&col)
            .ok()
            .map(|offset| start + offset)
    }

    /// Same structure, new values computed per storage slot.
    fn restructure<U>(&self, values: Vec<U>) -> CsrMatrix<U> {
        debug_assert_eq!(values.len(), self.nnz());
        CsrMatrix {
            row_ptr: self.row_ptr.clone(),
            col_indices: self.col_indices.clone(),
            values,
            rows: self.rows,
            cols: self.cols,
        }
    }
}

impl<T: Copy> CsrMatrix<T> {
    /// Build a CSR matrix from COO (coordinate) triplets.
    ///
    /// Entries are sorted by `(row, col)`; repeated positions keep the value
    /// that appeared last in the input.
    ///
    /// # Errors
    ///
    /// Returns [`McfError::InvalidInput`] if an index is out of bounds.
    pub fn from_coo(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = (usize, usize, T)>,
    ) -> Result<Self> {
        let mut sorted: Vec<_> = entries.into_iter().collect();
        // Stable sort so the last duplicate stays last.
        sorted.sort_by_key(|(r, c, _)| (*r, *c));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_indices = Vec::with_capacity(sorted.len());
        let mut values: Vec<T> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in sorted {
            if r >= rows || c >= cols {
                return Err(McfError::invalid_input(format!(
                    "entry ({r}, {c}) out of bounds for {rows}x{cols} matrix"
                )));
            }
            if last == Some((r, c)) {
                if let Some(slot) = values.last_mut() {
                    *slot = v;
                }
                continue;
            }
            row_ptr[r + 1] += 1;
            col_indices.push(c);
            values.push(v);
            last = Some((r, c));
        }
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        Ok(Self {
            row_ptr,
            col_indices,
            values,
            rows,
            cols,
        })
    }
}

impl CsrMatrix<f32> {
    /// Square identity matrix of dimension `n`; hop 0 of every neighborhood
    /// set.
    pub fn identity(n: usize) -> Self {
        Self {
            row_ptr: (0..=n).collect(),
            col_indices: (0..n).collect(),
            values: vec![1.0f32; n],
            rows: n,
            cols: n,
        }
    }
}

// ---------------------------------------------------------------------------
// EdgeMatrix
// ---------------------------------------------------------------------------

impl EdgeMatrix for CsrMatrix<f32> {
    const REPRESENTATION: Representation = Representation::Sparse;

    fn from_edges<I>(num_nodes: usize, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f32)>,
    {
        let entries: Vec<_> = edges.into_iter().collect();
        if let Some((u, v, x)) = entries.iter().find(|(_, _, x)| !x.is_finite()) {
            return Err(McfError::NonFiniteValue(format!("edge ({u}, {v}) = {x}")));
        }
        Self::from_coo(num_nodes, num_nodes, entries)
    }

    fn num_nodes(&self) -> usize {
        self.rows
    }

    fn num_edges(&self) -> usize {
        self.nnz()
    }

    fn has_edge(&self, u: usize, v: usize) -> bool {
        self.position(u, v).is_some()
    }

    fn get(&self, u: usize, v: usize) -> f32 {
        self.position(u, v).map_or(0.0, |idx| self.values[idx])
    }

    fn row_degree(&self, u: usize) -> usize {
        self.row_ptr[u + 1] - self.row_ptr[u]
    }

    fn with_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(usize, usize, f32) -> f32,
    {
        let mut values = Vec::with_capacity(self.nnz());
        for u in 0..self.rows {
            for idx in self.row_ptr[u]..self.row_ptr[u + 1] {
                values.push(f(u, self.col_indices[idx], self.values[idx]));
            }
        }
        self.restructure(values)
    }

    fn zip_map<F>(&self, other: &Self, mut f: F) -> Result<Self>
    where
        F: FnMut(f32, f32) -> f32,
    {
        if self.row_ptr != other.row_ptr || self.col_indices != other.col_indices {
            return Err(pattern_mismatch("sparse zip_map", self.nnz(), other.nnz()));
        }
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(self.restructure(values))
    }

    fn row_sums(&self) -> Array1<f32> {
        Array1::from_shape_fn(self.rows, |u| {
            self.values[self.row_ptr[u]..self.row_ptr[u + 1]].iter().sum()
        })
    }

    fn col_sums(&self) -> Array1<f32> {
        let mut sums = Array1::zeros(self.cols);
        for (&c, &x) in self.col_indices.iter().zip(self.values.iter()) {
            sums[c] += x;
        }
        sums
    }

    fn reverse_values(&self) -> Self {
        self.with_values(|u, v, _| self.get(v, u))
    }

    fn map_rows<F>(&self, mut f: F) -> Self
    where
        F: FnMut(usize, &[usize], &mut [f32]),
    {
        let mut values = self.values.clone();
        for u in 0..self.rows {
            let (start, end) = (self.row_ptr[u], self.row_ptr[u + 1]);
            if start == end {
                continue;
            }
            f(u, &self.col_indices[start..end], &mut values[start..end]);
        }
        self.restructure(values)
    }

    fn spmm(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut out = Array2::zeros((self.rows, x.ncols()));
        for u in 0..self.rows {
            let mut row = out.row_mut(u);
            for (v, &w) in self.row_entries(u) {
                row.scaled_add(w, &x.row(v));
            }
        }
        out
    }

    fn for_each_edge<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, f32),
    {
        for u in 0..self.rows {
            for (v, &x) in self.row_entries(u) {
                f(u, v, x);
            }
        }
    }

    fn to_dense(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.rows, self.cols));
        self.for_each_edge(|u, v, x| out[[u, v]] = x);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_coo_sorts_and_keeps_last_duplicate() {
        let m = CsrMatrix::<f32>::from_coo(2, 2, vec![(1, 0, 1.0), (0, 1, 2.0), (1, 0, 5.0)])
            .unwrap();
        assert_eq!(m.row_ptr, vec![0, 1, 2]);
        assert_eq!(m.col_indices, vec![1, 0]);
        assert_eq!(m.values, vec![2.0, 5.0]);
    }

    #[test]
    fn reverse_values_read_the_opposite_edge() {
        // (0, 1) and (1, 0) are mutual; (1, 2) has no reverse edge.
        let m = CsrMatrix::<f32>::from_coo(3, 3, vec![(0, 1, 2.0), (1, 0, 3.0), (1, 2, 4.0)])
            .unwrap();
        let r = m.reverse_values();
        assert_eq!(r.row_ptr, m.row_ptr);
        assert_eq!(r.col_indices, m.col_indices);
        assert_eq!(r.values, vec![3.0, 2.0, 0.0]);
    }

    #[test]
    fn identity_has_unit_diagonal() {
        let eye = CsrMatrix::identity(4);
        assert_eq!(eye.nnz(), 4);
        assert!((0..4).all(|i| eye.get(i, i) == 1.0));
    }

    #[test]
    fn empty_rows_are_skipped_by_map_rows() {
        let m = CsrMatrix::<f32>::from_coo(3, 3, vec![(0, 1, 1.0)]).unwrap();
        let mut visited = Vec::new();
        m.map_rows(|u, _, _| visited.push(u));
        assert_eq!(visited, vec![0]);
    }
}
