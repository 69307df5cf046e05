//! Sparse Hessian assembly.
//!
//! Objectives only produce triplet values over a fixed pattern. The pattern is analyzed once into
//! a compressed matrix whose layout is picked by the linear solver, and every update refills the
//! values in place.
use crate::error::{Error, Result};
use crate::utils::apply_fixed_variables;
use faer::sparse::{SparseColMat, SparseRowMat, SymbolicSparseColMat, SymbolicSparseRowMat};
use rayon::prelude::*;

/// Storage order of an assembled matrix.
pub trait SparseLayout: Send + Sync + 'static {
    type Matrix: Send + Sync;

    /// `(outer, inner)` coordinates of the entry `(row, col)`.
    fn storage_key(row: usize, col: usize) -> (usize, usize);

    /// Square matrix from compressed outer pointers and inner indices, values zeroed.
    fn from_compressed(n: usize, outer_ptr: Vec<usize>, inner_idx: Vec<usize>) -> Self::Matrix;

    fn values_mut(matrix: &mut Self::Matrix) -> &mut [f64];

    /// `out = A x`
    fn mul_vec(matrix: &Self::Matrix, x: &[f64], out: &mut [f64]);

    fn diagonal(matrix: &Self::Matrix, out: &mut [f64]);

    /// Replace the rows and columns of `fixed` by identity and zero them in `rhs`, so the solution
    /// keeps those variables at zero.
    fn fix_variables(matrix: &mut Self::Matrix, rhs: &mut [f64], fixed: &[usize]);
}

/// Compressed sparse columns, as used by the direct solvers.
#[derive(Clone, Copy, Debug, Default)]
pub struct ColMajor;

/// Compressed sparse rows, as used by the iterative solvers.
#[derive(Clone, Copy, Debug, Default)]
pub struct RowMajor;

impl SparseLayout for ColMajor {
    type Matrix = SparseColMat<usize, f64>;

    fn storage_key(row: usize, col: usize) -> (usize, usize) {
        (col, row)
    }

    fn from_compressed(n: usize, outer_ptr: Vec<usize>, inner_idx: Vec<usize>) -> Self::Matrix {
        let nnz = inner_idx.len();
        let symbolic = SymbolicSparseColMat::new_checked(n, n, outer_ptr, None, inner_idx);
        SparseColMat::new(symbolic, vec![0.; nnz])
    }

    fn values_mut(matrix: &mut Self::Matrix) -> &mut [f64] {
        matrix.val_mut()
    }

    fn mul_vec(matrix: &Self::Matrix, x: &[f64], out: &mut [f64]) {
        let symbolic = matrix.symbolic();
        let (col_ptr, row_idx) = (symbolic.col_ptr(), symbolic.row_idx());
        let values = matrix.val();
        out.fill(0.);
        for (j, &xj) in x.iter().enumerate() {
            for k in col_ptr[j]..col_ptr[j + 1] {
                out[row_idx[k]] += values[k] * xj;
            }
        }
    }

    fn diagonal(matrix: &Self::Matrix, out: &mut [f64]) {
        let symbolic = matrix.symbolic();
        let (col_ptr, row_idx) = (symbolic.col_ptr(), symbolic.row_idx());
        let values = matrix.val();
        for (j, d) in out.iter_mut().enumerate() {
            *d = (col_ptr[j]..col_ptr[j + 1])
                .find(|&k| row_idx[k] == j)
                .map_or(0., |k| values[k]);
        }
    }

    fn fix_variables(matrix: &mut Self::Matrix, rhs: &mut [f64], fixed: &[usize]) {
        apply_fixed_variables(matrix, rhs, fixed);
    }
}

impl SparseLayout for RowMajor {
    type Matrix = SparseRowMat<usize, f64>;

    fn storage_key(row: usize, col: usize) -> (usize, usize) {
        (row, col)
    }

    fn from_compressed(n: usize, outer_ptr: Vec<usize>, inner_idx: Vec<usize>) -> Self::Matrix {
        let nnz = inner_idx.len();
        let symbolic = SymbolicSparseRowMat::new_checked(n, n, outer_ptr, None, inner_idx);
        SparseRowMat::new(symbolic, vec![0.; nnz])
    }

    fn values_mut(matrix: &mut Self::Matrix) -> &mut [f64] {
        matrix.val_mut()
    }

    fn mul_vec(matrix: &Self::Matrix, x: &[f64], out: &mut [f64]) {
        let symbolic = matrix.symbolic();
        let (row_ptr, col_idx) = (symbolic.row_ptr(), symbolic.col_idx());
        let values = matrix.val();
        out.par_iter_mut().enumerate().for_each(|(i, o)| {
            *o = (row_ptr[i]..row_ptr[i + 1])
                .map(|k| values[k] * x[col_idx[k]])
                .sum();
        });
    }

    fn diagonal(matrix: &Self::Matrix, out: &mut [f64]) {
        let symbolic = matrix.symbolic();
        let (row_ptr, col_idx) = (symbolic.row_ptr(), symbolic.col_idx());
        let values = matrix.val();
        for (i, d) in out.iter_mut().enumerate() {
            *d = (row_ptr[i]..row_ptr[i + 1])
                .find(|&k| col_idx[k] == i)
                .map_or(0., |k| values[k]);
        }
    }

    fn fix_variables(matrix: &mut Self::Matrix, rhs: &mut [f64], fixed: &[usize]) {
        if fixed.is_empty() {
            return;
        }
        let (symbolic, values) = matrix.parts_mut();
        let (row_ptr, col_idx) = (symbolic.row_ptr(), symbolic.col_idx());
        values
            .par_iter_mut()
            .zip(col_idx.par_iter())
            .for_each(|(value, j)| {
                if fixed.contains(j) {
                    *value = 0.;
                }
            });
        for &i in fixed {
            for k in row_ptr[i]..row_ptr[i + 1] {
                values[k] = if col_idx[k] == i { 1. } else { 0. };
            }
            rhs[i] = 0.;
        }
    }
}

/// Hessian pattern analyzed once from the global entries of a model.
///
/// Like the face assembly of the parameterization solver, triplets are sorted by storage
/// position: `order[offsets[k]..offsets[k + 1]]` lists the triplets summed into the `k`-th stored
/// value. The diagonal is always stored, even when no objective touches it.
pub struct HessianPattern<L: SparseLayout> {
    matrix: L::Matrix,
    order: Vec<usize>,
    offsets: Vec<usize>,
    n: usize,
}

impl<L: SparseLayout> HessianPattern<L> {
    pub fn analyze(n: usize, entries: &[(usize, usize)]) -> Result<Self> {
        if let Some(&(i, j)) = entries.iter().find(|&&(i, j)| i >= n || j >= n) {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: i.max(j) + 1,
            });
        }
        let mut keyed: Vec<((usize, usize), Option<usize>)> = entries
            .iter()
            .enumerate()
            .map(|(t, &(i, j))| (L::storage_key(i, j), Some(t)))
            .chain((0..n).map(|i| ((i, i), None)))
            .collect();
        keyed.sort_unstable();

        let mut outer_ptr = vec![0; n + 1];
        let mut inner_idx = Vec::new();
        let mut order = Vec::with_capacity(entries.len());
        let mut offsets = vec![0];
        let mut current = None;
        for (key, triplet) in keyed {
            if current != Some(key) {
                if current.is_some() {
                    offsets.push(order.len());
                }
                current = Some(key);
                inner_idx.push(key.1);
                outer_ptr[key.0 + 1] += 1;
            }
            if let Some(t) = triplet {
                order.push(t);
            }
        }
        offsets.push(order.len());
        for k in 0..n {
            outer_ptr[k + 1] += outer_ptr[k];
        }

        Ok(Self {
            matrix: L::from_compressed(n, outer_ptr, inner_idx),
            order,
            offsets,
            n,
        })
    }

    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Number of stored values.
    pub fn nnz(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of triplets the pattern was analyzed from.
    pub fn triplets_count(&self) -> usize {
        self.order.len()
    }

    /// Overwrite the stored values, summing duplicated triplets.
    pub fn refill(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.order.len() {
            return Err(Error::DimensionMismatch {
                expected: self.order.len(),
                found: values.len(),
            });
        }
        let (order, offsets) = (&self.order, &self.offsets);
        L::values_mut(&mut self.matrix)
            .par_iter_mut()
            .zip(offsets.par_windows(2))
            .for_each(|(v, range)| {
                *v = order[range[0]..range[1]].iter().map(|&t| values[t]).sum();
            });
        Ok(())
    }

    pub fn matrix(&self) -> &L::Matrix {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut L::Matrix {
        &mut self.matrix
    }
}
