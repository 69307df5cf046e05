use super::LinearSolver;
use crate::error::{Error, Result};
use crate::sparse::ColMajor;
use faer::linalg::solvers::Solve;
use faer::reborrow::Reborrow;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::SparseColMat;
use faer::{ColMut, Side};

/// Sparse `LLᵀ` reusing the symbolic factorization of the pattern. Only the lower triangle is
/// read.
#[derive(Default)]
pub struct CholeskySolver {
    symbolic: Option<SymbolicLlt<usize>>,
}

impl CholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for CholeskySolver {
    type Layout = ColMajor;

    fn analyze_pattern(&mut self, matrix: &SparseColMat<usize, f64>) -> Result<()> {
        let symbolic = SymbolicLlt::try_new(matrix.symbolic(), Side::Lower)
            .map_err(|e| Error::Factorization(format!("{e:?}")))?;
        self.symbolic = Some(symbolic);
        Ok(())
    }

    fn solve(&mut self, matrix: &SparseColMat<usize, f64>, b: &[f64], x: &mut [f64]) -> Result<()> {
        if self.symbolic.is_none() {
            self.analyze_pattern(matrix)?;
        }
        let Some(symbolic) = &self.symbolic else {
            return Err(Error::NotInitialized);
        };
        let llt = Llt::try_new_with_symbolic(symbolic.clone(), matrix.rb(), Side::Lower)
            .map_err(|e| Error::Factorization(format!("{e:?}")))?;
        x.copy_from_slice(b);
        llt.solve_in_place(ColMut::from_slice_mut(x).as_mat_mut());
        if x.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(Error::Solve("non finite Cholesky solution".into()))
        }
    }
}
