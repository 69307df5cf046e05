use super::LinearSolver;
use crate::error::{Error, Result};
use crate::sparse::ColMajor;
use faer::linalg::solvers::Solve;
use faer::reborrow::Reborrow;
use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
use faer::sparse::SparseColMat;
use faer::ColMut;

/// Sparse LU with partial pivoting. Slower than [`CholeskySolver`](super::CholeskySolver) but
/// handles indefinite Hessians.
#[derive(Default)]
pub struct LuSolver {
    symbolic: Option<SymbolicLu<usize>>,
}

impl LuSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for LuSolver {
    type Layout = ColMajor;

    fn analyze_pattern(&mut self, matrix: &SparseColMat<usize, f64>) -> Result<()> {
        let symbolic = SymbolicLu::try_new(matrix.symbolic())
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
        let lu = Lu::try_new_with_symbolic(symbolic.clone(), matrix.rb())
            .map_err(|e| Error::Factorization(format!("{e:?}")))?;
        x.copy_from_slice(b);
        lu.solve_in_place(ColMut::from_slice_mut(x).as_mat_mut());
        if x.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(Error::Solve("non finite LU solution".into()))
        }
    }
}
