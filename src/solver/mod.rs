//! Linear solvers for the Newton system `H p = -g`.
use crate::error::Result;
use crate::sparse::SparseLayout;

mod cholesky;
mod conjugate_gradient;
mod lu;

pub use cholesky::CholeskySolver;
pub use conjugate_gradient::ConjugateGradientSolver;
pub use lu::LuSolver;

/// Sparse linear solver over a fixed pattern.
pub trait LinearSolver: Send {
    type Layout: SparseLayout;

    /// Symbolic analysis. Called once per pattern, before any [`solve`](Self::solve).
    fn analyze_pattern(&mut self, matrix: &<Self::Layout as SparseLayout>::Matrix) -> Result<()>;

    /// Solve `A x = b`.
    fn solve(
        &mut self,
        matrix: &<Self::Layout as SparseLayout>::Matrix,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<()>;
}

/// Backend of the Newton method built by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SolverKind {
    #[default]
    Cholesky,
    Lu,
    ConjugateGradient,
}
