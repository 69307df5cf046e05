use super::DescentMethod;
use crate::error::Result;
use crate::model::EnergyModel;
use crate::solver::LinearSolver;
use crate::sparse::{HessianPattern, SparseLayout};

/// Newton direction: solves `H p = -g` with the injected solver.
///
/// The Hessian pattern is analyzed again, and the solver symbolic factorization redone, every
/// time the model revision changes. When the solve fails the direction falls back to `-g`.
pub struct NewtonMethod<S: LinearSolver> {
    solver: S,
    pattern: Option<HessianPattern<S::Layout>>,
    revision: Option<u64>,
    fixed: Vec<usize>,
    gradient: Vec<f64>,
}

impl<S: LinearSolver> NewtonMethod<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            pattern: None,
            revision: None,
            fixed: Vec::new(),
            gradient: Vec::new(),
        }
    }

    /// Keep the given variables at their current value.
    pub fn with_fixed_variables(mut self, fixed: Vec<usize>) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn set_fixed_variables(&mut self, fixed: Vec<usize>) {
        self.fixed = fixed;
    }

    pub fn fixed_variables(&self) -> &[usize] {
        &self.fixed
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    fn steepest_descent(&self, direction: &mut [f64]) {
        for (d, g) in direction.iter_mut().zip(&self.gradient) {
            *d = -g;
        }
        for &i in &self.fixed {
            direction[i] = 0.;
        }
    }
}

impl<S: LinearSolver> DescentMethod for NewtonMethod<S> {
    fn compute_descent_direction(
        &mut self,
        model: &EnergyModel,
        direction: &mut [f64],
    ) -> Result<()> {
        let n = model.variables_count();
        if self.revision != Some(model.revision()) {
            let pattern = HessianPattern::analyze(n, &model.hessian_entries())?;
            self.solver.analyze_pattern(pattern.matrix())?;
            log::debug!(
                "newton: analyzed pattern of revision {} ({} non zeros)",
                model.revision(),
                pattern.nnz()
            );
            self.pattern = Some(pattern);
            self.revision = Some(model.revision());
        }
        self.gradient.resize(n, 0.);
        model.gradient_into(&mut self.gradient);

        let Some(pattern) = self.pattern.as_mut() else {
            self.steepest_descent(direction);
            return Ok(());
        };
        pattern.refill(model.hessian_values())?;
        let mut rhs: Vec<f64> = self.gradient.iter().map(|g| -g).collect();
        <S::Layout as SparseLayout>::fix_variables(pattern.matrix_mut(), &mut rhs, &self.fixed);
        if let Err(e) = self.solver.solve(pattern.matrix(), &rhs, direction) {
            log::warn!("newton: {e}, falling back to steepest descent");
            self.steepest_descent(direction);
        }
        Ok(())
    }
}
