//! Descent methods and the background worker driving them.
use crate::error::Result;
use crate::model::EnergyModel;
use crate::objective::UpdateFidelity;
use std::time::Duration;

mod gradient_descent;
mod iterative;
mod line_search;
mod newton;

pub use gradient_descent::GradientDescent;
pub use iterative::{IterativeMethod, ThreadState};
pub use line_search::{compute_max_step_from_singularities, line_search, LineSearchOutcome};
pub use newton::NewtonMethod;

/// User values for the iterative methods.
#[derive(Clone, Debug)]
pub struct IterativeOptions {
    /// Cap every step below the first face inversion
    pub flip_avoiding_line_search: bool,
    /// Maximum number of step halvings
    pub max_backtracking_iterations: usize,
    /// Fraction of the inversion-free step taken as initial step
    pub step_cap: f64,
    /// Gradient norm under which the worker considers itself converged and idles
    pub idle_tolerance: f64,
    /// Sleep between two iterations once converged
    pub idle_interval: Duration,
}

impl Default for IterativeOptions {
    fn default() -> Self {
        Self {
            flip_avoiding_line_search: true,
            max_backtracking_iterations: 12,
            step_cap: 0.8,
            idle_tolerance: 1e-10,
            idle_interval: Duration::from_millis(10),
        }
    }
}

/// Direction computation of an iterative method.
pub trait DescentMethod: Send {
    /// Fill `direction` from the model, freshly updated with full fidelity.
    fn compute_descent_direction(
        &mut self,
        model: &EnergyModel,
        direction: &mut [f64],
    ) -> Result<()>;
}

impl<D: DescentMethod + ?Sized> DescentMethod for Box<D> {
    fn compute_descent_direction(
        &mut self,
        model: &EnergyModel,
        direction: &mut [f64],
    ) -> Result<()> {
        (**self).compute_descent_direction(model, direction)
    }
}

/// Summary of one iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationReport {
    pub energy_before: f64,
    pub energy_after: f64,
    pub gradient_norm: f64,
    pub step: f64,
}

impl IterationReport {
    /// Whether `x` moved.
    pub fn committed(&self) -> bool {
        self.step > 0.
    }
}

/// One synchronous iteration at `x`: full update, descent direction, line search and commit.
pub fn run_iteration<D: DescentMethod + ?Sized>(
    model: &mut EnergyModel,
    method: &mut D,
    x: &mut [f64],
    options: &IterativeOptions,
) -> Result<IterationReport> {
    model.update(x, UpdateFidelity::Hessian)?;
    let energy_before = model.value();
    let mut gradient = vec![0.; x.len()];
    model.gradient_into(&mut gradient);
    let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();

    let mut direction = vec![0.; x.len()];
    method.compute_descent_direction(model, &mut direction)?;
    let outcome = line_search(model, x, &direction, energy_before, options)?;
    log::debug!(
        "iteration: energy {energy_before:e} -> {:e}, step {:e}, |g| {gradient_norm:e}",
        outcome.value,
        outcome.step
    );
    Ok(IterationReport {
        energy_before,
        energy_after: outcome.value,
        gradient_norm,
        step: outcome.step,
    })
}
