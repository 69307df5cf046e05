use super::DescentMethod;
use crate::error::Result;
use crate::model::EnergyModel;

/// Steepest descent: `p = -g`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GradientDescent;

impl DescentMethod for GradientDescent {
    fn compute_descent_direction(
        &mut self,
        model: &EnergyModel,
        direction: &mut [f64],
    ) -> Result<()> {
        model.gradient_into(direction);
        for d in direction.iter_mut() {
            *d = -*d;
        }
        Ok(())
    }
}
