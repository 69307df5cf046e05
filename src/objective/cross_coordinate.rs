use super::{ObjectiveFunction, ObjectiveState, UpdateFidelity};
use crate::data_provider::{
    CrossCoordinateDiffDataProvider, ProviderGraph, ProviderId, ProviderView,
};
use crate::error::{Error, Result};

/// `f(x) = (x[a] - x[b]) - (x[c] - x[d])`: the mismatch of one coordinate difference across a
/// seam.
pub struct CrossCoordinateObjective {
    state: ObjectiveState,
    provider: ProviderId<CrossCoordinateDiffDataProvider>,
    terms: [(usize, f64); 4],
    // Linear: computed once.
    gradient: Vec<f64>,
}

impl CrossCoordinateObjective {
    pub fn new(
        name: impl Into<String>,
        providers: &ProviderGraph,
        provider: ProviderId<CrossCoordinateDiffDataProvider>,
    ) -> Result<Self> {
        let terms = *providers
            .get(provider)
            .ok_or(Error::UnknownNode(provider.node().index()))?
            .terms();
        Ok(Self {
            state: ObjectiveState::new(name),
            provider,
            terms,
            gradient: Vec::new(),
        })
    }
}

impl ObjectiveFunction for CrossCoordinateObjective {
    fn state(&self) -> &ObjectiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectiveState {
        &mut self.state
    }

    fn initialize(&mut self) -> Result<()> {
        let mut variables: Vec<usize> = self.terms.iter().map(|t| t.0).collect();
        variables.sort_unstable();
        variables.dedup();
        self.gradient = vec![0.; variables.len()];
        for &(index, sign) in &self.terms {
            // Every term index is in `variables`.
            let local = variables.binary_search(&index).unwrap();
            self.gradient[local] += sign;
        }
        self.state.declare(variables, Vec::new());
        Ok(())
    }

    fn update(&mut self, _x: &[f64], providers: &ProviderView<'_, '_>, fidelity: UpdateFidelity) {
        self.state.set_value(providers.get(self.provider).diff());
        if fidelity.gradient() {
            self.state.gradient_mut().copy_from_slice(&self.gradient);
        }
    }
}
