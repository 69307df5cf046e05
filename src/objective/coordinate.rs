use super::{ObjectiveFunction, ObjectiveState, UpdateFidelity};
use crate::data_provider::{CoordinateDataProvider, ProviderGraph, ProviderId, ProviderView};
use crate::error::{Error, Result};

/// `f(x) = x[i]`. Mostly useful as the inner function of a composite objective.
pub struct CoordinateObjective {
    state: ObjectiveState,
    provider: ProviderId<CoordinateDataProvider>,
    index: usize,
}

impl CoordinateObjective {
    pub fn new(
        name: impl Into<String>,
        providers: &ProviderGraph,
        provider: ProviderId<CoordinateDataProvider>,
    ) -> Result<Self> {
        let index = providers
            .get(provider)
            .ok_or(Error::UnknownNode(provider.node().index()))?
            .index();
        Ok(Self {
            state: ObjectiveState::new(name),
            provider,
            index,
        })
    }
}

impl ObjectiveFunction for CoordinateObjective {
    fn state(&self) -> &ObjectiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectiveState {
        &mut self.state
    }

    fn initialize(&mut self) -> Result<()> {
        self.state.declare(vec![self.index], Vec::new());
        Ok(())
    }

    fn update(&mut self, _x: &[f64], providers: &ProviderView<'_, '_>, fidelity: UpdateFidelity) {
        self.state.set_value(providers.get(self.provider).value());
        if fidelity.gradient() {
            self.state.gradient_mut()[0] = 1.;
        }
    }
}
