use super::{ElementPattern, ObjectiveFunction, ObjectiveState, Property, PropertyId, UpdateFidelity};
use crate::data_provider::{EdgePairDataProvider, ProviderGraph, ProviderId, ProviderView};
use crate::error::{Error, Result};
use crate::utils::project_to_psd;

/// `(‖e1‖² - ‖e2‖²)²`: both image copies of a seam edge should have the same length.
pub struct EdgePairLengthObjective {
    state: ObjectiveState,
    provider: ProviderId<EdgePairDataProvider>,
    pattern: ElementPattern,
    project_to_psd: bool,
}

impl EdgePairLengthObjective {
    pub fn new(
        name: impl Into<String>,
        providers: &ProviderGraph,
        provider: ProviderId<EdgePairDataProvider>,
    ) -> Result<Self> {
        let indices = *providers
            .get(provider)
            .ok_or(Error::UnknownNode(provider.node().index()))?
            .indices();
        Ok(Self {
            state: ObjectiveState::new(name),
            provider,
            pattern: ElementPattern::new(8, &[indices]),
            project_to_psd: true,
        })
    }
}

impl ObjectiveFunction for EdgePairLengthObjective {
    fn state(&self) -> &ObjectiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectiveState {
        &mut self.state
    }

    fn initialize(&mut self) -> Result<()> {
        self.pattern.declare(&mut self.state);
        Ok(())
    }

    fn update(&mut self, _x: &[f64], providers: &ProviderView<'_, '_>, fidelity: UpdateFidelity) {
        let pair = providers.get(self.provider);
        let s = pair.edge1_squared_norm() - pair.edge2_squared_norm();
        self.state.set_value(s * s);

        let e1 = pair.edge1();
        let e2 = pair.edge2();
        let ds = [2. * e1[0], 2. * e1[1], -2. * e2[0], -2. * e2[1]];
        if fidelity.gradient() {
            let g = EdgePairDataProvider::pull_back_gradient(&ds.map(|d| 2. * s * d));
            self.pattern
                .accumulate_gradient([&g[..]], self.state.gradient_mut());
        }
        if fidelity.hessian() {
            let curvature = [2., 2., -2., -2.];
            let mut h = [0.; 16];
            for i in 0..4 {
                for j in 0..4 {
                    h[4 * i + j] = 2. * ds[i] * ds[j];
                }
                h[5 * i] += 2. * s * curvature[i];
            }
            let mut block = EdgePairDataProvider::pull_back_hessian(&h);
            if self.project_to_psd {
                project_to_psd(&mut block, 8);
            }
            self.state.triplet_values_mut().copy_from_slice(&block);
        }
    }

    fn read_property(&self, id: PropertyId) -> Result<Property> {
        match id {
            PropertyId::ProjectToPsd => Ok(Property::ProjectToPsd(self.project_to_psd)),
            _ => Err(self.unsupported(id)),
        }
    }

    fn apply_property(&mut self, property: Property) -> Result<()> {
        match property {
            Property::ProjectToPsd(project) => {
                self.project_to_psd = project;
                Ok(())
            }
            _ => Err(self.unsupported(property.id())),
        }
    }
}
