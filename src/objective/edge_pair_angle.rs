use super::{ElementPattern, ObjectiveFunction, ObjectiveState, UpdateFidelity};
use crate::data_provider::{EdgePairDataProvider, ProviderGraph, ProviderId, ProviderView};
use crate::error::{Error, Result};

/// Signed angle between the two image edges of a seam: `θ(e1) - θ(e2)`, wrapped to `(-π, π]`.
///
/// Seamlessness asks for this angle to be a multiple of `π/2`, so it is usually wrapped in a
/// periodic objective.
pub struct EdgePairAngleObjective {
    state: ObjectiveState,
    provider: ProviderId<EdgePairDataProvider>,
    pattern: ElementPattern,
}

impl EdgePairAngleObjective {
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
        })
    }
}

/// Hessian of `atan2(v.y, v.x)` with respect to `v`, row-major.
pub(crate) fn polar_angle_hessian(v: [f64; 2]) -> [f64; 4] {
    let r4 = (v[0] * v[0] + v[1] * v[1]).powi(2);
    let xy = 2. * v[0] * v[1] / r4;
    let d = (v[1] * v[1] - v[0] * v[0]) / r4;
    [xy, d, d, -xy]
}

/// Gradient of `atan2(v.y, v.x)` with respect to `v`.
pub(crate) fn polar_angle_gradient(v: [f64; 2]) -> [f64; 2] {
    let r2 = v[0] * v[0] + v[1] * v[1];
    [-v[1] / r2, v[0] / r2]
}

impl ObjectiveFunction for EdgePairAngleObjective {
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
        let e1 = pair.edge1();
        let e2 = pair.edge2();
        let cross = e2[0] * e1[1] - e2[1] * e1[0];
        let dot = e2[0] * e1[0] + e2[1] * e1[1];
        self.state.set_value(cross.atan2(dot));

        if fidelity.gradient() {
            let g1 = polar_angle_gradient(e1);
            let g2 = polar_angle_gradient(e2);
            let g = EdgePairDataProvider::pull_back_gradient(&[g1[0], g1[1], -g2[0], -g2[1]]);
            self.pattern
                .accumulate_gradient([&g[..]], self.state.gradient_mut());
        }
        if fidelity.hessian() {
            let h1 = polar_angle_hessian(e1);
            let h2 = polar_angle_hessian(e2);
            #[rustfmt::skip]
            let h = [
                h1[0], h1[1], 0., 0.,
                h1[2], h1[3], 0., 0.,
                0., 0., -h2[0], -h2[1],
                0., 0., -h2[2], -h2[3],
            ];
            let block = EdgePairDataProvider::pull_back_hessian(&h);
            self.state.triplet_values_mut().copy_from_slice(&block);
        }
    }
}
