use super::edge_pair_angle::{polar_angle_gradient, polar_angle_hessian};
use super::{ElementPattern, ObjectiveFunction, ObjectiveState, UpdateFidelity};
use crate::data_provider::{FaceFanDataProvider, ProviderGraph, ProviderId, ProviderView};
use crate::error::{Error, Result};
use crate::mesh::MeshDataProvider;

// Start and end slot of `[ax, ay, bx, by]` in the corner layout
// `[x(center), x(next), x(previous), y(center), y(next), y(previous)]`.
const CORNER_SLOTS: [(usize, usize); 4] = [(0, 1), (3, 4), (0, 2), (3, 5)];

/// Total image angle around a domain vertex, summed over its face fan.
///
/// A vertex is regular when this is a multiple of `2π` and a cone singularity of index `k / 4`
/// when it is a multiple of `π / 2`, so it is meant to be wrapped in a periodic objective.
pub struct SingularPointObjective {
    state: ObjectiveState,
    fan: ProviderId<FaceFanDataProvider>,
    pattern: ElementPattern,
}

impl SingularPointObjective {
    pub fn new(
        name: impl Into<String>,
        mesh: &dyn MeshDataProvider,
        providers: &ProviderGraph,
        fan: ProviderId<FaceFanDataProvider>,
    ) -> Result<Self> {
        let corners = providers
            .get(fan)
            .ok_or(Error::UnknownNode(fan.node().index()))?
            .fan();
        if corners.is_empty() {
            return Err(Error::EmptyMeshData);
        }
        let elements: Vec<[usize; 6]> = corners
            .iter()
            .map(|c| {
                [
                    mesh.x_variable_index(c.center),
                    mesh.x_variable_index(c.next),
                    mesh.x_variable_index(c.previous),
                    mesh.y_variable_index(c.center),
                    mesh.y_variable_index(c.next),
                    mesh.y_variable_index(c.previous),
                ]
            })
            .collect();
        Ok(Self {
            state: ObjectiveState::new(name),
            fan,
            pattern: ElementPattern::new(6, &elements),
        })
    }
}

fn pull_back(g: &[f64; 4], h: &[f64; 16]) -> ([f64; 6], [f64; 36]) {
    let mut grad = [0.; 6];
    let mut hess = [0.; 36];
    for (c1, &(s1, e1)) in CORNER_SLOTS.iter().enumerate() {
        grad[s1] -= g[c1];
        grad[e1] += g[c1];
        for (c2, &(s2, e2)) in CORNER_SLOTS.iter().enumerate() {
            let v = h[4 * c1 + c2];
            hess[6 * s1 + s2] += v;
            hess[6 * s1 + e2] -= v;
            hess[6 * e1 + s2] -= v;
            hess[6 * e1 + e2] += v;
        }
    }
    (grad, hess)
}

impl ObjectiveFunction for SingularPointObjective {
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
        let fan = providers.get(self.fan);
        self.state.set_value(fan.angle_sum());
        if !fidelity.gradient() {
            return;
        }
        // θ = arg(b) - arg(a)
        let (gradients, hessians): (Vec<[f64; 6]>, Vec<[f64; 36]>) = fan
            .edges()
            .iter()
            .map(|&(a, b)| {
                let ga = polar_angle_gradient(a);
                let gb = polar_angle_gradient(b);
                let ha = polar_angle_hessian(a);
                let hb = polar_angle_hessian(b);
                #[rustfmt::skip]
                let h = [
                    -ha[0], -ha[1], 0., 0.,
                    -ha[2], -ha[3], 0., 0.,
                    0., 0., hb[0], hb[1],
                    0., 0., hb[2], hb[3],
                ];
                pull_back(&[-ga[0], -ga[1], gb[0], gb[1]], &h)
            })
            .unzip();
        self.pattern.accumulate_gradient(
            gradients.iter().map(|g| &g[..]),
            self.state.gradient_mut(),
        );
        if fidelity.hessian() {
            for (dst, h) in self
                .state
                .triplet_values_mut()
                .chunks_mut(36)
                .zip(&hessians)
            {
                dst.copy_from_slice(h);
            }
        }
    }
}
