use super::{
    positive, ElementPattern, ObjectiveFunction, ObjectiveState, Property, PropertyId,
    UpdateFidelity,
};
use crate::data_provider::{PlainDataProvider, ProviderId, ProviderView};
use crate::error::{Error, Result};
use crate::mesh::MeshDataProvider;
use crate::utils::project_to_psd;
use pulp::Arch;
use rayon::prelude::*;

/// Seam opening cost: `Σ L_i n_i / (n_i + δ)` where `n_i` is the squared distance between the
/// two image copies of a domain vertex and `L_i` the rest length they carry.
///
/// Close pairs cost almost nothing, far pairs cost almost `L_i`, so the energy counts the length
/// of the cuts. `δ` controls how soft the transition is.
pub struct Separation {
    state: ObjectiveState,
    plain: ProviderId<PlainDataProvider>,
    pairs: Vec<(usize, usize)>,
    lengths: Vec<f64>,
    pattern: ElementPattern,
    delta: f64,
    project_to_psd: bool,
}

impl Separation {
    pub fn new(
        name: impl Into<String>,
        mesh: &dyn MeshDataProvider,
        plain: ProviderId<PlainDataProvider>,
        delta: f64,
    ) -> Result<Self> {
        if mesh.image_vertices_count() == 0 {
            return Err(Error::EmptyMeshData);
        }
        let pairs = mesh.corresponding_vertex_pairs().to_vec();
        let elements: Vec<[usize; 4]> = pairs
            .iter()
            .map(|&(p, q)| {
                [
                    mesh.x_variable_index(p),
                    mesh.x_variable_index(q),
                    mesh.y_variable_index(p),
                    mesh.y_variable_index(q),
                ]
            })
            .collect();
        Ok(Self {
            state: ObjectiveState::new(name),
            plain,
            pairs,
            lengths: mesh.corresponding_vertex_pairs_edge_length().to_vec(),
            pattern: ElementPattern::new(4, &elements),
            delta: positive("delta", delta)?,
            project_to_psd: true,
        })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }
}

fn pair_terms(
    p: [f64; 2],
    q: [f64; 2],
    length: f64,
    delta: f64,
    project: bool,
    fidelity: UpdateFidelity,
    block: &mut [f64],
) -> (f64, [f64; 4]) {
    let dx = p[0] - q[0];
    let dy = p[1] - q[1];
    let n = dx * dx + dy * dy;
    let value = length * n / (n + delta);

    let mut gradient = [0.; 4];
    if fidelity.gradient() {
        let f_n = length * delta / (n + delta).powi(2);
        let dn = [2. * dx, -2. * dx, 2. * dy, -2. * dy];
        gradient = dn.map(|d| f_n * d);
        if fidelity.hessian() {
            let f_nn = -2. * length * delta / (n + delta).powi(3);
            let mut h = [0.; 16];
            for i in 0..4 {
                for j in 0..4 {
                    h[4 * i + j] = f_nn * dn[i] * dn[j];
                }
            }
            // ∇²n
            for (i, j, v) in [(0, 0, 2.), (0, 1, -2.), (1, 0, -2.), (1, 1, 2.)] {
                h[4 * i + j] += f_n * v;
                h[4 * (i + 2) + j + 2] += f_n * v;
            }
            if project {
                project_to_psd(&mut h, 4);
            }
            block.copy_from_slice(&h);
        }
    }
    (value, gradient)
}

impl ObjectiveFunction for Separation {
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
        let positions = providers.get(self.plain).positions();
        let (delta, project) = (self.delta, self.project_to_psd);
        let blocks = self.state.triplet_values_mut();
        let (pairs, lengths) = (&self.pairs, &self.lengths);
        let arch = Arch::new();
        let (values, gradients): (Vec<f64>, Vec<[f64; 4]>) = arch.dispatch(|| {
            pairs
                .par_iter()
                .zip(lengths)
                .zip(blocks.par_chunks_mut(16))
                .map(|((&(p, q), &length), block)| {
                    pair_terms(
                        positions[p],
                        positions[q],
                        length,
                        delta,
                        project,
                        fidelity,
                        block,
                    )
                })
                .unzip()
        });

        self.state.set_value(values.iter().sum());
        if fidelity.gradient() {
            self.pattern.accumulate_gradient(
                gradients.iter().map(|g| &g[..]),
                self.state.gradient_mut(),
            );
        }
    }

    fn read_property(&self, id: PropertyId) -> Result<Property> {
        match id {
            PropertyId::Delta => Ok(Property::Delta(self.delta)),
            PropertyId::ProjectToPsd => Ok(Property::ProjectToPsd(self.project_to_psd)),
            _ => Err(self.unsupported(id)),
        }
    }

    fn apply_property(&mut self, property: Property) -> Result<()> {
        match property {
            Property::Delta(delta) => {
                self.delta = positive("delta", delta)?;
                Ok(())
            }
            Property::ProjectToPsd(project) => {
                self.project_to_psd = project;
                Ok(())
            }
            _ => Err(self.unsupported(property.id())),
        }
    }
}
