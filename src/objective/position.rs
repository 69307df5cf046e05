use super::{ElementPattern, ObjectiveFunction, ObjectiveState, Property, PropertyId, UpdateFidelity};
use crate::data_provider::{FaceDataProvider, PlainDataProvider, ProviderGraph, ProviderId, ProviderView};
use crate::error::{Error, Result};
use crate::mesh::MeshDataProvider;

/// `‖p_v - t‖²` for one image vertex.
pub struct VertexPositionObjective {
    state: ObjectiveState,
    plain: ProviderId<PlainDataProvider>,
    vertex: usize,
    pattern: ElementPattern,
    target: [f64; 2],
}

impl VertexPositionObjective {
    pub fn new(
        name: impl Into<String>,
        mesh: &dyn MeshDataProvider,
        plain: ProviderId<PlainDataProvider>,
        vertex: usize,
        target: [f64; 2],
    ) -> Result<Self> {
        if vertex >= mesh.image_vertices_count() {
            return Err(Error::InvalidMesh(format!("vertex {vertex} does not exist")));
        }
        let element = [mesh.x_variable_index(vertex), mesh.y_variable_index(vertex)];
        Ok(Self {
            state: ObjectiveState::new(name),
            plain,
            vertex,
            pattern: ElementPattern::new(2, &[element]),
            target,
        })
    }

    pub fn target(&self) -> [f64; 2] {
        self.target
    }

    pub fn set_target(&mut self, target: [f64; 2]) {
        self.target = target;
    }
}

impl ObjectiveFunction for VertexPositionObjective {
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
        let p = providers.get(self.plain).position(self.vertex);
        let d = [p[0] - self.target[0], p[1] - self.target[1]];
        self.state.set_value(d[0] * d[0] + d[1] * d[1]);
        if fidelity.gradient() {
            let g = [2. * d[0], 2. * d[1]];
            self.pattern
                .accumulate_gradient([&g[..]], self.state.gradient_mut());
        }
        if fidelity.hessian() {
            self.state
                .triplet_values_mut()
                .copy_from_slice(&[2., 0., 0., 2.]);
        }
    }

    fn read_property(&self, id: PropertyId) -> Result<Property> {
        match id {
            PropertyId::Target => Ok(Property::Target(self.target)),
            _ => Err(self.unsupported(id)),
        }
    }

    fn apply_property(&mut self, property: Property) -> Result<()> {
        match property {
            Property::Target(target) => {
                self.target = target;
                Ok(())
            }
            _ => Err(self.unsupported(property.id())),
        }
    }
}

/// `‖b_f - t‖²` where `b_f` is the barycenter of an image face. Used to pin or drag faces.
pub struct FaceBarycenterPositionObjective {
    state: ObjectiveState,
    face: ProviderId<FaceDataProvider>,
    pattern: ElementPattern,
    target: [f64; 2],
}

impl FaceBarycenterPositionObjective {
    pub fn new(
        name: impl Into<String>,
        mesh: &dyn MeshDataProvider,
        providers: &ProviderGraph,
        face: ProviderId<FaceDataProvider>,
        target: [f64; 2],
    ) -> Result<Self> {
        let vertices = providers
            .get(face)
            .ok_or(Error::UnknownNode(face.node().index()))?
            .face();
        let element = [
            mesh.x_variable_index(vertices[0]),
            mesh.x_variable_index(vertices[1]),
            mesh.x_variable_index(vertices[2]),
            mesh.y_variable_index(vertices[0]),
            mesh.y_variable_index(vertices[1]),
            mesh.y_variable_index(vertices[2]),
        ];
        Ok(Self {
            state: ObjectiveState::new(name),
            face,
            pattern: ElementPattern::new(6, &[element]),
            target,
        })
    }

    pub fn face(&self) -> ProviderId<FaceDataProvider> {
        self.face
    }

    pub fn target(&self) -> [f64; 2] {
        self.target
    }

    pub fn set_target(&mut self, target: [f64; 2]) {
        self.target = target;
    }
}

impl ObjectiveFunction for FaceBarycenterPositionObjective {
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
        let b = providers.get(self.face).barycenter();
        let d = [b[0] - self.target[0], b[1] - self.target[1]];
        self.state.set_value(d[0] * d[0] + d[1] * d[1]);
        if fidelity.gradient() {
            let (gx, gy) = (2. * d[0] / 3., 2. * d[1] / 3.);
            let g = [gx, gx, gx, gy, gy, gy];
            self.pattern
                .accumulate_gradient([&g[..]], self.state.gradient_mut());
        }
        if fidelity.hessian() {
            let block = self.state.triplet_values_mut();
            for i in 0..6 {
                for j in 0..6 {
                    block[6 * i + j] = if i / 3 == j / 3 { 2. / 9. } else { 0. };
                }
            }
        }
    }

    fn read_property(&self, id: PropertyId) -> Result<Property> {
        match id {
            PropertyId::Target => Ok(Property::Target(self.target)),
            _ => Err(self.unsupported(id)),
        }
    }

    fn apply_property(&mut self, property: Property) -> Result<()> {
        match property {
            Property::Target(target) => {
                self.target = target;
                Ok(())
            }
            _ => Err(self.unsupported(property.id())),
        }
    }
}
