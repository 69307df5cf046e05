use super::{PlainDataProvider, ProviderId, ProviderView};
use crate::graph::NodeId;
use crate::utils::calculate_barycenter;

/// Corner positions and barycenter of one image face.
#[derive(Clone, Debug)]
pub struct FaceDataProvider {
    deps: [NodeId; 1],
    plain: ProviderId<PlainDataProvider>,
    face: [usize; 3],
    positions: [[f64; 2]; 3],
    barycenter: [f64; 2],
}

impl FaceDataProvider {
    pub fn new(plain: ProviderId<PlainDataProvider>, face: [usize; 3]) -> Self {
        Self {
            deps: [plain.node()],
            plain,
            face,
            positions: [[0.; 2]; 3],
            barycenter: [0.; 2],
        }
    }

    pub fn face(&self) -> [usize; 3] {
        self.face
    }

    pub fn positions(&self) -> &[[f64; 2]; 3] {
        &self.positions
    }

    pub fn barycenter(&self) -> [f64; 2] {
        self.barycenter
    }

    pub(super) fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    pub(super) fn update(&mut self, deps: &ProviderView<'_, '_>) {
        let plain = deps.get(self.plain);
        for (p, &v) in self.positions.iter_mut().zip(&self.face) {
            *p = plain.position(v);
        }
        if let Ok(barycenter) = calculate_barycenter(plain.positions(), &self.face) {
            self.barycenter = barycenter;
        }
    }
}
