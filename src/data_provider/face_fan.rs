use super::{PlainDataProvider, ProviderId, ProviderView};
use crate::graph::NodeId;
use crate::mesh::FaceFan;

/// Corner angles around one domain vertex, measured in the image.
///
/// For every corner, `edges` holds `(next - center, previous - center)` and the angle is the
/// signed angle swept from the first to the second.
#[derive(Clone, Debug)]
pub struct FaceFanDataProvider {
    deps: [NodeId; 1],
    plain: ProviderId<PlainDataProvider>,
    fan: FaceFan,
    edges: Vec<([f64; 2], [f64; 2])>,
    angles: Vec<f64>,
    angle_sum: f64,
}

impl FaceFanDataProvider {
    pub fn new(plain: ProviderId<PlainDataProvider>, fan: FaceFan) -> Self {
        let n = fan.len();
        Self {
            deps: [plain.node()],
            plain,
            fan,
            edges: vec![([0.; 2], [0.; 2]); n],
            angles: vec![0.; n],
            angle_sum: 0.,
        }
    }

    pub fn fan(&self) -> &FaceFan {
        &self.fan
    }

    pub fn edges(&self) -> &[([f64; 2], [f64; 2])] {
        &self.edges
    }

    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn angle_sum(&self) -> f64 {
        self.angle_sum
    }

    pub(super) fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    pub(super) fn update(&mut self, deps: &ProviderView<'_, '_>) {
        let plain = deps.get(self.plain);
        self.angle_sum = 0.;
        for ((corner, edges), angle) in self
            .fan
            .iter()
            .zip(self.edges.iter_mut())
            .zip(self.angles.iter_mut())
        {
            let c = plain.position(corner.center);
            let n = plain.position(corner.next);
            let p = plain.position(corner.previous);
            let a = [n[0] - c[0], n[1] - c[1]];
            let b = [p[0] - c[0], p[1] - c[1]];
            *edges = (a, b);
            *angle = (a[0] * b[1] - a[1] * b[0]).atan2(a[0] * b[0] + a[1] * b[1]);
            self.angle_sum += *angle;
        }
    }
}
