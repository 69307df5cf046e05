use crate::mesh::{EdgePairDescriptor, MeshDataProvider};

// Start and end slot of each edge component, in the order `[dx1, dy1, dx2, dy2]`.
const COMPONENT_SLOTS: [(usize, usize); 4] = [(0, 1), (4, 5), (2, 3), (6, 7)];

/// Shared algebra of the two image edges of a seam.
///
/// The variable layout is fixed at construction:
/// `[x(e1.0), x(e1.1), x(e2.0), x(e2.1), y(e1.0), y(e1.1), y(e2.0), y(e2.1)]`.
/// Edge vectors go from `.0` to `.1`.
#[derive(Clone, Debug)]
pub struct EdgePairDataProvider {
    descriptor: EdgePairDescriptor,
    indices: [usize; 8],
    edge1: [f64; 2],
    edge2: [f64; 2],
    edge1_square: [f64; 2],
    edge2_square: [f64; 2],
    edge1_squared_norm: f64,
    edge2_squared_norm: f64,
    edge1_quadrupled_norm: f64,
    edge2_quadrupled_norm: f64,
}

impl EdgePairDataProvider {
    pub fn new(mesh: &dyn MeshDataProvider, descriptor: EdgePairDescriptor) -> Self {
        let EdgePairDescriptor(e1, e2) = descriptor;
        let indices = [
            mesh.x_variable_index(e1.0),
            mesh.x_variable_index(e1.1),
            mesh.x_variable_index(e2.0),
            mesh.x_variable_index(e2.1),
            mesh.y_variable_index(e1.0),
            mesh.y_variable_index(e1.1),
            mesh.y_variable_index(e2.0),
            mesh.y_variable_index(e2.1),
        ];
        Self {
            descriptor,
            indices,
            edge1: [0.; 2],
            edge2: [0.; 2],
            edge1_square: [0.; 2],
            edge2_square: [0.; 2],
            edge1_squared_norm: 0.,
            edge2_squared_norm: 0.,
            edge1_quadrupled_norm: 0.,
            edge2_quadrupled_norm: 0.,
        }
    }

    pub fn descriptor(&self) -> EdgePairDescriptor {
        self.descriptor
    }

    pub fn indices(&self) -> &[usize; 8] {
        &self.indices
    }

    pub fn edge1(&self) -> [f64; 2] {
        self.edge1
    }

    pub fn edge2(&self) -> [f64; 2] {
        self.edge2
    }

    pub fn edge1_x_diff(&self) -> f64 {
        self.edge1[0]
    }

    pub fn edge1_y_diff(&self) -> f64 {
        self.edge1[1]
    }

    pub fn edge2_x_diff(&self) -> f64 {
        self.edge2[0]
    }

    pub fn edge2_y_diff(&self) -> f64 {
        self.edge2[1]
    }

    pub fn edge1_x_square_diff(&self) -> f64 {
        self.edge1_square[0]
    }

    pub fn edge1_y_square_diff(&self) -> f64 {
        self.edge1_square[1]
    }

    pub fn edge2_x_square_diff(&self) -> f64 {
        self.edge2_square[0]
    }

    pub fn edge2_y_square_diff(&self) -> f64 {
        self.edge2_square[1]
    }

    pub fn edge1_squared_norm(&self) -> f64 {
        self.edge1_squared_norm
    }

    pub fn edge2_squared_norm(&self) -> f64 {
        self.edge2_squared_norm
    }

    /// `‖e1‖⁴`
    pub fn edge1_quadrupled_norm(&self) -> f64 {
        self.edge1_quadrupled_norm
    }

    /// `‖e2‖⁴`
    pub fn edge2_quadrupled_norm(&self) -> f64 {
        self.edge2_quadrupled_norm
    }

    /// Map a gradient with respect to `[dx1, dy1, dx2, dy2]` onto the eight variables.
    pub fn pull_back_gradient(g: &[f64; 4]) -> [f64; 8] {
        let mut res = [0.; 8];
        for (c, &(start, end)) in COMPONENT_SLOTS.iter().enumerate() {
            res[start] -= g[c];
            res[end] += g[c];
        }
        res
    }

    /// Map a row-major 4x4 Hessian with respect to `[dx1, dy1, dx2, dy2]` onto the eight
    /// variables, as a row-major 8x8 block.
    pub fn pull_back_hessian(h: &[f64; 16]) -> [f64; 64] {
        let mut res = [0.; 64];
        for (c1, &(s1, e1)) in COMPONENT_SLOTS.iter().enumerate() {
            for (c2, &(s2, e2)) in COMPONENT_SLOTS.iter().enumerate() {
                let v = h[4 * c1 + c2];
                res[8 * s1 + s2] += v;
                res[8 * s1 + e2] -= v;
                res[8 * e1 + s2] -= v;
                res[8 * e1 + e2] += v;
            }
        }
        res
    }

    pub(super) fn update(&mut self, x: &[f64]) {
        let i = &self.indices;
        self.edge1 = [x[i[1]] - x[i[0]], x[i[5]] - x[i[4]]];
        self.edge2 = [x[i[3]] - x[i[2]], x[i[7]] - x[i[6]]];
        self.edge1_square = [self.edge1[0].powi(2), self.edge1[1].powi(2)];
        self.edge2_square = [self.edge2[0].powi(2), self.edge2[1].powi(2)];
        self.edge1_squared_norm = self.edge1_square[0] + self.edge1_square[1];
        self.edge2_squared_norm = self.edge2_square[0] + self.edge2_square[1];
        self.edge1_quadrupled_norm = self.edge1_squared_norm.powi(2);
        self.edge2_quadrupled_norm = self.edge2_squared_norm.powi(2);
    }
}
