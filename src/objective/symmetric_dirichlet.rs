//! Symmetric Dirichlet distortion: `Σ_f A_f (‖J‖² + ‖J⁻¹‖²)`.
//!
//! Writing `J = [[a, b], [c, d]]`, the energy of a face only depends on its signed singular
//! values `s1 = α + β` and `s2 = α - β`, where `α = ‖((a + d) / 2, (c - b) / 2)‖` (conformal part)
//! and `β = ‖((a - d) / 2, (c + b) / 2)‖` (anti-conformal part). The Hessian is assembled in
//! those coordinates.
use super::{
    ElementPattern, HessianMode, ObjectiveFunction, ObjectiveState, Property, PropertyId,
    UpdateFidelity,
};
use crate::data_provider::{PlainDataProvider, ProviderId, ProviderView};
use crate::error::{Error, Result};
use crate::mesh::MeshDataProvider;
use crate::utils::{
    finalize_grad, finalize_hess, jacobian_map, project_to_psd_2x2, ssvd2x2,
};
use pulp::Arch;
use rayon::prelude::*;

const BETA_EPSILON: f64 = 1e-10;
const BETA_THRESHOLD: f64 = 1e-7;
const DIAGONAL_SHIFT: f64 = 1e-6;

pub struct SymmetricDirichlet {
    state: ObjectiveState,
    plain: ProviderId<PlainDataProvider>,
    faces: Vec<[usize; 3]>,
    d1: Vec<[f64; 3]>,
    d2: Vec<[f64; 3]>,
    areas: Vec<f64>,
    pattern: ElementPattern,
    mode: HessianMode,
}

impl SymmetricDirichlet {
    pub fn new(
        name: impl Into<String>,
        mesh: &dyn MeshDataProvider,
        plain: ProviderId<PlainDataProvider>,
    ) -> Result<Self> {
        let faces = mesh.image_faces().to_vec();
        if faces.is_empty() {
            return Err(Error::EmptyMeshData);
        }
        let elements: Vec<[usize; 6]> = faces
            .iter()
            .map(|f| {
                let mut e = [0; 6];
                for (i, &v) in f.iter().enumerate() {
                    e[2 * i] = mesh.x_variable_index(v);
                    e[2 * i + 1] = mesh.y_variable_index(v);
                }
                e
            })
            .collect();
        Ok(Self {
            state: ObjectiveState::new(name),
            plain,
            faces,
            d1: mesh.d1().to_vec(),
            d2: mesh.d2().to_vec(),
            areas: mesh.face_areas().to_vec(),
            pattern: ElementPattern::new(6, &elements),
            mode: HessianMode::default(),
        })
    }

    pub fn hessian_mode(&self) -> HessianMode {
        self.mode
    }

    pub fn set_hessian_mode(&mut self, mode: HessianMode) {
        self.mode = mode;
    }
}

fn dphi(s: f64) -> f64 {
    2. * s - 2. / s.powi(3)
}

fn ddphi(s: f64) -> f64 {
    2. + 6. / s.powi(4)
}

fn outer_add(h: &mut [f64; 16], u: &[f64; 4], v: &[f64; 4], mul: f64) {
    for i in 0..4 {
        for j in 0..4 {
            h[4 * i + j] += mul * u[i] * v[j];
        }
    }
}

// `Mαᵀ n` and `Mβᵀ n`
fn conformal_lift(n: [f64; 2]) -> [f64; 4] {
    [0.5 * n[0], -0.5 * n[1], 0.5 * n[1], 0.5 * n[0]]
}

fn anticonformal_lift(n: [f64; 2]) -> [f64; 4] {
    [0.5 * n[0], 0.5 * n[1], 0.5 * n[1], -0.5 * n[0]]
}

/// Hessian of `‖J‖² + ‖J⁻¹‖²` with respect to the row-major `J`.
pub(crate) fn jacobian_hessian(j: &[f64; 4], mode: HessianMode) -> [f64; 16] {
    let [a, b, c, d] = *j;
    let av = [0.5 * (a + d), 0.5 * (c - b)];
    let bv = [0.5 * (a - d), 0.5 * (c + b)];
    let alpha = av[0].hypot(av[1]);
    let beta = bv[0].hypot(bv[1]);
    let s1 = alpha + beta;
    let s2 = alpha - beta;

    let h_a = dphi(s1) + dphi(s2);
    let h_b = dphi(s1) - dphi(s2);
    let h_aa = ddphi(s1) + ddphi(s2);
    let h_ab = ddphi(s1) - ddphi(s2);
    let h_bb = h_aa;

    let na = [av[0] / alpha, av[1] / alpha];
    let ta = [-na[1], na[0]];
    // At β = 0 the direction of the anti-conformal part is arbitrary and `h_β / β` tends to
    // `h_ββ`.
    let (nb, tb, w_beta) = if beta < BETA_EPSILON {
        ([1., 0.], [0., 1.], h_bb)
    } else {
        let nb = [bv[0] / beta, bv[1] / beta];
        (nb, [-nb[1], nb[0]], h_b / beta)
    };
    let w_alpha = h_a / alpha;

    let da = conformal_lift(na);
    let db = anticonformal_lift(nb);
    let ga = conformal_lift(ta);
    let gb = anticonformal_lift(tb);

    let (k11, k12, k22) = match mode {
        HessianMode::Exact => (h_aa, h_ab, h_bb),
        HessianMode::ConvexConcave => {
            let [k11, k12, k22] = project_to_psd_2x2(h_aa, h_ab, h_bb);
            (k11, k12, k22)
        }
    };

    let mut h = [0.; 16];
    outer_add(&mut h, &da, &da, k11);
    outer_add(&mut h, &da, &db, k12);
    outer_add(&mut h, &db, &da, k12);
    outer_add(&mut h, &db, &db, k22);
    match mode {
        HessianMode::Exact => {
            outer_add(&mut h, &ga, &ga, w_alpha);
            outer_add(&mut h, &gb, &gb, w_beta);
        }
        HessianMode::ConvexConcave => {
            if w_alpha > 0. {
                outer_add(&mut h, &ga, &ga, w_alpha);
            }
            if w_beta > BETA_THRESHOLD {
                outer_add(&mut h, &gb, &gb, w_beta);
            }
        }
    }
    h
}

struct FaceTerms {
    value: f64,
    gradient: [f64; 6],
}

fn face_terms(
    p: [[f64; 2]; 3],
    d1: &[f64; 3],
    d2: &[f64; 3],
    area: f64,
    mode: HessianMode,
    fidelity: UpdateFidelity,
    block: &mut [f64],
) -> FaceTerms {
    let dot = |d: &[f64; 3], k: usize| d[0] * p[0][k] + d[1] * p[1][k] + d[2] * p[2][k];
    let j = [dot(d1, 0), dot(d2, 0), dot(d1, 1), dot(d2, 1)];
    let norm2 = j.iter().map(|v| v * v).sum::<f64>();
    let det = j[0] * j[3] - j[1] * j[2];
    let value = area * (norm2 + norm2 / (det * det));

    let mut gradient = [0.; 6];
    if fidelity.gradient() {
        let dfdx = jacobian_map(*d1, *d2);
        let svd = ssvd2x2(&j);
        let gj = svd.recompose([dphi(svd.s[0]), dphi(svd.s[1])]);
        gradient = finalize_grad(&dfdx, &gj).map(|g| area * g);
        if fidelity.hessian() {
            let hj = jacobian_hessian(&j, mode);
            let mut h = finalize_hess(&dfdx, &hj).map(|v| area * v);
            if mode == HessianMode::ConvexConcave {
                for i in 0..6 {
                    h[7 * i] += DIAGONAL_SHIFT;
                }
            }
            block.copy_from_slice(&h);
        }
    }
    FaceTerms { value, gradient }
}

impl ObjectiveFunction for SymmetricDirichlet {
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
        let mode = self.mode;
        let blocks = self.state.triplet_values_mut();
        let (faces, d1, d2, areas) = (&self.faces, &self.d1, &self.d2, &self.areas);
        let arch = Arch::new();
        let terms: Vec<FaceTerms> = arch.dispatch(|| {
            let mut terms = Vec::new();
            faces
                .par_iter()
                .zip(d1)
                .zip(d2)
                .zip(areas)
                .zip(blocks.par_chunks_mut(36))
                .map(|((((f, d1), d2), &area), block)| {
                    let p = [positions[f[0]], positions[f[1]], positions[f[2]]];
                    face_terms(p, d1, d2, area, mode, fidelity, block)
                })
                .collect_into_vec(&mut terms);
            terms
        });

        self.state
            .set_value(terms.iter().map(|t| t.value).sum::<f64>());
        if fidelity.gradient() {
            self.pattern.accumulate_gradient(
                terms.iter().map(|t| &t.gradient[..]),
                self.state.gradient_mut(),
            );
        }
    }

    fn read_property(&self, id: PropertyId) -> Result<Property> {
        match id {
            PropertyId::HessianMode => Ok(Property::HessianMode(self.mode)),
            _ => Err(self.unsupported(id)),
        }
    }

    fn apply_property(&mut self, property: Property) -> Result<()> {
        match property {
            Property::HessianMode(mode) => {
                self.mode = mode;
                Ok(())
            }
            _ => Err(self.unsupported(property.id())),
        }
    }
}
