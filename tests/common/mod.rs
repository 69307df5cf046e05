#![allow(dead_code)]
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uvcut_rs::data_provider::{PlainDataProvider, ProviderId};
use uvcut_rs::mesh::{MeshDataProvider, TriangleSoup};
use uvcut_rs::utils::{approximate_gradient, approximate_hessian};
use uvcut_rs::{EnergyModel, ObjectiveFunction, UpdateFidelity};

pub type Mesh = (Vec<[f64; 3]>, Vec<[usize; 3]>);

/// Two triangles sharing the edge `1 - 2`, the second one slightly lifted.
pub fn two_triangles() -> Mesh {
    (
        vec![[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [1., 1., 0.3]],
        vec![[0, 1, 2], [1, 3, 2]],
    )
}

pub fn equilateral_triangle() -> Mesh {
    (
        vec![[0., 0., 0.], [1., 0., 0.], [0.5, 3f64.sqrt() / 2., 0.]],
        vec![[0, 1, 2]],
    )
}

/// Two by one grid of squares, each split in two.
pub fn strip() -> Mesh {
    (
        vec![
            [0., 0., 0.],
            [1., 0., 0.],
            [2., 0., 0.1],
            [0., 1., 0.],
            [1., 1., 0.],
            [2., 1., -0.1],
        ],
        vec![[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4]],
    )
}

/// Projection on the `xy` plane.
pub fn planar_uv(vertices: &[[f64; 3]]) -> Vec<[f64; 2]> {
    vertices.iter().map(|v| [v[0], v[1]]).collect()
}

pub struct Fixture {
    pub mesh: TriangleSoup,
    pub model: EnergyModel,
    pub plain: ProviderId<PlainDataProvider>,
    pub x: Vec<f64>,
}

/// Soup of `mesh` with a model holding only the plain provider, and the planar parameterization.
pub fn fixture((vertices, faces): Mesh) -> Fixture {
    let mesh = TriangleSoup::new(&vertices, &faces).unwrap();
    let mut model = EnergyModel::from_mesh(&mesh);
    let plain = model
        .providers_mut()
        .insert(PlainDataProvider::new(mesh.image_vertices_count()));
    let x = mesh.image_from_domain_uv(&planar_uv(&vertices)).unwrap();
    Fixture {
        mesh,
        model,
        plain,
        x,
    }
}

pub fn perturbed(x: &[f64], seed: u64, amplitude: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    x.iter()
        .map(|v| v + rng.gen_range(-amplitude..amplitude))
        .collect()
}

/// Rotate the image of `face` around its barycenter.
pub fn rotate_face(mesh: &TriangleSoup, x: &mut [f64], face: usize, angle: f64) {
    let n = mesh.image_vertices_count();
    let vertices = mesh.image_faces()[face];
    let cx = vertices.iter().map(|&v| x[v]).sum::<f64>() / 3.;
    let cy = vertices.iter().map(|&v| x[n + v]).sum::<f64>() / 3.;
    let (s, c) = angle.sin_cos();
    for v in vertices {
        let (dx, dy) = (x[v] - cx, x[n + v] - cy);
        x[v] = cx + c * dx - s * dy;
        x[n + v] = cy + s * dx + c * dy;
    }
}

/// Doubled signed areas of the image faces.
pub fn signed_areas(mesh: &TriangleSoup, x: &[f64]) -> Vec<f64> {
    let n = mesh.image_vertices_count();
    mesh.image_faces()
        .iter()
        .map(|f| {
            let (x1, y1) = (x[f[1]] - x[f[0]], x[n + f[1]] - x[n + f[0]]);
            let (x2, y2) = (x[f[2]] - x[f[0]], x[n + f[2]] - x[n + f[0]]);
            x1 * y2 - y1 * x2
        })
        .collect()
}

pub fn dense_hessian(model: &EnergyModel) -> Vec<Vec<f64>> {
    let n = model.variables_count();
    let mut h = vec![vec![0.; n]; n];
    for (&(i, j), &v) in model.hessian_entries().iter().zip(model.hessian_values()) {
        h[i][j] += v;
    }
    h
}

pub fn assert_close(analytic: f64, numeric: f64, what: &str) {
    assert!(
        (analytic - numeric).abs() <= 1e-4 * (analytic.abs() + 1e-3),
        "{what}: analytic {analytic} vs numeric {numeric}"
    );
}

/// Compare the analytic gradient and Hessian of an initialized model with central differences.
pub fn assert_derivatives(model: &mut EnergyModel, x: &[f64]) {
    let n = x.len();
    model.update(x, UpdateFidelity::Hessian).unwrap();
    let gradient = model.gradient();
    let hessian = dense_hessian(model);

    let numeric_gradient = approximate_gradient(|y| model.evaluate(y).unwrap(), x);
    for i in 0..n {
        assert_close(gradient[i], numeric_gradient[i], &format!("gradient[{i}]"));
    }
    let numeric_hessian = approximate_hessian(
        |y| {
            model.update(y, UpdateFidelity::Gradient).unwrap();
            model.gradient()
        },
        x,
    );
    for i in 0..n {
        for j in i..n {
            assert_close(
                hessian[i][j],
                numeric_hessian[(i, j)],
                &format!("hessian[{i}][{j}]"),
            );
        }
    }
}

/// The gradient of every objective is zero outside of its declared variables.
pub fn assert_gradient_support(objective: &dyn ObjectiveFunction, n: usize) {
    let gradient = objective.gradient(n);
    for (i, g) in gradient.iter().enumerate() {
        if objective.variables().binary_search(&i).is_err() {
            assert_eq!(*g, 0., "{} touches variable {i}", objective.name());
        }
    }
}
