use crate::error::{Error, Result};
use faer::sparse::SparseColMat;
use faer::{Mat, Side};
use rayon::prelude::*;

/// Inverse of the matrix holding the edges of a 3d triangle expressed in a local orthonormal
/// frame of its plane, row-major.
pub fn reference_frame_inverse(v1t: [f64; 3], v2t: [f64; 3], v3t: [f64; 3]) -> [f64; 4] {
    let vm1 = [v2t[0] - v1t[0], v2t[1] - v1t[1], v2t[2] - v1t[2]];
    let vm2 = [v3t[0] - v1t[0], v3t[1] - v1t[1], v3t[2] - v1t[2]];
    let l1 = (vm1[0].powi(2) + vm1[1].powi(2) + vm1[2].powi(2)).sqrt();
    let l2 = (vm2[0].powi(2) + vm2[1].powi(2) + vm2[2].powi(2)).sqrt();
    let cos = (vm1[0] * vm2[0] + vm1[1] * vm2[1] + vm1[2] * vm2[2]) / l1 / l2;
    let sin = (1. - cos.powi(2)).max(0.).sqrt();
    let m2 = [l1, l2 * cos, 0., l2 * sin];
    inv_mat_2d(&m2)
}

pub fn inv_mat_2d(mat: &[f64; 4]) -> [f64; 4] {
    let det = mat[0] * mat[3] - mat[1] * mat[2];
    [mat[3] / det, -mat[1] / det, -mat[2] / det, mat[0] / det]
}

/// Singular value decomposition `m = U diag(s) Vᵀ` of a row-major 2x2 matrix.
///
/// `s` is sorted in descending order and non-negative. When `det(m) < 0` the reflection is
/// carried by `V`.
#[derive(Clone, Copy, Debug)]
pub struct Ssvd2x2 {
    pub u: [f64; 4],
    pub s: [f64; 2],
    pub v: [f64; 4],
}

impl Ssvd2x2 {
    /// `U diag(w) Vᵀ`
    pub fn recompose(&self, w: [f64; 2]) -> [f64; 4] {
        let (u, v) = (&self.u, &self.v);
        [
            u[0] * w[0] * v[0] + u[1] * w[1] * v[1],
            u[0] * w[0] * v[2] + u[1] * w[1] * v[3],
            u[2] * w[0] * v[0] + u[3] * w[1] * v[1],
            u[2] * w[0] * v[2] + u[3] * w[1] * v[3],
        ]
    }
}

/// Closed-form (trigonometric, non iterative) SVD of a 2x2 matrix.
pub fn ssvd2x2(m: &[f64; 4]) -> Ssvd2x2 {
    let e = 0.5 * (m[0] + m[3]);
    let f = 0.5 * (m[0] - m[3]);
    let g = 0.5 * (m[2] + m[1]);
    let h = 0.5 * (m[2] - m[1]);
    let q = (e.powi(2) + h.powi(2)).sqrt();
    let r = (f.powi(2) + g.powi(2)).sqrt();
    let sx = q + r;
    let sy = q - r;
    let a1 = g.atan2(f);
    let a2 = h.atan2(e);
    let theta = 0.5 * (a2 - a1);
    let (sin_t, cos_t) = theta.sin_cos();
    let phi = 0.5 * (a2 + a1);
    let (sin_p, cos_p) = phi.sin_cos();
    let s = [sx, sy.abs()];
    let u = [cos_p, -sin_p, sin_p, cos_p];
    let v = if sy >= 0. {
        [cos_t, sin_t, -sin_t, cos_t]
    } else {
        [cos_t, -sin_t, -sin_t, -cos_t]
    };
    Ssvd2x2 { u, s, v }
}

/// Derivative of the row-major Jacobian `[a, b, c, d]` of a face with respect to its interleaved
/// image coordinates `[x0, y0, x1, y1, x2, y2]`, as a row-major 4x6 matrix. `d1` and `d2` are the
/// rows of the face in the discrete gradient operators.
pub fn jacobian_map(d1: [f64; 3], d2: [f64; 3]) -> [f64; 24] {
    [
        d1[0], 0., d1[1], 0., d1[2], 0., //
        d2[0], 0., d2[1], 0., d2[2], 0., //
        0., d1[0], 0., d1[1], 0., d1[2], //
        0., d2[0], 0., d2[1], 0., d2[2],
    ]
}

/// `Dᵀ h D` for the 4x6 map `D` and a 4x4 `h`.
pub fn finalize_hess(dfdx: &[f64; 24], h: &[f64; 16]) -> [f64; 36] {
    let mut acc = [0.; 24];
    for i in 0..4 {
        for j in 0..6 {
            for j2 in 0..4 {
                acc[i * 6 + j] += h[j2 + 4 * i] * dfdx[j + 6 * j2];
            }
        }
    }
    let mut res = [0.; 36];
    for i in 0..6 {
        for j in 0..6 {
            for i2 in 0..4 {
                res[i * 6 + j] += acc[j + 6 * i2] * dfdx[i + 6 * i2];
            }
        }
    }
    res
}

/// `Dᵀ g` for the 4x6 map `D`.
pub fn finalize_grad(dfdx: &[f64; 24], g: &[f64; 4]) -> [f64; 6] {
    let mut res = [0.; 6];
    for i in 0..6 {
        for j in 0..4 {
            res[i] += dfdx[i + j * 6] * g[j];
        }
    }
    res
}

/// Clamp the negative eigenvalue(s) of the symmetric matrix `[[a, b], [b, c]]` to zero.
pub fn project_to_psd_2x2(a: f64, b: f64, c: f64) -> [f64; 3] {
    let mean = 0.5 * (a + c);
    let radius = (0.25 * (a - c).powi(2) + b * b).sqrt();
    let l_max = mean + radius;
    let l_min = mean - radius;
    if l_min >= 0. {
        return [a, b, c];
    }
    if l_max <= 0. {
        return [0., 0., 0.];
    }
    let (vx, vy) = if a >= c { (l_max - c, b) } else { (b, l_max - a) };
    let norm2 = vx * vx + vy * vy;
    if norm2 == 0. {
        return [l_max, 0., l_max];
    }
    let k = l_max / norm2;
    [k * vx * vx, k * vx * vy, k * vy * vy]
}

/// Replace a symmetric row-major `k x k` block by its nearest positive semi-definite matrix,
/// clamping negative eigenvalues to zero.
pub fn project_to_psd(block: &mut [f64], k: usize) {
    debug_assert_eq!(block.len(), k * k);
    let m = Mat::<f64>::from_fn(k, k, |i, j| 0.5 * (block[i * k + j] + block[j * k + i]));
    let Ok(evd) = m.self_adjoint_eigen(Side::Lower) else {
        return;
    };
    let s = evd.S().column_vector();
    if (0..k).all(|l| s[l] >= 0.) {
        return;
    }
    let u = evd.U();
    for i in 0..k {
        for j in 0..k {
            block[i * k + j] = (0..k).map(|l| u[(i, l)] * s[l].max(0.) * u[(j, l)]).sum();
        }
    }
}

/// Mean of the rows of `vertices` selected by `indices`.
pub fn calculate_barycenter<const D: usize>(
    vertices: &[[f64; D]],
    indices: &[usize],
) -> Result<[f64; D]> {
    if indices.is_empty() {
        return Err(Error::EmptyIndexSet);
    }
    let mut res = [0.; D];
    for &i in indices {
        for (r, v) in res.iter_mut().zip(vertices[i]) {
            *r += v;
        }
    }
    let count = indices.len() as f64;
    for r in res.iter_mut() {
        *r /= count;
    }
    Ok(res)
}

fn finite_difference_step(x: &[f64]) -> f64 {
    let scale = x.iter().fold(1f64, |acc, v| acc.max(v.abs()));
    f64::EPSILON.cbrt() * scale
}

/// Central-difference gradient of `f` at `x`.
pub fn approximate_gradient<F: FnMut(&[f64]) -> f64>(mut f: F, x: &[f64]) -> Vec<f64> {
    let h = finite_difference_step(x);
    let mut shifted = x.to_vec();
    (0..x.len())
        .map(|i| {
            shifted[i] = x[i] + h;
            let forward = f(&shifted);
            shifted[i] = x[i] - h;
            let backward = f(&shifted);
            shifted[i] = x[i];
            (forward - backward) / (2. * h)
        })
        .collect()
}

/// Central-difference Hessian of a function given by its gradient `g` at `x`.
pub fn approximate_hessian<G: FnMut(&[f64]) -> Vec<f64>>(mut g: G, x: &[f64]) -> Mat<f64> {
    let n = x.len();
    let h = finite_difference_step(x);
    let mut shifted = x.to_vec();
    let mut res = Mat::<f64>::zeros(n, n);
    for j in 0..n {
        shifted[j] = x[j] + h;
        let forward = g(&shifted);
        shifted[j] = x[j] - h;
        let backward = g(&shifted);
        shifted[j] = x[j];
        for i in 0..n {
            res[(i, j)] = (forward[i] - backward[i]) / (2. * h);
        }
    }
    res
}

/// Pin the variables in `fixed` to their current value: their rows and columns of `l` are
/// replaced by identity rows and the matching entries of `rhs` are zeroed.
pub fn apply_fixed_variables(l: &mut SparseColMat<usize, f64>, rhs: &mut [f64], fixed: &[usize]) {
    if fixed.is_empty() {
        return;
    }
    {
        let (sym, v) = l.parts_mut();
        let indices = sym.row_idx();
        indices
            .par_iter()
            .zip(v.par_iter_mut())
            .for_each(|(i, value)| {
                if fixed.contains(i) {
                    *value = 0.;
                }
            });
    }
    for &index in fixed {
        let (sym, v) = l.parts_mut();
        let indices = sym.row_idx_of_col_raw(index);
        let range = sym.col_range(index);
        for (value, &i) in v[range].iter_mut().zip(indices) {
            *value = if i == index { 1. } else { 0. };
        }
        rhs[index] = 0.;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matmul(a: &[f64; 4], b: &[f64; 4]) -> [f64; 4] {
        [
            a[0] * b[0] + a[1] * b[2],
            a[0] * b[1] + a[1] * b[3],
            a[2] * b[0] + a[3] * b[2],
            a[2] * b[1] + a[3] * b[3],
        ]
    }

    #[test]
    fn ssvd_recomposes_input() {
        let cases = [
            [1., 0., 0., 1.],
            [2., 0.3, -0.7, 0.5],
            [1., 0., 0., -1.],
            [0.1, 3., 2., -0.4],
            [-1., 2., 0.5, 0.25],
        ];
        for m in cases {
            let svd = ssvd2x2(&m);
            assert!(svd.s[0] >= svd.s[1]);
            assert!(svd.s[1] >= 0.);
            let r = svd.recompose(svd.s);
            for k in 0..4 {
                assert!((r[k] - m[k]).abs() < 1e-12, "{m:?} -> {r:?}");
            }
            let ut = [svd.u[0], svd.u[2], svd.u[1], svd.u[3]];
            let i = matmul(&ut, &svd.u);
            assert!((i[0] - 1.).abs() < 1e-12 && i[1].abs() < 1e-12);
            let det = m[0] * m[3] - m[1] * m[2];
            assert!((svd.s[0] * svd.s[1] - det.abs()).abs() < 1e-12);
        }
    }

    #[test]
    fn psd_2x2_projection() {
        assert_eq!(project_to_psd_2x2(2., 0.5, 1.), [2., 0.5, 1.]);
        assert_eq!(project_to_psd_2x2(-2., 0., -1.), [0., 0., 0.]);
        let [a, b, c] = project_to_psd_2x2(1., 0., -1.);
        assert!((a - 1.).abs() < 1e-14 && b.abs() < 1e-14 && c.abs() < 1e-14);
        let [a, b, c] = project_to_psd_2x2(0., 1., 0.);
        assert!((a - 0.5).abs() < 1e-14 && (b - 0.5).abs() < 1e-14 && (c - 0.5).abs() < 1e-14);
    }

    #[test]
    fn psd_projection_clamps_negative_eigenvalues() {
        let mut m = [1., 0., 0., 0., -3., 0., 0., 0., 2.];
        project_to_psd(&mut m, 3);
        let expected = [1., 0., 0., 0., 0., 0., 0., 0., 2.];
        for (a, b) in m.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
        let mut spd = [2., 1., 1., 2.];
        project_to_psd(&mut spd, 2);
        assert_eq!(spd, [2., 1., 1., 2.]);
    }

    #[test]
    fn barycenter() {
        let v = [[0., 0.], [3., 0.], [0., 3.], [9., 9.]];
        assert_eq!(calculate_barycenter(&v, &[0, 1, 2]).unwrap(), [1., 1.]);
        assert_eq!(calculate_barycenter(&v, &[]), Err(Error::EmptyIndexSet));
    }

    #[test]
    fn finite_differences_of_a_quadratic() {
        let f = |x: &[f64]| x[0] * x[0] * x[1] + 3. * x[1];
        let g = approximate_gradient(f, &[1.5, -2.]);
        assert!((g[0] - 2. * 1.5 * -2.).abs() < 1e-6);
        assert!((g[1] - (1.5 * 1.5 + 3.)).abs() < 1e-6);
        let h = approximate_hessian(|x| vec![2. * x[0] * x[1], x[0] * x[0] + 3.], &[1.5, -2.]);
        assert!((h[(0, 0)] + 4.).abs() < 1e-6);
        assert!((h[(0, 1)] - 3.).abs() < 1e-6);
        assert!((h[(1, 0)] - 3.).abs() < 1e-6);
        assert!(h[(1, 1)].abs() < 1e-6);
    }

    #[test]
    fn reference_frame_of_a_right_triangle() {
        let m = reference_frame_inverse([0., 0., 0.], [2., 0., 0.], [0., 1., 0.]);
        // Edges in the local frame are [[2, 0], [0, 1]].
        assert!((m[0] - 0.5).abs() < 1e-14 && m[1].abs() < 1e-14);
        assert!(m[2].abs() < 1e-14 && (m[3] - 1.).abs() < 1e-14);
    }
}
