use super::LinearSolver;
use crate::error::{Error, Result};
use crate::sparse::{RowMajor, SparseLayout};
use faer::sparse::SparseRowMat;

/// Jacobi preconditioned conjugate gradient.
///
/// Meant for inexact Newton steps: it stops after `max_iterations` or once the residual dropped
/// below `tolerance × ‖b‖`, and it returns the current iterate (or `b` itself on the first
/// iteration) when it meets a direction of non positive curvature.
pub struct ConjugateGradientSolver {
    pub max_iterations: usize,
    pub tolerance: f64,
    diagonal: Vec<f64>,
}

impl Default for ConjugateGradientSolver {
    fn default() -> Self {
        Self::new(1000, 1e-6)
    }
}

impl ConjugateGradientSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            diagonal: Vec::new(),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

impl LinearSolver for ConjugateGradientSolver {
    type Layout = RowMajor;

    fn analyze_pattern(&mut self, matrix: &SparseRowMat<usize, f64>) -> Result<()> {
        self.diagonal = vec![0.; matrix.nrows()];
        Ok(())
    }

    #[allow(non_snake_case)]
    fn solve(&mut self, A: &SparseRowMat<usize, f64>, b: &[f64], x: &mut [f64]) -> Result<()> {
        let n = b.len();
        self.diagonal.resize(n, 0.);
        RowMajor::diagonal(A, &mut self.diagonal);
        let m_inv: Vec<f64> = self
            .diagonal
            .iter()
            .map(|&d| if d > 0. { 1. / d } else { 1. })
            .collect();

        x.fill(0.);
        let mut r = b.to_vec();
        let threshold = self.tolerance * dot(b, b).sqrt();
        if dot(&r, &r).sqrt() <= threshold {
            return Ok(());
        }
        let mut z: Vec<f64> = r.iter().zip(&m_inv).map(|(r, m)| r * m).collect();
        let mut p = z.clone();
        let mut ap = vec![0.; n];
        let mut numerator = dot(&r, &z);
        for i in 0..self.max_iterations {
            RowMajor::mul_vec(A, &p, &mut ap);
            let denominator = dot(&p, &ap);
            if denominator <= 0. {
                if i == 0 {
                    x.copy_from_slice(b);
                }
                break;
            }
            let alpha = numerator / denominator;
            for ((x, r), (p, ap)) in x.iter_mut().zip(r.iter_mut()).zip(p.iter().zip(&ap)) {
                *x += alpha * p;
                *r -= alpha * ap;
            }
            if dot(&r, &r).sqrt() <= threshold {
                break;
            }
            for ((z, r), m) in z.iter_mut().zip(&r).zip(&m_inv) {
                *z = r * m;
            }
            let next = dot(&r, &z);
            let beta = next / numerator;
            for (p, z) in p.iter_mut().zip(&z) {
                *p = z + beta * *p;
            }
            numerator = next;
        }
        if x.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(Error::Solve("conjugate gradient diverged".into()))
        }
    }
}
