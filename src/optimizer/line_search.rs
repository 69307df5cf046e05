use super::IterativeOptions;
use crate::error::Result;
use crate::model::EnergyModel;
use rayon::prelude::*;

/// Largest step `t` along `direction` before the signed area of some image face vanishes.
///
/// The doubled signed area of a face moved to `x + t p` is the quadratic `a t² + b t + c`;
/// the result is its smallest positive root over all faces, or `f64::INFINITY` when no face
/// ever degenerates.
pub fn compute_max_step_from_singularities(
    x: &[f64],
    direction: &[f64],
    faces: &[[usize; 3]],
) -> f64 {
    let n = x.len() / 2;
    let position = |v: &[f64], i: usize| [v[i], v[n + i]];
    faces
        .par_iter()
        .map(|face| {
            let v1 = position(x, face[0]);
            let v1p = position(direction, face[0]);
            let v2 = position(x, face[1]);
            let v2p = position(direction, face[1]);
            let v3 = position(x, face[2]);
            let v3p = position(direction, face[2]);
            let (x1, y1) = (v2[0] - v1[0], v2[1] - v1[1]);
            let (x1p, y1p) = (v2p[0] - v1p[0], v2p[1] - v1p[1]);
            let (x2, y2) = (v3[0] - v1[0], v3[1] - v1[1]);
            let (x2p, y2p) = (v3p[0] - v1p[0], v3p[1] - v1p[1]);
            let c = x1 * y2 - y1 * x2;
            let b = x1p * y2 + x1 * y2p - y1p * x2 - y1 * x2p;
            let a = x1p * y2p - y1p * x2p;
            smallest_positive_root(a, b, c)
        })
        .reduce(|| f64::INFINITY, f64::min)
}

fn smallest_positive_root(a: f64, b: f64, c: f64) -> f64 {
    let scale = a.abs().max(b.abs()).max(c.abs());
    if scale == 0. {
        return f64::INFINITY;
    }
    if a.abs() <= 1e-14 * scale {
        if b == 0. {
            return f64::INFINITY;
        }
        let t = -c / b;
        return if t > 0. { t } else { f64::INFINITY };
    }
    let delta = b * b - 4. * a * c;
    if delta < 0. {
        return f64::INFINITY;
    }
    let sqrt_delta = delta.sqrt();
    [(-b - sqrt_delta) / (2. * a), (-b + sqrt_delta) / (2. * a)]
        .into_iter()
        .filter(|&t| t > 0.)
        .fold(f64::INFINITY, f64::min)
}

/// Result of one backtracking search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSearchOutcome {
    /// Committed step, `0` when no decrease was found.
    pub step: f64,
    pub value: f64,
    pub backtracks: usize,
}

/// Backtrack from the initial step until the energy decreases, then commit `x ← x + t p`.
///
/// `energy` is the value at `x`. The model is left updated at the last trial point.
pub fn line_search(
    model: &mut EnergyModel,
    x: &mut [f64],
    direction: &[f64],
    energy: f64,
    options: &IterativeOptions,
) -> Result<LineSearchOutcome> {
    let mut step: f64 = 1.;
    if options.flip_avoiding_line_search {
        let max_step = compute_max_step_from_singularities(x, direction, model.image_faces());
        if max_step.is_finite() {
            step = step.min(options.step_cap * max_step);
        }
    }

    let mut trial = vec![0.; x.len()];
    for backtracks in 0..=options.max_backtracking_iterations {
        for ((t, &x), &p) in trial.iter_mut().zip(x.iter()).zip(direction) {
            *t = x + step * p;
        }
        let value = model.evaluate(&trial)?;
        if value < energy {
            x.copy_from_slice(&trial);
            return Ok(LineSearchOutcome {
                step,
                value,
                backtracks,
            });
        }
        step *= 0.5;
    }
    log::warn!(
        "line search found no decrease after {} backtracking steps",
        options.max_backtracking_iterations
    );
    Ok(LineSearchOutcome {
        step: 0.,
        value: energy,
        backtracks: options.max_backtracking_iterations,
    })
}
