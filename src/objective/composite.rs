//! Scalar functions applied on top of another objective: `g(f(x))`.
use super::{
    positive, HessianEntry, ObjectiveFunction, ObjectiveState, Property, PropertyId,
    UpdateFidelity,
};
use crate::data_provider::ProviderView;
use crate::error::{Error, Result};
use crate::utils::project_to_psd;
use faer::linalg::solvers::Solve;
use faer::Mat;

/// Outer function `g` of a composite objective.
pub trait OuterFunction: Send + Sync {
    /// `[g(f), g'(f), g''(f)]`
    fn evaluate(&self, f: f64) -> [f64; 3];

    /// Properties owned by the outer function. `None` forwards the request to the inner
    /// objective.
    fn read_property(&self, _id: PropertyId) -> Option<Property> {
        None
    }

    fn apply_property(&mut self, _property: Property) -> Option<Result<()>> {
        None
    }
}

/// Twice differentiable periodic penalty, zero on multiples of the period.
///
/// On `[0, T]` it is the quintic `q` with `q(0) = q(T) = 0`, `q'(0) = q'(T) = 0` and
/// `q''(0) = q''(T) = 2`, so it behaves like `u²` around every multiple of `T`.
#[derive(Clone, Debug)]
pub struct PeriodicQuintic {
    period: f64,
    coefficients: [f64; 6],
}

impl PeriodicQuintic {
    pub fn new(period: f64) -> Result<Self> {
        let period = positive("period", period)?;
        Ok(Self {
            period,
            coefficients: quintic_coefficients(period)?,
        })
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn coefficients(&self) -> &[f64; 6] {
        &self.coefficients
    }
}

fn quintic_coefficients(t: f64) -> Result<[f64; 6]> {
    // Rows: q(0), q'(0), q''(0), q(T), q'(T), q''(T).
    let a = Mat::<f64>::from_fn(6, 6, |i, k| {
        let (order, at) = (i % 3, if i < 3 { 0. } else { t });
        let k = k as i32;
        if k < order as i32 {
            return 0.;
        }
        let falling = (0..order as i32).map(|m| (k - m) as f64).product::<f64>();
        falling * at.powi(k - order as i32)
    });
    let mut rhs = Mat::<f64>::from_fn(6, 1, |i, _| if i % 3 == 2 { 2. } else { 0. });
    a.partial_piv_lu().solve_in_place(rhs.as_mut());
    let mut coefficients = [0.; 6];
    for (k, c) in coefficients.iter_mut().enumerate() {
        *c = rhs[(k, 0)];
    }
    if coefficients.iter().all(|c| c.is_finite()) {
        Ok(coefficients)
    } else {
        Err(Error::InvalidProperty(format!(
            "no periodic quintic for period {t}"
        )))
    }
}

impl OuterFunction for PeriodicQuintic {
    fn evaluate(&self, f: f64) -> [f64; 3] {
        let u = f.rem_euclid(self.period);
        let c = &self.coefficients;
        let mut res = [0.; 3];
        // Horner on q, q' and q''.
        for k in (0..6).rev() {
            res[0] = res[0] * u + c[k];
            if k >= 1 {
                res[1] = res[1] * u + k as f64 * c[k];
            }
            if k >= 2 {
                res[2] = res[2] * u + (k * (k - 1)) as f64 * c[k];
            }
        }
        res
    }

    fn read_property(&self, id: PropertyId) -> Option<Property> {
        match id {
            PropertyId::Period => Some(Property::Period(self.period)),
            _ => None,
        }
    }

    fn apply_property(&mut self, property: Property) -> Option<Result<()>> {
        match property {
            Property::Period(period) => Some(PeriodicQuintic::new(period).map(|q| *self = q)),
            _ => None,
        }
    }
}

/// `λ c + μ c² / 2` for a constraint `c(x) = 0`.
#[derive(Clone, Debug)]
pub struct AugmentedLagrangian {
    multiplier: f64,
    penalty: f64,
}

impl AugmentedLagrangian {
    pub fn new(multiplier: f64, penalty: f64) -> Result<Self> {
        Ok(Self {
            multiplier,
            penalty: positive("penalty", penalty)?,
        })
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }
}

impl OuterFunction for AugmentedLagrangian {
    fn evaluate(&self, c: f64) -> [f64; 3] {
        [
            self.multiplier * c + 0.5 * self.penalty * c * c,
            self.multiplier + self.penalty * c,
            self.penalty,
        ]
    }

    fn read_property(&self, id: PropertyId) -> Option<Property> {
        match id {
            PropertyId::Multiplier => Some(Property::Multiplier(self.multiplier)),
            PropertyId::Penalty => Some(Property::Penalty(self.penalty)),
            _ => None,
        }
    }

    fn apply_property(&mut self, property: Property) -> Option<Result<()>> {
        match property {
            Property::Multiplier(m) => {
                self.multiplier = m;
                Some(Ok(()))
            }
            Property::Penalty(p) => Some(positive("penalty", p).map(|p| self.penalty = p)),
            _ => None,
        }
    }
}

/// `g(f(x))` with `∇ = g'∇f` and `H = g''∇f∇fᵀ + g'H_f`.
///
/// The Hessian is stored as a dense block over the variables of `f`.
pub struct CompositeObjective<F: OuterFunction> {
    state: ObjectiveState,
    inner: Box<dyn ObjectiveFunction>,
    outer: F,
    project_to_psd: bool,
    dense: Vec<f64>,
}

pub type PeriodicObjective = CompositeObjective<PeriodicQuintic>;
pub type LagrangianObjective = CompositeObjective<AugmentedLagrangian>;

impl<F: OuterFunction> CompositeObjective<F> {
    pub fn new(
        name: impl Into<String>,
        inner: impl ObjectiveFunction + 'static,
        outer: F,
    ) -> Self {
        Self {
            state: ObjectiveState::new(name),
            inner: Box::new(inner),
            outer,
            project_to_psd: true,
            dense: Vec::new(),
        }
    }

    pub fn inner(&self) -> &dyn ObjectiveFunction {
        self.inner.as_ref()
    }

    pub fn outer(&self) -> &F {
        &self.outer
    }

    pub fn set_project_to_psd(&mut self, project: bool) {
        self.project_to_psd = project;
    }
}

impl PeriodicObjective {
    pub fn periodic(
        name: impl Into<String>,
        inner: impl ObjectiveFunction + 'static,
        period: f64,
    ) -> Result<Self> {
        Ok(Self::new(name, inner, PeriodicQuintic::new(period)?))
    }
}

impl LagrangianObjective {
    /// `λ ← λ + μ c` with the constraint value of the last update.
    pub fn update_multiplier(&mut self) {
        let c = self.inner.value();
        self.outer.multiplier += self.outer.penalty * c;
    }
}

impl<F: OuterFunction> ObjectiveFunction for CompositeObjective<F> {
    fn state(&self) -> &ObjectiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectiveState {
        &mut self.state
    }

    fn children(&self) -> Vec<&dyn ObjectiveFunction> {
        vec![self.inner.as_ref()]
    }

    fn children_mut(&mut self) -> Vec<&mut dyn ObjectiveFunction> {
        let inner: &mut dyn ObjectiveFunction = self.inner.as_mut();
        vec![inner]
    }

    fn initialize(&mut self) -> Result<()> {
        self.inner.initialize()?;
        let variables = self.inner.variables().to_vec();
        let k = variables.len();
        let entries: Vec<HessianEntry> = (0..k).flat_map(|i| (0..k).map(move |j| (i, j))).collect();
        self.dense = vec![0.; k * k];
        self.state.declare(variables, entries);
        Ok(())
    }

    fn update(&mut self, x: &[f64], providers: &ProviderView<'_, '_>, fidelity: UpdateFidelity) {
        self.inner.update(x, providers, fidelity);
        let [g, dg, ddg] = self.outer.evaluate(self.inner.value());
        self.state.set_value(g);
        if !fidelity.gradient() {
            return;
        }
        let inner_gradient = self.inner.local_gradient();
        for (dst, &d) in self.state.gradient_mut().iter_mut().zip(inner_gradient) {
            *dst = dg * d;
        }
        if fidelity.hessian() {
            let k = inner_gradient.len();
            let dense = &mut self.dense;
            for i in 0..k {
                for j in 0..k {
                    dense[i * k + j] = ddg * inner_gradient[i] * inner_gradient[j];
                }
            }
            for (&(i, j), &v) in self
                .inner
                .local_entries()
                .iter()
                .zip(self.inner.triplet_values())
            {
                dense[i * k + j] += dg * v;
            }
            if self.project_to_psd {
                project_to_psd(dense, k);
            }
            self.state.triplet_values_mut().copy_from_slice(dense);
        }
    }

    fn read_property(&self, id: PropertyId) -> Result<Property> {
        if id == PropertyId::ProjectToPsd {
            return Ok(Property::ProjectToPsd(self.project_to_psd));
        }
        match self.outer.read_property(id) {
            Some(property) => Ok(property),
            None => self.inner.property(id),
        }
    }

    fn apply_property(&mut self, property: Property) -> Result<()> {
        if let Property::ProjectToPsd(project) = property {
            self.project_to_psd = project;
            return Ok(());
        }
        match self.outer.apply_property(property) {
            Some(result) => result,
            None => self.inner.set_property(property),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn quintic_matches_boundary_conditions() {
        for period in [0.5, 1., 2. * PI] {
            let q = PeriodicQuintic::new(period).unwrap();
            let c = q.coefficients();
            let at = |u: f64| {
                let mut r = [0.; 3];
                for k in 0..6 {
                    r[0] += c[k] * u.powi(k as i32);
                    if k >= 1 {
                        r[1] += k as f64 * c[k] * u.powi(k as i32 - 1);
                    }
                    if k >= 2 {
                        r[2] += (k * (k - 1)) as f64 * c[k] * u.powi(k as i32 - 2);
                    }
                }
                r
            };
            let start = at(0.);
            let end = at(period);
            for d in 0..3 {
                assert!((start[d] - end[d]).abs() < 1e-9, "{period} {d}");
            }
            assert!((start[2] - 2.).abs() < 1e-9);
            // u² (T - u)² / T²
            let u = 0.3 * period;
            let expected = u * u * (period - u).powi(2) / (period * period);
            assert!((q.evaluate(u)[0] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn quintic_is_periodic() {
        let q = PeriodicQuintic::new(1.).unwrap();
        let a = q.evaluate(0.25);
        let b = q.evaluate(3.25);
        let c = q.evaluate(-0.75);
        for d in 0..3 {
            assert!((a[d] - b[d]).abs() < 1e-9);
            assert!((a[d] - c[d]).abs() < 1e-9);
        }
        assert_eq!(q.evaluate(0.)[0], 0.);
        assert!(q.evaluate(1.)[0].abs() < 1e-12);
    }

    #[test]
    fn invalid_periods_are_rejected() {
        assert!(PeriodicQuintic::new(0.).is_err());
        assert!(PeriodicQuintic::new(-1.).is_err());
        assert!(PeriodicQuintic::new(f64::NAN).is_err());
    }

    #[test]
    fn lagrangian_derivatives() {
        let l = AugmentedLagrangian::new(0.5, 4.).unwrap();
        assert_eq!(l.evaluate(2.), [0.5 * 2. + 2. * 4., 0.5 + 8., 4.]);
    }
}
