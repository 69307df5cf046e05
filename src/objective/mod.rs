//! Energies over the image coordinates.
//!
//! Every objective declares once, in [`ObjectiveFunction::initialize`], the sorted list of global
//! variables it reads and the fixed list of local Hessian entries it fills. Updates only refill
//! the numeric values: the pattern never changes until the next initialization.
use crate::data_provider::ProviderView;
use crate::error::{Error, Result};
use faer::sparse::{SparseColMat, Triplet};

mod composite;
mod coordinate;
mod cross_coordinate;
mod edge_pair_angle;
mod edge_pair_length;
mod element;
mod position;
mod separation;
mod singular_point;
mod summation;
mod symmetric_dirichlet;

pub use composite::{
    AugmentedLagrangian, CompositeObjective, LagrangianObjective, OuterFunction,
    PeriodicObjective, PeriodicQuintic,
};
pub use coordinate::CoordinateObjective;
pub use cross_coordinate::CrossCoordinateObjective;
pub use edge_pair_angle::EdgePairAngleObjective;
pub use edge_pair_length::EdgePairLengthObjective;
pub use element::ElementPattern;
pub use position::{FaceBarycenterPositionObjective, VertexPositionObjective};
pub use separation::Separation;
pub use singular_point::SingularPointObjective;
pub use summation::{ObjectiveHandle, SummationObjective};
pub use symmetric_dirichlet::SymmetricDirichlet;

/// `(row, column)` in the local, dense numbering of an objective's variables.
pub type HessianEntry = (usize, usize);

/// How much of an objective an update recomputes. Each level includes the previous ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateFidelity {
    Value,
    Gradient,
    Hessian,
}

impl UpdateFidelity {
    pub fn gradient(self) -> bool {
        self >= UpdateFidelity::Gradient
    }

    pub fn hessian(self) -> bool {
        self >= UpdateFidelity::Hessian
    }
}

/// Hessian flavour of the distortion energy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HessianMode {
    /// Analytic second derivatives, possibly indefinite.
    Exact,
    /// Positive semi-definite approximation used for Newton steps.
    #[default]
    ConvexConcave,
}

/// Runtime tunable of an objective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyId {
    Weight,
    /// Last computed value. Read only.
    Value,
    Delta,
    Period,
    Target,
    ProjectToPsd,
    HessianMode,
    Multiplier,
    Penalty,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Property {
    Weight(f64),
    Value(f64),
    Delta(f64),
    Period(f64),
    Target([f64; 2]),
    ProjectToPsd(bool),
    HessianMode(HessianMode),
    Multiplier(f64),
    Penalty(f64),
}

impl Property {
    pub fn id(&self) -> PropertyId {
        match self {
            Property::Weight(_) => PropertyId::Weight,
            Property::Value(_) => PropertyId::Value,
            Property::Delta(_) => PropertyId::Delta,
            Property::Period(_) => PropertyId::Period,
            Property::Target(_) => PropertyId::Target,
            Property::ProjectToPsd(_) => PropertyId::ProjectToPsd,
            Property::HessianMode(_) => PropertyId::HessianMode,
            Property::Multiplier(_) => PropertyId::Multiplier,
            Property::Penalty(_) => PropertyId::Penalty,
        }
    }
}

/// Bookkeeping shared by every objective.
#[derive(Clone, Debug)]
pub struct ObjectiveState {
    name: String,
    weight: f64,
    variables: Vec<usize>,
    value: f64,
    gradient: Vec<f64>,
    entries: Vec<HessianEntry>,
    triplet_values: Vec<f64>,
}

impl ObjectiveState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 1.,
            variables: Vec::new(),
            value: 0.,
            gradient: Vec::new(),
            entries: Vec::new(),
            triplet_values: Vec::new(),
        }
    }

    /// Set the variables and the Hessian pattern, and reset every cached quantity.
    ///
    /// `variables` must be sorted and without duplicates.
    pub fn declare(&mut self, variables: Vec<usize>, entries: Vec<HessianEntry>) {
        debug_assert!(variables.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(entries
            .iter()
            .all(|&(i, j)| i < variables.len() && j < variables.len()));
        self.value = 0.;
        self.gradient = vec![0.; variables.len()];
        self.triplet_values = vec![0.; entries.len()];
        self.variables = variables;
        self.entries = entries;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn variables(&self) -> &[usize] {
        &self.variables
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn gradient(&self) -> &[f64] {
        &self.gradient
    }

    pub fn gradient_mut(&mut self) -> &mut [f64] {
        &mut self.gradient
    }

    pub fn entries(&self) -> &[HessianEntry] {
        &self.entries
    }

    pub fn triplet_values(&self) -> &[f64] {
        &self.triplet_values
    }

    pub fn triplet_values_mut(&mut self) -> &mut [f64] {
        &mut self.triplet_values
    }
}

/// An energy term with analytic first and second derivatives.
///
/// The value, gradient and Hessian exposed through the provided methods are unweighted: the
/// weight is applied by the parent summation.
pub trait ObjectiveFunction: Send + Sync {
    fn state(&self) -> &ObjectiveState;

    fn state_mut(&mut self) -> &mut ObjectiveState;

    /// Declare variables and Hessian pattern.
    fn initialize(&mut self) -> Result<()>;

    /// Recompute the cached quantities. Providers have already been refreshed for `x`.
    fn update(&mut self, x: &[f64], providers: &ProviderView<'_, '_>, fidelity: UpdateFidelity);

    /// Objective specific properties, on top of the weight and the value.
    fn read_property(&self, id: PropertyId) -> Result<Property> {
        Err(self.unsupported(id))
    }

    fn apply_property(&mut self, property: Property) -> Result<()> {
        Err(self.unsupported(property.id()))
    }

    /// Objectives this one is composed of.
    fn children(&self) -> Vec<&dyn ObjectiveFunction> {
        Vec::new()
    }

    fn children_mut(&mut self) -> Vec<&mut dyn ObjectiveFunction> {
        Vec::new()
    }

    fn name(&self) -> &str {
        self.state().name()
    }

    fn weight(&self) -> f64 {
        self.state().weight()
    }

    fn set_weight(&mut self, weight: f64) {
        self.state_mut().set_weight(weight);
    }

    fn value(&self) -> f64 {
        self.state().value()
    }

    fn variables(&self) -> &[usize] {
        self.state().variables()
    }

    fn local_gradient(&self) -> &[f64] {
        self.state().gradient()
    }

    fn local_entries(&self) -> &[HessianEntry] {
        self.state().entries()
    }

    fn triplet_values(&self) -> &[f64] {
        self.state().triplet_values()
    }

    /// Dense gradient over `n` variables, zero outside of [`variables`](Self::variables).
    fn gradient(&self, n: usize) -> Vec<f64> {
        let mut g = vec![0.; n];
        for (&v, &d) in self.variables().iter().zip(self.local_gradient()) {
            g[v] += d;
        }
        g
    }

    /// Hessian pattern in global variable indices.
    fn hessian_entries(&self) -> Vec<(usize, usize)> {
        let variables = self.variables();
        self.local_entries()
            .iter()
            .map(|&(i, j)| (variables[i], variables[j]))
            .collect()
    }

    /// Assembled `n x n` Hessian. Duplicated entries are summed.
    fn hessian(&self, n: usize) -> Result<SparseColMat<usize, f64>> {
        let triplets: Vec<_> = self
            .hessian_entries()
            .into_iter()
            .zip(self.triplet_values())
            .map(|((i, j), &v)| Triplet::new(i, j, v))
            .collect();
        SparseColMat::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| Error::Assembly(format!("{e:?}")))
    }

    fn property(&self, id: PropertyId) -> Result<Property> {
        match id {
            PropertyId::Weight => Ok(Property::Weight(self.weight())),
            PropertyId::Value => Ok(Property::Value(self.value())),
            _ => self.read_property(id),
        }
    }

    fn set_property(&mut self, property: Property) -> Result<()> {
        match property {
            Property::Weight(w) => {
                self.set_weight(w);
                Ok(())
            }
            Property::Value(_) => Err(Error::InvalidProperty("value is read only".into())),
            _ => self.apply_property(property),
        }
    }

    fn unsupported(&self, id: PropertyId) -> Error {
        Error::UnsupportedProperty {
            objective: self.name().to_owned(),
            property: format!("{id:?}"),
        }
    }
}

/// Depth first search for the objective named `name`, starting with `objective` itself.
pub fn find_objective<'a>(
    objective: &'a dyn ObjectiveFunction,
    name: &str,
) -> Option<&'a dyn ObjectiveFunction> {
    if objective.name() == name {
        return Some(objective);
    }
    objective
        .children()
        .into_iter()
        .find_map(|child| find_objective(child, name))
}

pub fn find_objective_mut<'a>(
    objective: &'a mut dyn ObjectiveFunction,
    name: &str,
) -> Option<&'a mut dyn ObjectiveFunction> {
    if objective.name() == name {
        return Some(objective);
    }
    objective
        .children_mut()
        .into_iter()
        .find_map(|child| find_objective_mut(child, name))
}

pub(crate) fn positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0. {
        Ok(value)
    } else {
        Err(Error::InvalidProperty(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}
