//! Providers and objectives of one optimization problem.
use crate::data_provider::ProviderGraph;
use crate::error::{Error, Result};
use crate::mesh::MeshDataProvider;
use crate::objective::{
    find_objective, find_objective_mut, ObjectiveFunction, ObjectiveHandle, SummationObjective,
    UpdateFidelity,
};

/// The energy minimized by the iterative methods: a provider graph and a root summation over
/// the `2V` image coordinates.
///
/// Adding or removing providers or objectives invalidates the model until
/// [`initialize`](Self::initialize) is called again. Every initialization bumps
/// [`revision`](Self::revision), which solvers use to know when the Hessian pattern changed.
pub struct EnergyModel {
    providers: ProviderGraph,
    root: SummationObjective,
    image_faces: Vec<[usize; 3]>,
    variables_count: usize,
    revision: u64,
    initialized: bool,
}

impl EnergyModel {
    pub fn new(variables_count: usize, image_faces: Vec<[usize; 3]>) -> Self {
        Self {
            providers: ProviderGraph::new(),
            root: SummationObjective::new("root"),
            image_faces,
            variables_count,
            revision: 0,
            initialized: false,
        }
    }

    pub fn from_mesh(mesh: &dyn MeshDataProvider) -> Self {
        Self::new(mesh.variables_count(), mesh.image_faces().to_vec())
    }

    pub fn providers(&self) -> &ProviderGraph {
        &self.providers
    }

    pub fn providers_mut(&mut self) -> &mut ProviderGraph {
        self.initialized = false;
        &mut self.providers
    }

    pub fn root(&self) -> &SummationObjective {
        &self.root
    }

    pub fn add_objective(&mut self, objective: impl ObjectiveFunction + 'static) -> ObjectiveHandle {
        self.initialized = false;
        self.root.add_objective(objective)
    }

    pub fn add_boxed(&mut self, objective: Box<dyn ObjectiveFunction>) -> ObjectiveHandle {
        self.initialized = false;
        self.root.add_boxed(objective)
    }

    pub fn remove_objective(&mut self, handle: ObjectiveHandle) -> Result<Box<dyn ObjectiveFunction>> {
        let removed = self.root.remove_objective(handle)?;
        self.initialized = false;
        Ok(removed)
    }

    pub fn objective(&self, handle: ObjectiveHandle) -> Option<&dyn ObjectiveFunction> {
        self.root.get(handle)
    }

    /// Mutable access for weights and properties. Structural changes must go through
    /// [`add_objective`](Self::add_objective) and [`remove_objective`](Self::remove_objective).
    pub fn objective_mut(&mut self, handle: ObjectiveHandle) -> Option<&mut dyn ObjectiveFunction> {
        self.root.get_mut(handle)
    }

    pub fn find(&self, name: &str) -> Option<ObjectiveHandle> {
        self.root.find(name)
    }

    /// Objective named `name` at any depth of the composition tree.
    pub fn find_by_name(&self, name: &str) -> Option<&dyn ObjectiveFunction> {
        find_objective(&self.root, name)
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut dyn ObjectiveFunction> {
        find_objective_mut(&mut self.root, name)
    }

    /// Layer the providers and declare every objective pattern.
    pub fn initialize(&mut self) -> Result<()> {
        self.providers.build()?;
        self.root.initialize()?;
        if let Some(&last) = self.root.variables().last() {
            if last >= self.variables_count {
                return Err(Error::DimensionMismatch {
                    expected: self.variables_count,
                    found: last + 1,
                });
            }
        }
        self.revision += 1;
        self.initialized = true;
        log::debug!(
            "energy model initialized: revision {}, {} providers, {} objectives, {} hessian entries",
            self.revision,
            self.providers.len(),
            self.root.len(),
            self.root.local_entries().len()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn variables_count(&self) -> usize {
        self.variables_count
    }

    pub fn image_faces(&self) -> &[[usize; 3]] {
        &self.image_faces
    }

    /// Refresh the providers, then the objectives, at `x`.
    pub fn update(&mut self, x: &[f64], fidelity: UpdateFidelity) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        if x.len() != self.variables_count {
            return Err(Error::DimensionMismatch {
                expected: self.variables_count,
                found: x.len(),
            });
        }
        self.providers.update(x)?;
        let root = &mut self.root;
        self.providers
            .with_view(|view| root.update(x, &view, fidelity));
        Ok(())
    }

    /// Value-only update at `x`.
    pub fn evaluate(&mut self, x: &[f64]) -> Result<f64> {
        self.update(x, UpdateFidelity::Value)?;
        Ok(self.value())
    }

    /// Energy at the last update.
    pub fn value(&self) -> f64 {
        self.root.value()
    }

    /// Dense gradient at the last update.
    pub fn gradient_into(&self, out: &mut [f64]) {
        out.fill(0.);
        for (&v, &g) in self.root.variables().iter().zip(self.root.local_gradient()) {
            out[v] += g;
        }
    }

    pub fn gradient(&self) -> Vec<f64> {
        self.root.gradient(self.variables_count)
    }

    /// Global Hessian pattern. Fixed between two initializations.
    pub fn hessian_entries(&self) -> Vec<(usize, usize)> {
        self.root.hessian_entries()
    }

    /// Hessian values at the last update, aligned with [`hessian_entries`](Self::hessian_entries).
    pub fn hessian_values(&self) -> &[f64] {
        self.root.triplet_values()
    }
}
