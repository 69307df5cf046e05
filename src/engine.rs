//! Entry point for applications: one mesh, its default energy and a background solver.
use crate::data_provider::{EdgePairDataProvider, FaceDataProvider, PlainDataProvider, ProviderId};
use crate::error::{Error, Result};
use crate::mesh::{MeshDataProvider, TriangleSoup};
use crate::model::EnergyModel;
use crate::objective::{
    EdgePairAngleObjective, EdgePairLengthObjective, FaceBarycenterPositionObjective,
    HessianMode, ObjectiveFunction, ObjectiveHandle, PeriodicObjective, Property, PropertyId,
    Separation, SummationObjective, SymmetricDirichlet,
};
use crate::optimizer::{DescentMethod, IterativeMethod, IterativeOptions, NewtonMethod, ThreadState};
use crate::solver::{CholeskySolver, ConjugateGradientSolver, LuSolver, SolverKind};
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const SYMMETRIC_DIRICHLET: &str = "symmetric_dirichlet";
pub const SEPARATION: &str = "separation";
pub const SEAMLESS: &str = "seamless";

/// User values for the engine
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Balance between seam length and distortion: the separation is weighted by `lambda` and
    /// the distortion by `1 - lambda`
    pub lambda: f64,
    /// Softness of the separation energy
    pub delta: f64,
    /// Weight of every face position constraint
    pub position_weight: f64,
    /// Weight of the seamless energy, not added when `None`
    pub seamless_weight: Option<f64>,
    pub hessian_mode: HessianMode,
    pub solver: SolverKind,
    pub iterative: IterativeOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            lambda: 0.25,
            delta: 1.,
            position_weight: 10.,
            seamless_weight: None,
            hessian_mode: HessianMode::ConvexConcave,
            solver: SolverKind::Cholesky,
            iterative: IterativeOptions::default(),
        }
    }
}

struct FaceConstraint {
    handle: ObjectiveHandle,
    provider: ProviderId<FaceDataProvider>,
}

fn descent_method(kind: SolverKind) -> Box<dyn DescentMethod> {
    match kind {
        SolverKind::Cholesky => Box::new(NewtonMethod::new(CholeskySolver::new())),
        SolverKind::Lu => Box::new(NewtonMethod::new(LuSolver::new())),
        SolverKind::ConjugateGradient => {
            Box::new(NewtonMethod::new(ConjugateGradientSolver::default()))
        }
    }
}

/// A triangle soup parameterization optimized on a background thread.
///
/// The energy is `(1 - λ) symmetric_dirichlet + λ separation`, optionally plus a seamless term,
/// plus one position term per constrained face. Every structural change is done under the model
/// mutex and re-initializes the model, so it is safe while the solver runs.
pub struct Engine {
    mesh: TriangleSoup,
    model: Arc<Mutex<EnergyModel>>,
    solver: IterativeMethod<Box<dyn DescentMethod>>,
    options: EngineOptions,
    plain: ProviderId<PlainDataProvider>,
    registry: HashMap<String, ObjectiveHandle>,
    constraints: HashMap<usize, FaceConstraint>,
    current: Vec<f64>,
}

impl Engine {
    /// Load a mesh and its initial parameterization, given per domain vertex.
    pub fn new(
        domain_vertices: &[[f64; 3]],
        domain_faces: &[[usize; 3]],
        domain_uv: &[[f64; 2]],
        options: EngineOptions,
    ) -> Result<Self> {
        let mesh = TriangleSoup::new(domain_vertices, domain_faces)?;
        let x0 = mesh.image_from_domain_uv(domain_uv)?;
        let mut model = EnergyModel::from_mesh(&mesh);
        let plain = model
            .providers_mut()
            .insert(PlainDataProvider::new(mesh.image_vertices_count()));

        let mut registry = HashMap::new();
        let mut distortion = SymmetricDirichlet::new(SYMMETRIC_DIRICHLET, &mesh, plain)?;
        distortion.set_hessian_mode(options.hessian_mode);
        distortion.set_weight(1. - options.lambda);
        registry.insert(SYMMETRIC_DIRICHLET.to_owned(), model.add_objective(distortion));

        let mut separation = Separation::new(SEPARATION, &mesh, plain, options.delta)?;
        separation.set_weight(options.lambda);
        registry.insert(SEPARATION.to_owned(), model.add_objective(separation));

        if let Some(weight) = options.seamless_weight {
            let mut seamless = SummationObjective::new(SEAMLESS);
            seamless.set_weight(weight);
            for (i, &pair) in mesh.edge_pairs().iter().enumerate() {
                let providers = model.providers_mut();
                let provider = providers.insert(EdgePairDataProvider::new(&mesh, pair));
                let angle = EdgePairAngleObjective::new(
                    format!("edge_pair_angle_{i}"),
                    providers,
                    provider,
                )?;
                seamless.add_objective(PeriodicObjective::periodic(
                    format!("edge_pair_angle_period_{i}"),
                    angle,
                    FRAC_PI_2,
                )?);
                seamless.add_objective(EdgePairLengthObjective::new(
                    format!("edge_pair_length_{i}"),
                    providers,
                    provider,
                )?);
            }
            registry.insert(SEAMLESS.to_owned(), model.add_objective(seamless));
        }
        model.initialize()?;

        let model = Arc::new(Mutex::new(model));
        let solver = IterativeMethod::new(
            Arc::clone(&model),
            descent_method(options.solver),
            x0.clone(),
            options.iterative.clone(),
        )?;
        log::info!(
            "engine loaded: {} domain vertices, {} faces, {} image vertices, solver {:?}",
            mesh.domain_vertices_count(),
            mesh.domain_faces().len(),
            mesh.image_vertices_count(),
            options.solver
        );
        Ok(Self {
            mesh,
            model,
            solver,
            options,
            plain,
            registry,
            constraints: HashMap::new(),
            current: x0,
        })
    }

    fn lock_model(&self) -> MutexGuard<'_, EnergyModel> {
        lock(&self.model)
    }

    pub fn mesh(&self) -> &TriangleSoup {
        &self.mesh
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn domain_vertices_count(&self) -> usize {
        self.mesh.domain_vertices_count()
    }

    pub fn image_vertices_count(&self) -> usize {
        self.mesh.image_vertices_count()
    }

    pub fn domain_faces(&self) -> &[[usize; 3]] {
        self.mesh.domain_faces()
    }

    pub fn image_faces(&self) -> &[[usize; 3]] {
        self.mesh.image_faces()
    }

    /// Domain positions, three `f32` per face corner.
    pub fn domain_buffered_vertices(&self) -> Vec<f32> {
        let vertices = self.mesh.domain_vertices();
        self.mesh
            .domain_faces()
            .iter()
            .flatten()
            .flat_map(|&v| vertices[v].map(|c| c as f32))
            .collect()
    }

    /// Latest iterate, fetched from the solver if it moved.
    pub fn image_vertices(&mut self) -> Vec<[f64; 2]> {
        self.refresh();
        let n = self.mesh.image_vertices_count();
        (0..n)
            .map(|v| [self.current[v], self.current[n + v]])
            .collect()
    }

    /// Image positions, three `f32` per face corner with a zero third coordinate.
    pub fn image_buffered_vertices(&mut self) -> Vec<f32> {
        self.refresh();
        let n = self.mesh.image_vertices_count();
        let x = &self.current;
        self.mesh
            .image_faces()
            .iter()
            .flatten()
            .flat_map(|&v| [x[v] as f32, x[n + v] as f32, 0.])
            .collect()
    }

    /// Whether the solver committed a new iterate since the last call.
    pub fn refresh(&mut self) -> bool {
        self.solver.get_approximation(&mut self.current)
    }

    pub fn resume_solver(&mut self) {
        self.solver.resume();
    }

    pub fn pause_solver(&self) {
        self.solver.pause();
    }

    pub fn terminate_solver(&mut self) {
        self.solver.terminate();
    }

    pub fn solver_state(&self) -> ThreadState {
        self.solver.state()
    }

    pub fn solver(&self) -> &IterativeMethod<Box<dyn DescentMethod>> {
        &self.solver
    }

    /// Handle of a top level objective.
    pub fn objective_handle(&self, name: &str) -> Option<ObjectiveHandle> {
        self.registry.get(name).copied()
    }

    pub fn set_weight(&self, name: &str, weight: f64) -> Result<()> {
        self.set_property(name, Property::Weight(weight))
    }

    pub fn weight(&self, name: &str) -> Result<f64> {
        match self.property(name, PropertyId::Weight)? {
            Property::Weight(w) => Ok(w),
            other => Err(Error::InvalidProperty(format!("unexpected {other:?}"))),
        }
    }

    /// `(1 - lambda)` on the distortion and `lambda` on the separation.
    pub fn set_lambda(&self, lambda: f64) -> Result<()> {
        if !(0. ..=1.).contains(&lambda) {
            return Err(Error::InvalidProperty(format!(
                "lambda must be in [0, 1], got {lambda}"
            )));
        }
        self.set_weight(SYMMETRIC_DIRICHLET, 1. - lambda)?;
        self.set_weight(SEPARATION, lambda)
    }

    /// Set a property of the objective named `name`, nested ones included.
    pub fn set_property(&self, name: &str, property: Property) -> Result<()> {
        let mut model = self.lock_model();
        model
            .find_by_name_mut(name)
            .ok_or_else(|| Error::UnknownObjective(name.to_owned()))?
            .set_property(property)
    }

    pub fn property(&self, name: &str, id: PropertyId) -> Result<Property> {
        let model = self.lock_model();
        model
            .find_by_name(name)
            .ok_or_else(|| Error::UnknownObjective(name.to_owned()))?
            .property(id)
    }

    /// Pin a face at its current barycenter. Returns the existing handle if it is already pinned.
    pub fn constrain_face_position(&mut self, face: usize) -> Result<ObjectiveHandle> {
        if let Some(constraint) = self.constraints.get(&face) {
            return Ok(constraint.handle);
        }
        let vertices = *self
            .mesh
            .image_faces()
            .get(face)
            .ok_or_else(|| Error::InvalidMesh(format!("face {face} does not exist")))?;
        self.refresh();
        let n = self.mesh.image_vertices_count();
        let mut target = [0.; 2];
        for &v in &vertices {
            target[0] += self.current[v] / 3.;
            target[1] += self.current[n + v] / 3.;
        }

        let name = face_constraint_name(face);
        let mut model = lock(&self.model);
        let provider = model
            .providers_mut()
            .insert(FaceDataProvider::new(self.plain, vertices));
        let mut objective = match FaceBarycenterPositionObjective::new(
            name.clone(),
            &self.mesh,
            model.providers(),
            provider,
            target,
        ) {
            Ok(objective) => objective,
            Err(e) => {
                restore(&mut model, None, provider);
                return Err(e);
            }
        };
        objective.set_weight(self.options.position_weight);
        let handle = model.add_objective(objective);
        if let Err(e) = model.initialize() {
            restore(&mut model, Some(handle), provider);
            return Err(e);
        }
        drop(model);

        log::info!("constrained face {face} at {target:?}");
        self.registry.insert(name, handle);
        self.constraints
            .insert(face, FaceConstraint { handle, provider });
        Ok(handle)
    }

    /// Move the target of a pinned face.
    pub fn update_face_position(&self, face: usize, target: [f64; 2]) -> Result<()> {
        if !self.constraints.contains_key(&face) {
            return Err(Error::UnknownObjective(face_constraint_name(face)));
        }
        self.set_property(&face_constraint_name(face), Property::Target(target))
    }

    pub fn unconstrain_face_position(&mut self, face: usize) -> Result<()> {
        let name = face_constraint_name(face);
        let constraint = self
            .constraints
            .get_mut(&face)
            .ok_or_else(|| Error::UnknownObjective(name.clone()))?;
        let mut model = lock(&self.model);
        let objective = model.remove_objective(constraint.handle)?;
        if let Err(e) = model.providers_mut().remove(constraint.provider) {
            constraint.handle = model.add_boxed(objective);
            self.registry.insert(name, constraint.handle);
            if let Err(init) = model.initialize() {
                log::error!("cannot restore face constraint {face}: {init}");
            }
            return Err(e);
        }
        self.constraints.remove(&face);
        self.registry.remove(&name);
        model.initialize()?;
        log::info!("released face {face}");
        Ok(())
    }

    pub fn constrained_faces(&self) -> Vec<usize> {
        let mut faces: Vec<usize> = self.constraints.keys().copied().collect();
        faces.sort_unstable();
        faces
    }

    /// Run `f` on the model, serialized with the solver iterations. The model is re-initialized
    /// afterwards if `f` changed its structure.
    pub fn with_model<R>(&self, f: impl FnOnce(&mut EnergyModel) -> R) -> Result<R> {
        let mut model = self.lock_model();
        let res = f(&mut model);
        if !model.is_initialized() {
            model.initialize()?;
        }
        Ok(res)
    }
}

fn lock(model: &Mutex<EnergyModel>) -> MutexGuard<'_, EnergyModel> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take a half inserted face constraint back out of `model`.
fn restore(
    model: &mut EnergyModel,
    handle: Option<ObjectiveHandle>,
    provider: ProviderId<FaceDataProvider>,
) {
    if let Some(handle) = handle {
        if let Err(e) = model.remove_objective(handle) {
            log::warn!("cannot remove the face objective: {e}");
        }
    }
    if let Err(e) = model.providers_mut().remove(provider) {
        log::warn!("cannot remove the face provider: {e}");
    }
    if let Err(e) = model.initialize() {
        log::error!("cannot restore the energy model: {e}");
    }
}

fn face_constraint_name(face: usize) -> String {
    format!("face_position_{face}")
}
