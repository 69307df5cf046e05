//! Composable energies for mesh parameterization, and a flip-avoiding Newton solver running them
//! on a background thread.
//!
//! The domain mesh is turned into a triangle soup whose image coordinates are the unknowns. Data
//! providers cache geometric quantities (edges, barycenters, corner angles) refreshed in
//! dependency order, objectives turn them into values, gradients and fixed-pattern Hessians, and
//! summations and composite objectives combine them. The default energy trades distortion
//! (symmetric Dirichlet) for seam length (separation).
//!
//! Can be used the following way (assuming `v` holds vertices, `f` faces and `uv` a valid
//! initial parameterization per vertex):
//! ```no_run
//! use uvcut_rs::{Engine, EngineOptions};
//!
//! # let v = vec![[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [1., 1., 0.2]];
//! # let f = vec![[0, 1, 2], [1, 3, 2]];
//! # let uv = vec![[0., 0.], [1., 0.], [0., 1.], [1., 1.]];
//! let mut engine = Engine::new(&v, &f, &uv, EngineOptions::default()).unwrap();
//! engine.resume_solver();
//! // Drag the first face around while the solver runs.
//! engine.constrain_face_position(0).unwrap();
//! engine.update_face_position(0, [-0.5, 0.2]).unwrap();
//! let corners = engine.image_buffered_vertices();
//! engine.terminate_solver();
//! ```
pub mod data_provider;
pub mod engine;
pub mod error;
pub mod graph;
pub mod mesh;
pub mod model;
pub mod objective;
pub mod optimizer;
pub mod solver;
pub mod sparse;
pub mod utils;

pub use engine::{Engine, EngineOptions};
pub use error::{Error, Result};
pub use mesh::{MeshDataProvider, TriangleSoup};
pub use model::EnergyModel;
pub use objective::{ObjectiveFunction, Property, PropertyId, UpdateFidelity};
pub use optimizer::{IterativeMethod, IterativeOptions, ThreadState};
pub use solver::SolverKind;
