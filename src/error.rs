use thiserror::Error;

/// Errors raised while building or driving the optimization engine.
///
/// Numeric degeneracies inside the energies (zero area, zero edge length) are not
/// reported here: they propagate as `NaN`/`Inf` and the flip-avoiding line search is
/// responsible for keeping iterates away from them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("the dependency graph contains a cycle")]
    CyclicDependency,

    #[error("node {0} referenced as a dependency does not exist")]
    UnknownNode(usize),

    #[error("provider {0} is still a dependency of another provider")]
    ProviderInUse(usize),

    #[error("the dependency graph changed since it was last built")]
    GraphNotBuilt,

    #[error("the energy model must be initialized after a structural change")]
    NotInitialized,

    #[error("cannot compute a barycenter of an empty index set")]
    EmptyIndexSet,

    #[error("objective requires mesh data but the mesh is empty")]
    EmptyMeshData,

    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("no objective named `{0}`")]
    UnknownObjective(String),

    #[error("objective handle does not exist")]
    UnknownHandle,

    #[error("objective `{objective}` has no property {property}")]
    UnsupportedProperty { objective: String, property: String },

    #[error("invalid property value: {0}")]
    InvalidProperty(String),

    #[error("sparse assembly failed: {0}")]
    Assembly(String),

    #[error("factorization failed: {0}")]
    Factorization(String),

    #[error("linear solve failed: {0}")]
    Solve(String),
}

pub type Result<T> = std::result::Result<T, Error>;
