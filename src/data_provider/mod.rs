//! Providers cache geometric quantities derived from the current solution vector.
//!
//! They are refreshed by [`ProviderGraph::update`] in dependency order, before any objective
//! reads them. Getters never recompute.
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, GraphView, NodeId, Updatable};
use std::fmt;
use std::marker::PhantomData;

mod coordinate;
mod edge_pair;
mod face;
mod face_fan;
mod plain;

pub use coordinate::{
    CoordinateDataProvider, CoordinateDiffDataProvider, CrossCoordinateDiffDataProvider,
};
pub use edge_pair::EdgePairDataProvider;
pub use face::FaceDataProvider;
pub use face_fan::FaceFanDataProvider;
pub use plain::{EmptyDataProvider, PlainDataProvider};

pub enum DataProvider {
    Coordinate(CoordinateDataProvider),
    CoordinateDiff(CoordinateDiffDataProvider),
    CrossCoordinateDiff(CrossCoordinateDiffDataProvider),
    EdgePair(EdgePairDataProvider),
    Plain(PlainDataProvider),
    Face(FaceDataProvider),
    FaceFan(FaceFanDataProvider),
    Empty(EmptyDataProvider),
}

/// Concrete provider type stored in a [`DataProvider`] variant.
pub trait ProviderKind: Sized {
    fn downcast(provider: &DataProvider) -> Option<&Self>;
    fn into_provider(self) -> DataProvider;
}

macro_rules! provider_kind {
    ($variant:ident, $ty:ty) => {
        impl ProviderKind for $ty {
            fn downcast(provider: &DataProvider) -> Option<&Self> {
                match provider {
                    DataProvider::$variant(p) => Some(p),
                    _ => None,
                }
            }

            fn into_provider(self) -> DataProvider {
                DataProvider::$variant(self)
            }
        }
    };
}

provider_kind!(Coordinate, CoordinateDataProvider);
provider_kind!(CoordinateDiff, CoordinateDiffDataProvider);
provider_kind!(CrossCoordinateDiff, CrossCoordinateDiffDataProvider);
provider_kind!(EdgePair, EdgePairDataProvider);
provider_kind!(Plain, PlainDataProvider);
provider_kind!(Face, FaceDataProvider);
provider_kind!(FaceFan, FaceFanDataProvider);
provider_kind!(Empty, EmptyDataProvider);

impl Updatable for DataProvider {
    fn dependencies(&self) -> &[NodeId] {
        match self {
            DataProvider::CoordinateDiff(p) => p.dependencies(),
            DataProvider::CrossCoordinateDiff(p) => p.dependencies(),
            DataProvider::Face(p) => p.dependencies(),
            DataProvider::FaceFan(p) => p.dependencies(),
            DataProvider::Coordinate(_)
            | DataProvider::EdgePair(_)
            | DataProvider::Plain(_)
            | DataProvider::Empty(_) => &[],
        }
    }

    fn update(&mut self, x: &[f64], deps: &GraphView<'_, Self>) {
        let deps = ProviderView { graph: deps };
        match self {
            DataProvider::Coordinate(p) => p.update(x),
            DataProvider::CoordinateDiff(p) => p.update(&deps),
            DataProvider::CrossCoordinateDiff(p) => p.update(&deps),
            DataProvider::EdgePair(p) => p.update(x),
            DataProvider::Plain(p) => p.update(x),
            DataProvider::Face(p) => p.update(&deps),
            DataProvider::FaceFan(p) => p.update(&deps),
            DataProvider::Empty(_) => {}
        }
    }
}

/// Typed handle of a provider stored in a [`ProviderGraph`].
pub struct ProviderId<P> {
    node: NodeId,
    _kind: PhantomData<fn() -> P>,
}

impl<P> ProviderId<P> {
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl<P> Clone for ProviderId<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for ProviderId<P> {}

impl<P> PartialEq for ProviderId<P> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<P> Eq for ProviderId<P> {}

impl<P> fmt::Debug for ProviderId<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderId({})", self.node.index())
    }
}

/// Read access to refreshed providers.
#[derive(Clone, Copy)]
pub struct ProviderView<'a, 'b> {
    graph: &'b GraphView<'a, DataProvider>,
}

impl<'a, 'b> ProviderView<'a, 'b> {
    pub fn get<P: ProviderKind>(&self, id: ProviderId<P>) -> &'a P {
        P::downcast(self.graph.node(id.node))
            .expect("provider handle does not match the stored provider kind")
    }
}

/// Arena owning every data provider of an energy model.
///
/// Slots of removed providers are reused by later insertions, so the handle of a removed
/// provider must not be used again.
#[derive(Default)]
pub struct ProviderGraph {
    graph: DependencyGraph<DataProvider>,
    free: Vec<NodeId>,
}

impl ProviderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Number of slots left by removed providers and not reused yet.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    pub fn insert<P: ProviderKind>(&mut self, provider: P) -> ProviderId<P> {
        let provider = provider.into_provider();
        let node = match self.free.pop() {
            Some(node) => {
                // Free slots are always valid ids.
                let _ = self.graph.replace(node, provider);
                node
            }
            None => self.graph.insert(provider),
        };
        ProviderId {
            node,
            _kind: PhantomData,
        }
    }

    pub fn get<P: ProviderKind>(&self, id: ProviderId<P>) -> Option<&P> {
        self.graph.get(id.node).and_then(P::downcast)
    }

    /// Release a provider and make its slot available. Fails if another provider still depends
    /// on it.
    pub fn remove<P: ProviderKind>(&mut self, id: ProviderId<P>) -> Result<()> {
        if self.free.contains(&id.node) || self.get(id).is_none() {
            return Err(Error::UnknownNode(id.node.index()));
        }
        if !self.graph.dependents(id.node).is_empty() {
            return Err(Error::ProviderInUse(id.node.index()));
        }
        self.graph
            .replace(id.node, DataProvider::Empty(EmptyDataProvider))?;
        self.free.push(id.node);
        Ok(())
    }

    pub fn build(&mut self) -> Result<()> {
        self.graph.build()
    }

    pub fn is_built(&self) -> bool {
        self.graph.is_built()
    }

    pub fn layers(&self) -> Vec<Vec<NodeId>> {
        self.graph.layers()
    }

    pub fn update(&mut self, x: &[f64]) -> Result<()> {
        self.graph.update(x)
    }

    /// Run `f` with a view on every provider.
    pub fn with_view<R>(&self, f: impl FnOnce(ProviderView<'_, '_>) -> R) -> R {
        let view = self.graph.view();
        f(ProviderView { graph: &view })
    }
}
