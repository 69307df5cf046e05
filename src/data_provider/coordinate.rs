use super::{ProviderGraph, ProviderId, ProviderView};
use crate::error::{Error, Result};
use crate::graph::NodeId;

/// Value of a single variable.
#[derive(Clone, Debug)]
pub struct CoordinateDataProvider {
    index: usize,
    value: f64,
}

impl CoordinateDataProvider {
    pub fn new(index: usize) -> Self {
        Self { index, value: 0. }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub(super) fn update(&mut self, x: &[f64]) {
        self.value = x[self.index];
    }
}

/// `first - second` for two coordinate providers.
#[derive(Clone, Debug)]
pub struct CoordinateDiffDataProvider {
    deps: [NodeId; 2],
    first: ProviderId<CoordinateDataProvider>,
    second: ProviderId<CoordinateDataProvider>,
    terms: [(usize, f64); 2],
    diff: f64,
}

impl CoordinateDiffDataProvider {
    pub fn new(
        providers: &ProviderGraph,
        first: ProviderId<CoordinateDataProvider>,
        second: ProviderId<CoordinateDataProvider>,
    ) -> Result<Self> {
        let a = providers
            .get(first)
            .ok_or(Error::UnknownNode(first.node().index()))?;
        let b = providers
            .get(second)
            .ok_or(Error::UnknownNode(second.node().index()))?;
        Ok(Self {
            deps: [first.node(), second.node()],
            first,
            second,
            terms: [(a.index(), 1.), (b.index(), -1.)],
            diff: 0.,
        })
    }

    pub fn diff(&self) -> f64 {
        self.diff
    }

    /// The difference as a signed combination of variables.
    pub fn terms(&self) -> &[(usize, f64); 2] {
        &self.terms
    }

    pub(super) fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    pub(super) fn update(&mut self, deps: &ProviderView<'_, '_>) {
        self.diff = deps.get(self.first).value() - deps.get(self.second).value();
    }
}

/// `first - second` for two coordinate difference providers, typically the same difference taken
/// on both sides of a seam.
#[derive(Clone, Debug)]
pub struct CrossCoordinateDiffDataProvider {
    deps: [NodeId; 2],
    first: ProviderId<CoordinateDiffDataProvider>,
    second: ProviderId<CoordinateDiffDataProvider>,
    terms: [(usize, f64); 4],
    diff: f64,
}

impl CrossCoordinateDiffDataProvider {
    pub fn new(
        providers: &ProviderGraph,
        first: ProviderId<CoordinateDiffDataProvider>,
        second: ProviderId<CoordinateDiffDataProvider>,
    ) -> Result<Self> {
        let a = providers
            .get(first)
            .ok_or(Error::UnknownNode(first.node().index()))?
            .terms();
        let b = providers
            .get(second)
            .ok_or(Error::UnknownNode(second.node().index()))?
            .terms();
        Ok(Self {
            deps: [first.node(), second.node()],
            first,
            second,
            terms: [a[0], a[1], (b[0].0, -b[0].1), (b[1].0, -b[1].1)],
            diff: 0.,
        })
    }

    pub fn diff(&self) -> f64 {
        self.diff
    }

    pub fn terms(&self) -> &[(usize, f64); 4] {
        &self.terms
    }

    pub(super) fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    pub(super) fn update(&mut self, deps: &ProviderView<'_, '_>) {
        self.diff = deps.get(self.first).diff() - deps.get(self.second).diff();
    }
}
