//! Arena of updatable nodes with topological layering.
//!
//! Nodes are addressed by [`NodeId`] and list their direct dependencies. [`DependencyGraph::build`]
//! assigns every node to the earliest layer such that all of its dependencies live in strictly
//! earlier layers (Kahn's algorithm), then stores the nodes contiguously in layer order. An update
//! walks the layers in increasing order and refreshes the nodes of one layer in parallel, each node
//! only seeing the (already refreshed) earlier layers.
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::ops::Range;

/// Stable handle of a node inside a [`DependencyGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node of the dependency graph.
pub trait Updatable: Send + Sync + Sized {
    /// Direct dependencies of this node.
    fn dependencies(&self) -> &[NodeId];

    /// Refresh the cached state from the solution vector `x`. Every dependency has already been
    /// refreshed for this `x` when this is called.
    fn update(&mut self, x: &[f64], deps: &GraphView<'_, Self>);
}

/// Read-only view on the nodes of a graph.
pub struct GraphView<'a, T> {
    nodes: &'a [T],
    slot_of: &'a [usize],
}

impl<'a, T> GraphView<'a, T> {
    /// Node with the given id.
    ///
    /// Panics if the node is not part of the view, which for an update means that it is not a
    /// dependency of the node being updated.
    pub fn node(&self, id: NodeId) -> &'a T {
        &self.nodes[self.slot_of[id.0]]
    }
}

pub struct DependencyGraph<T> {
    nodes: Vec<T>,
    // NodeId -> position in `nodes`
    slot_of: Vec<usize>,
    // position in `nodes` -> NodeId
    id_of: Vec<usize>,
    layers: Vec<Range<usize>>,
    built: bool,
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            slot_of: Vec::new(),
            id_of: Vec::new(),
            layers: Vec::new(),
            built: true,
        }
    }
}

impl<T: Updatable> DependencyGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the layering reflects the current nodes.
    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn insert(&mut self, node: T) -> NodeId {
        let id = self.slot_of.len();
        self.slot_of.push(self.nodes.len());
        self.id_of.push(id);
        self.nodes.push(node);
        self.built = false;
        NodeId(id)
    }

    /// Replace the node behind `id`, keeping the handle valid.
    pub fn replace(&mut self, id: NodeId, node: T) -> Result<T> {
        let slot = *self.slot_of.get(id.0).ok_or(Error::UnknownNode(id.0))?;
        self.built = false;
        Ok(std::mem::replace(&mut self.nodes[slot], node))
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slot_of.get(id.0).map(|&slot| &self.nodes[slot])
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slot_of.get(id.0).map(|&slot| &mut self.nodes[slot])
    }

    /// Nodes that list `id` as a direct dependency.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .zip(&self.id_of)
            .filter(|(node, _)| node.dependencies().contains(&id))
            .map(|(_, &other)| NodeId(other))
            .collect()
    }

    /// Layers computed by the last [`build`](Self::build), as lists of node ids.
    pub fn layers(&self) -> Vec<Vec<NodeId>> {
        self.layers
            .iter()
            .map(|range| self.id_of[range.clone()].iter().map(|&i| NodeId(i)).collect())
            .collect()
    }

    pub fn view(&self) -> GraphView<'_, T> {
        GraphView {
            nodes: &self.nodes,
            slot_of: &self.slot_of,
        }
    }

    /// Compute the dependency layers and reorder the storage accordingly.
    pub fn build(&mut self) -> Result<()> {
        let n = self.nodes.len();
        let mut dependents = vec![Vec::new(); n];
        let mut pending = vec![0usize; n];
        for (slot, node) in self.nodes.iter().enumerate() {
            let id = self.id_of[slot];
            for dep in node.dependencies() {
                if dep.0 >= n {
                    return Err(Error::UnknownNode(dep.0));
                }
                dependents[dep.0].push(id);
                pending[id] += 1;
            }
        }

        let mut layer = vec![0usize; n];
        let mut queue: VecDeque<usize> = (0..n).filter(|&id| pending[id] == 0).collect();
        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for &next in &dependents[id] {
                layer[next] = layer[next].max(layer[id] + 1);
                pending[next] -= 1;
                if pending[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if visited != n {
            return Err(Error::CyclicDependency);
        }

        let mut tagged: Vec<(usize, usize, T)> = std::mem::take(&mut self.nodes)
            .into_iter()
            .zip(std::mem::take(&mut self.id_of))
            .map(|(node, id)| (layer[id], id, node))
            .collect();
        tagged.sort_by_key(|(layer, id, _)| (*layer, *id));

        self.layers.clear();
        for (slot, (l, id, node)) in tagged.into_iter().enumerate() {
            if self.layers.len() <= l {
                self.layers.push(slot..slot);
            }
            self.layers[l].end = slot + 1;
            self.slot_of[id] = slot;
            self.id_of.push(id);
            self.nodes.push(node);
        }
        self.built = true;
        Ok(())
    }

    /// Refresh every node, layer after layer.
    pub fn update(&mut self, x: &[f64]) -> Result<()> {
        if !self.built {
            return Err(Error::GraphNotBuilt);
        }
        let slot_of = &self.slot_of;
        for range in &self.layers {
            let (done, rest) = self.nodes.split_at_mut(range.start);
            let view = GraphView {
                nodes: done,
                slot_of,
            };
            rest[..range.len()]
                .par_iter_mut()
                .for_each(|node| node.update(x, &view));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sum {
        deps: Vec<NodeId>,
        own: usize,
        value: f64,
    }

    impl Updatable for Sum {
        fn dependencies(&self) -> &[NodeId] {
            &self.deps
        }

        fn update(&mut self, x: &[f64], deps: &GraphView<'_, Self>) {
            self.value = x[self.own] + self.deps.iter().map(|&d| deps.node(d).value).sum::<f64>();
        }
    }

    fn sum(own: usize, deps: &[NodeId]) -> Sum {
        Sum {
            deps: deps.to_vec(),
            own,
            value: 0.,
        }
    }

    #[test]
    fn layers_are_topological_levels() {
        let mut graph = DependencyGraph::new();
        let top = graph.insert(sum(0, &[NodeId(1), NodeId(2)]));
        let a = graph.insert(sum(1, &[]));
        let b = graph.insert(sum(2, &[a]));
        graph.build().unwrap();
        assert_eq!(graph.layers(), vec![vec![a], vec![b], vec![top]]);

        graph.update(&[1., 10., 100.]).unwrap();
        assert_eq!(graph.get(a).unwrap().value, 10.);
        assert_eq!(graph.get(b).unwrap().value, 110.);
        assert_eq!(graph.get(top).unwrap().value, 121.);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(sum(0, &[NodeId(1)]));
        graph.insert(sum(0, &[a]));
        assert_eq!(graph.build(), Err(Error::CyclicDependency));
    }

    #[test]
    fn unknown_dependencies_are_rejected() {
        let mut graph = DependencyGraph::new();
        graph.insert(sum(0, &[NodeId(7)]));
        assert_eq!(graph.build(), Err(Error::UnknownNode(7)));
    }

    #[test]
    fn update_requires_build() {
        let mut graph = DependencyGraph::new();
        graph.insert(sum(0, &[]));
        assert_eq!(graph.update(&[0.]), Err(Error::GraphNotBuilt));
    }
}
