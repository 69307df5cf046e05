use super::{HessianEntry, ObjectiveFunction, ObjectiveState, UpdateFidelity};
use crate::data_provider::ProviderView;
use crate::error::{Error, Result};
use rayon::prelude::*;

/// Handle of a child inside a [`SummationObjective`]. Stays valid until the child is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectiveHandle(u64);

struct Child {
    handle: ObjectiveHandle,
    objective: Box<dyn ObjectiveFunction>,
    // child local variable -> parent local variable
    scatter: Vec<usize>,
    // first triplet of this child in the parent
    offset: usize,
}

/// Weighted sum of child objectives: `Σ w_i f_i`.
///
/// Weights are read from the children on every update, so changing one needs no
/// re-initialization. Adding or removing a child does.
pub struct SummationObjective {
    state: ObjectiveState,
    children: Vec<Child>,
    next_handle: u64,
    initialized: bool,
}

impl SummationObjective {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: ObjectiveState::new(name),
            children: Vec::new(),
            next_handle: 0,
            initialized: false,
        }
    }

    pub fn add_objective(&mut self, objective: impl ObjectiveFunction + 'static) -> ObjectiveHandle {
        self.add_boxed(Box::new(objective))
    }

    pub fn add_boxed(&mut self, objective: Box<dyn ObjectiveFunction>) -> ObjectiveHandle {
        let handle = ObjectiveHandle(self.next_handle);
        self.next_handle += 1;
        self.children.push(Child {
            handle,
            objective,
            scatter: Vec::new(),
            offset: 0,
        });
        self.initialized = false;
        handle
    }

    pub fn remove_objective(&mut self, handle: ObjectiveHandle) -> Result<Box<dyn ObjectiveFunction>> {
        let position = self
            .children
            .iter()
            .position(|c| c.handle == handle)
            .ok_or(Error::UnknownHandle)?;
        self.initialized = false;
        Ok(self.children.remove(position).objective)
    }

    pub fn get(&self, handle: ObjectiveHandle) -> Option<&dyn ObjectiveFunction> {
        let child = self.children.iter().find(|c| c.handle == handle)?;
        Some(child.objective.as_ref())
    }

    pub fn get_mut(&mut self, handle: ObjectiveHandle) -> Option<&mut dyn ObjectiveFunction> {
        let child = self.children.iter_mut().find(|c| c.handle == handle)?;
        let objective: &mut dyn ObjectiveFunction = child.objective.as_mut();
        Some(objective)
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<ObjectiveHandle> {
        self.children
            .iter()
            .find(|c| c.objective.name() == name)
            .map(|c| c.handle)
    }

    pub fn handles(&self) -> Vec<ObjectiveHandle> {
        self.children.iter().map(|c| c.handle).collect()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl ObjectiveFunction for SummationObjective {
    fn state(&self) -> &ObjectiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ObjectiveState {
        &mut self.state
    }

    fn children(&self) -> Vec<&dyn ObjectiveFunction> {
        self.children.iter().map(|c| c.objective.as_ref()).collect()
    }

    fn children_mut(&mut self) -> Vec<&mut dyn ObjectiveFunction> {
        let mut children: Vec<&mut dyn ObjectiveFunction> = Vec::with_capacity(self.children.len());
        for child in &mut self.children {
            children.push(child.objective.as_mut());
        }
        children
    }

    fn initialize(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.objective.initialize()?;
        }
        let mut variables: Vec<usize> = self
            .children
            .iter()
            .flat_map(|c| c.objective.variables().iter().copied())
            .collect();
        variables.sort_unstable();
        variables.dedup();

        let mut entries: Vec<HessianEntry> = Vec::new();
        for child in &mut self.children {
            child.scatter = child
                .objective
                .variables()
                .iter()
                // Every child variable is in the union.
                .map(|v| variables.binary_search(v).unwrap())
                .collect();
            child.offset = entries.len();
            entries.extend(
                child
                    .objective
                    .local_entries()
                    .iter()
                    .map(|&(i, j)| (child.scatter[i], child.scatter[j])),
            );
        }
        self.state.declare(variables, entries);
        self.initialized = true;
        Ok(())
    }

    fn update(&mut self, x: &[f64], providers: &ProviderView<'_, '_>, fidelity: UpdateFidelity) {
        self.children
            .par_iter_mut()
            .for_each(|c| c.objective.update(x, providers, fidelity));

        let value = self
            .children
            .iter()
            .map(|c| c.objective.weight() * c.objective.value())
            .sum();
        self.state.set_value(value);

        if fidelity.gradient() {
            let gradient = self.state.gradient_mut();
            gradient.fill(0.);
            for child in &self.children {
                let w = child.objective.weight();
                for (&l, &g) in child.scatter.iter().zip(child.objective.local_gradient()) {
                    gradient[l] += w * g;
                }
            }
        }
        if fidelity.hessian() {
            let values = self.state.triplet_values_mut();
            for child in &self.children {
                let w = child.objective.weight();
                let child_values = child.objective.triplet_values();
                for (dst, &v) in values[child.offset..child.offset + child_values.len()]
                    .iter_mut()
                    .zip(child_values)
                {
                    *dst = w * v;
                }
            }
        }
    }
}
