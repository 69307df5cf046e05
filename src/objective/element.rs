use super::{HessianEntry, ObjectiveState};

/// Pattern of an objective made of small dense elements of identical size.
///
/// The Hessian entries are the full `size x size` block of every element, in element order and
/// row-major inside a block, so the triplet values of element `e` are the contiguous range
/// `e * size² .. (e + 1) * size²`. Elements may share variables; shared entries are summed at
/// assembly.
#[derive(Clone, Debug, Default)]
pub struct ElementPattern {
    size: usize,
    variables: Vec<usize>,
    locals: Vec<usize>,
}

impl ElementPattern {
    pub fn new<E: AsRef<[usize]>>(size: usize, elements: &[E]) -> Self {
        let mut variables: Vec<usize> = elements
            .iter()
            .flat_map(|e| e.as_ref().iter().copied())
            .collect();
        variables.sort_unstable();
        variables.dedup();
        let mut locals = Vec::with_capacity(size * elements.len());
        for e in elements {
            let e = e.as_ref();
            assert_eq!(e.len(), size, "element has the wrong number of variables");
            for v in e {
                // `variables` holds every variable of every element.
                locals.push(variables.binary_search(v).unwrap());
            }
        }
        Self {
            size,
            variables,
            locals,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.locals.len() / self.size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn variables(&self) -> &[usize] {
        &self.variables
    }

    pub fn locals(&self, element: usize) -> &[usize] {
        &self.locals[element * self.size..(element + 1) * self.size]
    }

    pub fn entries(&self) -> Vec<HessianEntry> {
        let mut entries = Vec::with_capacity(self.locals.len() * self.size);
        for element in self.locals.chunks(self.size.max(1)) {
            for &i in element {
                for &j in element {
                    entries.push((i, j));
                }
            }
        }
        entries
    }

    pub fn declare(&self, state: &mut ObjectiveState) {
        state.declare(self.variables.clone(), self.entries());
    }

    /// Zero `out`, then add every element gradient into it. `gradients` holds `size` values per
    /// element.
    pub fn accumulate_gradient<'a, I>(&self, gradients: I, out: &mut [f64])
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        out.fill(0.);
        for (element, g) in self.locals.chunks(self.size.max(1)).zip(gradients) {
            for (&l, &d) in element.iter().zip(g) {
                out[l] += d;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_variables_are_merged() {
        let pattern = ElementPattern::new(2, &[[7usize, 3], [3, 9]]);
        assert_eq!(pattern.variables(), &[3, 7, 9]);
        assert_eq!(pattern.len(), 2);
        assert_eq!(pattern.locals(0), &[1, 0]);
        assert_eq!(pattern.locals(1), &[0, 2]);
        assert_eq!(
            pattern.entries(),
            vec![(1, 1), (1, 0), (0, 1), (0, 0), (0, 0), (0, 2), (2, 0), (2, 2)]
        );
        let mut g = [5.; 3];
        pattern.accumulate_gradient([&[1., 2.][..], &[10., 20.][..]], &mut g);
        assert_eq!(g, [12., 1., 20.]);
    }
}
