/// Image positions of every vertex, shared by the whole-mesh energies.
#[derive(Clone, Debug)]
pub struct PlainDataProvider {
    positions: Vec<[f64; 2]>,
}

impl PlainDataProvider {
    pub fn new(image_vertices_count: usize) -> Self {
        Self {
            positions: vec![[0.; 2]; image_vertices_count],
        }
    }

    pub fn vertices_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[[f64; 2]] {
        &self.positions
    }

    pub fn position(&self, vertex: usize) -> [f64; 2] {
        self.positions[vertex]
    }

    pub(super) fn update(&mut self, x: &[f64]) {
        let n = self.positions.len();
        let (xs, ys) = x.split_at(n);
        for ((p, &px), &py) in self.positions.iter_mut().zip(xs).zip(ys) {
            *p = [px, py];
        }
    }
}

/// Provider without state. Used by objectives that read nothing and to tombstone removed
/// providers.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyDataProvider;
