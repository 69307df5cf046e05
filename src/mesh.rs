//! Mesh data consumed by the energies.
//!
//! The engine never parses files: a domain mesh is handed over as vertex and face arrays and
//! turned into a [`TriangleSoup`], which implements [`MeshDataProvider`]. Every face of the soup
//! owns its three image vertices, so seams can open anywhere.
use crate::error::{Error, Result};
use crate::utils::reference_frame_inverse;
use pulp::Arch;
use rayon::prelude::*;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Unordered pair of vertices. Keeps the orientation it was built with, but equality and hashing
/// ignore it.
#[derive(Clone, Copy, Debug)]
pub struct EdgeDescriptor(pub usize, pub usize);

impl EdgeDescriptor {
    pub fn normalized(&self) -> (usize, usize) {
        (self.0.min(self.1), self.0.max(self.1))
    }

    pub fn reversed(&self) -> Self {
        EdgeDescriptor(self.1, self.0)
    }
}

impl PartialEq for EdgeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for EdgeDescriptor {}

impl Hash for EdgeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

/// Two image edges mapped to the same domain edge. `self.0.0` and `self.1.0` are copies of the
/// same domain vertex, as are `self.0.1` and `self.1.1`. Identity ignores edge direction and the
/// order of the two edges.
#[derive(Clone, Copy, Debug)]
pub struct EdgePairDescriptor(pub EdgeDescriptor, pub EdgeDescriptor);

impl EdgePairDescriptor {
    pub fn normalized(&self) -> ((usize, usize), (usize, usize)) {
        let a = self.0.normalized();
        let b = self.1.normalized();
        (a.min(b), a.max(b))
    }
}

impl PartialEq for EdgePairDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for EdgePairDescriptor {}

impl Hash for EdgePairDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

/// One corner of a face fan: the image copy of the fan center and the two other vertices of the
/// face, in counter-clockwise order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanCorner {
    pub center: usize,
    pub next: usize,
    pub previous: usize,
}

pub type FaceFan = Vec<FanCorner>;

/// Read-only accessor for the topology and geometry of the domain mesh and its image.
///
/// The unknown vector stores all image `X` coordinates, then all image `Y` coordinates.
pub trait MeshDataProvider: Send + Sync {
    fn domain_vertices(&self) -> &[[f64; 3]];
    fn domain_faces(&self) -> &[[usize; 3]];
    fn domain_edges(&self) -> &[EdgeDescriptor];
    fn image_faces(&self) -> &[[usize; 3]];
    fn image_vertices_count(&self) -> usize;

    /// Discrete surface gradient operator, first local axis: one row per face, one coefficient
    /// per face corner.
    fn d1(&self) -> &[[f64; 3]];
    /// Same as [`d1`](Self::d1) for the second local axis.
    fn d2(&self) -> &[[f64; 3]];
    /// Area of each domain face.
    fn face_areas(&self) -> &[f64];

    /// Rows of the separation matrix: each pair `(p, q)` has `+1` on `p` and `-1` on `q`.
    fn corresponding_vertex_pairs(&self) -> &[(usize, usize)];
    /// Rest length carried by each corresponding vertex pair.
    fn corresponding_vertex_pairs_edge_length(&self) -> &[f64];
    /// Fan of every domain vertex.
    fn face_fans(&self) -> &[FaceFan];
    fn edge_pairs(&self) -> &[EdgePairDescriptor];

    fn domain_edge_index(&self, edge: &EdgeDescriptor) -> Option<usize>;
    fn image_edge_index(&self, edge: &EdgeDescriptor) -> Option<usize>;

    fn domain_vertices_count(&self) -> usize {
        self.domain_vertices().len()
    }

    fn domain_edges_count(&self) -> usize {
        self.domain_edges().len()
    }

    fn image_edges_count(&self) -> usize {
        3 * self.image_faces().len()
    }

    fn variables_count(&self) -> usize {
        2 * self.image_vertices_count()
    }

    fn x_variable_index(&self, vertex: usize) -> usize {
        vertex
    }

    fn y_variable_index(&self, vertex: usize) -> usize {
        self.image_vertices_count() + vertex
    }

    fn vertex_index(&self, variable: usize) -> usize {
        variable % self.image_vertices_count()
    }
}

/// Triangle soup built from an indexed domain mesh.
pub struct TriangleSoup {
    domain_vertices: Vec<[f64; 3]>,
    domain_faces: Vec<[usize; 3]>,
    domain_edges: Vec<EdgeDescriptor>,
    domain_edge_indices: HashMap<EdgeDescriptor, usize>,
    image_faces: Vec<[usize; 3]>,
    image_to_domain: Vec<usize>,
    d1: Vec<[f64; 3]>,
    d2: Vec<[f64; 3]>,
    areas: Vec<f64>,
    vertex_pairs: Vec<(usize, usize)>,
    vertex_pair_lengths: Vec<f64>,
    face_fans: Vec<FaceFan>,
    edge_pairs: Vec<EdgePairDescriptor>,
}

impl TriangleSoup {
    pub fn new(domain_vertices: &[[f64; 3]], domain_faces: &[[usize; 3]]) -> Result<Self> {
        if domain_vertices.is_empty() || domain_faces.is_empty() {
            return Err(Error::EmptyMeshData);
        }
        for (i, f) in domain_faces.iter().enumerate() {
            if f.iter().any(|&v| v >= domain_vertices.len()) {
                return Err(Error::InvalidMesh(format!(
                    "face {i} references a vertex out of range"
                )));
            }
            if f[0] == f[1] || f[1] == f[2] || f[2] == f[0] {
                return Err(Error::InvalidMesh(format!("face {i} is degenerate")));
            }
        }

        let image_faces: Vec<[usize; 3]> = (0..domain_faces.len())
            .map(|i| [3 * i, 3 * i + 1, 3 * i + 2])
            .collect();
        let image_to_domain: Vec<usize> = domain_faces.iter().flatten().copied().collect();

        // Faces incident to each domain edge, with the corner the edge starts from.
        let mut domain_edges = Vec::new();
        let mut domain_edge_indices = HashMap::new();
        let mut edge_faces: Vec<Vec<(usize, usize)>> = Vec::new();
        for (fi, f) in domain_faces.iter().enumerate() {
            for k in 0..3 {
                let e = EdgeDescriptor(f[k], f[(k + 1) % 3]);
                let index = *domain_edge_indices.entry(e).or_insert_with(|| {
                    domain_edges.push(e);
                    edge_faces.push(Vec::new());
                    domain_edges.len() - 1
                });
                edge_faces[index].push((fi, k));
            }
        }
        if let Some(e) = edge_faces.iter().position(|faces| faces.len() > 2) {
            return Err(Error::InvalidMesh(format!(
                "edge {:?} is non-manifold",
                domain_edges[e]
            )));
        }

        let mut edge_pairs = Vec::new();
        let mut vertex_pairs = Vec::new();
        let mut vertex_pair_lengths = Vec::new();
        for (e, faces) in domain_edges.iter().zip(&edge_faces) {
            let &[(fa, ka), (fb, kb)] = faces.as_slice() else {
                continue;
            };
            // Image copies of the edge start/end in each face.
            let a0 = 3 * fa + ka;
            let a1 = 3 * fa + (ka + 1) % 3;
            let (b0, b1) = if domain_faces[fb][kb] == domain_faces[fa][ka] {
                (3 * fb + kb, 3 * fb + (kb + 1) % 3)
            } else {
                (3 * fb + (kb + 1) % 3, 3 * fb + kb)
            };
            edge_pairs.push(EdgePairDescriptor(
                EdgeDescriptor(a0, a1),
                EdgeDescriptor(b0, b1),
            ));
            let length = distance(&domain_vertices[e.0], &domain_vertices[e.1]);
            vertex_pairs.push((a0, b0));
            vertex_pairs.push((a1, b1));
            vertex_pair_lengths.push(0.5 * length);
            vertex_pair_lengths.push(0.5 * length);
        }

        let mut face_fans = vec![Vec::new(); domain_vertices.len()];
        for (fi, f) in domain_faces.iter().enumerate() {
            for k in 0..3 {
                face_fans[f[k]].push(FanCorner {
                    center: 3 * fi + k,
                    next: 3 * fi + (k + 1) % 3,
                    previous: 3 * fi + (k + 2) % 3,
                });
            }
        }

        let areas = areas(domain_faces, domain_vertices);
        let (d1, d2) = gradient_operators(domain_faces, domain_vertices);

        Ok(Self {
            domain_vertices: domain_vertices.to_vec(),
            domain_faces: domain_faces.to_vec(),
            domain_edges,
            domain_edge_indices,
            image_faces,
            image_to_domain,
            d1,
            d2,
            areas,
            vertex_pairs,
            vertex_pair_lengths,
            face_fans,
            edge_pairs,
        })
    }

    /// Domain vertex an image vertex is a copy of.
    pub fn domain_vertex_of(&self, image_vertex: usize) -> usize {
        self.image_to_domain[image_vertex]
    }

    /// Build the unknown vector from per-domain-vertex coordinates.
    pub fn image_from_domain_uv(&self, uv: &[[f64; 2]]) -> Result<Vec<f64>> {
        if uv.len() != self.domain_vertices.len() {
            return Err(Error::DimensionMismatch {
                expected: self.domain_vertices.len(),
                found: uv.len(),
            });
        }
        let n = self.image_to_domain.len();
        let mut x = vec![0.; 2 * n];
        for (i, &v) in self.image_to_domain.iter().enumerate() {
            x[i] = uv[v][0];
            x[n + i] = uv[v][1];
        }
        Ok(x)
    }
}

impl MeshDataProvider for TriangleSoup {
    fn domain_vertices(&self) -> &[[f64; 3]] {
        &self.domain_vertices
    }

    fn domain_faces(&self) -> &[[usize; 3]] {
        &self.domain_faces
    }

    fn domain_edges(&self) -> &[EdgeDescriptor] {
        &self.domain_edges
    }

    fn image_faces(&self) -> &[[usize; 3]] {
        &self.image_faces
    }

    fn image_vertices_count(&self) -> usize {
        self.image_to_domain.len()
    }

    fn d1(&self) -> &[[f64; 3]] {
        &self.d1
    }

    fn d2(&self) -> &[[f64; 3]] {
        &self.d2
    }

    fn face_areas(&self) -> &[f64] {
        &self.areas
    }

    fn corresponding_vertex_pairs(&self) -> &[(usize, usize)] {
        &self.vertex_pairs
    }

    fn corresponding_vertex_pairs_edge_length(&self) -> &[f64] {
        &self.vertex_pair_lengths
    }

    fn face_fans(&self) -> &[FaceFan] {
        &self.face_fans
    }

    fn edge_pairs(&self) -> &[EdgePairDescriptor] {
        &self.edge_pairs
    }

    fn domain_edge_index(&self, edge: &EdgeDescriptor) -> Option<usize> {
        self.domain_edge_indices.get(edge).copied()
    }

    fn image_edge_index(&self, edge: &EdgeDescriptor) -> Option<usize> {
        let (a, b) = edge.normalized();
        let face = a / 3;
        if b / 3 != face || face >= self.image_faces.len() {
            return None;
        }
        // Edge k of a face goes from corner k to corner k + 1.
        match (a % 3, b % 3) {
            (0, 1) => Some(3 * face),
            (1, 2) => Some(3 * face + 1),
            (0, 2) => Some(3 * face + 2),
            _ => None,
        }
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn areas(f: &[[usize; 3]], v: &[[f64; 3]]) -> Vec<f64> {
    let arch = Arch::new();
    arch.dispatch(|| {
        let mut areas = Vec::new();
        f.par_iter()
            .map(|row| {
                let l = [
                    distance(&v[row[0]], &v[row[1]]),
                    distance(&v[row[1]], &v[row[2]]),
                    distance(&v[row[2]], &v[row[0]]),
                ];
                let s = 0.5 * (l[0] + l[1] + l[2]);
                (s * (s - l[0]) * (s - l[1]) * (s - l[2])).max(0.).sqrt()
            })
            .collect_into_vec(&mut areas);
        areas
    })
}

fn gradient_operators(f: &[[usize; 3]], v: &[[f64; 3]]) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    f.par_iter()
        .map(|row| {
            let m = reference_frame_inverse(v[row[0]], v[row[1]], v[row[2]]);
            (
                [-(m[0] + m[2]), m[0], m[2]],
                [-(m[1] + m[3]), m[1], m[3]],
            )
        })
        .unzip()
}
