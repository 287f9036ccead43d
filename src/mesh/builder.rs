//! Mesh construction.
//!
//! Incremental creation of vertices, mesh edges and faces, plus helpers for
//! converting between a [`Mesh`] and face-vertex lists as found in mesh file
//! formats.

use std::collections::HashMap;

use nalgebra::Point3;
use tracing::{debug, trace};

use super::geometry::polygon_normal;
use super::halfedge::Mesh;
use super::index::{EdgeId, FaceId, MeshIndex, VertexId};
use super::{CreateOption, SortOption};
use crate::error::{MeshError, Result};

impl<I: MeshIndex> Mesh<I> {
    /// Create a vertex, or return an existing one within `epsilon` of `position`.
    ///
    /// With [`CreateOption::ReuseExisting`] the vertex store must be sorted,
    /// otherwise [`MeshError::VertexStoreUnsorted`] is returned.
    pub fn create_vertex(
        &mut self,
        position: Point3<f64>,
        create: CreateOption,
        sort: SortOption,
        epsilon: f64,
    ) -> Result<VertexId<I>> {
        if create == CreateOption::ReuseExisting {
            if let Some(&existing) = self.find_vertices(&position, epsilon)?.first() {
                return Ok(existing);
            }
        }
        self.ensure_capacity(1, 0, 0, 0)?;
        let v = self.alloc_vertex(position);
        self.vertex_store.add(v, &self.vertices, sort);
        self.mark_as_changed();
        Ok(v)
    }

    /// Add a new vertex at its sorted position (or appended, if the store is
    /// already waiting on a bulk sort).
    ///
    /// # Panics
    /// Panics if the index type has run out of vertex handles; use
    /// [`create_vertex`](Self::create_vertex) to get a
    /// [`MeshError::CapacityExceeded`] error instead.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        match self.create_vertex(position, CreateOption::CreateNew, SortOption::SortNow, 0.0) {
            Ok(v) => v,
            Err(e) => panic!("add_vertex: {}", e),
        }
    }

    /// Bring the vertex store into spatial order.
    pub fn sort_vertices(&mut self) {
        self.vertex_store.sort(&self.vertices);
    }

    /// All vertices within `epsilon` of `position` (exact matches for `epsilon == 0`).
    ///
    /// Fails with [`MeshError::VertexStoreUnsorted`] unless the store is sorted.
    pub fn find_vertices(&self, position: &Point3<f64>, epsilon: f64) -> Result<Vec<VertexId<I>>> {
        self.vertex_store.find(position, epsilon, &self.vertices)
    }

    /// Create a mesh edge between two distinct vertices.
    ///
    /// With [`CreateOption::ReuseExisting`] an edge already joining the two
    /// vertices is returned instead.
    pub fn create_mesh_edge(
        &mut self,
        v1: VertexId<I>,
        v2: VertexId<I>,
        create: CreateOption,
    ) -> Result<EdgeId<I>> {
        if v1 == v2 {
            return Err(MeshError::SelfLoop { vertex: v1.index() });
        }
        self.check_vertex(v1)?;
        self.check_vertex(v2)?;

        if create == CreateOption::ReuseExisting {
            if let Some(existing) = self.find_mesh_edge(v1, v2) {
                return Ok(existing);
            }
        }

        self.ensure_capacity(0, 1, 0, 0)?;
        let e = self.alloc_edge(v1, v2);
        self.ring_insert(v1, e, 0)?;
        self.ring_insert(v2, e, 1)?;
        self.mark_as_changed();
        Ok(e)
    }

    /// Create a face bounded by `vertices` in order.
    ///
    /// Consecutive repeats (by handle or by position) are collapsed first.
    /// Degenerate input, meaning fewer than three distinct vertices or a
    /// collinear triangle, yields `Ok(None)`: such faces show up routinely in
    /// imported files and must not abort a bulk load.
    pub fn create_face(
        &mut self,
        vertices: &[VertexId<I>],
        create: CreateOption,
    ) -> Result<Option<FaceId<I>>> {
        for &v in vertices {
            self.check_vertex(v)?;
        }

        let mut ring: Vec<VertexId<I>> = Vec::with_capacity(vertices.len());
        for &v in vertices {
            if let Some(&last) = ring.last() {
                if self.coincident(last, v) {
                    continue;
                }
            }
            ring.push(v);
        }
        while ring.len() > 1 && self.coincident(ring[0], ring[ring.len() - 1]) {
            ring.pop();
        }

        let mut distinct = ring.clone();
        distinct.sort();
        distinct.dedup();
        if distinct.len() < 3 {
            debug!(requested = vertices.len(), "skipping face with fewer than 3 distinct vertices");
            return Ok(None);
        }

        let positions: Vec<Point3<f64>> = ring.iter().map(|&v| *self.position(v)).collect();
        if ring.len() == 3 {
            let e1 = positions[1] - positions[0];
            let e2 = positions[2] - positions[0];
            let cross = e1.cross(&e2).norm_squared();
            if cross <= f64::EPSILON * e1.norm_squared() * e2.norm_squared() {
                debug!("skipping collinear triangle");
                return Ok(None);
            }
        }
        let normal = polygon_normal(&positions);

        let n = ring.len();
        let new_edges = (0..n)
            .filter(|&i| {
                create == CreateOption::CreateNew
                    || self.find_mesh_edge(ring[i], ring[(i + 1) % n]).is_none()
            })
            .count();
        self.ensure_capacity(0, new_edges, n, 1)?;
        let mut edges = Vec::with_capacity(n);
        for i in 0..n {
            edges.push(self.create_mesh_edge(ring[i], ring[(i + 1) % n], create)?);
        }

        let face = self.alloc_face(normal);
        let face_edges: Vec<_> = (0..n)
            .map(|i| self.alloc_face_edge(face, edges[i], ring[i]))
            .collect();
        for i in 0..n {
            self.link(face_edges[i], face_edges[(i + 1) % n]);
        }
        self.face_mut(face).first_face_edge = face_edges[0];
        for &fe in &face_edges {
            self.radial_insert(fe);
        }

        self.mark_as_changed();
        trace!(?face, sides = n, "created face");
        Ok(Some(face))
    }

    fn coincident(&self, a: VertexId<I>, b: VertexId<I>) -> bool {
        a == b || self.position(a) == self.position(b)
    }

    /// Create a face from positions, creating (or reusing, within `epsilon`) its vertices.
    pub fn create_face_from_positions(
        &mut self,
        positions: &[Point3<f64>],
        create: CreateOption,
        epsilon: f64,
    ) -> Result<Option<FaceId<I>>> {
        let sort = if create == CreateOption::ReuseExisting {
            SortOption::SortNow
        } else {
            SortOption::WillSortLater
        };
        let vertices = positions
            .iter()
            .map(|&p| self.create_vertex(p, create, sort, epsilon))
            .collect::<Result<Vec<_>>>()?;
        self.create_face(&vertices, create)
    }
}

/// Build a mesh from vertex positions and polygon faces given as vertex indices.
///
/// Shared edges are reused, so faces sharing vertex indices come out stitched.
/// Degenerate faces are skipped.
///
/// # Example
/// ```
/// use polykernel::mesh::{build_from_polygons, Mesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let faces = vec![vec![0, 1, 2], vec![0, 2, 3]];
///
/// let mesh: Mesh = build_from_polygons(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_faces(), 2);
/// assert_eq!(mesh.num_mesh_edges(), 5);
/// ```
pub fn build_from_polygons<I: MeshIndex, F: AsRef<[usize]>>(
    vertices: &[Point3<f64>],
    faces: &[F],
) -> Result<Mesh<I>> {
    for (fi, face) in faces.iter().enumerate() {
        if let Some(&vi) = face.as_ref().iter().find(|&&vi| vi >= vertices.len()) {
            return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
        }
    }

    let mut mesh = Mesh::with_capacity(vertices.len(), faces.len());
    mesh.ensure_capacity(vertices.len(), 0, 0, 0)?;
    let ids: Vec<VertexId<I>> = vertices
        .iter()
        .map(|&p| {
            let v = mesh.alloc_vertex(p);
            mesh.vertex_store.add(v, &mesh.vertices, SortOption::WillSortLater);
            v
        })
        .collect();
    mesh.sort_vertices();

    let mut skipped = 0usize;
    for face in faces {
        let face_ids: Vec<_> = face.as_ref().iter().map(|&i| ids[i]).collect();
        if mesh.create_face(&face_ids, CreateOption::ReuseExisting)?.is_none() {
            skipped += 1;
        }
    }
    if skipped > 0 {
        debug!(skipped, "skipped degenerate faces while building mesh");
    }
    mesh.mark_as_changed();
    Ok(mesh)
}

/// Convert a mesh back to a face-vertex representation.
///
/// Vertices come out in store order; faces in insertion order.
pub fn to_face_vertex<I: MeshIndex>(mesh: &Mesh<I>) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let mut index_of: HashMap<VertexId<I>, usize> = HashMap::with_capacity(mesh.num_vertices());
    let mut vertices = Vec::with_capacity(mesh.num_vertices());
    for (id, v) in mesh.vertices() {
        index_of.insert(id, vertices.len());
        vertices.push(*v.position());
    }

    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_vertices(f).map(|v| index_of[&v]).collect())
        .collect();

    (vertices, faces)
}
