//! Half-edge polygon mesh data structure.
//!
//! Unlike a twin-based half-edge mesh, edges here are first-class:
//!
//! - Each **mesh edge** joins two vertices and threads two circular rings, one
//!   per endpoint, so every vertex can enumerate its incident edges.
//! - Each **face-edge** is one directed side of one face. It sits in exactly
//!   one face boundary loop (`next`/`prev`) and exactly one *radial loop*
//!   (`radial_next`/`radial_prev`) of face-edges sharing its mesh edge.
//! - A mesh edge used by two faces is manifold; boundary edges have one
//!   face-edge and non-manifold edges three or more.
//!
//! All elements live in tombstoned slot storage owned by [`Mesh`]; handles are
//! indices into that storage and never alias a later element.

use std::sync::OnceLock;

use nalgebra::{Point3, Vector3};

use super::index::{EdgeId, FaceEdgeId, FaceId, MeshIndex, VertexId};
use super::storage::Slots;
use super::vertex_store::VertexStore;
use crate::error::{MeshError, Result};

/// A vertex in the mesh.
#[derive(Debug, Clone)]
pub struct Vertex<I: MeshIndex = u32> {
    pub(crate) uid: u64,

    /// The 3D position of this vertex.
    pub(crate) position: Point3<f64>,

    /// Vertex normal, filled in by [`Mesh::calculate_normals`].
    pub(crate) normal: Vector3<f64>,

    /// Entry point into the ring of incident mesh edges.
    pub(crate) first_edge: EdgeId<I>,
}

impl<I: MeshIndex> Vertex<I> {
    pub(crate) fn new(position: Point3<f64>, uid: u64) -> Self {
        Self {
            uid,
            position,
            normal: Vector3::zeros(),
            first_edge: EdgeId::invalid(),
        }
    }

    /// Identifier assigned at creation, unique within the owning mesh.
    #[inline]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The 3D position of this vertex.
    #[inline]
    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    /// The vertex normal.
    #[inline]
    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    /// One incident mesh edge, or an invalid handle for an isolated vertex.
    #[inline]
    pub fn first_edge(&self) -> EdgeId<I> {
        self.first_edge
    }
}

/// An undirected edge between two vertices.
#[derive(Debug, Clone)]
pub struct MeshEdge<I: MeshIndex = u32> {
    pub(crate) uid: u64,

    /// The two endpoints.
    pub(crate) vertices: [VertexId<I>; 2],

    /// `next_at[k]` is the next edge in the ring of `vertices[k]`.
    pub(crate) next_at: [EdgeId<I>; 2],

    /// Entry point into the radial loop, invalid when no face uses the edge.
    pub(crate) first_face_edge: FaceEdgeId<I>,
}

impl<I: MeshIndex> MeshEdge<I> {
    fn new(v0: VertexId<I>, v1: VertexId<I>, uid: u64) -> Self {
        Self {
            uid,
            vertices: [v0, v1],
            next_at: [EdgeId::invalid(), EdgeId::invalid()],
            first_face_edge: FaceEdgeId::invalid(),
        }
    }

    /// Identifier assigned at creation, unique within the owning mesh.
    #[inline]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The two endpoints.
    #[inline]
    pub fn vertices(&self) -> [VertexId<I>; 2] {
        self.vertices
    }

    /// Which end of the edge `v` is.
    #[inline]
    pub fn end_of(&self, v: VertexId<I>) -> Option<usize> {
        if self.vertices[0] == v {
            Some(0)
        } else if self.vertices[1] == v {
            Some(1)
        } else {
            None
        }
    }

    /// The endpoint opposite `v`.
    #[inline]
    pub fn other_vertex(&self, v: VertexId<I>) -> Option<VertexId<I>> {
        self.end_of(v).map(|k| self.vertices[1 - k])
    }

    /// Whether the edge joins `a` and `b` in either direction.
    #[inline]
    pub fn connects(&self, a: VertexId<I>, b: VertexId<I>) -> bool {
        (self.vertices[0] == a && self.vertices[1] == b)
            || (self.vertices[0] == b && self.vertices[1] == a)
    }

    /// The next edge around `v`, if `v` is an endpoint.
    #[inline]
    pub fn next_edge_at(&self, v: VertexId<I>) -> Option<EdgeId<I>> {
        self.end_of(v).map(|k| self.next_at[k])
    }

    /// One face-edge of the radial loop, or an invalid handle.
    #[inline]
    pub fn first_face_edge(&self) -> FaceEdgeId<I> {
        self.first_face_edge
    }
}

/// One directed side of one face.
#[derive(Debug, Clone, Copy)]
pub struct FaceEdge<I: MeshIndex = u32> {
    pub(crate) uid: u64,
    pub(crate) face: FaceId<I>,
    pub(crate) edge: EdgeId<I>,
    pub(crate) start: VertexId<I>,
    pub(crate) next: FaceEdgeId<I>,
    pub(crate) prev: FaceEdgeId<I>,
    pub(crate) radial_next: FaceEdgeId<I>,
    pub(crate) radial_prev: FaceEdgeId<I>,
}

impl<I: MeshIndex> FaceEdge<I> {
    fn new(face: FaceId<I>, edge: EdgeId<I>, start: VertexId<I>, uid: u64) -> Self {
        Self {
            uid,
            face,
            edge,
            start,
            next: FaceEdgeId::invalid(),
            prev: FaceEdgeId::invalid(),
            radial_next: FaceEdgeId::invalid(),
            radial_prev: FaceEdgeId::invalid(),
        }
    }

    /// Identifier assigned at creation, unique within the owning mesh.
    #[inline]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The face this face-edge bounds.
    #[inline]
    pub fn face(&self) -> FaceId<I> {
        self.face
    }

    /// The mesh edge this face-edge runs along.
    #[inline]
    pub fn edge(&self) -> EdgeId<I> {
        self.edge
    }

    /// The vertex this face-edge leaves from.
    #[inline]
    pub fn start(&self) -> VertexId<I> {
        self.start
    }

    /// Next face-edge around the face.
    #[inline]
    pub fn next(&self) -> FaceEdgeId<I> {
        self.next
    }

    /// Previous face-edge around the face.
    #[inline]
    pub fn prev(&self) -> FaceEdgeId<I> {
        self.prev
    }

    /// Next face-edge sharing the same mesh edge.
    #[inline]
    pub fn radial_next(&self) -> FaceEdgeId<I> {
        self.radial_next
    }

    /// Previous face-edge sharing the same mesh edge.
    #[inline]
    pub fn radial_prev(&self) -> FaceEdgeId<I> {
        self.radial_prev
    }
}

/// A polygonal face.
#[derive(Debug, Clone, Copy)]
pub struct Face<I: MeshIndex = u32> {
    pub(crate) uid: u64,
    pub(crate) normal: Vector3<f64>,
    pub(crate) first_face_edge: FaceEdgeId<I>,
}

impl<I: MeshIndex> Face<I> {
    /// Identifier assigned at creation, unique within the owning mesh.
    #[inline]
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Unit face normal (zero for a degenerate face).
    #[inline]
    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    /// One face-edge of the boundary loop.
    #[inline]
    pub fn first_face_edge(&self) -> FaceEdgeId<I> {
        self.first_face_edge
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Extent along each axis.
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Center point.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}

/// A polygon mesh with explicit edges, face boundary loops and radial loops.
#[derive(Debug, Clone)]
pub struct Mesh<I: MeshIndex = u32> {
    pub(crate) vertices: Slots<Vertex<I>>,
    pub(crate) edges: Slots<MeshEdge<I>>,
    pub(crate) face_edges: Slots<FaceEdge<I>>,
    pub(crate) faces: Slots<Face<I>>,
    pub(crate) vertex_store: VertexStore<I>,
    next_uid: u64,
    change_count: u64,
    bounds_cache: OnceLock<Option<Aabb>>,
}

impl<I: MeshIndex> Default for Mesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> Mesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Slots::new(),
            edges: Slots::new(),
            face_edges: Slots::new(),
            faces: Slots::new(),
            vertex_store: VertexStore::new(),
            next_uid: 0,
            change_count: 0,
            bounds_cache: OnceLock::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        // Closed triangle meshes have E = 3F/2 and 3F face-edges
        let num_edges = num_faces * 3 / 2 + num_faces / 4;
        Self {
            vertices: Slots::with_capacity(num_vertices),
            edges: Slots::with_capacity(num_edges),
            face_edges: Slots::with_capacity(num_faces * 3),
            faces: Slots::with_capacity(num_faces),
            vertex_store: VertexStore::with_capacity(num_vertices),
            next_uid: 0,
            change_count: 0,
            bounds_cache: OnceLock::new(),
        }
    }

    // ==================== Accessors ====================

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of live mesh edges.
    #[inline]
    pub fn num_mesh_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of live face-edges.
    #[inline]
    pub fn num_face_edges(&self) -> usize {
        self.face_edges.len()
    }

    /// Number of live faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Get a vertex by handle.
    ///
    /// # Panics
    /// Panics if the handle is not live; see [`try_vertex`](Self::try_vertex).
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex<I> {
        &self.vertices[id.index()]
    }

    /// Get a mesh edge by handle. Panics if the handle is not live.
    #[inline]
    pub fn mesh_edge(&self, id: EdgeId<I>) -> &MeshEdge<I> {
        &self.edges[id.index()]
    }

    /// Get a face-edge by handle. Panics if the handle is not live.
    #[inline]
    pub fn face_edge(&self, id: FaceEdgeId<I>) -> &FaceEdge<I> {
        &self.face_edges[id.index()]
    }

    /// Get a face by handle. Panics if the handle is not live.
    #[inline]
    pub fn face(&self, id: FaceId<I>) -> &Face<I> {
        &self.faces[id.index()]
    }

    /// Get a vertex, or a [`MeshError::StaleHandle`] error.
    pub fn try_vertex(&self, id: VertexId<I>) -> Result<&Vertex<I>> {
        self.vertices
            .get(id.index())
            .ok_or_else(|| MeshError::stale("vertex", id.index()))
    }

    /// Get a mesh edge, or a [`MeshError::StaleHandle`] error.
    pub fn try_mesh_edge(&self, id: EdgeId<I>) -> Result<&MeshEdge<I>> {
        self.edges
            .get(id.index())
            .ok_or_else(|| MeshError::stale("edge", id.index()))
    }

    /// Get a face-edge, or a [`MeshError::StaleHandle`] error.
    pub fn try_face_edge(&self, id: FaceEdgeId<I>) -> Result<&FaceEdge<I>> {
        self.face_edges
            .get(id.index())
            .ok_or_else(|| MeshError::stale("face-edge", id.index()))
    }

    /// Get a face, or a [`MeshError::StaleHandle`] error.
    pub fn try_face(&self, id: FaceId<I>) -> Result<&Face<I>> {
        self.faces
            .get(id.index())
            .ok_or_else(|| MeshError::stale("face", id.index()))
    }

    /// Whether the handle refers to a live vertex.
    #[inline]
    pub fn contains_vertex(&self, id: VertexId<I>) -> bool {
        self.vertices.contains(id.index())
    }

    /// Whether the handle refers to a live mesh edge.
    #[inline]
    pub fn contains_mesh_edge(&self, id: EdgeId<I>) -> bool {
        self.edges.contains(id.index())
    }

    /// Whether the handle refers to a live face.
    #[inline]
    pub fn contains_face(&self, id: FaceId<I>) -> bool {
        self.faces.contains(id.index())
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertex(v).position
    }

    /// Get the normal of a face.
    #[inline]
    pub fn face_normal(&self, f: FaceId<I>) -> &Vector3<f64> {
        &self.face(f).normal
    }

    /// Whether the vertex store is in spatial order.
    #[inline]
    pub fn is_sorted(&self) -> bool {
        self.vertex_store.is_sorted()
    }

    /// Monotonic counter bumped by every topology or position edit.
    #[inline]
    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    /// Invalidate cached data derived from the mesh.
    #[inline]
    pub fn mark_as_changed(&mut self) {
        self.change_count += 1;
        self.bounds_cache.take();
    }

    // ==================== Iteration ====================

    /// Iterate over vertex handles, in spatial order once sorted.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertex_store.ids().iter().copied()
    }

    /// Iterate over vertices with their handles, in spatial order once sorted.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId<I>, &Vertex<I>)> + '_ {
        self.vertex_store
            .ids()
            .iter()
            .map(move |&v| (v, &self.vertices[v.index()]))
    }

    /// Iterate over mesh edge handles in insertion order.
    pub fn mesh_edge_ids(&self) -> impl Iterator<Item = EdgeId<I>> + '_ {
        self.edges.iter().map(|(i, _)| EdgeId::new(i))
    }

    /// Iterate over mesh edges with their handles in insertion order.
    pub fn mesh_edges(&self) -> impl Iterator<Item = (EdgeId<I>, &MeshEdge<I>)> + '_ {
        self.edges.iter().map(|(i, e)| (EdgeId::new(i), e))
    }

    /// Iterate over face handles in insertion order.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.faces.iter().map(|(i, _)| FaceId::new(i))
    }

    /// Iterate over faces with their handles in insertion order.
    pub fn faces(&self) -> impl Iterator<Item = (FaceId<I>, &Face<I>)> + '_ {
        self.faces.iter().map(|(i, f)| (FaceId::new(i), f))
    }

    /// Iterate over the face-edges of a face boundary, starting at its first face-edge.
    pub fn face_boundary(&self, f: FaceId<I>) -> FaceBoundaryIter<'_, I> {
        FaceBoundaryIter::new(self, f)
    }

    /// Iterate over the vertices of a face in boundary order.
    pub fn face_vertices(&self, f: FaceId<I>) -> impl Iterator<Item = VertexId<I>> + Clone + '_ {
        self.face_boundary(f).map(move |fe| self.face_edges[fe.index()].start)
    }

    /// Positions of the vertices of a face in boundary order.
    pub fn face_positions(&self, f: FaceId<I>) -> Vec<Point3<f64>> {
        self.face_vertices(f).map(|v| *self.position(v)).collect()
    }

    /// Number of sides of a face.
    pub fn face_vertex_count(&self, f: FaceId<I>) -> usize {
        self.face_boundary(f).count()
    }

    /// Iterate over the ring of mesh edges incident to a vertex.
    pub fn vertex_edges(&self, v: VertexId<I>) -> VertexEdgeIter<'_, I> {
        VertexEdgeIter::new(self, v)
    }

    /// Number of mesh edges incident to a vertex.
    pub fn vertex_edge_count(&self, v: VertexId<I>) -> usize {
        self.vertex_edges(v).count()
    }

    /// Iterate over vertices joined to `v` by a mesh edge.
    pub fn vertex_neighbors(&self, v: VertexId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertex_edges(v)
            .filter_map(move |e| self.edges[e.index()].other_vertex(v))
    }

    /// Faces using any edge incident to `v`, without repeats.
    pub fn vertex_faces(&self, v: VertexId<I>) -> Vec<FaceId<I>> {
        let mut faces = Vec::new();
        for e in self.vertex_edges(v) {
            for f in self.edge_faces(e) {
                if !faces.contains(&f) {
                    faces.push(f);
                }
            }
        }
        faces
    }

    /// Iterate over the radial loop of face-edges sharing a mesh edge.
    pub fn radial_face_edges(&self, e: EdgeId<I>) -> RadialIter<'_, I> {
        RadialIter::new(self, e)
    }

    /// Iterate over faces using a mesh edge.
    pub fn edge_faces(&self, e: EdgeId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.radial_face_edges(e)
            .map(move |fe| self.face_edges[fe.index()].face)
    }

    /// Number of faces using a mesh edge.
    pub fn edge_face_count(&self, e: EdgeId<I>) -> usize {
        self.radial_face_edges(e).count()
    }

    /// All mesh edges joining `a` and `b`.
    pub fn find_mesh_edges(&self, a: VertexId<I>, b: VertexId<I>) -> Vec<EdgeId<I>> {
        if !self.contains_vertex(a) {
            return Vec::new();
        }
        self.vertex_edges(a)
            .filter(|&e| self.edges[e.index()].connects(a, b))
            .collect()
    }

    /// The first mesh edge joining `a` and `b`, if any.
    pub fn find_mesh_edge(&self, a: VertexId<I>, b: VertexId<I>) -> Option<EdgeId<I>> {
        if !self.contains_vertex(a) {
            return None;
        }
        self.vertex_edges(a)
            .find(|&e| self.edges[e.index()].connects(a, b))
    }

    /// The face-edge of `f` that leaves from `v`.
    pub fn face_edge_starting_at(&self, f: FaceId<I>, v: VertexId<I>) -> Option<FaceEdgeId<I>> {
        self.face_boundary(f)
            .find(|&fe| self.face_edges[fe.index()].start == v)
    }

    /// The face-edge of `f` that runs along `e`.
    pub fn face_edge_on(&self, f: FaceId<I>, e: EdgeId<I>) -> Option<FaceEdgeId<I>> {
        self.face_boundary(f)
            .find(|&fe| self.face_edges[fe.index()].edge == e)
    }

    /// The vertex a face-edge runs to.
    pub fn face_edge_end(&self, fe: FaceEdgeId<I>) -> VertexId<I> {
        let fe = &self.face_edges[fe.index()];
        self.edges[fe.edge.index()]
            .other_vertex(fe.start)
            .unwrap_or_default()
    }

    /// Mesh edges whose radial loop does not hold exactly two face-edges.
    pub fn non_manifold_edges(&self) -> Vec<EdgeId<I>> {
        self.mesh_edge_ids()
            .filter(|&e| self.edge_face_count(e) != 2)
            .collect()
    }

    /// Whether every mesh edge is shared by exactly two faces.
    pub fn is_manifold(&self) -> bool {
        self.mesh_edge_ids().all(|e| self.edge_face_count(e) == 2)
    }

    // ==================== Allocation ====================

    /// Fail unless `I` can address the given number of additional elements.
    ///
    /// Slots are never reused, so the limit counts every allocation made
    /// since the mesh was created, not just live elements.
    pub(crate) fn ensure_capacity(
        &self,
        vertices: usize,
        edges: usize,
        face_edges: usize,
        faces: usize,
    ) -> Result<()> {
        let limit = I::MAX.to_usize().saturating_add(1);
        let demands = [
            ("vertex", self.vertices.slot_count(), vertices),
            ("edge", self.edges.slot_count(), edges),
            ("face-edge", self.face_edges.slot_count(), face_edges),
            ("face", self.faces.slot_count(), faces),
        ];
        for (kind, used, extra) in demands {
            if extra > limit.saturating_sub(used) {
                return Err(MeshError::CapacityExceeded { kind, limit });
            }
        }
        Ok(())
    }

    pub(crate) fn take_uid(&mut self) -> u64 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    pub(crate) fn alloc_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        let uid = self.take_uid();
        VertexId::new(self.vertices.insert(Vertex::new(position, uid)))
    }

    /// Allocate an edge without threading it into the vertex rings.
    pub(crate) fn alloc_edge(&mut self, v0: VertexId<I>, v1: VertexId<I>) -> EdgeId<I> {
        let uid = self.take_uid();
        EdgeId::new(self.edges.insert(MeshEdge::new(v0, v1, uid)))
    }

    pub(crate) fn alloc_face_edge(
        &mut self,
        face: FaceId<I>,
        edge: EdgeId<I>,
        start: VertexId<I>,
    ) -> FaceEdgeId<I> {
        let uid = self.take_uid();
        FaceEdgeId::new(self.face_edges.insert(FaceEdge::new(face, edge, start, uid)))
    }

    pub(crate) fn alloc_face(&mut self, normal: Vector3<f64>) -> FaceId<I> {
        let uid = self.take_uid();
        FaceId::new(self.faces.insert(Face {
            uid,
            normal,
            first_face_edge: FaceEdgeId::invalid(),
        }))
    }

    #[inline]
    pub(crate) fn fe(&self, id: FaceEdgeId<I>) -> &FaceEdge<I> {
        &self.face_edges[id.index()]
    }

    #[inline]
    pub(crate) fn fe_mut(&mut self, id: FaceEdgeId<I>) -> &mut FaceEdge<I> {
        &mut self.face_edges[id.index()]
    }

    #[inline]
    pub(crate) fn edge_mut(&mut self, id: EdgeId<I>) -> &mut MeshEdge<I> {
        &mut self.edges[id.index()]
    }

    #[inline]
    pub(crate) fn face_mut(&mut self, id: FaceId<I>) -> &mut Face<I> {
        &mut self.faces[id.index()]
    }

    pub(crate) fn check_vertex(&self, v: VertexId<I>) -> Result<()> {
        self.try_vertex(v).map(|_| ())
    }

    pub(crate) fn check_edge(&self, e: EdgeId<I>) -> Result<()> {
        self.try_mesh_edge(e).map(|_| ())
    }

    pub(crate) fn check_face(&self, f: FaceId<I>) -> Result<()> {
        self.try_face(f).map(|_| ())
    }

    // ==================== Ring / loop plumbing ====================

    fn end_index(&self, e: EdgeId<I>, v: VertexId<I>) -> Result<usize> {
        self.edges[e.index()].end_of(v).ok_or_else(|| {
            MeshError::InvalidTopology(format!("{:?} is not an endpoint of {:?}", v, e))
        })
    }

    /// Thread `e` into the ring of `v`, which must be its endpoint `k`.
    pub(crate) fn ring_insert(&mut self, v: VertexId<I>, e: EdgeId<I>, k: usize) -> Result<()> {
        let Some(head) = self.vertices[v.index()].first_edge.valid() else {
            self.edges[e.index()].next_at[k] = e;
            self.vertices[v.index()].first_edge = e;
            return Ok(());
        };
        let hk = self.end_index(head, v)?;
        let after = self.edges[head.index()].next_at[hk];
        self.edges[e.index()].next_at[k] = after;
        self.edges[head.index()].next_at[hk] = e;
        Ok(())
    }

    /// Unthread `e` from the ring of `v`.
    pub(crate) fn ring_remove(&mut self, v: VertexId<I>, e: EdgeId<I>) -> Result<()> {
        let k = self.end_index(e, v)?;
        let after = self.edges[e.index()].next_at[k];
        if after == e {
            if self.vertices[v.index()].first_edge == e {
                self.vertices[v.index()].first_edge = EdgeId::invalid();
            }
        } else {
            let mut prev = after;
            let mut steps = 0;
            loop {
                let pk = self.end_index(prev, v)?;
                let pn = self.edges[prev.index()].next_at[pk];
                if pn == e {
                    self.edges[prev.index()].next_at[pk] = after;
                    break;
                }
                prev = pn;
                steps += 1;
                if !prev.is_valid() || steps > self.edges.slot_count() {
                    return Err(MeshError::InvalidTopology(format!(
                        "ring of {:?} does not close through {:?}",
                        v, e
                    )));
                }
            }
            if self.vertices[v.index()].first_edge == e {
                self.vertices[v.index()].first_edge = after;
            }
        }
        self.edges[e.index()].next_at[k] = EdgeId::invalid();
        Ok(())
    }

    /// Add `fe` to the radial loop of its mesh edge.
    pub(crate) fn radial_insert(&mut self, fe: FaceEdgeId<I>) {
        let e = self.fe(fe).edge;
        let Some(head) = self.edges[e.index()].first_face_edge.valid() else {
            let f = self.fe_mut(fe);
            f.radial_next = fe;
            f.radial_prev = fe;
            self.edges[e.index()].first_face_edge = fe;
            return;
        };
        let after = self.fe(head).radial_next;
        {
            let f = self.fe_mut(fe);
            f.radial_prev = head;
            f.radial_next = after;
        }
        self.fe_mut(head).radial_next = fe;
        self.fe_mut(after).radial_prev = fe;
    }

    /// Remove `fe` from the radial loop of its mesh edge.
    pub(crate) fn radial_remove(&mut self, fe: FaceEdgeId<I>) {
        let FaceEdge {
            edge,
            radial_next,
            radial_prev,
            ..
        } = *self.fe(fe);
        if radial_next == fe || !radial_next.is_valid() {
            if self.edges[edge.index()].first_face_edge == fe {
                self.edges[edge.index()].first_face_edge = FaceEdgeId::invalid();
            }
        } else {
            self.fe_mut(radial_prev).radial_next = radial_next;
            self.fe_mut(radial_next).radial_prev = radial_prev;
            if self.edges[edge.index()].first_face_edge == fe {
                self.edges[edge.index()].first_face_edge = radial_next;
            }
        }
        let f = self.fe_mut(fe);
        f.radial_next = FaceEdgeId::invalid();
        f.radial_prev = FaceEdgeId::invalid();
    }

    /// Move `fe` from the radial loop of its current edge to that of `to`.
    pub(crate) fn radial_move(&mut self, fe: FaceEdgeId<I>, to: EdgeId<I>) {
        self.radial_remove(fe);
        self.fe_mut(fe).edge = to;
        self.radial_insert(fe);
    }

    /// Link `a -> b` in a face boundary loop.
    #[inline]
    pub(crate) fn link(&mut self, a: FaceEdgeId<I>, b: FaceEdgeId<I>) {
        self.fe_mut(a).next = b;
        self.fe_mut(b).prev = a;
    }

    /// Cut `fe` out of its face boundary loop, keeping the face's entry point live.
    pub(crate) fn boundary_remove(&mut self, fe: FaceEdgeId<I>) {
        let FaceEdge { face, next, prev, .. } = *self.fe(fe);
        if next != fe {
            self.link(prev, next);
        }
        if self.faces.contains(face.index()) && self.faces[face.index()].first_face_edge == fe {
            self.faces[face.index()].first_face_edge = if next != fe {
                next
            } else {
                FaceEdgeId::invalid()
            };
        }
        let f = self.fe_mut(fe);
        f.next = FaceEdgeId::invalid();
        f.prev = FaceEdgeId::invalid();
    }

    /// Drop a vertex slot and its store entry. The vertex must be unlinked.
    pub(crate) fn kill_vertex(&mut self, v: VertexId<I>) {
        self.vertex_store.remove(v, &self.vertices);
        self.vertices.remove(v.index());
    }

    /// Batch vertex store removals, for passes that kill many vertices.
    ///
    /// Nothing may query the store by position until
    /// [`flush_vertex_removals`](Self::flush_vertex_removals).
    pub(crate) fn defer_vertex_removals(&mut self) {
        self.vertex_store.defer_removals();
    }

    /// Compact the vertex store after [`defer_vertex_removals`](Self::defer_vertex_removals).
    pub(crate) fn flush_vertex_removals(&mut self) {
        self.vertex_store.flush(&self.vertices);
    }

    /// Unthread an edge from both rings and drop it. Its radial loop must be empty.
    pub(crate) fn kill_edge(&mut self, e: EdgeId<I>) -> Result<()> {
        let [v0, v1] = self.edges[e.index()].vertices;
        self.ring_remove(v0, e)?;
        self.ring_remove(v1, e)?;
        self.edges.remove(e.index());
        Ok(())
    }

    // ==================== Validation ====================

    /// Check every ring, loop and back-reference invariant.
    pub fn validate(&self) -> Result<()> {
        fn bad<T>(msg: String) -> Result<T> {
            Err(MeshError::InvalidTopology(msg))
        }

        let mut ring_sizes = vec![0usize; self.vertices.slot_count()];
        let mut radial_sizes = vec![0usize; self.edges.slot_count()];
        let mut loop_sizes = vec![0usize; self.faces.slot_count()];

        for (i, e) in self.edges.iter() {
            let [a, b] = e.vertices;
            if a == b {
                return bad(format!("E({}) is a self loop", i));
            }
            for v in [a, b] {
                if !self.vertices.contains(v.index()) {
                    return bad(format!("E({}) references dead {:?}", i, v));
                }
                ring_sizes[v.index()] += 1;
            }
        }
        for (i, fe) in self.face_edges.iter() {
            if !self.faces.contains(fe.face.index()) {
                return bad(format!("FE({}) owned by dead {:?}", i, fe.face));
            }
            if !self.edges.contains(fe.edge.index()) {
                return bad(format!("FE({}) runs along dead {:?}", i, fe.edge));
            }
            radial_sizes[fe.edge.index()] += 1;
            loop_sizes[fe.face.index()] += 1;
        }

        for (i, _) in self.vertices.iter() {
            let v = VertexId::new(i);
            let n = self.vertex_edges(v).count();
            if n != ring_sizes[i] {
                return bad(format!("ring of {:?} has {} edges, expected {}", v, n, ring_sizes[i]));
            }
            for e in self.vertex_edges(v) {
                if self.edges[e.index()].end_of(v).is_none() {
                    return bad(format!("ring of {:?} contains unrelated {:?}", v, e));
                }
            }
        }

        for (i, e) in self.edges.iter() {
            let id = EdgeId::new(i);
            let mut n = 0;
            for fe in self.radial_face_edges(id) {
                let f = self.fe(fe);
                if f.edge != id {
                    return bad(format!("radial loop of {:?} contains {:?} on {:?}", id, fe, f.edge));
                }
                if self.fe(f.radial_next).radial_prev != fe {
                    return bad(format!("radial links broken at {:?}", fe));
                }
                n += 1;
            }
            if n != radial_sizes[i] {
                return bad(format!("radial loop of {:?} has {} entries, expected {}", id, n, radial_sizes[i]));
            }
            if n == 0 && e.first_face_edge.is_valid() {
                return bad(format!("{:?} points at a face-edge but has none", id));
            }
        }

        for (i, face) in self.faces.iter() {
            let id = FaceId::new(i);
            if !self.face_edges.contains(face.first_face_edge.index()) {
                return bad(format!("{:?} has no boundary", id));
            }
            let mut n = 0;
            for fe in self.face_boundary(id) {
                let f = self.fe(fe);
                if f.face != id {
                    return bad(format!("boundary of {:?} contains {:?} owned by {:?}", id, fe, f.face));
                }
                if self.fe(f.next).prev != fe {
                    return bad(format!("boundary links broken at {:?}", fe));
                }
                let end = match self.edges[f.edge.index()].other_vertex(f.start) {
                    Some(end) => end,
                    None => return bad(format!("{:?} starts off its edge {:?}", fe, f.edge)),
                };
                if self.fe(f.next).start != end {
                    return bad(format!("{:?} ends at {:?} but next starts elsewhere", fe, end));
                }
                n += 1;
            }
            if n != loop_sizes[i] {
                return bad(format!("boundary of {:?} has {} sides, expected {}", id, n, loop_sizes[i]));
            }
        }

        if self.vertex_store.len() != self.vertices.len() {
            return bad(format!(
                "vertex store holds {} entries for {} vertices",
                self.vertex_store.len(),
                self.vertices.len()
            ));
        }
        if self.vertex_store.ids().iter().any(|v| !self.vertices.contains(v.index())) {
            return bad("vertex store references a dead vertex".to_string());
        }
        if !self.vertex_store.is_consistent(&self.vertices) {
            return bad("vertex store claims to be sorted but is not".to_string());
        }
        Ok(())
    }

    /// Check if the mesh is valid (all connectivity is consistent).
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub(crate) fn bounds_cache(&self) -> &OnceLock<Option<Aabb>> {
        &self.bounds_cache
    }
}

/// Iterator over the ring of mesh edges around a vertex.
///
/// The walk is bounded by the number of edge slots, so it terminates even
/// while a ring is temporarily open during an edit.
#[derive(Clone)]
pub struct VertexEdgeIter<'a, I: MeshIndex = u32> {
    mesh: &'a Mesh<I>,
    vertex: VertexId<I>,
    start: EdgeId<I>,
    current: EdgeId<I>,
    remaining: usize,
}

impl<'a, I: MeshIndex> VertexEdgeIter<'a, I> {
    fn new(mesh: &'a Mesh<I>, v: VertexId<I>) -> Self {
        let start = mesh
            .vertices
            .get(v.index())
            .map(|v| v.first_edge)
            .unwrap_or_default();
        Self {
            mesh,
            vertex: v,
            start,
            current: start,
            remaining: mesh.edges.slot_count(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for VertexEdgeIter<'a, I> {
    type Item = EdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || !self.current.is_valid() {
            return None;
        }
        let result = self.current;
        self.remaining -= 1;
        let next = self
            .mesh
            .edges
            .get(result.index())
            .and_then(|e| e.next_edge_at(self.vertex))
            .unwrap_or_default();
        self.current = if next == self.start {
            EdgeId::invalid()
        } else {
            next
        };
        Some(result)
    }
}

/// Iterator over the face-edges of a face boundary loop.
#[derive(Clone)]
pub struct FaceBoundaryIter<'a, I: MeshIndex = u32> {
    mesh: &'a Mesh<I>,
    start: FaceEdgeId<I>,
    current: FaceEdgeId<I>,
    remaining: usize,
}

impl<'a, I: MeshIndex> FaceBoundaryIter<'a, I> {
    fn new(mesh: &'a Mesh<I>, f: FaceId<I>) -> Self {
        let start = mesh
            .faces
            .get(f.index())
            .map(|f| f.first_face_edge)
            .unwrap_or_default();
        Self {
            mesh,
            start,
            current: start,
            remaining: mesh.face_edges.slot_count(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for FaceBoundaryIter<'a, I> {
    type Item = FaceEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || !self.current.is_valid() {
            return None;
        }
        let result = self.current;
        self.remaining -= 1;
        let next = self
            .mesh
            .face_edges
            .get(result.index())
            .map(|fe| fe.next)
            .unwrap_or_default();
        self.current = if next == self.start {
            FaceEdgeId::invalid()
        } else {
            next
        };
        Some(result)
    }
}

/// Iterator over the radial loop of face-edges sharing a mesh edge.
#[derive(Clone)]
pub struct RadialIter<'a, I: MeshIndex = u32> {
    mesh: &'a Mesh<I>,
    start: FaceEdgeId<I>,
    current: FaceEdgeId<I>,
    remaining: usize,
}

impl<'a, I: MeshIndex> RadialIter<'a, I> {
    fn new(mesh: &'a Mesh<I>, e: EdgeId<I>) -> Self {
        let start = mesh
            .edges
            .get(e.index())
            .map(|e| e.first_face_edge)
            .unwrap_or_default();
        Self {
            mesh,
            start,
            current: start,
            remaining: mesh.face_edges.slot_count(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for RadialIter<'a, I> {
    type Item = FaceEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || !self.current.is_valid() {
            return None;
        }
        let result = self.current;
        self.remaining -= 1;
        let next = self
            .mesh
            .face_edges
            .get(result.index())
            .map(|fe| fe.radial_next)
            .unwrap_or_default();
        self.current = if next == self.start {
            FaceEdgeId::invalid()
        } else {
            next
        };
        Some(result)
    }
}
