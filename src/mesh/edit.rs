//! Structural edits: face and edge splitting, their inverses, triangulation.
//!
//! Every operation checks its preconditions before touching the mesh, so a
//! returned error leaves connectivity exactly as it was.

use nalgebra::Point3;
use tracing::{debug, trace, warn};

use super::halfedge::{FaceEdge, Mesh};
use super::index::{EdgeId, FaceEdgeId, FaceId, MeshIndex, VertexId};
use super::SortOption;
use crate::error::{MeshError, Result};

impl<I: MeshIndex> Mesh<I> {
    /// Split `face` in two along a new mesh edge from `v_start` to `v_end`.
    ///
    /// Both vertices must lie on the face boundary and must not already be
    /// joined by a mesh edge. The original face keeps the part of its
    /// boundary from `v_start` round to `v_end`; the rest moves to a new face,
    /// which is returned together with the new edge.
    pub fn split_face(
        &mut self,
        face: FaceId<I>,
        v_start: VertexId<I>,
        v_end: VertexId<I>,
    ) -> Result<(EdgeId<I>, FaceId<I>)> {
        self.check_face(face)?;
        self.check_vertex(v_start)?;
        self.check_vertex(v_end)?;
        if v_start == v_end {
            return Err(MeshError::SelfLoop {
                vertex: v_start.index(),
            });
        }
        let fe_s = self.boundary_entry(face, v_start)?;
        let fe_e = self.boundary_entry(face, v_end)?;
        if self.find_mesh_edge(v_start, v_end).is_some() {
            return Err(MeshError::EdgeExists {
                v0: v_start.index(),
                v1: v_end.index(),
            });
        }

        let old_first = self.face(face).first_face_edge;
        let prev_s = self.fe(fe_s).prev;
        let prev_e = self.fe(fe_e).prev;
        let normal = self.face(face).normal;
        self.ensure_capacity(0, 1, 2, 1)?;

        let edge = self.alloc_edge(v_start, v_end);
        self.ring_insert(v_start, edge, 0)?;
        self.ring_insert(v_end, edge, 1)?;

        let new_face = self.alloc_face(normal);
        let kept = self.alloc_face_edge(face, edge, v_end);
        let moved = self.alloc_face_edge(new_face, edge, v_start);

        self.link(prev_e, kept);
        self.link(kept, fe_s);
        self.link(prev_s, moved);
        self.link(moved, fe_e);

        self.face_mut(new_face).first_face_edge = fe_e;
        let new_loop: Vec<_> = self.face_boundary(new_face).collect();
        for &fe in &new_loop {
            self.fe_mut(fe).face = new_face;
        }
        self.face_mut(face).first_face_edge = if new_loop.contains(&old_first) {
            fe_s
        } else {
            old_first
        };

        self.radial_insert(kept);
        self.radial_insert(moved);
        self.mark_as_changed();
        trace!(?face, ?new_face, ?edge, "split face");
        Ok((edge, new_face))
    }

    /// Merge `discard` into `keep` by removing the mesh edge they share.
    ///
    /// The two faces must run along `shared_edge` in opposite directions;
    /// face-edges starting at the same vertex are rejected as
    /// [`MeshError::IncompatibleWinding`]. The shared edge is deleted once no
    /// other face uses it.
    pub fn unsplit_face(
        &mut self,
        keep: FaceId<I>,
        discard: FaceId<I>,
        shared_edge: EdgeId<I>,
    ) -> Result<()> {
        if keep == discard {
            return Err(MeshError::SameFace { face: keep.index() });
        }
        self.check_face(keep)?;
        self.check_face(discard)?;
        self.check_edge(shared_edge)?;

        let fe_k = self.edge_entry(keep, shared_edge)?;
        let fe_d = self.edge_entry(discard, shared_edge)?;
        let k = *self.fe(fe_k);
        let d = *self.fe(fe_d);
        if k.start == d.start {
            return Err(MeshError::IncompatibleWinding {
                keep: keep.index(),
                discard: discard.index(),
                edge: shared_edge.index(),
            });
        }

        let absorbed: Vec<_> = self
            .face_boundary(discard)
            .filter(|&fe| fe != fe_d)
            .collect();

        self.link(k.prev, d.next);
        self.link(d.prev, k.next);
        for fe in absorbed {
            self.fe_mut(fe).face = keep;
        }
        if self.face(keep).first_face_edge == fe_k {
            self.face_mut(keep).first_face_edge = k.prev;
        }

        for fe in [fe_k, fe_d] {
            self.radial_remove(fe);
            self.face_edges.remove(fe.index());
        }
        if !self.mesh_edge(shared_edge).first_face_edge.is_valid() {
            self.kill_edge(shared_edge)?;
        }
        self.faces.remove(discard.index());
        self.mark_as_changed();
        trace!(?keep, ?discard, ?shared_edge, "unsplit face");
        Ok(())
    }

    /// Insert a vertex into `edge`, at `position` or the midpoint.
    ///
    /// The original edge keeps its first endpoint and now ends at the new
    /// vertex; a new edge runs from the new vertex to the old second endpoint.
    /// Every face using the edge gains a side.
    pub fn split_mesh_edge(
        &mut self,
        edge: EdgeId<I>,
        position: Option<Point3<f64>>,
    ) -> Result<(VertexId<I>, EdgeId<I>)> {
        self.check_edge(edge)?;
        let [a, b] = self.mesh_edge(edge).vertices;
        let radial: Vec<_> = self.radial_face_edges(edge).collect();
        if let Some(&bad) = radial
            .iter()
            .find(|&&fe| self.fe(fe).start != a && self.fe(fe).start != b)
        {
            return Err(MeshError::InvalidTopology(format!(
                "{:?} on {:?} starts at neither endpoint",
                bad, edge
            )));
        }

        self.ensure_capacity(1, 1, radial.len(), 0)?;

        let position =
            position.unwrap_or_else(|| nalgebra::center(self.position(a), self.position(b)));
        let m = self.alloc_vertex(position);
        self.vertex_store.add(m, &self.vertices, SortOption::SortNow);

        self.ring_remove(b, edge)?;
        self.edge_mut(edge).vertices[1] = m;
        self.ring_insert(m, edge, 1)?;
        let tail = self.alloc_edge(m, b);
        self.ring_insert(m, tail, 0)?;
        self.ring_insert(b, tail, 1)?;

        for fe in radial {
            let FaceEdge { face, start, next, .. } = *self.fe(fe);
            // a -> m stays on `edge`; b -> m moves onto `tail`
            let inserted = if start == a {
                self.alloc_face_edge(face, tail, m)
            } else {
                self.radial_move(fe, tail);
                self.alloc_face_edge(face, edge, m)
            };
            self.link(inserted, next);
            self.link(fe, inserted);
            self.radial_insert(inserted);
        }

        self.mark_as_changed();
        trace!(?edge, ?tail, vertex = ?m, "split mesh edge");
        Ok((m, tail))
    }

    /// Remove `vertex` from the middle of `edge`, undoing [`split_mesh_edge`](Self::split_mesh_edge).
    ///
    /// The vertex must have exactly two incident edges. `edge` absorbs the
    /// other one and every face using them loses the now redundant side.
    pub fn unsplit_mesh_edge(&mut self, edge: EdgeId<I>, vertex: VertexId<I>) -> Result<()> {
        self.check_edge(edge)?;
        self.check_vertex(vertex)?;
        let k = self.mesh_edge(edge).end_of(vertex).ok_or_else(|| {
            MeshError::InvalidTopology(format!("{:?} is not an endpoint of {:?}", vertex, edge))
        })?;
        let count = self.vertex_edge_count(vertex);
        if count != 2 {
            return Err(MeshError::NotASplitVertex {
                vertex: vertex.index(),
                edges: count,
            });
        }
        let other = self
            .vertex_edges(vertex)
            .find(|&e| e != edge)
            .ok_or_else(|| MeshError::InvalidTopology(format!("{:?} has a broken ring", vertex)))?;
        let far = self.mesh_edge(other).other_vertex(vertex).unwrap_or_default();
        if far == self.mesh_edge(edge).vertices[1 - k] {
            return Err(MeshError::InvalidTopology(format!(
                "unsplitting {:?} at {:?} would leave a self loop",
                edge, vertex
            )));
        }

        // Every face through the vertex must pass straight from one edge to the other
        let on_other: Vec<_> = self.radial_face_edges(other).collect();
        let on_edge: Vec<_> = self.radial_face_edges(edge).collect();
        let paired = |mesh: &Self, fe: FaceEdgeId<I>, partner: EdgeId<I>| {
            let f = mesh.fe(fe);
            let neighbour = if f.start == vertex { f.prev } else { f.next };
            mesh.fe(neighbour).edge == partner
        };
        if !on_other.iter().all(|&fe| paired(self, fe, edge))
            || !on_edge.iter().all(|&fe| paired(self, fe, other))
        {
            return Err(MeshError::InvalidTopology(format!(
                "faces at {:?} do not run straight through it",
                vertex
            )));
        }

        for fe in on_other {
            let f = *self.fe(fe);
            let dropped = if f.start == vertex {
                fe
            } else {
                self.radial_move(fe, edge);
                f.next
            };
            self.boundary_remove(dropped);
            self.radial_remove(dropped);
            self.face_edges.remove(dropped.index());
        }

        self.kill_edge(other)?;
        self.ring_remove(vertex, edge)?;
        self.edge_mut(edge).vertices[k] = far;
        self.ring_insert(far, edge, k)?;
        self.kill_vertex(vertex);
        self.mark_as_changed();
        trace!(?edge, ?vertex, "unsplit mesh edge");
        Ok(())
    }

    /// Split every face with more than three sides into triangles.
    ///
    /// Triangles are cut off in a fan around the face's first vertex. When a
    /// fan diagonal is already an edge of the mesh, the next corner along the
    /// boundary is tried instead. A face whose every candidate diagonal
    /// already exists is left as it is.
    ///
    /// Returns the number of faces created.
    pub fn triangulate(&mut self) -> Result<usize> {
        let mut created = 0;
        let mut stuck = 0;
        let faces: Vec<FaceId<I>> = self.face_ids().collect();
        for face in faces {
            let anchor = match self.face_vertices(face).next() {
                Some(v) => v,
                None => continue,
            };
            let mut current = face;
            loop {
                let ring: Vec<VertexId<I>> = self.face_vertices(current).collect();
                if ring.len() <= 3 {
                    break;
                }
                let Some((a, b)) = self.free_diagonal(&ring, anchor) else {
                    stuck += 1;
                    break;
                };
                let (_, rest) = self.split_face(current, a, b)?;
                current = rest;
                created += 1;
            }
        }
        if stuck > 0 {
            warn!(faces = stuck, "left faces untriangulated; every diagonal is already an edge");
        }
        if created > 0 {
            debug!(created, "triangulated mesh");
        }
        Ok(created)
    }

    /// First corner, starting from `anchor`, whose diagonal to the vertex two
    /// steps along `ring` is not yet an edge.
    fn free_diagonal(&self, ring: &[VertexId<I>], anchor: VertexId<I>) -> Option<(VertexId<I>, VertexId<I>)> {
        let len = ring.len();
        let at = ring.iter().position(|&v| v == anchor).unwrap_or(0);
        (0..len)
            .map(|k| (ring[(at + k) % len], ring[(at + k + 2) % len]))
            .find(|&(a, b)| a != b && self.find_mesh_edge(a, b).is_none())
    }

    /// Reverse the winding of a face, negating its normal.
    pub fn reverse_face(&mut self, face: FaceId<I>) -> Result<()> {
        self.check_face(face)?;
        let boundary: Vec<_> = self.face_boundary(face).collect();
        let ends: Vec<_> = boundary.iter().map(|&fe| self.face_edge_end(fe)).collect();
        for (&fe, &end) in boundary.iter().zip(&ends) {
            let f = self.fe_mut(fe);
            f.start = end;
            std::mem::swap(&mut f.next, &mut f.prev);
        }
        let f = self.face_mut(face);
        f.normal = -f.normal;
        self.mark_as_changed();
        Ok(())
    }

    fn boundary_entry(&self, face: FaceId<I>, v: VertexId<I>) -> Result<FaceEdgeId<I>> {
        self.face_edge_starting_at(face, v)
            .ok_or_else(|| MeshError::NotOnFace {
                what: format!("{:?}", v),
                face: face.index(),
            })
    }

    fn edge_entry(&self, face: FaceId<I>, e: EdgeId<I>) -> Result<FaceEdgeId<I>> {
        self.face_edge_on(face, e).ok_or_else(|| MeshError::NotOnFace {
            what: format!("{:?}", e),
            face: face.index(),
        })
    }
}
