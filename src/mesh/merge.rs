//! Deletion and merging of mesh elements.
//!
//! Each routine collects the elements it will touch before changing any
//! links, so no ring or loop is walked while it is being rewired.

use tracing::trace;

use super::halfedge::Mesh;
use super::index::{EdgeId, FaceId, MeshIndex, VertexId};
use crate::error::{MeshError, Result};

impl<I: MeshIndex> Mesh<I> {
    /// Delete a face and its face-edges.
    ///
    /// With `remove_orphans`, mesh edges left without faces and vertices left
    /// without edges are deleted too.
    pub fn delete_face(&mut self, face: FaceId<I>, remove_orphans: bool) -> Result<()> {
        self.check_face(face)?;
        let boundary: Vec<_> = self.face_boundary(face).collect();
        let edges: Vec<EdgeId<I>> = boundary.iter().map(|&fe| self.fe(fe).edge).collect();

        for fe in boundary {
            self.radial_remove(fe);
            self.face_edges.remove(fe.index());
        }
        self.faces.remove(face.index());

        if remove_orphans {
            let mut loose = Vec::new();
            for e in edges {
                if self.contains_mesh_edge(e) && !self.mesh_edge(e).first_face_edge.is_valid() {
                    loose.extend(self.mesh_edge(e).vertices);
                    self.kill_edge(e)?;
                }
            }
            for v in loose {
                if self.contains_vertex(v) && !self.vertex(v).first_edge.is_valid() {
                    self.kill_vertex(v);
                }
            }
        }
        self.mark_as_changed();
        Ok(())
    }

    /// Delete a mesh edge along with every face that uses it.
    pub fn delete_mesh_edge(&mut self, edge: EdgeId<I>) -> Result<()> {
        self.check_edge(edge)?;
        let mut faces: Vec<_> = self.edge_faces(edge).collect();
        faces.sort();
        faces.dedup();
        for f in faces {
            self.delete_face(f, false)?;
        }
        self.kill_edge(edge)?;
        self.mark_as_changed();
        Ok(())
    }

    /// Delete a vertex along with its incident edges and their faces.
    pub fn delete_vertex(&mut self, vertex: VertexId<I>) -> Result<()> {
        self.check_vertex(vertex)?;
        let ring: Vec<_> = self.vertex_edges(vertex).collect();
        for e in ring {
            self.delete_mesh_edge(e)?;
        }
        self.kill_vertex(vertex);
        self.mark_as_changed();
        Ok(())
    }

    /// Replace `discard` by `keep` everywhere and delete `discard`.
    ///
    /// Edges joining the two vertices collapse: their face-edges leave their
    /// faces, and faces reduced below three sides are deleted. Edges that
    /// become parallel are left for [`merge_mesh_edges`](Self::merge_mesh_edges).
    pub fn merge_vertices(&mut self, keep: VertexId<I>, discard: VertexId<I>) -> Result<()> {
        self.check_vertex(keep)?;
        self.check_vertex(discard)?;
        if keep == discard {
            return Ok(());
        }

        for e in self.find_mesh_edges(keep, discard) {
            self.collapse_edge(e)?;
        }

        let ring: Vec<_> = self.vertex_edges(discard).collect();
        for &e in &ring {
            let k = self.mesh_edge(e).end_of(discard).ok_or_else(|| {
                MeshError::InvalidTopology(format!("ring of {:?} contains unrelated {:?}", discard, e))
            })?;
            self.edge_mut(e).vertices[k] = keep;
            self.ring_insert(keep, e, k)?;

            let radial: Vec<_> = self.radial_face_edges(e).collect();
            for fe in radial {
                if self.fe(fe).start == discard {
                    self.fe_mut(fe).start = keep;
                }
            }
        }
        self.vertices[discard.index()].first_edge = EdgeId::invalid();
        self.kill_vertex(discard);
        self.mark_as_changed();
        trace!(?keep, ?discard, edges = ring.len(), "merged vertices");
        Ok(())
    }

    /// Move every face-edge of `discard` onto `keep` and delete `discard`.
    ///
    /// Both edges must join the same two vertices.
    pub fn merge_mesh_edges(&mut self, keep: EdgeId<I>, discard: EdgeId<I>) -> Result<()> {
        self.check_edge(keep)?;
        self.check_edge(discard)?;
        if keep == discard {
            return Ok(());
        }
        let [a, b] = self.mesh_edge(keep).vertices;
        if !self.mesh_edge(discard).connects(a, b) {
            return Err(MeshError::InvalidTopology(format!(
                "{:?} and {:?} do not join the same vertices",
                keep, discard
            )));
        }

        let radial: Vec<_> = self.radial_face_edges(discard).collect();
        for fe in radial {
            self.radial_move(fe, keep);
        }
        self.kill_edge(discard)?;
        self.mark_as_changed();
        trace!(?keep, ?discard, "merged mesh edges");
        Ok(())
    }

    /// Remove an edge whose endpoints are about to become one vertex.
    fn collapse_edge(&mut self, e: EdgeId<I>) -> Result<()> {
        let radial: Vec<_> = self.radial_face_edges(e).collect();
        for fe in radial {
            if !self.face_edges.contains(fe.index()) {
                continue;
            }
            let face = self.fe(fe).face;
            self.radial_remove(fe);
            self.boundary_remove(fe);
            self.face_edges.remove(fe.index());
            if self.face_vertex_count(face) < 3 {
                self.delete_face(face, false)?;
            }
        }
        self.kill_edge(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::CreateOption;
    use crate::test_fixtures::{self, Counts};
    use nalgebra::Point3;

    #[test]
    fn test_delete_face_keeps_shared_edges() {
        let mut mesh = test_fixtures::cube();
        let f = mesh.face_ids().next().unwrap();
        let edges: Vec<_> = mesh.face_boundary(f).map(|fe| mesh.face_edge(fe).edge()).collect();

        mesh.delete_face(f, true).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.num_faces(), 5);
        assert_eq!(mesh.num_mesh_edges(), 12);
        assert_eq!(mesh.num_face_edges(), 20);
        for e in edges {
            assert_eq!(mesh.edge_face_count(e), 1);
        }
        assert_eq!(mesh.non_manifold_edges().len(), 4);
        assert!(matches!(mesh.delete_face(f, true), Err(MeshError::StaleHandle { .. })));
    }

    #[test]
    fn test_delete_face_orphans() {
        let mut mesh: Mesh = Mesh::new();
        let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let b = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        let c = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0));
        let f = mesh.create_face(&[a, b, c], CreateOption::CreateNew).unwrap().unwrap();

        let mut kept = mesh.clone();
        kept.delete_face(f, false).unwrap();
        kept.validate().unwrap();
        assert_eq!((kept.num_faces(), kept.num_mesh_edges(), kept.num_vertices()), (0, 3, 3));

        mesh.delete_face(f, true).unwrap();
        mesh.validate().unwrap();
        assert_eq!((mesh.num_faces(), mesh.num_mesh_edges(), mesh.num_vertices()), (0, 0, 0));
    }

    #[test]
    fn test_delete_mesh_edge_removes_its_faces() {
        let mut mesh = test_fixtures::cube();
        let e = mesh.mesh_edge_ids().next().unwrap();
        mesh.delete_mesh_edge(e).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.num_faces(), 4);
        assert_eq!(mesh.num_mesh_edges(), 11);
        assert_eq!(mesh.num_vertices(), 8);
        assert!(!mesh.contains_mesh_edge(e));
    }

    #[test]
    fn test_delete_vertex() {
        let mut mesh = test_fixtures::cube();
        let v = mesh.find_vertices(&Point3::origin(), 0.0).unwrap()[0];
        mesh.delete_vertex(v).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.num_vertices(), 7);
        assert_eq!(mesh.num_mesh_edges(), 9);
        assert_eq!(mesh.num_faces(), 3);
        assert!(mesh.find_vertices(&Point3::origin(), 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_merge_coincident_triangles() {
        let mut mesh = test_fixtures::triangle_pair_soup();
        assert_eq!(mesh.num_vertices(), 6);

        // Stitch each coincident pair, then the now parallel edges
        let ids: Vec<_> = mesh.vertex_ids().collect();
        for v in ids {
            if !mesh.contains_vertex(v) {
                continue;
            }
            let position = *mesh.position(v);
            for other in mesh.find_vertices(&position, 0.0).unwrap() {
                if other != v {
                    mesh.merge_vertices(v, other).unwrap();
                    mesh.validate().unwrap();
                }
            }
        }
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_mesh_edges(), 6);

        let parallel: Vec<_> = mesh
            .mesh_edge_ids()
            .filter(|&e| {
                let [a, b] = mesh.mesh_edge(e).vertices();
                mesh.find_mesh_edges(a, b).len() == 2
            })
            .collect();
        assert_eq!(parallel.len(), 2);
        mesh.merge_mesh_edges(parallel[0], parallel[1]).unwrap();
        mesh.validate().unwrap();

        assert_eq!(mesh.num_mesh_edges(), 5);
        assert_eq!(mesh.edge_face_count(parallel[0]), 2);
        assert_eq!(mesh.num_faces(), 2);
    }

    #[test]
    fn test_merge_vertices_collapses_joining_edge() {
        let mut mesh = test_fixtures::two_triangles();
        let before = Counts::of(&mesh);
        let shared = mesh.mesh_edge_ids().find(|&e| mesh.edge_face_count(e) == 2).unwrap();
        let [a, b] = mesh.mesh_edge(shared).vertices();

        mesh.merge_vertices(a, b).unwrap();
        mesh.validate().unwrap();

        // Both triangles lose a side and vanish; their outer edges remain
        assert_eq!(mesh.num_faces(), 0);
        assert_eq!(mesh.num_vertices(), before.vertices - 1);
        assert_eq!(mesh.num_mesh_edges(), before.edges - 1);
        assert!(!mesh.contains_vertex(b));
        assert_eq!(mesh.vertex_edge_count(a), 4);
    }

    #[test]
    fn test_merge_vertices_keeps_larger_faces() {
        let mut mesh = test_fixtures::cube();
        let e = mesh.mesh_edge_ids().next().unwrap();
        let [a, b] = mesh.mesh_edge(e).vertices();

        mesh.merge_vertices(a, b).unwrap();
        mesh.validate().unwrap();
        assert_eq!(mesh.num_faces(), 6);
        assert_eq!(mesh.num_vertices(), 7);
        assert_eq!(mesh.num_mesh_edges(), 11);
        let sides: usize = mesh.face_ids().map(|f| mesh.face_vertex_count(f)).sum();
        assert_eq!(sides, 22);
        assert!(mesh.is_manifold());
    }

    #[test]
    fn test_merge_mesh_edges_requires_same_endpoints() {
        let mut mesh = test_fixtures::cube();
        let edges: Vec<_> = mesh.mesh_edge_ids().collect();
        let e0 = edges[0];
        let [a, b] = mesh.mesh_edge(e0).vertices();
        let far = *edges
            .iter()
            .find(|&&e| !mesh.mesh_edge(e).connects(a, b))
            .unwrap();
        assert!(matches!(
            mesh.merge_mesh_edges(e0, far),
            Err(MeshError::InvalidTopology(_))
        ));
        mesh.merge_mesh_edges(e0, e0).unwrap();
        mesh.validate().unwrap();
    }
}
