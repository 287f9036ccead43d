//! Core mesh data structures.
//!
//! This module provides the polygon mesh representation and its editing
//! operations.
//!
//! # Overview
//!
//! The primary type is [`Mesh`]. Vertices, mesh edges, faces and face-edges
//! live in slot storage owned by the mesh and reference each other through
//! type-safe handles:
//! - [`VertexId`] - a vertex, with a ring of incident mesh edges
//! - [`EdgeId`] - a mesh edge, with a radial loop of face-edges
//! - [`FaceId`] - a face, with a boundary loop of face-edges
//! - [`FaceEdgeId`] - one directed side of one face
//!
//! Handles are generic over the underlying integer type ([`MeshIndex`]).
//!
//! # Construction
//!
//! Loaders create vertices and faces incrementally, then run the global
//! clean pass to stitch shared vertices and edges together:
//!
//! ```
//! use polykernel::mesh::{CreateOption, Mesh, SortOption};
//! use nalgebra::Point3;
//!
//! let mut mesh: Mesh = Mesh::new();
//! let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
//! let b = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
//! let c = mesh.add_vertex(Point3::new(0.5, 1.0, 0.0));
//!
//! let face = mesh.create_face(&[a, b, c], CreateOption::ReuseExisting).unwrap();
//! assert!(face.is_some());
//! assert_eq!(mesh.num_mesh_edges(), 3);
//! ```

mod builder;
mod edit;
mod geometry;
mod halfedge;
mod index;
mod merge;
mod storage;
mod vertex_store;

pub use builder::{build_from_polygons, to_face_vertex};
pub use halfedge::{
    Aabb, Face, FaceBoundaryIter, FaceEdge, Mesh, MeshEdge, RadialIter, Vertex, VertexEdgeIter,
};
pub use index::{EdgeId, FaceEdgeId, FaceId, MeshIndex, VertexId};

/// Whether a creation call may return an existing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateOption {
    /// Always allocate a new element.
    #[default]
    CreateNew,
    /// Return a matching existing element if there is one.
    ReuseExisting,
}

/// When a new vertex is placed in spatial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOption {
    /// Insert at the sorted position immediately.
    #[default]
    SortNow,
    /// Append and leave the store unsorted until [`Mesh::sort_vertices`].
    WillSortLater,
}
