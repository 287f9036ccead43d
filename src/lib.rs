//! # Polykernel
//!
//! A polygon mesh kernel for editing and drawing arbitrary polygon meshes.
//!
//! Polykernel keeps explicit vertices, mesh edges, faces and face-edges with
//! full adjacency, so faces of any size and edges shared by any number of
//! faces are represented directly.
//!
//! ## Features
//!
//! - **Polygon mesh data structure**: vertex edge rings, radial loops and face boundary loops
//! - **Flexible indexing**: Support for 16-bit, 32-bit, and 64-bit handles
//! - **Local edits**: split and unsplit faces and edges, triangulate, merge, delete
//! - **Clean pass**: stitch a triangle soup into connected topology, with progress and cancellation
//! - **BSP ordering**: back-to-front face order for painter's-algorithm drawing
//! - **File formats**: STL
//!
//! ## Quick Start
//!
//! ```no_run
//! use polykernel::prelude::*;
//!
//! // Load and stitch a mesh
//! let mesh: Mesh = polykernel::io::load("model.stl").unwrap();
//!
//! // Query mesh properties
//! println!("Vertices: {}", mesh.num_vertices());
//! println!("Faces: {}", mesh.num_faces());
//!
//! for face_id in mesh.face_ids() {
//!     let normal = mesh.face_normal(face_id);
//!     let area = mesh.face_area(face_id);
//!     println!("Face {:?}: normal={:?}, area={}", face_id, normal, area);
//! }
//!
//! polykernel::io::save(&mesh, "output.stl").unwrap();
//! ```
//!
//! ## Stitching a Triangle Soup
//!
//! ```
//! use polykernel::prelude::*;
//! use nalgebra::Point3;
//!
//! let corners = [
//!     [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
//!     [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
//! ];
//!
//! let mut mesh: Mesh = Mesh::new();
//! for tri in &corners {
//!     let ids: Vec<_> = tri
//!         .iter()
//!         .map(|&[x, y, z]| {
//!             mesh.create_vertex(
//!                 Point3::new(x, y, z),
//!                 CreateOption::CreateNew,
//!                 SortOption::WillSortLater,
//!                 0.0,
//!             )
//!             .unwrap()
//!         })
//!         .collect();
//!     mesh.create_face(&ids, CreateOption::CreateNew).unwrap();
//! }
//! assert_eq!(mesh.num_vertices(), 6);
//!
//! let report = clean_and_merge(
//!     &mut mesh,
//!     &CleanOptions::default(),
//!     &CancellationToken::new(),
//!     &Progress::none(),
//! )
//! .unwrap();
//! assert_eq!(report.vertices_merged, 2);
//! assert_eq!(mesh.num_vertices(), 4);
//! assert_eq!(mesh.num_mesh_edges(), 5);
//! ```
//!
//! ## Drawing Order
//!
//! ```
//! use polykernel::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//! let mesh: Mesh = build_from_polygons(&vertices, &faces).unwrap();
//!
//! let tree = BspTree::build(&mesh, &BspOptions::default()).unwrap();
//! for face in tree.visibility_order_from_eye(&Point3::new(0.5, 0.5, 4.0)) {
//!     println!("draw {:?}", face);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod io;
pub mod mesh;

#[cfg(test)]
pub(crate) mod test_fixtures;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use polykernel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::{
        clean_and_merge, BspOptions, BspTree, CancellationToken, CleanOptions, CleanReport,
        Progress,
    };
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_polygons, to_face_vertex, CreateOption, EdgeId, FaceEdgeId, FaceId, Mesh,
        MeshIndex, SortOption, VertexId,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
