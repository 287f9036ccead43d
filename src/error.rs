//! Error types for polykernel.
//!
//! Structural precondition violations (caller logic errors) are reported
//! through [`MeshError`]. Degenerate input to face creation is *not* an error;
//! see [`Mesh::create_face`](crate::mesh::Mesh::create_face).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// A handle does not refer to a live element of this mesh.
    #[error("{kind} handle {index} is not live in this mesh")]
    StaleHandle {
        /// The element kind ("vertex", "edge", "face", "face-edge").
        kind: &'static str,
        /// The raw slot index.
        index: usize,
    },

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A mesh edge was requested between a vertex and itself.
    #[error("cannot create a mesh edge from vertex {vertex} to itself")]
    SelfLoop {
        /// The vertex slot index.
        vertex: usize,
    },

    /// A mesh edge already connects the two vertices of a requested split.
    #[error("vertices {v0} and {v1} are already connected by a mesh edge")]
    EdgeExists {
        /// First vertex slot index.
        v0: usize,
        /// Second vertex slot index.
        v1: usize,
    },

    /// An element that must lie on a face boundary does not.
    #[error("{what} is not on the boundary of face {face}")]
    NotOnFace {
        /// Description of the missing element.
        what: String,
        /// The face slot index.
        face: usize,
    },

    /// Two faces that must be distinct are the same face.
    #[error("face {face} cannot be merged with itself")]
    SameFace {
        /// The face slot index.
        face: usize,
    },

    /// The face-edges on a shared edge start at the same vertex.
    #[error("faces {keep} and {discard} have incompatible winding along edge {edge}")]
    IncompatibleWinding {
        /// The face that would be kept.
        keep: usize,
        /// The face that would be discarded.
        discard: usize,
        /// The shared mesh edge.
        edge: usize,
    },

    /// A vertex to remove by unsplitting is not connected to exactly two edges.
    #[error("vertex {vertex} has {edges} incident edges, expected exactly 2")]
    NotASplitVertex {
        /// The vertex slot index.
        vertex: usize,
        /// Number of incident mesh edges.
        edges: usize,
    },

    /// The index type cannot address another element of this kind.
    #[error("mesh cannot hold more than {limit} {kind} slots with this index type")]
    CapacityExceeded {
        /// The element kind ("vertex", "edge", "face", "face-edge").
        kind: &'static str,
        /// Number of addressable slots.
        limit: usize,
    },

    /// A proximity query was issued against an unsorted vertex store.
    #[error("vertex store must be sorted before proximity queries")]
    VertexStoreUnsorted,

    /// Connectivity is not in the shape an operation requires.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading mesh from file.
    #[error("failed to load mesh from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving mesh to file.
    #[error("failed to save mesh to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    pub(crate) fn stale(kind: &'static str, index: usize) -> Self {
        MeshError::StaleHandle { kind, index }
    }
}
