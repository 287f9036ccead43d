//! Mesh file I/O.
//!
//! Format adapters only use the public creation and iteration API of
//! [`Mesh`]; loaders build a soup and hand it to the clean pass.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | STL | `.stl` | ✓ | ✓ | Binary and ASCII in, binary out |
//!
//! # Usage
//!
//! ```no_run
//! use polykernel::io::{load, save};
//! use polykernel::mesh::Mesh;
//!
//! let mesh: Mesh = load("model.stl").unwrap();
//! save(&mesh, "output.stl").unwrap();
//! ```

pub mod stl;

use std::path::Path;

use crate::error::{MeshError, Result};
use crate::mesh::{Mesh, MeshIndex};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// STL (stereolithography) format.
    Stl,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "stl" => Some(Format::Stl),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }

    fn require<P: AsRef<Path>>(path: P) -> Result<Format> {
        let path = path.as_ref();
        Format::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string(),
        })
    }
}

/// Load and stitch a mesh, choosing the format by file extension.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<Mesh<I>> {
    match Format::require(&path)? {
        Format::Stl => stl::load(path),
    }
}

/// Load a mesh without running the clean pass, choosing the format by file extension.
pub fn load_unmerged<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<Mesh<I>> {
    match Format::require(&path)? {
        Format::Stl => stl::load_unmerged(path),
    }
}

/// Save a mesh, choosing the format by file extension.
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &Mesh<I>, path: P) -> Result<()> {
    match Format::require(&path)? {
        Format::Stl => stl::save(mesh, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::from_path("part.STL"), Some(Format::Stl));
        assert_eq!(Format::from_path("dir/part.stl"), Some(Format::Stl));
        assert_eq!(Format::from_path("part.amf"), None);
        assert_eq!(Format::from_path("part"), None);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load::<_, u32>("model.obj").unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { ref extension } if extension == "obj"));
        let err = save(&Mesh::<u32>::new(), "model").unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { ref extension } if extension == "(none)"));
    }
}
