//! STL (stereolithography) format support.
//!
//! Loading creates one vertex per triangle corner without any deduplication,
//! then runs the global clean pass to stitch shared corners and edges.
//! Saving triangulates a copy of the mesh and writes binary STL.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use nalgebra::Point3;
use tracing::{debug, warn};

use crate::algo::progress::{CancellationToken, Progress};
use crate::error::{MeshError, Result};
use crate::mesh::{CreateOption, Mesh, MeshIndex, SortOption};

/// Load a mesh from an STL file and stitch it together.
///
/// Automatically detects binary vs ASCII format.
///
/// # Example
///
/// ```no_run
/// use polykernel::io::stl;
/// use polykernel::mesh::Mesh;
///
/// let mesh: Mesh = stl::load("model.stl").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<Mesh<I>> {
    let mut mesh = load_unmerged(&path)?;
    mesh.clean_and_merge(&CancellationToken::new(), 0.0, &Progress::none())?;
    Ok(mesh)
}

/// Load an STL file as a triangle soup, leaving stitching to the caller.
///
/// The vertex store is left unsorted.
pub fn load_unmerged<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<Mesh<I>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let mesh = read_unmerged(&mut reader).map_err(|e| match e {
        MeshError::Io(e) => MeshError::LoadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
        other => other,
    })?;

    if mesh.num_faces() == 0 {
        return Err(MeshError::LoadError {
            path: path.to_path_buf(),
            message: "STL file contains no valid triangles".to_string(),
        });
    }
    Ok(mesh)
}

/// Read STL data and stitch it together.
pub fn read<R: Read + Seek, I: MeshIndex>(reader: &mut R) -> Result<Mesh<I>> {
    let mut mesh = read_unmerged(reader)?;
    mesh.clean_and_merge(&CancellationToken::new(), 0.0, &Progress::none())?;
    Ok(mesh)
}

/// Read STL data as a triangle soup: three fresh vertices per triangle.
///
/// Degenerate triangles are skipped along with their corners.
pub fn read_unmerged<R: Read + Seek, I: MeshIndex>(reader: &mut R) -> Result<Mesh<I>> {
    let stl = stl_io::read_stl(reader)?;
    let mut mesh = Mesh::with_capacity(stl.faces.len() * 3, stl.faces.len());

    mesh.defer_vertex_removals();
    let added = add_triangles(&mut mesh, &stl);
    mesh.flush_vertex_removals();
    let skipped = added?;

    if skipped > 0 {
        warn!(skipped, "skipped degenerate triangles");
    }
    debug!(triangles = mesh.num_faces(), "read STL");
    Ok(mesh)
}

/// Add every triangle with fresh corners, returning how many were degenerate.
fn add_triangles<I: MeshIndex>(mesh: &mut Mesh<I>, stl: &stl_io::IndexedMesh) -> Result<usize> {
    let mut skipped = 0usize;
    for tri in &stl.faces {
        let mut corners = Vec::with_capacity(3);
        for &index in &tri.vertices {
            let v = stl.vertices.get(index).ok_or(MeshError::InvalidVertexIndex {
                face: mesh.num_faces() + skipped,
                vertex: index,
            })?;
            let position = Point3::new(v[0] as f64, v[1] as f64, v[2] as f64);
            corners.push(mesh.create_vertex(
                position,
                CreateOption::CreateNew,
                SortOption::WillSortLater,
                0.0,
            )?);
        }

        if mesh.create_face(&corners, CreateOption::CreateNew)?.is_none() {
            skipped += 1;
            for v in corners {
                mesh.delete_vertex(v)?;
            }
        }
    }
    Ok(skipped)
}

/// Save a mesh to a binary STL file.
///
/// # Example
///
/// ```no_run
/// use polykernel::io::stl;
/// use polykernel::mesh::Mesh;
///
/// let mesh: Mesh = Mesh::new();
/// stl::save(&mesh, "output.stl").unwrap();
/// ```
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &Mesh<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write(mesh, &mut writer)
        .and_then(|()| writer.flush().map_err(MeshError::from))
        .map_err(|e| match e {
            MeshError::Io(e) => MeshError::SaveError {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
            other => other,
        })
}

/// Write a triangulated copy of `mesh` as binary STL.
///
/// Faces that [`Mesh::triangulate`] leaves whole are written as a fan of
/// triangles around their first vertex.
pub fn write<W: Write, I: MeshIndex>(mesh: &Mesh<I>, writer: &mut W) -> Result<()> {
    let mut triangles_only = mesh.clone();
    triangles_only.triangulate()?;

    let vertex = |p: &Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
    let mut triangles: Vec<stl_io::Triangle> = Vec::with_capacity(triangles_only.num_faces());
    for f in triangles_only.face_ids() {
        let n = triangles_only.face_normal(f);
        let normal = stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]);
        let p = triangles_only.face_positions(f);
        if p.len() < 3 {
            continue;
        }
        for pair in p[1..].windows(2) {
            triangles.push(stl_io::Triangle {
                normal,
                vertices: [vertex(&p[0]), vertex(&pair[0]), vertex(&pair[1])],
            });
        }
    }

    stl_io::write_stl(writer, triangles.iter())?;
    Ok(())
}
