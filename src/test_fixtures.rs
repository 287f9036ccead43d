//! Small meshes shared by the unit tests.

use nalgebra::Point3;

use crate::mesh::{build_from_polygons, CreateOption, Mesh, SortOption};

/// Element counts, compared before and after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Counts {
    pub vertices: usize,
    pub edges: usize,
    pub face_edges: usize,
    pub faces: usize,
}

impl Counts {
    pub fn of(mesh: &Mesh) -> Self {
        Self {
            vertices: mesh.num_vertices(),
            edges: mesh.num_mesh_edges(),
            face_edges: mesh.num_face_edges(),
            faces: mesh.num_faces(),
        }
    }
}

/// Rotate a cyclic sequence so it starts at its smallest element.
pub(crate) fn cyclic<T: Ord + Copy>(mut ring: Vec<T>) -> Vec<T> {
    if let Some(at) = ring.iter().enumerate().min_by_key(|(_, v)| **v).map(|(i, _)| i) {
        ring.rotate_left(at);
    }
    ring
}

/// Corner `i` of the unit cube, with `i = x + 2y + 4z`.
pub(crate) fn cube_corner(i: usize) -> Point3<f64> {
    Point3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64)
}

/// Outward-wound quads of the unit cube: -z, +z, -y, +y, -x, +x.
pub(crate) const CUBE_FACES: [[usize; 4]; 6] = [
    [0, 2, 3, 1],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [2, 6, 7, 3],
    [0, 4, 6, 2],
    [1, 3, 7, 5],
];

/// Unit cube, 8 shared vertices and 6 quads.
pub(crate) fn cube() -> Mesh {
    let corners: Vec<_> = (0..8).map(cube_corner).collect();
    build_from_polygons(&corners, &CUBE_FACES).unwrap()
}

/// Unit cube as 6 unconnected quads with 24 vertices, the way a loader
/// produces it before cleaning.
pub(crate) fn cube_soup() -> Mesh {
    let mut mesh = Mesh::new();
    for quad in CUBE_FACES {
        let positions: Vec<_> = quad.iter().map(|&i| cube_corner(i)).collect();
        mesh.create_face_from_positions(&positions, CreateOption::CreateNew, 0.0)
            .unwrap()
            .unwrap();
    }
    mesh
}

/// Tetrahedron with outward-wound faces.
pub(crate) fn tetrahedron() -> Mesh {
    let vertices = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
        Point3::new(0.5, 0.5, 1.0),
    ];
    let faces = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
    build_from_polygons(&vertices, &faces).unwrap()
}

/// Unit square split along its diagonal into two stitched triangles.
pub(crate) fn two_triangles() -> Mesh {
    let vertices = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    build_from_polygons(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap()
}

/// Two triangles built independently, two of whose corners coincide.
pub(crate) fn triangle_pair_soup() -> Mesh {
    let mut mesh = Mesh::new();
    let corners = [
        [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, -1.0, 0.0]],
    ];
    for tri in corners {
        let ids: Vec<_> = tri
            .iter()
            .map(|p| {
                mesh.create_vertex(
                    Point3::new(p[0], p[1], p[2]),
                    CreateOption::CreateNew,
                    SortOption::WillSortLater,
                    0.0,
                )
                .unwrap()
            })
            .collect();
        mesh.create_face(&ids, CreateOption::CreateNew).unwrap().unwrap();
    }
    mesh.sort_vertices();
    mesh
}

/// An `n` by `n` grid of unit squares, each split into two triangles that
/// carry their own corners, as an STL loader would produce.
pub(crate) fn grid_soup(n: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(n * n * 6, n * n * 2);
    let p = |i: usize, j: usize| Point3::new(i as f64, j as f64, 0.0);
    for j in 0..n {
        for i in 0..n {
            let quad = [p(i, j), p(i + 1, j), p(i + 1, j + 1), p(i, j + 1)];
            for tri in [[0, 1, 2], [0, 2, 3]] {
                let ids: Vec<_> = tri
                    .iter()
                    .map(|&k| {
                        mesh.create_vertex(
                            quad[k],
                            CreateOption::CreateNew,
                            SortOption::WillSortLater,
                            0.0,
                        )
                        .unwrap()
                    })
                    .collect();
                mesh.create_face(&ids, CreateOption::CreateNew).unwrap().unwrap();
            }
        }
    }
    mesh
}
