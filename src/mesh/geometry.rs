//! Geometric queries and whole-mesh transforms.

use nalgebra::{Matrix4, Point3, Vector3};

use super::halfedge::{Aabb, Mesh};
use super::index::{FaceId, MeshIndex, VertexId};
use super::SortOption;
use crate::error::Result;

/// Unit normal of a polygon.
///
/// Uses the right-hand rule on the first two sides; falls back to Newell's
/// method when those are collinear. Returns zero for a degenerate polygon.
pub(crate) fn polygon_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    if points.len() < 3 {
        return Vector3::zeros();
    }
    let e1 = points[1] - points[0];
    let e2 = points[2] - points[0];
    let cross = e1.cross(&e2);
    if cross.norm_squared() > f64::EPSILON * e1.norm_squared() * e2.norm_squared() {
        return cross.normalize();
    }
    newell(points).try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// Area-weighted (twice the area) normal of a polygon by Newell's method.
fn newell(points: &[Point3<f64>]) -> Vector3<f64> {
    let mut n = Vector3::zeros();
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        n.x += (p.y - q.y) * (p.z + q.z);
        n.y += (p.z - q.z) * (p.x + q.x);
        n.z += (p.x - q.x) * (p.y + q.y);
    }
    n
}

impl<I: MeshIndex> Mesh<I> {
    /// Compute the axis-aligned bounding box, cached until the next edit.
    pub fn bounding_box(&self) -> Option<Aabb> {
        *self.bounds_cache().get_or_init(|| {
            let mut iter = self.vertices.iter().map(|(_, v)| v.position);
            iter.next().map(|first| {
                let (min, max) = iter.fold((first, first), |(mut min, mut max), p| {
                    for i in 0..3 {
                        min[i] = min[i].min(p[i]);
                        max[i] = max[i].max(p[i]);
                    }
                    (min, max)
                });
                Aabb { min, max }
            })
        })
    }

    /// Move a single vertex, keeping the vertex store ordered and adjacent
    /// face normals current.
    pub fn set_position(&mut self, v: VertexId<I>, position: Point3<f64>) -> Result<()> {
        self.check_vertex(v)?;
        self.vertex_store.remove(v, &self.vertices);
        self.vertices[v.index()].position = position;
        self.vertex_store.add(v, &self.vertices, SortOption::SortNow);

        for f in self.vertex_faces(v) {
            let normal = polygon_normal(&self.face_positions(f));
            self.face_mut(f).normal = normal;
        }
        self.mark_as_changed();
        Ok(())
    }

    /// Apply an affine transform to every vertex and recompute normals.
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for (_, v) in self.vertices.iter_mut() {
            v.position = matrix.transform_point(&v.position);
        }
        self.calculate_normals();
        self.resort_vertices();
        self.mark_as_changed();
    }

    /// Translate every vertex by `offset`.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for (_, v) in self.vertices.iter_mut() {
            v.position += offset;
        }
        self.resort_vertices();
        self.mark_as_changed();
    }

    fn resort_vertices(&mut self) {
        let was_sorted = self.vertex_store.is_sorted();
        self.vertex_store.mark_unsorted();
        if was_sorted {
            self.vertex_store.sort(&self.vertices);
        }
    }

    /// Recompute every face normal from its boundary, and every vertex
    /// normal as the normalized sum of its adjacent face normals.
    pub fn calculate_normals(&mut self) {
        let mut vertex_sums = vec![Vector3::zeros(); self.vertices.slot_count()];
        let face_ids: Vec<FaceId<I>> = self.face_ids().collect();
        for f in face_ids {
            let normal = polygon_normal(&self.face_positions(f));
            for v in self.face_vertices(f) {
                vertex_sums[v.index()] += normal;
            }
            self.face_mut(f).normal = normal;
        }
        for (i, v) in self.vertices.iter_mut() {
            v.normal = vertex_sums[i].try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        }
        self.mark_as_changed();
    }

    /// Plane of a face as `(unit normal, offset)` with `normal · p == offset` on the plane.
    pub fn face_plane(&self, f: FaceId<I>) -> (Vector3<f64>, f64) {
        let normal = *self.face_normal(f);
        let offset = self
            .face_vertices(f)
            .next()
            .map(|v| normal.dot(&self.position(v).coords))
            .unwrap_or(0.0);
        (normal, offset)
    }

    /// Average of the vertex positions of a face.
    pub fn face_centroid(&self, f: FaceId<I>) -> Point3<f64> {
        let mut sum = Vector3::zeros();
        let mut n = 0usize;
        for v in self.face_vertices(f) {
            sum += self.position(v).coords;
            n += 1;
        }
        if n == 0 {
            Point3::origin()
        } else {
            Point3::from(sum / n as f64)
        }
    }

    /// Area of a (planar) face.
    pub fn face_area(&self, f: FaceId<I>) -> f64 {
        0.5 * newell(&self.face_positions(f)).norm()
    }

    /// Total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }
}
