//! Binary space partition over mesh faces for back-to-front drawing.
//!
//! The tree holds face handles only. Faces are never cut: a face that
//! straddles a splitting plane goes to the side its vertices lean towards.
//! Once built, the tree yields a painter's order for any eye position
//! without being rebuilt.
//!
//! # Example
//!
//! ```
//! use polykernel::algo::bsp::{BspOptions, BspTree};
//! use polykernel::mesh::{build_from_polygons, Mesh};
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
//! let order = tree.visibility_order_from_eye(&Point3::new(0.5, 0.5, 5.0));
//! assert_eq!(order.len(), 4);
//! ```

use nalgebra::{Matrix4, Point3, Vector3};
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::mesh::{FaceId, Mesh, MeshIndex};

/// Options for [`BspTree::build`].
#[derive(Debug, Clone)]
pub struct BspOptions {
    /// Candidate splitting faces examined at each node.
    pub max_faces_to_sample: usize,

    /// Keep searching among zero-crossing candidates for the best balanced one.
    /// When false the first candidate that crosses nothing is taken.
    pub balance_tree: bool,

    /// Points closer than this to a plane count as lying on it.
    pub plane_epsilon: f64,
}

impl Default for BspOptions {
    fn default() -> Self {
        Self {
            max_faces_to_sample: 16,
            balance_tree: true,
            plane_epsilon: 1e-9,
        }
    }
}

impl BspOptions {
    /// Set the number of candidates sampled per node.
    pub fn with_max_faces_to_sample(mut self, count: usize) -> Self {
        self.max_faces_to_sample = count;
        self
    }

    /// Set whether to favour balance over build speed.
    pub fn with_balance_tree(mut self, balance: bool) -> Self {
        self.balance_tree = balance;
        self
    }
}

#[derive(Debug, Clone)]
struct BspNode<I: MeshIndex> {
    face: FaceId<I>,
    normal: Vector3<f64>,
    offset: f64,
    back: Option<usize>,
    front: Option<usize>,
}

impl<I: MeshIndex> BspNode<I> {
    #[inline]
    fn distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.offset
    }
}

/// A BSP tree over the faces of one mesh.
#[derive(Debug, Clone)]
pub struct BspTree<I: MeshIndex = u32> {
    nodes: Vec<BspNode<I>>,
    root: Option<usize>,
    depth: usize,
}

/// Per-face geometry gathered once before building.
struct Polygon {
    normal: Vector3<f64>,
    offset: f64,
    points: Vec<Point3<f64>>,
}

impl Polygon {
    fn signed_sum(&self, normal: &Vector3<f64>, offset: f64) -> f64 {
        self.points.iter().map(|p| normal.dot(&p.coords) - offset).sum()
    }
}

#[derive(Clone, Copy)]
enum Slot {
    Root,
    Back(usize),
    Front(usize),
}

impl<I: MeshIndex> BspTree<I> {
    /// Build a tree over every face of `mesh`.
    pub fn build(mesh: &Mesh<I>, options: &BspOptions) -> Result<Self> {
        if options.max_faces_to_sample == 0 {
            return Err(MeshError::invalid_param(
                "max_faces_to_sample",
                options.max_faces_to_sample,
                "must be at least 1",
            ));
        }

        let faces: Vec<FaceId<I>> = mesh.face_ids().collect();
        let polygons: Vec<Polygon> = faces
            .iter()
            .map(|&f| {
                let (normal, offset) = mesh.face_plane(f);
                Polygon {
                    normal,
                    offset,
                    points: mesh.face_positions(f),
                }
            })
            .collect();

        let mut tree = Self {
            nodes: Vec::with_capacity(faces.len()),
            root: None,
            depth: 0,
        };
        let mut work: Vec<(Vec<usize>, Slot, usize)> = vec![((0..faces.len()).collect(), Slot::Root, 1)];

        while let Some((list, slot, depth)) = work.pop() {
            if list.is_empty() {
                continue;
            }
            let chosen = choose_splitter(&list, &polygons, options);
            let plane = &polygons[chosen];

            let mut back = Vec::new();
            let mut front = Vec::new();
            for &other in &list {
                if other == chosen {
                    continue;
                }
                if polygons[other].signed_sum(&plane.normal, plane.offset) < 0.0 {
                    back.push(other);
                } else {
                    front.push(other);
                }
            }

            let node = tree.nodes.len();
            tree.nodes.push(BspNode {
                face: faces[chosen],
                normal: plane.normal,
                offset: plane.offset,
                back: None,
                front: None,
            });
            match slot {
                Slot::Root => tree.root = Some(node),
                Slot::Back(parent) => tree.nodes[parent].back = Some(node),
                Slot::Front(parent) => tree.nodes[parent].front = Some(node),
            }
            tree.depth = tree.depth.max(depth);

            work.push((back, Slot::Back(node), depth + 1));
            work.push((front, Slot::Front(node), depth + 1));
        }

        debug!(nodes = tree.nodes.len(), depth = tree.depth, "built BSP tree");
        Ok(tree)
    }

    /// Number of faces in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no faces.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Length of the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The face splitting the whole set.
    pub fn root_face(&self) -> Option<FaceId<I>> {
        self.root.map(|n| self.nodes[n].face)
    }

    /// Back-to-front face order for a camera.
    ///
    /// `camera_transform` maps mesh space to view space; the eye sits at the
    /// view-space origin.
    pub fn visibility_order(&self, camera_transform: &Matrix4<f64>) -> Result<Vec<FaceId<I>>> {
        let inverse = camera_transform.try_inverse().ok_or_else(|| {
            MeshError::invalid_param("camera_transform", "singular matrix", "must be invertible")
        })?;
        let eye = inverse.transform_point(&Point3::origin());
        Ok(self.visibility_order_from_eye(&eye))
    }

    /// Back-to-front face order seen from `eye`, in mesh space.
    pub fn visibility_order_from_eye(&self, eye: &Point3<f64>) -> Vec<FaceId<I>> {
        enum Visit<I: MeshIndex> {
            Expand(usize),
            Emit(FaceId<I>),
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<Visit<I>> = self.root.map(Visit::Expand).into_iter().collect();
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Emit(face) => order.push(face),
                Visit::Expand(n) => {
                    let node = &self.nodes[n];
                    let (near, far) = if node.distance(eye) >= 0.0 {
                        (node.front, node.back)
                    } else {
                        (node.back, node.front)
                    };
                    // Far side first, so it is pushed last
                    stack.extend(near.map(Visit::Expand));
                    stack.push(Visit::Emit(node.face));
                    stack.extend(far.map(Visit::Expand));
                }
            }
        }
        order
    }
}

/// Pick the face whose plane cuts the rest of `list` least.
///
/// Only a strided sample of at most `max_faces_to_sample` faces is scored,
/// each against the other sampled faces. The score sums squared distances of
/// straddling faces' vertices on each side of the plane and is the smaller of
/// the two sums; ties go to the candidate with the more even side counts.
fn choose_splitter(list: &[usize], polygons: &[Polygon], options: &BspOptions) -> usize {
    if list.len() == 1 {
        return list[0];
    }
    let stride = (list.len() / options.max_faces_to_sample).max(1);
    let sample: Vec<usize> = list
        .iter()
        .step_by(stride)
        .take(options.max_faces_to_sample)
        .copied()
        .collect();

    let mut best: Option<(usize, f64, usize)> = None;
    'candidates: for &candidate in &sample {
        let plane = &polygons[candidate];
        let mut below = 0.0;
        let mut above = 0.0;
        let mut backs = 0usize;
        let mut fronts = 0usize;

        for &other in &sample {
            if other == candidate {
                continue;
            }
            let mut face_below = 0.0;
            let mut face_above = 0.0;
            let mut sum = 0.0;
            for p in &polygons[other].points {
                let d = plane.normal.dot(&p.coords) - plane.offset;
                sum += d;
                if d.abs() < options.plane_epsilon {
                    continue;
                }
                if d < 0.0 {
                    face_below += d * d;
                } else {
                    face_above += d * d;
                }
            }
            if face_below > 0.0 && face_above > 0.0 {
                below += face_below;
                above += face_above;
            }
            if sum < 0.0 {
                backs += 1;
            } else {
                fronts += 1;
            }
            if let Some((_, best_score, _)) = best {
                if below > best_score && above > best_score {
                    continue 'candidates;
                }
            }
        }

        let score = f64::min(below, above);
        let imbalance = backs.abs_diff(fronts);
        let better = match best {
            None => true,
            Some((_, s, i)) => score < s || (score == s && imbalance < i),
        };
        if better {
            best = Some((candidate, score, imbalance));
            if score == 0.0 && !options.balance_tree {
                break;
            }
        }
    }
    best.map(|(face, _, _)| face).unwrap_or(list[0])
}

impl<I: MeshIndex> Mesh<I> {
    /// Build a [`BspTree`] over this mesh's faces.
    pub fn build_bsp(&self, options: &BspOptions) -> Result<BspTree<I>> {
        BspTree::build(self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::CreateOption;
    use crate::test_fixtures;
    use nalgebra::{Isometry3, Vector3};

    fn assert_each_face_once(mesh: &Mesh, order: &[FaceId]) {
        let mut sorted = order.to_vec();
        sorted.sort();
        let mut expected: Vec<_> = mesh.face_ids().collect();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    /// On a convex mesh, every face turned away from the eye must be drawn
    /// before every face turned towards it.
    fn assert_painter_order(mesh: &Mesh, order: &[FaceId], eye: &Point3<f64>) {
        let facing: Vec<bool> = order
            .iter()
            .map(|&f| {
                let (n, d) = mesh.face_plane(f);
                n.dot(&eye.coords) - d > 0.0
            })
            .collect();
        let first_front = facing.iter().position(|&x| x).unwrap_or(facing.len());
        assert!(facing[first_front..].iter().all(|&x| x), "order {:?}", facing);
    }

    fn eyes() -> Vec<Point3<f64>> {
        let mut eyes = Vec::new();
        for x in [-3.0, 0.4, 3.0] {
            for y in [-2.5, 0.3, 2.0] {
                for z in [-4.0, 0.2, 3.5] {
                    eyes.push(Point3::new(x, y, z));
                }
            }
        }
        eyes
    }

    #[test]
    fn test_tetrahedron_visits_each_face_once() {
        let mesh = test_fixtures::tetrahedron();
        let tree = BspTree::build(&mesh, &BspOptions::default()).unwrap();
        assert_eq!(tree.len(), 4);
        for eye in eyes() {
            let camera = Isometry3::look_at_rh(&eye, &Point3::new(0.5, 0.5, 0.25), &Vector3::y());
            let order = tree.visibility_order(&camera.to_homogeneous()).unwrap();
            assert_each_face_once(&mesh, &order);
            assert_painter_order(&mesh, &order, &eye);
        }
    }

    #[test]
    fn test_order_changes_across_root_plane() {
        let mesh = test_fixtures::tetrahedron();
        let tree = BspTree::build(&mesh, &BspOptions::default()).unwrap();
        let root = tree.root_face().unwrap();
        let (n, _) = mesh.face_plane(root);
        let centroid = mesh.face_centroid(root);

        let outside = centroid + n * 0.5;
        let inside = centroid - n * 0.05;
        let seen_outside = tree.visibility_order_from_eye(&outside);
        let seen_inside = tree.visibility_order_from_eye(&inside);

        assert_ne!(seen_outside, seen_inside);
        assert_eq!(seen_outside.last(), Some(&root));
        assert_eq!(seen_inside.first(), Some(&root));
    }

    #[test]
    fn test_camera_transform_matches_eye() {
        let mesh = test_fixtures::tetrahedron();
        let tree = BspTree::build(&mesh, &BspOptions::default()).unwrap();
        let eye = Point3::new(2.0, -1.0, 1.5);
        let camera = Isometry3::look_at_rh(&eye, &Point3::origin(), &Vector3::z());
        assert_eq!(
            tree.visibility_order(&camera.to_homogeneous()).unwrap(),
            tree.visibility_order_from_eye(&eye)
        );
    }

    #[test]
    fn test_singular_camera_rejected() {
        let mesh = test_fixtures::tetrahedron();
        let tree = BspTree::build(&mesh, &BspOptions::default()).unwrap();
        assert!(matches!(
            tree.visibility_order(&Matrix4::zeros()),
            Err(MeshError::InvalidParameter { name: "camera_transform", .. })
        ));
    }

    #[test]
    fn test_cube_painter_order_with_and_without_balance() {
        let mesh = test_fixtures::cube();
        for balance in [true, false] {
            let options = BspOptions::default().with_balance_tree(balance);
            let tree = mesh.build_bsp(&options).unwrap();
            assert_eq!(tree.len(), 6);
            for eye in eyes() {
                let order = tree.visibility_order_from_eye(&eye);
                assert_each_face_once(&mesh, &order);
                assert_painter_order(&mesh, &order, &eye);
            }
        }
    }

    #[test]
    fn test_faces_wholly_on_one_side_cost_nothing() {
        // Three parallel triangles. No plane crosses another face, so every
        // candidate scores zero and the balance tie-break picks the middle one.
        let mut mesh: Mesh = Mesh::new();
        let mut faces = Vec::new();
        for z in [-1.0, 0.0, 1.0] {
            let tri = [
                Point3::new(0.0, 0.0, z),
                Point3::new(1.0, 0.0, z),
                Point3::new(0.0, 1.0, z),
            ];
            let face = mesh
                .create_face_from_positions(&tri, CreateOption::CreateNew, 0.0)
                .unwrap()
                .unwrap();
            faces.push(face);
        }

        let balanced = mesh.build_bsp(&BspOptions::default()).unwrap();
        assert_eq!(balanced.root_face(), Some(faces[1]));
        assert_eq!(balanced.depth(), 2);

        // Without balancing the first zero-cost candidate wins
        let options = BspOptions::default().with_balance_tree(false);
        let first = mesh.build_bsp(&options).unwrap();
        assert_eq!(first.root_face(), Some(faces[0]));
        assert_eq!(first.depth(), 3);
    }

    #[test]
    fn test_sampling_limit_still_covers_all_faces() {
        // A strip of 12 triangles folded into a zig-zag, so planes cross faces
        let mut mesh: Mesh = Mesh::new();
        for i in 0..12 {
            let x = i as f64;
            let z = if i % 2 == 0 { 0.0 } else { 0.7 };
            let tri = [
                Point3::new(x, 0.0, 0.0),
                Point3::new(x + 1.0, 0.0, z),
                Point3::new(x + 0.5, 1.0, z * 0.5),
            ];
            mesh.create_face_from_positions(&tri, CreateOption::CreateNew, 0.0)
                .unwrap()
                .unwrap();
        }
        let tree = BspTree::build(&mesh, &BspOptions::default().with_max_faces_to_sample(3)).unwrap();
        assert_eq!(tree.len(), 12);
        assert!(tree.depth() >= 4);
        for eye in eyes() {
            assert_each_face_once(&mesh, &tree.visibility_order_from_eye(&eye));
        }
    }

    #[test]
    fn test_empty_mesh_and_bad_options() {
        let mesh: Mesh = Mesh::new();
        let tree = BspTree::build(&mesh, &BspOptions::default()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.root_face(), None);
        assert!(tree.visibility_order_from_eye(&Point3::origin()).is_empty());

        let bad = BspOptions::default().with_max_faces_to_sample(0);
        assert!(matches!(
            BspTree::build(&mesh, &bad),
            Err(MeshError::InvalidParameter { name: "max_faces_to_sample", .. })
        ));
    }
}
