use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::aabb::Aabb;

/// The `MeshError` enum represents the ways mesh construction can fail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    #[error("Face {face} references vertex {vertex}, but the mesh has {count} vertices")]
    FaceIndexOutOfBounds {
        face: usize,
        vertex: usize,
        count: usize,
    },
}

/// A ray starting at `origin` and travelling along `direction`.
///
/// The direction is not required to be normalized; intersection parameters
/// are expressed in units of the direction length.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self { origin, direction }
    }

    /// The point at parameter `t` along the ray.
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }
}

/// Intersects a ray with the triangle `(a, b, c)` using the
/// Möller–Trumbore algorithm.
///
/// Returns the ray parameter of the hit, or `None` when the ray misses or
/// runs parallel to the triangle plane. Hits at negative parameters (behind
/// the origin) are rejected.
pub fn ray_triangle(
    ray: &Ray,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<f64> {
    const EPS: f64 = 1e-12;

    let e1 = b - a;
    let e2 = c - a;
    let pvec = ray.direction.cross(&e2);
    let det = e1.dot(&pvec);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = ray.origin - a;
    let u = tvec.dot(&pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(&e1);
    let v = ray.direction.dot(&qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(&qvec) * inv_det;
    (t > EPS).then_some(t)
}

/// An indexed triangle mesh.
#[derive(Clone, Debug, Default)]
pub struct TriMesh {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
}

impl TriMesh {
    /// Creates a mesh after validating that every face index is in bounds.
    pub fn new(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Result<Self, MeshError> {
        let count = vertices.len();
        for (face, idx) in faces.iter().enumerate() {
            for &vertex in idx {
                if vertex >= count {
                    return Err(MeshError::FaceIndexOutOfBounds {
                        face,
                        vertex,
                        count,
                    });
                }
            }
        }
        Ok(Self { vertices, faces })
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// The three corner points of face `i`.
    pub fn face_vertices(&self, i: usize) -> [&Point3<f64>; 3] {
        let [a, b, c] = self.faces[i];
        [&self.vertices[a], &self.vertices[b], &self.vertices[c]]
    }

    fn face_aabb(&self, i: usize) -> Aabb {
        let [a, b, c] = self.face_vertices(i);
        let mut aabb = Aabb::new(*a, *a);
        aabb.grow(b);
        aabb.grow(c);
        aabb
    }

    fn face_centroid(&self, i: usize) -> Point3<f64> {
        let [a, b, c] = self.face_vertices(i);
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Smallest box enclosing all vertices, or `None` for an empty mesh.
    pub fn aabb(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().copied())
    }
}

const BVH_LEAF_SIZE: usize = 4;

#[derive(Clone, Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        start: usize,
        len: usize,
    },
    Internal {
        aabb: Aabb,
        left: usize,
        right: usize,
    },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// A bounding volume hierarchy over the faces of a [`TriMesh`].
///
/// Built once by median splits along the longest box axis; queries walk the
/// tree with an explicit stack. The hierarchy stores face indices only and
/// borrows the mesh at query time.
#[derive(Clone, Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    order: Vec<usize>,
    root: usize,
}

impl Bvh {
    pub fn build(mesh: &TriMesh) -> Self {
        let mut order: Vec<usize> = (0..mesh.faces().len()).collect();
        let mut nodes = Vec::new();
        let root = if order.is_empty() {
            0
        } else {
            Self::build_range(mesh, &mut order, 0, mesh.faces().len(), &mut nodes)
        };
        debug!(
            faces = order.len(),
            nodes = nodes.len(),
            "built mesh bounding volume hierarchy"
        );
        Self { nodes, order, root }
    }

    fn build_range(
        mesh: &TriMesh,
        order: &mut [usize],
        start: usize,
        end: usize,
        nodes: &mut Vec<BvhNode>,
    ) -> usize {
        let mut aabb = mesh.face_aabb(order[start]);
        for &f in &order[start + 1..end] {
            aabb = aabb.merged(&mesh.face_aabb(f));
        }
        if end - start <= BVH_LEAF_SIZE {
            nodes.push(BvhNode::Leaf {
                aabb,
                start,
                len: end - start,
            });
            return nodes.len() - 1;
        }

        let axis = aabb.longest_axis();
        let mid = start + (end - start) / 2;
        order[start..end].select_nth_unstable_by(mid - start, |&fa, &fb| {
            let ca = mesh.face_centroid(fa)[axis];
            let cb = mesh.face_centroid(fb)[axis];
            ca.total_cmp(&cb)
        });

        let left = Self::build_range(mesh, order, start, mid, nodes);
        let right = Self::build_range(mesh, order, mid, end, nodes);
        nodes.push(BvhNode::Internal { aabb, left, right });
        nodes.len() - 1
    }

    /// Parameter of the nearest intersection of `ray` with the mesh, or
    /// `None` when the ray misses every face.
    pub fn nearest_hit(&self, mesh: &TriMesh, ray: &Ray) -> Option<f64> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<f64> = None;
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            let node = &self.nodes[node];
            let t_max = best.unwrap_or(f64::INFINITY);
            if node
                .aabb()
                .ray_interval(&ray.origin, &ray.direction, t_max)
                .is_none()
            {
                continue;
            }
            match node {
                BvhNode::Leaf { start, len, .. } => {
                    for &f in &self.order[*start..*start + *len] {
                        let [a, b, c] = mesh.face_vertices(f);
                        if let Some(t) = ray_triangle(ray, a, b, c) {
                            if best.is_none_or(|tb| t < tb) {
                                best = Some(t);
                            }
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An axis aligned cuboid triangulated into 12 faces.
    pub(crate) fn cuboid(center: Point3<f64>, half: Vector3<f64>) -> TriMesh {
        let mut vertices = Vec::with_capacity(8);
        for k in 0..8 {
            let sx = if k & 1 == 0 { -1.0 } else { 1.0 };
            let sy = if k & 2 == 0 { -1.0 } else { 1.0 };
            let sz = if k & 4 == 0 { -1.0 } else { 1.0 };
            vertices.push(Point3::new(
                center.x + sx * half.x,
                center.y + sy * half.y,
                center.z + sz * half.z,
            ));
        }
        let faces = vec![
            // -z and +z
            [0, 2, 1],
            [1, 2, 3],
            [4, 5, 6],
            [5, 7, 6],
            // -y and +y
            [0, 1, 4],
            [1, 5, 4],
            [2, 6, 3],
            [3, 6, 7],
            // -x and +x
            [0, 4, 2],
            [2, 4, 6],
            [1, 3, 5],
            [3, 7, 5],
        ];
        TriMesh::new(vertices, faces).unwrap()
    }

    #[test]
    fn test_face_index_validation() {
        let r = TriMesh::new(vec![Point3::origin()], vec![[0, 0, 1]]);
        assert_eq!(
            r.unwrap_err(),
            MeshError::FaceIndexOutOfBounds {
                face: 0,
                vertex: 1,
                count: 1
            }
        );
    }

    #[test]
    fn test_ray_triangle_hit() {
        let ray = Ray::new(Point3::new(0.2, 0.2, 1.0), Vector3::new(0.0, 0.0, -1.0));
        let t = ray_triangle(
            &ray,
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert!((t - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ray_triangle_miss_and_parallel() {
        let tri = (
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        // Outside the triangle.
        let ray = Ray::new(Point3::new(0.9, 0.9, 1.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(ray_triangle(&ray, &tri.0, &tri.1, &tri.2).is_none());
        // Parallel to the plane.
        let ray = Ray::new(Point3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(ray_triangle(&ray, &tri.0, &tri.1, &tri.2).is_none());
        // Behind the origin.
        let ray = Ray::new(Point3::new(0.2, 0.2, -1.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(ray_triangle(&ray, &tri.0, &tri.1, &tri.2).is_none());
    }

    #[test]
    fn test_nearest_hit_on_cuboid() {
        let mesh = cuboid(Point3::origin(), Vector3::new(0.5, 0.5, 0.5));
        let bvh = Bvh::build(&mesh);
        let ray = Ray::new(Point3::new(0.1, 0.1, 5.0), Vector3::new(0.0, 0.0, -1.0));
        let t = bvh.nearest_hit(&mesh, &ray).unwrap();
        assert!((t - 4.5).abs() < 1e-9);

        let miss = Ray::new(Point3::new(2.0, 2.0, 5.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(bvh.nearest_hit(&mesh, &miss).is_none());
    }

    #[test]
    fn test_nearest_hit_matches_brute_force() {
        // A strip of offset cuboids exercises interior BVH nodes.
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        for k in 0..6 {
            let m = cuboid(
                Point3::new(k as f64 * 2.0, 0.2 * k as f64, -1.5 * k as f64),
                Vector3::new(0.4, 0.6, 0.5),
            );
            let base = vertices.len();
            vertices.extend_from_slice(m.vertices());
            faces.extend(m.faces().iter().map(|f| f.map(|v| v + base)));
        }
        let mesh = TriMesh::new(vertices, faces).unwrap();
        let bvh = Bvh::build(&mesh);

        let rays = [
            Ray::new(Point3::new(0.0, 0.0, 10.0), Vector3::new(0.0, 0.0, -1.0)),
            Ray::new(Point3::new(4.1, 0.3, 10.0), Vector3::new(0.0, 0.0, -1.0)),
            Ray::new(Point3::new(-5.0, 0.1, 0.0), Vector3::new(1.0, 0.0, -0.4)),
            Ray::new(Point3::new(10.0, 1.0, -7.0), Vector3::new(-1.0, -0.05, 0.3)),
            Ray::new(Point3::new(0.0, 5.0, 0.0), Vector3::new(0.0, 1.0, 0.0)),
        ];
        for ray in &rays {
            let brute = (0..mesh.faces().len())
                .filter_map(|f| {
                    let [a, b, c] = mesh.face_vertices(f);
                    ray_triangle(ray, a, b, c)
                })
                .min_by(f64::total_cmp);
            let fast = bvh.nearest_hit(&mesh, ray);
            match (brute, fast) {
                (None, None) => {}
                (Some(tb), Some(tf)) => assert!((tb - tf).abs() < 1e-9),
                other => panic!("BVH disagrees with brute force: {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = TriMesh::default();
        let bvh = Bvh::build(&mesh);
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, 1.0));
        assert!(bvh.nearest_hit(&mesh, &ray).is_none());
    }
}
