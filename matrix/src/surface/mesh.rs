use nalgebra::Point3;
use tracing::debug;

use rt_dose_geometry::{Bvh, Ray, TriMesh};

use super::ExternalSurface;

/// Triangle mesh skin model.
///
/// The SSD is the distance from the source to the nearest intersection of
/// the mesh with the ray `src → pos`, or `+inf` when the ray misses the
/// mesh entirely. Intersections beyond `pos` count: the query is a ray, not
/// a segment.
#[derive(Clone, Debug)]
pub struct MeshSurface {
    mesh: TriMesh,
    bvh: Bvh,
}

impl MeshSurface {
    pub fn new(mesh: TriMesh) -> Self {
        let bvh = Bvh::build(&mesh);
        debug!(faces = mesh.faces().len(), "built mesh surface");
        Self { mesh, bvh }
    }

    pub fn mesh(&self) -> &TriMesh {
        &self.mesh
    }
}

impl ExternalSurface for MeshSurface {
    fn ssd(&self, pos: &Point3<f64>, src: &Point3<f64>) -> f64 {
        let Some(direction) = (pos - src).try_normalize(0.0) else {
            return f64::INFINITY;
        };
        let ray = Ray::new(*src, direction);
        self.bvh
            .nearest_hit(&self.mesh, &ray)
            .unwrap_or(f64::INFINITY)
    }
}
