use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::info;

use rt_dose_geometry::interp::{bracket, lerp, wrap_degrees};
use rt_dose_geometry::{brent, Aabb, Bvh, Ray, TriMesh};

use crate::error::Error;

use super::ExternalSurface;

/// Cylindrical height-field skin model around the patient y-axis.
///
/// Stores radii `ρ(ϕ, y)` on a closed gantry-angle grid (the last ϕ row
/// equals the first) and a strictly increasing y-grid. Grid samples whose
/// construction ray missed the mesh hold `+inf`. Radius lookups outside the
/// y-grid clamp to the edge rows.
#[derive(Clone, Debug)]
pub struct CylindricalSurface {
    /// Gantry angles in degrees, `0..=360`, uniformly spaced.
    phi: Vec<f64>,
    /// Axial coordinates, strictly increasing.
    y: Vec<f64>,
    /// Radii, one row of `y.len()` values per ϕ sample.
    rho: Vec<f64>,
}

impl CylindricalSurface {
    pub const DEFAULT_DELTA_PHI: f64 = 2.0;
    pub const DEFAULT_DELTA_Y: f64 = 2.0;

    /// Builds the height field from a mesh with the default grid spacing.
    pub fn from_mesh(mesh: &TriMesh) -> Result<Self, Error> {
        Self::from_mesh_spaced(mesh, Self::DEFAULT_DELTA_PHI, Self::DEFAULT_DELTA_Y)
    }

    /// Builds the height field from a mesh by casting inward rays at every
    /// `(ϕ, y)` grid sample.
    ///
    /// The requested spacings are upper bounds; both grids are stretched to
    /// land exactly on `360°` and on the mesh's axial extent.
    pub fn from_mesh_spaced(mesh: &TriMesh, delta_phi: f64, delta_y: f64) -> Result<Self, Error> {
        if delta_phi <= 0.0 || delta_y <= 0.0 {
            return Err(Error::InvalidSpacing { delta_phi, delta_y });
        }
        let aabb = mesh.aabb().ok_or(Error::EmptyMesh)?;
        let bvh = Bvh::build(mesh);

        let nseg_phi = (360.0 / delta_phi).ceil().max(1.0) as usize;
        let phi: Vec<f64> = (0..=nseg_phi)
            .map(|i| i as f64 * 360.0 / nseg_phi as f64)
            .collect();

        let (y0, y1) = (aabb.min().y, aabb.max().y);
        let nseg_y = (((y1 - y0) / delta_y).ceil().max(1.0)) as usize;
        let y: Vec<f64> = (0..=nseg_y)
            .map(|j| y0 + (y1 - y0) * j as f64 / nseg_y as f64)
            .collect();

        // Cast from a cylinder that encloses the mesh, towards the axis.
        let cast_radius = {
            let (min, max) = (aabb.min(), aabb.max());
            let rx = min.x.abs().max(max.x.abs());
            let rz = min.z.abs().max(max.z.abs());
            rx.hypot(rz) + 1.0
        };

        let ny = y.len();
        let mut rho = vec![f64::INFINITY; phi.len() * ny];
        rho.par_chunks_mut(ny)
            .zip(phi.par_iter())
            .for_each(|(row, &phi_deg)| {
                let (sin, cos) = phi_deg.to_radians().sin_cos();
                let radial = Vector3::new(sin, 0.0, cos);
                for (sample, &yj) in row.iter_mut().zip(&y) {
                    let origin = Point3::new(cast_radius * sin, yj, cast_radius * cos);
                    let ray = Ray::new(origin, -radial);
                    if let Some(t) = bvh.nearest_hit(mesh, &ray) {
                        let hit = ray.at(t);
                        *sample = hit.x.hypot(hit.z);
                    }
                }
            });

        // Close the seam: the 360° row repeats the 0° row.
        let ny_total = rho.len();
        rho.copy_within(0..ny, ny_total - ny);

        info!(
            phi_samples = phi.len(),
            y_samples = ny,
            "built cylindrical surface from mesh"
        );
        Ok(Self { phi, y, rho })
    }

    /// Bilinear radius lookup; `y` clamps to the grid, `ϕ` wraps.
    fn rho_at(&self, phi_deg: f64, y: f64) -> f64 {
        let ny = self.y.len();
        let (i0, i1, tp) = bracket(&self.phi, wrap_degrees(phi_deg));
        let (j0, j1, ty) = bracket(&self.y, y);
        let r0 = lerp_radius(tp, self.rho[i0 * ny + j0], self.rho[i1 * ny + j0]);
        let r1 = lerp_radius(tp, self.rho[i0 * ny + j1], self.rho[i1 * ny + j1]);
        lerp_radius(ty, r0, r1)
    }

    /// Whether `pos` lies inside the discretized surface.
    ///
    /// True iff the axial coordinate falls within the half-open grid span
    /// and the point's squared distance to the axis is below `ρ²`.
    pub fn is_inside(&self, pos: &Point3<f64>) -> bool {
        let (y_first, y_last) = (self.y[0], self.y[self.y.len() - 1]);
        if !(pos.y >= y_first && pos.y < y_last) {
            return false;
        }
        let rho = self.rho_at(pos.x.atan2(pos.z).to_degrees(), pos.y);
        pos.x * pos.x + pos.z * pos.z < rho * rho
    }

    /// Axis-aligned bounding box of the discretized surface, or `None` when
    /// every construction ray missed the mesh.
    pub fn extent(&self) -> Option<Aabb> {
        let ny = self.y.len();
        let points = self
            .phi
            .iter()
            .enumerate()
            .flat_map(|(i, &phi_deg)| {
                let (sin, cos) = phi_deg.to_radians().sin_cos();
                self.y.iter().enumerate().filter_map(move |(j, &yj)| {
                    let rho = self.rho[i * ny + j];
                    rho.is_finite()
                        .then(|| Point3::new(rho * sin, yj, rho * cos))
                })
            });
        Aabb::from_points(points)
    }

    /// Signed squared-radius clearance of the ray sample at `lambda`;
    /// positive inside the surface, negative outside.
    fn radial_clearance(&self, src: &Point3<f64>, step: &Vector3<f64>, lambda: f64) -> f64 {
        let r = src + step * lambda;
        let rho = self.rho_at(r.x.atan2(r.z).to_degrees(), r.y);
        rho * rho - (r.x * r.x + r.z * r.z)
    }
}

/// Interpolates between two radius samples, treating a non-finite sample as
/// "no surface": any span touching one is itself without surface.
fn lerp_radius(t: f64, a: f64, b: f64) -> f64 {
    if t == 0.0 {
        a
    } else if a.is_finite() && b.is_finite() {
        lerp(t, a, b)
    } else {
        f64::INFINITY
    }
}

impl ExternalSurface for CylindricalSurface {
    fn ssd(&self, pos: &Point3<f64>, src: &Point3<f64>) -> f64 {
        let step = pos - src;
        let f0 = self.radial_clearance(src, &step, 0.0);
        let f1 = self.radial_clearance(src, &step, 1.0);
        if f0 * f1 > 0.0 {
            // Both endpoints on the same side: the segment does not cross
            // the surface.
            return f64::INFINITY;
        }
        match brent(
            |lambda| self.radial_clearance(src, &step, lambda),
            0.0,
            1.0,
            1e-10,
            128,
        ) {
            Ok(lambda) => lambda * step.norm(),
            Err(_) => f64::INFINITY,
        }
    }
}
