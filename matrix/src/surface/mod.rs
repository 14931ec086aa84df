use nalgebra::Point3;

mod constant;
mod cylindrical;
mod linear;
mod mesh;
mod plane;

pub use constant::ConstantSurface;
pub use cylindrical::CylindricalSurface;
pub use linear::{LinearSurface, SurfacePlane, DEGREE_SAMPLES};
pub use mesh::MeshSurface;
pub use plane::PlaneSurface;

/// Skin model answering ray queries for dose calculation.
///
/// For a dose point `pos` and a beamlet source `src`, a surface reports the
/// source-surface distance along the ray `src → pos` and, derived from it,
/// the radiological depth of the point below the skin.
///
/// "No surface along the ray" is reported as a sentinel value rather than an
/// error: `+inf` for the mesh and cylindrical variants, `NaN` for the linear
/// variant when the ray runs parallel to the interpolated plane. Kernel
/// authors must tolerate both.
pub trait ExternalSurface: Sync {
    /// Source-surface distance from `src` along the ray through `pos`.
    fn ssd(&self, pos: &Point3<f64>, src: &Point3<f64>) -> f64;

    /// Depth of `pos` below the surface along the same ray.
    ///
    /// `depth + ssd = ‖pos − src‖` for every finite SSD, across all
    /// variants.
    fn depth(&self, pos: &Point3<f64>, src: &Point3<f64>) -> f64 {
        (pos - src).norm() - self.ssd(pos, src)
    }

    /// Analytic representation usable by the dense GPU back end, if this
    /// surface has one.
    fn device_repr(&self) -> Option<DeviceSurface> {
        None
    }
}

/// Device-friendly analytic surfaces for the GPU back end.
///
/// Surfaces that embed run-time lookups (mesh traversal, root finding) have
/// no device representation and stay on the CPU paths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceSurface {
    Constant { ssd: f64 },
    Plane { ssd: f64 },
}
