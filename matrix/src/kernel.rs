use nalgebra::Point3;

use crate::beamlet::{inside_cone, Beamlet};
use crate::surface::ExternalSurface;

/// Pointwise dose contribution contract.
///
/// The matrix core treats the kernel as opaque: nothing is assumed about
/// continuity, positivity or symmetry of the returned values. Kernels must
/// tolerate the surface sentinels (`+inf` and `NaN` SSD mean "no surface
/// along the ray"; the usual policy is zero dose).
pub trait DoseKernel: Sync {
    fn point_dose<S>(&self, pos: &Point3<f64>, beamlet: &Beamlet, surface: &S) -> f64
    where
        S: ExternalSurface + ?Sized;

    /// WGSL translation of the kernel for the dense GPU back end: the source
    /// of a function `fn point_dose(pos: vec3<f32>, src: vec3<f32>,
    /// dir: vec3<f32>, sad: f32, ssd: f32) -> f32`. Kernels that cannot run
    /// on a device return `None`.
    fn wgsl_point_dose(&self) -> Option<String> {
        None
    }
}

/// Evaluates the kernel through the culling cone.
///
/// Returns exactly `0.0`, without invoking the kernel, when `pos` lies
/// outside the beamlet's cone of influence for the given `maxradius`.
pub fn point_dose<K, S>(
    kernel: &K,
    pos: &Point3<f64>,
    beamlet: &Beamlet,
    surface: &S,
    maxradius: f64,
) -> f64
where
    K: DoseKernel + ?Sized,
    S: ExternalSurface + ?Sized,
{
    let r = pos - beamlet.source_position();
    if !inside_cone(&r, beamlet.direction(), beamlet.tan_half_angle(maxradius)) {
        return 0.0;
    }
    kernel.point_dose(pos, beamlet, surface)
}
