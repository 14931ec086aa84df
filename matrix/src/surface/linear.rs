use nalgebra::{Point3, Vector3};
use tracing::debug;

use rt_dose_geometry::interp::{bracket, wrap_degrees};

use crate::error::Error;

use super::ExternalSurface;

/// A local tangent plane of the patient surface, given by a normal and a
/// point on the plane. The normal does not need to be unit length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfacePlane {
    pub normal: Vector3<f64>,
    pub point: Point3<f64>,
}

/// Number of per-degree plane samples, both endpoints included.
pub const DEGREE_SAMPLES: usize = 361;

/// Gantry-interpolated plane skin model.
///
/// Stores one tangent plane per integer gantry degree. A query selects the
/// gantry angle from the source position (`atan2(src.x, src.z)` in degrees,
/// wrapped onto `[0, 360)`), linearly interpolates the two bracketing
/// planes and intersects the query ray with the result. The SSD is `NaN`
/// when the ray runs parallel to the interpolated plane.
#[derive(Clone, Debug)]
pub struct LinearSurface {
    planes: Vec<SurfacePlane>,
}

impl LinearSurface {
    /// Creates a surface from a densified per-degree table.
    ///
    /// The table must hold exactly [`DEGREE_SAMPLES`] entries; the last
    /// entry is overwritten with the first so the table closes over the
    /// 0/360 seam.
    pub fn new(mut planes: Vec<SurfacePlane>) -> Result<Self, Error> {
        if planes.len() != DEGREE_SAMPLES {
            return Err(Error::SurfaceTableLength {
                expected: DEGREE_SAMPLES,
                got: planes.len(),
            });
        }
        planes[DEGREE_SAMPLES - 1] = planes[0];
        Ok(Self { planes })
    }

    /// Creates a surface by resampling an irregular gantry-angle table onto
    /// the per-degree grid.
    ///
    /// `phis` are gantry angles in degrees, strictly increasing and within
    /// `[0, 360)`; angles between the last and the first sample interpolate
    /// across the seam.
    pub fn from_table(
        phis: &[f64],
        normals: &[Vector3<f64>],
        points: &[Point3<f64>],
    ) -> Result<Self, Error> {
        if phis.len() != normals.len() || phis.len() != points.len() || phis.is_empty() {
            return Err(Error::SurfaceTableMismatch {
                phis: phis.len(),
                normals: normals.len(),
                points: points.len(),
            });
        }
        let sorted = phis.windows(2).all(|w| w[0] < w[1]);
        let in_range = phis.iter().all(|&p| (0.0..360.0).contains(&p));
        if !sorted || !in_range {
            return Err(Error::SurfaceTableUnsorted);
        }

        let n = phis.len();
        let mut planes = Vec::with_capacity(DEGREE_SAMPLES);
        for degree in 0..DEGREE_SAMPLES {
            let phi = (degree % 360) as f64;
            let (i0, i1, t) = if phi < phis[0] || phi >= phis[n - 1] {
                // Bracket across the seam between the last and the first
                // sample, one full turn apart.
                let span = phis[0] + 360.0 - phis[n - 1];
                let offset = if phi < phis[0] {
                    phi + 360.0 - phis[n - 1]
                } else {
                    phi - phis[n - 1]
                };
                (n - 1, 0, offset / span)
            } else {
                bracket(phis, phi)
            };
            planes.push(SurfacePlane {
                normal: normals[i0].lerp(&normals[i1], t),
                point: Point3::from(points[i0].coords.lerp(&points[i1].coords, t)),
            });
        }
        debug!(samples = n, "resampled gantry table onto per-degree grid");
        Ok(Self { planes })
    }

    fn plane_at(&self, phi: f64) -> SurfacePlane {
        let i0 = phi.floor() as usize;
        let t = phi - i0 as f64;
        let p0 = &self.planes[i0];
        let p1 = &self.planes[i0 + 1];
        SurfacePlane {
            normal: p0.normal.lerp(&p1.normal, t),
            point: Point3::from(p0.point.coords.lerp(&p1.point.coords, t)),
        }
    }
}

impl ExternalSurface for LinearSurface {
    fn ssd(&self, pos: &Point3<f64>, src: &Point3<f64>) -> f64 {
        let phi = wrap_degrees(src.x.atan2(src.z).to_degrees());
        let plane = self.plane_at(phi);
        let d = pos - src;
        let denom = plane.normal.dot(&d);
        if denom == 0.0 {
            return f64::NAN;
        }
        let lambda = plane.normal.dot(&(plane.point - src)) / denom;
        lambda * d.norm()
    }
}
