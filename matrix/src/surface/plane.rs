use nalgebra::Point3;

use super::{DeviceSurface, ExternalSurface};

/// Plane at distance `ssd` from the source along the source-isocenter ray.
///
/// For an off-axis query ray the SSD grows with the hypotenuse:
/// `ssd · ‖src‖·‖src−pos‖ / (src·(src−pos))`, with the isocenter at the
/// origin of the world frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneSurface {
    ssd: f64,
}

impl PlaneSurface {
    pub fn new(ssd: f64) -> Self {
        Self { ssd }
    }
}

impl ExternalSurface for PlaneSurface {
    fn ssd(&self, pos: &Point3<f64>, src: &Point3<f64>) -> f64 {
        let d = src - pos;
        self.ssd * src.coords.norm() * d.norm() / src.coords.dot(&d)
    }

    fn device_repr(&self) -> Option<DeviceSurface> {
        Some(DeviceSurface::Plane { ssd: self.ssd })
    }
}
