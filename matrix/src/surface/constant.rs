use nalgebra::Point3;

use super::{DeviceSurface, ExternalSurface};

/// Surface returning the same SSD for every query.
///
/// Useful for tests and for water-tank style setups where the skin is a
/// fixed distance from the source regardless of the ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantSurface {
    ssd: f64,
}

impl ConstantSurface {
    pub fn new(ssd: f64) -> Self {
        Self { ssd }
    }
}

impl ExternalSurface for ConstantSurface {
    fn ssd(&self, _pos: &Point3<f64>, _src: &Point3<f64>) -> f64 {
        self.ssd
    }

    fn device_repr(&self) -> Option<DeviceSurface> {
        Some(DeviceSurface::Constant { ssd: self.ssd })
    }
}
