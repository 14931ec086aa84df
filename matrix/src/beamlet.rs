use nalgebra::{Point3, Unit, Vector3};

/// An elementary radiation pencil.
///
/// A beamlet is fully described towards the matrix core by its virtual
/// source position, the unit direction from the source through the beamlet
/// axis, and the source-axis distance (SAD). Cross-section and divergence
/// are the dose kernel's business.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Beamlet {
    source: Point3<f64>,
    direction: Unit<Vector3<f64>>,
    sad: f64,
}

impl Beamlet {
    /// Creates a beamlet. The direction is normalized; `source_axis_distance`
    /// must be positive.
    pub fn new(source: Point3<f64>, direction: Vector3<f64>, source_axis_distance: f64) -> Self {
        Self {
            source,
            direction: Unit::new_normalize(direction),
            sad: source_axis_distance,
        }
    }

    pub fn source_position(&self) -> &Point3<f64> {
        &self.source
    }

    pub fn direction(&self) -> &Unit<Vector3<f64>> {
        &self.direction
    }

    pub fn source_axis_distance(&self) -> f64 {
        self.sad
    }

    /// Tangent of the half angle of the culling cone that projects to a
    /// circle of radius `maxradius` on the isocenter plane.
    pub fn tan_half_angle(&self, maxradius: f64) -> f64 {
        maxradius / self.sad
    }
}

/// Conservative cone membership test for culling.
///
/// `r` is the vector from the beamlet source to the evaluation point, `axis`
/// the beamlet direction (unit length) and `tan_half_angle` the tangent of
/// the cone half angle. The test is the algebraic form
///
/// ```text
/// r·r < (r·a)² · (1 + tan²)
/// ```
///
/// which avoids square roots and trigonometry in the hot loop. Points behind
/// the source are accepted whenever the algebra permits (the dot product
/// enters squared); kernels that require `r·a > 0` must enforce it
/// themselves.
#[inline]
pub fn inside_cone(r: &Vector3<f64>, axis: &Vector3<f64>, tan_half_angle: f64) -> bool {
    r.norm_squared() < r.dot(axis).powi(2) * (1.0 + tan_half_angle * tan_half_angle)
}

/// A rectangular field boundary on the isocenter plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Jaws {
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
}

impl Jaws {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// A square field of the given side length centered on the axis.
    pub fn square(side: f64) -> Self {
        let h = side / 2.0;
        Self::new(-h, h, -h, h)
    }

    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    /// The overlap of two fields. Commutative; if one field contains the
    /// other the result equals the smaller.
    pub fn intersection(&self, other: &Jaws) -> Jaws {
        Jaws {
            xmin: self.xmin.max(other.xmin),
            xmax: self.xmax.min(other.xmax),
            ymin: self.ymin.max(other.ymin),
            ymax: self.ymax.min(other.ymax),
        }
    }

    /// Field area, zero when the jaws are closed past each other.
    pub fn area(&self) -> f64 {
        (self.xmax - self.xmin).max(0.0) * (self.ymax - self.ymin).max(0.0)
    }
}

/// Subdivides a jaws-bounded field into a grid of divergent beamlets.
///
/// The source sits at `(0, 0, sad)` (gantry zero) and every beamlet axis
/// passes through the center of one `spacing`-sized cell on the isocenter
/// plane. Cells are emitted in row-major order, x fastest.
pub fn beamlet_grid(jaws: &Jaws, spacing: f64, sad: f64) -> Vec<Beamlet> {
    let source = Point3::new(0.0, 0.0, sad);
    let nx = ((jaws.xmax() - jaws.xmin()) / spacing).round().max(1.0) as usize;
    let ny = ((jaws.ymax() - jaws.ymin()) / spacing).round().max(1.0) as usize;
    let mut beamlets = Vec::with_capacity(nx * ny);
    for iy in 0..ny {
        let y = jaws.ymin() + (iy as f64 + 0.5) * (jaws.ymax() - jaws.ymin()) / ny as f64;
        for ix in 0..nx {
            let x = jaws.xmin() + (ix as f64 + 0.5) * (jaws.xmax() - jaws.xmin()) / nx as f64;
            let target = Point3::new(x, y, 0.0);
            beamlets.push(Beamlet::new(source, target - source, sad));
        }
    }
    beamlets
}
