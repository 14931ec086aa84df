use nalgebra::{Point3, Vector3};

/// An axis aligned bounding box in the world frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    /// Creates a box from its extreme corners.
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all given points, or `None` for an empty input.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Self::new(first, first);
        for p in iter {
            aabb.grow(&p);
        }
        Some(aabb)
    }

    pub fn min(&self) -> &Point3<f64> {
        &self.min
    }

    pub fn max(&self) -> &Point3<f64> {
        &self.max
    }

    /// Expands the box to enclose `p`.
    pub fn grow(&mut self, p: &Point3<f64>) {
        for k in 0..3 {
            self.min[k] = self.min[k].min(p[k]);
            self.max[k] = self.max[k].max(p[k]);
        }
    }

    /// Smallest box enclosing `self` and `other`.
    pub fn merged(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.grow(&other.min);
        out.grow(&other.max);
        out
    }

    /// Whether `p` lies inside the box (boundary included).
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|k| self.min[k] <= p[k] && p[k] <= self.max[k])
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Index of the axis with the largest extent.
    pub fn longest_axis(&self) -> usize {
        let d = self.max - self.min;
        let mut axis = 0;
        for k in 1..3 {
            if d[k] > d[axis] {
                axis = k;
            }
        }
        axis
    }

    /// Intersects a ray with the box using the slab method.
    ///
    /// Returns the parameter interval `(t_enter, t_exit)` clipped to
    /// `[0, t_max]`, or `None` when the ray misses the box. A zero direction
    /// component on an axis whose slab does not contain the origin yields a
    /// miss, as expected.
    pub fn ray_interval(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        t_max: f64,
    ) -> Option<(f64, f64)> {
        let mut t0 = 0.0f64;
        let mut t1 = t_max;
        for k in 0..3 {
            let inv = 1.0 / direction[k];
            let ta = (self.min[k] - origin[k]) * inv;
            let tb = (self.max[k] - origin[k]) * inv;
            // f64::min/max discard a NaN operand, which keeps boxes touching
            // the origin on a zero-direction axis well behaved.
            t0 = t0.max(ta.min(tb));
            t1 = t1.min(ta.max(tb));
        }
        (t0 <= t1).then_some((t0, t1))
    }
}
