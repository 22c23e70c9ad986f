use nalgebra::{Point2, Point3};

/// An axis-aligned volume given by a minimum and maximum position per axis, in double
/// precision. Used as the predicate volume for spatial crops.
///
/// A `Bounds` is either a regular volume with min <= max per axis, or the special
/// [empty](Bounds::empty) volume that rejects every point. 2D volumes are expressed
/// as 3D volumes that are unbounded along z, see [from_min_max_2d](Bounds::from_min_max_2d).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Bounds {
    /// Creates a new Bounds from the given minimum and maximum positions. Panics if the
    /// minimum position is not less than or equal to the maximum position
    /// ```
    /// # use pointpipe_core::math::Bounds;
    /// let bounds = Bounds::from_min_max(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(1.0, 1.0, 1.0));
    /// ```
    pub fn from_min_max(min: Point3<f64>, max: Point3<f64>) -> Self {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            panic!("Bounds::from_min_max: Minimum position must be <= maximum position!");
        }
        Self { min, max }
    }

    /// Creates a new Bounds from the given minimum and maximum positions without checking
    /// that min <= max. Decoders use this for extents read from untrusted files
    pub fn from_min_max_unchecked(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Creates a 2D Bounds that is unbounded along the z axis. Panics if the minimum
    /// position is not less than or equal to the maximum position
    pub fn from_min_max_2d(min: Point2<f64>, max: Point2<f64>) -> Self {
        if min.x > max.x || min.y > max.y {
            panic!("Bounds::from_min_max_2d: Minimum position must be <= maximum position!");
        }
        Self {
            min: Point3::new(min.x, min.y, f64::NEG_INFINITY),
            max: Point3::new(max.x, max.y, f64::INFINITY),
        }
    }

    /// Returns the empty Bounds, a valid volume that contains no point at all
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Returns true if this Bounds contains no point at all
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Returns the minimum position of this Bounds
    pub fn min(&self) -> &Point3<f64> {
        &self.min
    }

    /// Returns the maximum position of this Bounds
    pub fn max(&self) -> &Point3<f64> {
        &self.max
    }

    /// Returns true if the given point is contained within this Bounds. Points right on
    /// the boundary (e.g. point.x == self.max.x) count as contained
    /// ```
    /// # use pointpipe_core::math::Bounds;
    /// let bounds = Bounds::from_min_max(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(1.0, 1.0, 1.0));
    /// assert!(bounds.contains(&nalgebra::Point3::new(0.5, 0.5, 1.0)));
    /// ```
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Like [contains](Bounds::contains), but ignores the z axis. Used when the point
    /// data carries no z dimension
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }
}
