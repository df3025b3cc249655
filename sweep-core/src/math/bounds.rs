use nalgebra::{Point3, Vector3};

/// 3D axis-aligned bounding box over `f64` positions
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AABB {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl AABB {
    /// Creates a degenerate AABB that contains exactly the given point
    pub fn from_point(point: &Point3<f64>) -> Self {
        Self {
            min: *point,
            max: *point,
        }
    }

    /// Returns the minimum corner of this AABB
    pub fn min(&self) -> &Point3<f64> {
        &self.min
    }

    /// Returns the maximum corner of this AABB
    pub fn max(&self) -> &Point3<f64> {
        &self.max
    }

    /// Returns the size of this AABB along each axis
    /// ```
    /// # use sweep_core::math::AABB;
    /// # use sweep_core::nalgebra::{Point3, Vector3};
    /// let bounds = AABB::from_point(&Point3::new(-1.0, 0.0, 0.0)).extended(&Point3::new(1.0, 2.0, 0.5));
    /// assert_eq!(bounds.extent(), Vector3::new(2.0, 2.0, 0.5));
    /// ```
    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Returns the center point of this AABB
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Returns the smallest AABB that contains both this AABB and `point`
    /// ```
    /// # use sweep_core::math::AABB;
    /// # use sweep_core::nalgebra::Point3;
    /// let bounds = AABB::from_point(&Point3::new(0.0, 0.0, 0.0)).extended(&Point3::new(2.0, -1.0, 3.0));
    /// assert_eq!(*bounds.min(), Point3::new(0.0, -1.0, 0.0));
    /// assert_eq!(*bounds.max(), Point3::new(2.0, 0.0, 3.0));
    /// ```
    pub fn extended(&self, point: &Point3<f64>) -> Self {
        Self {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }
}
