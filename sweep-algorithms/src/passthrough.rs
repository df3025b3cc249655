use sweep_core::containers::{Point, PointCloud};

use crate::error::{Error, Result};

/// A coordinate axis of a point position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Coordinate of `point` along this axis
    pub fn value(self, point: &Point) -> f64 {
        point.position[self.index()]
    }
}

impl std::str::FromStr for Axis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" | "X" => Ok(Axis::X),
            "y" | "Y" => Ok(Axis::Y),
            "z" | "Z" => Ok(Axis::Z),
            other => Err(Error::invalid(format!("Unknown axis '{}'", other))),
        }
    }
}

/// Pass-through filter that keeps the points whose coordinate along `axis` lies in `[min, max]`. With
/// `negative` set, the points inside the range are removed instead
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeFilter {
    pub axis: Axis,
    pub min: f64,
    pub max: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub negative: bool,
}

impl RangeFilter {
    pub fn new(axis: Axis, min: f64, max: f64) -> Self {
        Self {
            axis,
            min,
            max,
            negative: false,
        }
    }

    pub fn negative(mut self, negative: bool) -> Self {
        self.negative = negative;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(Error::invalid(format!(
                "Range filter limits must be finite, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(Error::InvalidRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Applies this filter to `cloud`, producing a new cloud. The input is left untouched
    pub fn apply(&self, cloud: &PointCloud) -> Result<PointCloud> {
        self.validate()?;
        let (axis, min, max) = (self.axis, self.min, self.max);
        let filtered = if self.negative {
            // NaN coordinates are neither inside nor outside, they never pass
            cloud.filtered(|p| {
                let v = axis.value(p);
                v < min || v > max
            })
        } else {
            cloud.filtered(|p| {
                let v = axis.value(p);
                min <= v && v <= max
            })
        };
        log::trace!(
            "Range filter {:?} [{}, {}] kept {} of {} points",
            axis,
            min,
            max,
            filtered.len(),
            cloud.len()
        );
        Ok(filtered)
    }
}

/// Removes every point of `cloud` whose `axis` coordinate lies outside `[min, max]`.
///
/// Fails with [Error::InvalidRange] if `min > max`.
/// ```
/// # use sweep_algorithms::passthrough::{filter_range, Axis};
/// # use sweep_core::containers::{Point, PointCloud};
/// let cloud: PointCloud = (0..10).map(|i| Point::new(0.0, 0.0, i as f64)).collect();
/// let filtered = filter_range(&cloud, Axis::Z, 2.0, 4.0).unwrap();
/// assert_eq!(filtered.len(), 3);
/// assert!(filter_range(&cloud, Axis::Z, 4.0, 2.0).is_err());
/// ```
pub fn filter_range(cloud: &PointCloud, axis: Axis, min: f64, max: f64) -> Result<PointCloud> {
    RangeFilter::new(axis, min, max).apply(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column() -> PointCloud {
        (-10..=10)
            .map(|i| Point::new(i as f64 * 0.5, 1.0, i as f64 * 0.3))
            .collect()
    }

    #[test]
    fn test_filter_range_partitions_points() {
        let cloud = column();
        let kept = filter_range(&cloud, Axis::Z, -0.8, 3.0).unwrap();
        for p in &kept {
            assert!(p.position.z >= -0.8 && p.position.z <= 3.0);
        }
        let removed = RangeFilter::new(Axis::Z, -0.8, 3.0)
            .negative(true)
            .apply(&cloud)
            .unwrap();
        for p in &removed {
            assert!(p.position.z < -0.8 || p.position.z > 3.0);
        }
        assert_eq!(kept.len() + removed.len(), cloud.len());
    }

    #[test]
    fn test_filter_range_keeps_bounds() {
        let cloud = column();
        let kept = filter_range(&cloud, Axis::X, -1.0, 1.0).unwrap();
        assert_eq!(kept.len(), 5);
        assert_eq!(kept.points()[0].position.x, -1.0);
        assert_eq!(kept.points()[4].position.x, 1.0);
    }

    #[test]
    fn test_filter_range_drops_nan() {
        let cloud: PointCloud = vec![Point::new(0.0, 0.0, f64::NAN), Point::new(0.0, 0.0, 1.0)]
            .into_iter()
            .collect();
        assert_eq!(filter_range(&cloud, Axis::Z, -5.0, 5.0).unwrap().len(), 1);
        let outside = RangeFilter::new(Axis::Z, -5.0, 5.0).negative(true);
        assert_eq!(outside.apply(&cloud).unwrap().len(), 0);
    }

    #[test]
    fn test_filter_range_invalid() {
        let cloud = column();
        assert_eq!(
            filter_range(&cloud, Axis::Y, 2.0, 1.0),
            Err(Error::InvalidRange { min: 2.0, max: 1.0 })
        );
        assert!(matches!(
            filter_range(&cloud, Axis::Y, f64::NAN, 1.0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_axis_from_str() {
        assert_eq!("z".parse::<Axis>().unwrap(), Axis::Z);
        assert!("w".parse::<Axis>().is_err());
    }
}
