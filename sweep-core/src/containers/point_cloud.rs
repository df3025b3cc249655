use std::iter::FromIterator;

use nalgebra::Vector3;

use super::Point;
use crate::math::RigidTransform;

/// Capture metadata of a point cloud
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CloudHeader {
    /// Capture time in seconds, if the source provides one
    pub stamp: Option<f64>,
    /// Name of the coordinate frame the positions are expressed in
    pub frame_id: String,
}

impl CloudHeader {
    pub fn new<S: Into<String>>(frame_id: S, stamp: Option<f64>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// An ordered, owned sequence of points together with a [CloudHeader].
///
/// Point order carries no meaning for alignment but is preserved by every operation so that results are
/// deterministic.
/// ```
/// # use sweep_core::containers::{Point, PointCloud};
/// let cloud: PointCloud = vec![Point::new(0.0, 0.0, 0.0), Point::new(0.0, 0.0, 2.0)]
///     .into_iter()
///     .collect();
/// let high = cloud.filtered(|p| p.position.z > 1.0);
/// assert_eq!(high.len(), 1);
/// assert_eq!(cloud.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointCloud {
    header: CloudHeader,
    points: Vec<Point>,
}

impl PointCloud {
    pub fn new(header: CloudHeader, points: Vec<Point>) -> Self {
        Self { header, points }
    }

    /// Creates a cloud with an empty header from bare positions
    pub fn from_positions<I: IntoIterator<Item = Vector3<f64>>>(positions: I) -> Self {
        positions.into_iter().map(Point::from_position).collect()
    }

    pub fn header(&self) -> &CloudHeader {
        &self.header
    }

    pub fn with_header(mut self, header: CloudHeader) -> Self {
        self.header = header;
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// True if every point carries surface attributes
    pub fn has_surfaces(&self) -> bool {
        self.points.iter().all(|p| p.surface().is_some())
    }

    /// Returns a new cloud with the same header that only contains the points matching `predicate`
    pub fn filtered<F: FnMut(&Point) -> bool>(&self, mut predicate: F) -> PointCloud {
        PointCloud {
            header: self.header.clone(),
            points: self.points.iter().filter(|p| predicate(p)).copied().collect(),
        }
    }

    /// Returns a new cloud with the same header whose points are produced by `f`
    pub fn mapped<F: FnMut(&Point) -> Point>(&self, f: F) -> PointCloud {
        PointCloud {
            header: self.header.clone(),
            points: self.points.iter().map(f).collect(),
        }
    }

    /// Returns a copy of this cloud with `transform` applied to every position. Normals are rotated, all
    /// other attributes and the point order are kept
    pub fn transformed(&self, transform: &RigidTransform) -> PointCloud {
        let rotation = transform.rotation();
        let translation = transform.translation();
        self.mapped(|p| {
            let mut moved = *p;
            moved.position = rotation * p.position + translation;
            match p.surface() {
                Some(surface) => moved.with_surface(rotation * surface.normal, surface.curvature),
                None => moved,
            }
        })
    }
}

impl FromIterator<Point> for PointCloud {
    fn from_iter<T: IntoIterator<Item = Point>>(iter: T) -> Self {
        Self {
            header: CloudHeader::default(),
            points: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
