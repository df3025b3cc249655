use sweep_core::containers::Point;

use crate::error::{Error, Result};

/// Number of dimensions of the correspondence feature space: `(x, y, z, curvature)`
pub const FEATURE_DIMENSIONS: usize = 4;

/// Maps a point to the feature vector that the registration uses to search for correspondences.
///
/// Features only bias which target point is picked as the nearest correspondence. The residuals of the
/// least-squares fit are always computed from the true positions.
pub trait PointRepresentation: Sync {
    fn features(&self, point: &Point) -> [f64; FEATURE_DIMENSIONS];
}

/// `(x, y, z, curvature)` scaled per dimension by a weight vector. A zero weight removes its dimension
/// from the correspondence search. Points without surface attributes contribute a curvature of zero.
/// ```
/// # use sweep_algorithms::point_representation::{CurvatureWeighted, PointRepresentation};
/// # use sweep_core::{containers::Point, nalgebra::Vector3};
/// let representation = CurvatureWeighted::new([1.0, 1.0, 1.0, 10.0]).unwrap();
/// let point = Point::new(1.0, 2.0, 3.0).with_surface(Vector3::z(), 0.1);
/// assert_eq!(representation.features(&point), [1.0, 2.0, 3.0, 1.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CurvatureWeighted {
    weights: [f64; FEATURE_DIMENSIONS],
}

impl CurvatureWeighted {
    /// Fails with [Error::InvalidParameter] if a weight is negative or not finite
    pub fn new(weights: [f64; FEATURE_DIMENSIONS]) -> Result<Self> {
        let representation = Self { weights };
        representation.validate()?;
        Ok(representation)
    }

    /// Matching on position alone, ignoring curvature
    pub fn position_only() -> Self {
        Self {
            weights: [1.0, 1.0, 1.0, 0.0],
        }
    }

    pub fn weights(&self) -> &[f64; FEATURE_DIMENSIONS] {
        &self.weights
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
            return Err(Error::invalid(format!(
                "Feature weights must be finite and non-negative, got {}",
                bad
            )));
        }
        if self.weights.iter().all(|w| *w == 0.0) {
            return Err(Error::invalid("At least one feature weight must be non-zero"));
        }
        Ok(())
    }
}

impl Default for CurvatureWeighted {
    fn default() -> Self {
        Self {
            weights: [1.0; FEATURE_DIMENSIONS],
        }
    }
}

impl PointRepresentation for CurvatureWeighted {
    fn features(&self, point: &Point) -> [f64; FEATURE_DIMENSIONS] {
        let curvature = point.curvature().unwrap_or(0.0);
        [
            point.position.x * self.weights[0],
            point.position.y * self.weights[1],
            point.position.z * self.weights[2],
            curvature * self.weights[3],
        ]
    }
}

/// Squared distance between two feature vectors
pub(crate) fn feature_distance_squared(
    a: &[f64; FEATURE_DIMENSIONS],
    b: &[f64; FEATURE_DIMENSIONS],
) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
