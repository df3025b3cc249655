//! Pairwise registration of two point clouds with nonlinear ICP.
//!
//! # Transform direction
//!
//! The optimizer estimates the transform that moves the *source* onto the *target*. The one reported in
//! [RegistrationResult::transform] is its inverse: it maps coordinates of the *target* frame back into the
//! *source* frame. Use [RegistrationResult::forward] for the source→target direction.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use sweep_core::{containers::PointCloud, math::RigidTransform};

use crate::error::{Error, Result};
use crate::point_representation::PointRepresentation;

mod correspondence;
mod estimation;
mod icp;

pub use self::icp::IterativeClosestPoint;

/// Residual that is minimized for each correspondence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorMetric {
    /// Euclidean distance between source and target point
    PointToPoint,
    /// Distance of the source point to the tangent plane of the target point. Needs target normals
    PointToPlane,
}

impl Default for ErrorMetric {
    fn default() -> Self {
        ErrorMetric::PointToPoint
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegistrationConfig {
    /// Upper bound on ICP iterations
    pub max_iterations: usize,
    /// ICP has converged once the incremental transform of an iteration is smaller than this
    /// (rotation angle plus translation norm)
    pub transformation_epsilon: f64,
    /// Correspondences whose positions are farther apart than this are discarded
    pub max_correspondence_distance: f64,
    pub metric: ErrorMetric,
    /// Levenberg-Marquardt iterations per ICP iteration
    pub max_inner_iterations: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            transformation_epsilon: 1e-8,
            max_correspondence_distance: 5.0,
            metric: ErrorMetric::PointToPoint,
            max_inner_iterations: 30,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::invalid("max_iterations must be at least 1"));
        }
        if self.max_inner_iterations == 0 {
            return Err(Error::invalid("max_inner_iterations must be at least 1"));
        }
        if !(self.transformation_epsilon.is_finite() && self.transformation_epsilon >= 0.0) {
            return Err(Error::invalid(format!(
                "transformation_epsilon must be finite and non-negative, got {}",
                self.transformation_epsilon
            )));
        }
        if !(self.max_correspondence_distance.is_finite() && self.max_correspondence_distance > 0.0) {
            return Err(Error::invalid(format!(
                "max_correspondence_distance must be positive, got {}",
                self.max_correspondence_distance
            )));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a caller and running registrations. It is checked between
/// ICP iterations, never in the middle of one
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a pairwise registration
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// Transform from the target frame into the source frame
    pub transform: RigidTransform,
    /// Source cloud moved onto the target: same points and order, positions transformed by [Self::forward]
    pub aligned_source: PointCloud,
    /// ICP iterations that were run
    pub iterations: usize,
    /// False if `max_iterations` was reached before the increment dropped below the epsilon
    pub converged: bool,
    /// Correspondences between the aligned source and the target
    pub correspondences: usize,
    /// Fraction of source points that found a correspondence after alignment
    pub fitness: f64,
    /// RMS distance of the final correspondences
    pub rmse: f64,
}

impl RegistrationResult {
    /// Transform from the source frame into the target frame
    pub fn forward(&self) -> RigidTransform {
        self.transform.inverse()
    }
}

/// Registers `source` onto `target` with nonlinear ICP using point-to-point residuals.
///
/// Returns the transform that maps the *target* back into the *source* frame, together with the source cloud
/// aligned onto the target. See [IterativeClosestPoint] for the full set of options.
///
/// # Examples
///
/// ```
/// # use sweep_algorithms::{point_representation::CurvatureWeighted, registration::register};
/// # use sweep_core::{containers::PointCloud, nalgebra::Vector3};
/// let corners: Vec<Vector3<f64>> = (0..8)
///     .map(|i| Vector3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64))
///     .collect();
/// let source = PointCloud::from_positions(corners.iter().copied());
/// let target = PointCloud::from_positions(corners.iter().map(|c| c + Vector3::new(1.0, 0.0, 0.0)));
///
/// let result = register(&source, &target, &CurvatureWeighted::default(), 100, 1e-8, 5.0).unwrap();
/// assert!((result.transform.translation() - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-3);
/// ```
pub fn register<R: PointRepresentation>(
    source: &PointCloud,
    target: &PointCloud,
    representation: &R,
    max_iterations: usize,
    eps: f64,
    max_correspondence_distance: f64,
) -> Result<RegistrationResult> {
    let config = RegistrationConfig {
        max_iterations,
        transformation_epsilon: eps,
        max_correspondence_distance,
        ..RegistrationConfig::default()
    };
    IterativeClosestPoint::new(config, representation).align(source, target)
}
