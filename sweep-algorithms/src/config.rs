use sweep_core::{math::RigidTransform, nalgebra::Vector3};

use crate::error::{Error, Result};
use crate::normal_estimation::MIN_NEIGHBORS;
use crate::passthrough::{Axis, RangeFilter};
use crate::point_representation::CurvatureWeighted;
use crate::registration::RegistrationConfig;

/// Settings of a [SequentialAligner](crate::alignment::SequentialAligner) session.
///
/// The defaults reproduce the Velodyne alignment setup this pipeline was tuned on: a height band of
/// `z ∈ [-0.8, 3.0]`, voxels of 1.2 and normals from 30 neighbours.
///
/// With the `serde` feature the configuration can be read from JSON, missing fields take their default:
/// ```
/// # #[cfg(feature = "serde")] {
/// # use sweep_algorithms::config::AlignmentConfig;
/// let config: AlignmentConfig = serde_json::from_str(r#"{ "leaf_size": 0.5, "step_limit": 1 }"#).unwrap();
/// assert_eq!(config.leaf_size, Some(0.5));
/// assert_eq!(config.k_neighbors, 30);
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AlignmentConfig {
    /// Range filter applied to every cloud before downsampling. `None` keeps all points
    pub range_filter: Option<RangeFilter>,
    /// Voxel edge for downsampling. `None` disables downsampling
    pub leaf_size: Option<f64>,
    /// Neighbourhood size for normal estimation
    pub k_neighbors: usize,
    /// Normals are oriented towards this position, in the (mounted) frame of each cloud
    pub viewpoint: Vector3<f64>,
    pub representation: CurvatureWeighted,
    pub registration: RegistrationConfig,
    /// Static pose of the sensor on its platform. Applied to each incoming cloud before anything else
    pub sensor_mount: Option<RigidTransform>,
    /// Stop registering after this many steps. Later clouds are ignored
    pub step_limit: Option<usize>,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            range_filter: Some(RangeFilter::new(Axis::Z, -0.8, 3.0)),
            leaf_size: Some(1.2),
            k_neighbors: 30,
            viewpoint: Vector3::zeros(),
            representation: CurvatureWeighted::default(),
            registration: RegistrationConfig::default(),
            sensor_mount: None,
            step_limit: None,
        }
    }
}

impl AlignmentConfig {
    pub fn with_range_filter(mut self, range_filter: Option<RangeFilter>) -> Self {
        self.range_filter = range_filter;
        self
    }

    pub fn with_leaf_size(mut self, leaf_size: Option<f64>) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    pub fn with_k_neighbors(mut self, k_neighbors: usize) -> Self {
        self.k_neighbors = k_neighbors;
        self
    }

    pub fn with_representation(mut self, representation: CurvatureWeighted) -> Self {
        self.representation = representation;
        self
    }

    pub fn with_registration(mut self, registration: RegistrationConfig) -> Self {
        self.registration = registration;
        self
    }

    pub fn with_sensor_mount(mut self, sensor_mount: Option<RigidTransform>) -> Self {
        self.sensor_mount = sensor_mount;
        self
    }

    pub fn with_step_limit(mut self, step_limit: Option<usize>) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Checks all settings. Fails with [Error::InvalidParameter] or [Error::InvalidRange]
    pub fn validate(&self) -> Result<()> {
        if let Some(filter) = &self.range_filter {
            filter.validate()?;
        }
        if let Some(leaf_size) = self.leaf_size {
            if !(leaf_size.is_finite() && leaf_size > 0.0) {
                return Err(Error::invalid(format!(
                    "Voxel leaf size must be a positive number, got {}",
                    leaf_size
                )));
            }
        }
        if self.k_neighbors < MIN_NEIGHBORS {
            return Err(Error::invalid(format!(
                "k_neighbors must be at least {}, got {}",
                MIN_NEIGHBORS, self.k_neighbors
            )));
        }
        if !self.viewpoint.iter().all(|v| v.is_finite()) {
            return Err(Error::invalid("The viewpoint must be finite"));
        }
        self.representation.validate()?;
        self.registration.validate()?;
        if self.step_limit == Some(0) {
            return Err(Error::invalid("step_limit must be at least 1"));
        }
        Ok(())
    }
}
