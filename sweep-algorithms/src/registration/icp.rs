use log::{debug, warn};
use sweep_core::{containers::PointCloud, math::RigidTransform};

use super::correspondence::{Correspondence, TargetIndex};
use super::estimation::IncrementEstimator;
use super::{ErrorMetric, RegistrationConfig, RegistrationResult, StopSignal};
use crate::error::{Error, Result};
use crate::point_representation::PointRepresentation;

/// Nonlinear iterative closest point.
///
/// Every iteration matches each point of the moved source to its nearest target point in the feature space
/// of `representation`, then fits a rigid increment to these correspondences with Levenberg-Marquardt and
/// composes it into the running source→target estimate. Iteration stops once the increment is smaller than
/// [RegistrationConfig::transformation_epsilon].
///
/// The transform returned by [IterativeClosestPoint::align] maps the target frame into the source frame.
pub struct IterativeClosestPoint<'a, R: PointRepresentation> {
    config: RegistrationConfig,
    representation: &'a R,
    stop_signal: Option<StopSignal>,
}

impl<'a, R: PointRepresentation> IterativeClosestPoint<'a, R> {
    pub fn new(config: RegistrationConfig, representation: &'a R) -> Self {
        Self {
            config,
            representation,
            stop_signal: None,
        }
    }

    /// Registration fails with [Error::Cancelled] once `stop_signal` is raised
    pub fn with_stop_signal(mut self, stop_signal: StopSignal) -> Self {
        self.stop_signal = Some(stop_signal);
        self
    }

    /// Registers `source` onto `target`
    pub fn align(&self, source: &PointCloud, target: &PointCloud) -> Result<RegistrationResult> {
        self.config.validate()?;
        if source.is_empty() || target.is_empty() {
            return Err(Error::invalid(format!(
                "Cannot register clouds with {} source and {} target points",
                source.len(),
                target.len()
            )));
        }
        if self.config.metric == ErrorMetric::PointToPlane && !target.has_surfaces() {
            return Err(Error::invalid(
                "Point-to-plane registration needs normals on every target point",
            ));
        }

        let index = TargetIndex::new(target, self.representation);
        let estimator = IncrementEstimator::new(self.config.metric, self.config.max_inner_iterations);
        let max_distance = self.config.max_correspondence_distance;

        let mut forward = RigidTransform::identity();
        let mut moved = source.clone();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            if self.is_stopped() {
                return Err(Error::Cancelled { iterations });
            }
            iterations += 1;

            let correspondences = index.find_correspondences(&moved, self.representation, max_distance);
            if correspondences.is_empty() {
                return Err(Error::RegistrationDiverged {
                    iteration: iterations,
                    max_correspondence_distance: max_distance,
                });
            }

            let increment = estimator.estimate(&correspondences, iterations)?;
            forward = (increment * forward).renormalized();
            moved = source.transformed(&forward);

            let magnitude = increment.magnitude();
            debug!(
                "ICP iteration {}: {} correspondences, increment {:e}",
                iterations,
                correspondences.len(),
                magnitude
            );
            if magnitude < self.config.transformation_epsilon {
                converged = true;
                break;
            }
        }

        let correspondences = index.find_correspondences(&moved, self.representation, max_distance);
        let rmse = root_mean_square(&correspondences);
        let fitness = correspondences.len() as f64 / source.len() as f64;

        if !converged {
            warn!(
                "ICP did not converge within {} iterations (fitness {:.3}, rmse {:.4})",
                iterations, fitness, rmse
            );
        }

        Ok(RegistrationResult {
            transform: forward.inverse(),
            aligned_source: moved,
            iterations,
            converged,
            correspondences: correspondences.len(),
            fitness,
            rmse,
        })
    }

    fn is_stopped(&self) -> bool {
        self.stop_signal
            .as_ref()
            .map_or(false, StopSignal::is_stopped)
    }
}

fn root_mean_square(correspondences: &[Correspondence]) -> f64 {
    if correspondences.is_empty() {
        return 0.0;
    }
    let sum: f64 = correspondences.iter().map(Correspondence::distance_squared).sum();
    (sum / correspondences.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_representation::CurvatureWeighted;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use sweep_core::{containers::Point, nalgebra::Vector3};

    fn jittered_lattice(seed: u64) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = vec![];
        for i in 0..5 {
            for j in 0..4 {
                for k in 0..3 {
                    let jitter = Vector3::new(
                        rng.gen_range(-0.2..0.2),
                        rng.gen_range(-0.2..0.2),
                        rng.gen_range(-0.2..0.2),
                    );
                    let position = Vector3::new(f64::from(i) - 2.0, f64::from(j) - 1.5, f64::from(k) - 1.0);
                    points.push(Point::from_position(position + jitter));
                }
            }
        }
        points.into_iter().collect()
    }

    fn small_motion() -> RigidTransform {
        RigidTransform::from_translation(Vector3::new(0.03, -0.02, 0.04))
            * RigidTransform::from_euler_angles(0.01, -0.005, 0.015)
    }

    #[test]
    fn test_recovers_small_motion() {
        let source = jittered_lattice(7);
        let motion = small_motion();
        let target = source.transformed(&motion);
        let representation = CurvatureWeighted::default();

        let result = IterativeClosestPoint::new(RegistrationConfig::default(), &representation)
            .align(&source, &target)
            .unwrap();
        assert!(result.converged);
        assert!(result.forward().approx_eq(&motion, 1e-6));
        assert!(result.transform.approx_eq(&motion.inverse(), 1e-6));
        assert_eq!(result.correspondences, source.len());
        assert!(result.rmse < 1e-6);
        assert!((result.fitness - 1.0).abs() < 1e-12);
        assert_eq!(result.aligned_source.len(), source.len());
    }

    #[test]
    fn test_far_clouds_diverge() {
        let source = jittered_lattice(3);
        let target = source.transformed(&RigidTransform::from_translation(Vector3::new(40.0, 0.0, 0.0)));
        let representation = CurvatureWeighted::default();
        let result = IterativeClosestPoint::new(RegistrationConfig::default(), &representation)
            .align(&source, &target);
        assert!(matches!(
            result,
            Err(Error::RegistrationDiverged { iteration: 1, .. })
        ));
    }

    #[test]
    fn test_iteration_limit_reports_not_converged() {
        let source = jittered_lattice(11);
        let target = source.transformed(&small_motion());
        let representation = CurvatureWeighted::default();
        let config = RegistrationConfig {
            max_iterations: 1,
            ..RegistrationConfig::default()
        };
        let result = IterativeClosestPoint::new(config, &representation)
            .align(&source, &target)
            .unwrap();
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
    }

    #[test]
    fn test_stop_signal_cancels() {
        let source = jittered_lattice(5);
        let target = source.transformed(&small_motion());
        let representation = CurvatureWeighted::default();
        let stop = StopSignal::new();
        stop.stop();
        let result = IterativeClosestPoint::new(RegistrationConfig::default(), &representation)
            .with_stop_signal(stop.clone())
            .align(&source, &target);
        assert_eq!(result, Err(Error::Cancelled { iterations: 0 }));

        stop.reset();
        assert!(IterativeClosestPoint::new(RegistrationConfig::default(), &representation)
            .with_stop_signal(stop)
            .align(&source, &target)
            .is_ok());
    }

    #[test]
    fn test_point_to_plane_needs_target_normals() {
        let source = jittered_lattice(1);
        let representation = CurvatureWeighted::default();
        let config = RegistrationConfig {
            metric: ErrorMetric::PointToPlane,
            ..RegistrationConfig::default()
        };
        assert!(matches!(
            IterativeClosestPoint::new(config, &representation).align(&source, &source),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_collinear_source_is_ill_conditioned() {
        let line = PointCloud::from_positions((0..20).map(|i| Vector3::new(f64::from(i) * 0.5, 0.0, 0.0)));
        let target = line.transformed(&RigidTransform::from_translation(Vector3::new(0.0, 0.1, 0.0)));
        let representation = CurvatureWeighted::default();
        let result = IterativeClosestPoint::new(RegistrationConfig::default(), &representation)
            .align(&line, &target);
        assert!(matches!(result, Err(Error::IllConditioned { .. })));
    }

    #[test]
    fn test_invalid_config_and_empty_clouds() {
        let source = jittered_lattice(2);
        let representation = CurvatureWeighted::default();
        let config = RegistrationConfig {
            max_correspondence_distance: 0.0,
            ..RegistrationConfig::default()
        };
        assert!(matches!(
            IterativeClosestPoint::new(config, &representation).align(&source, &source),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            IterativeClosestPoint::new(RegistrationConfig::default(), &representation)
                .align(&source, &PointCloud::default()),
            Err(Error::InvalidParameter(_))
        ));
    }
}
