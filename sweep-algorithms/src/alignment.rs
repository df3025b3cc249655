//! Sequential alignment of a live stream of scans.
//!
//! A [SequentialAligner] keeps the previous scan and the accumulated global transform. The first scan only
//! initializes it. Every later scan is range filtered, downsampled and given normals, then registered against
//! the previous scan with nonlinear ICP. The pairwise transform maps the new scan into the frame of the
//! previous one and is composed into the global transform, which therefore maps the newest scan into the frame
//! of the first one.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use sweep_core::{
    containers::{CloudHeader, PointCloud},
    math::RigidTransform,
};

use crate::config::AlignmentConfig;
use crate::error::{Error, Result};
use crate::normal_estimation::NormalEstimation;
use crate::registration::{IterativeClosestPoint, RegistrationResult, StopSignal};
use crate::voxel_grid::voxelgrid_filter;

/// State of a [SequentialAligner]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentState {
    /// No scan received yet
    Uninitialized,
    /// A previous scan is available to register against
    Ready,
}

/// Everything produced by one successful registration step
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentStep {
    /// Number of this step, starting at 1 for the second scan of a session
    pub sequence: usize,
    /// Header of the scan that was registered
    pub header: CloudHeader,
    /// Transform from the new scan's frame into the previous scan's frame
    pub pairwise: RigidTransform,
    /// Transform from the new scan's frame into the first scan's frame, after this step
    pub global: RigidTransform,
    /// Previous scan (prepared) moved onto the new scan
    pub aligned: PointCloud,
    /// Range-filtered new scan mapped into the previous scan's frame
    pub current_in_previous: PointCloud,
    pub iterations: usize,
    pub converged: bool,
    pub fitness: f64,
    pub rmse: f64,
    /// Number of points of the previous scan left out of registration because normal estimation rejected them
    pub rejected_previous: usize,
    /// Number of points of the new scan rejected by normal estimation
    pub rejected_current: usize,
    /// Wall time of preparing and registering the new scan
    pub elapsed: Duration,
}

/// Result of [SequentialAligner::push]
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The scan was stored as the first scan of the session
    Initialized,
    Aligned(AlignmentStep),
    /// The step limit of the session was reached, the scan was not processed
    Ignored,
}

/// Receives the events of a [SequentialAligner]. All methods default to doing nothing
pub trait AlignmentObserver {
    fn on_initialized(&mut self, _header: &CloudHeader) {}
    fn on_step(&mut self, _step: &AlignmentStep) {}
    /// Called when a scan could not be processed. The aligner state is unchanged
    fn on_failure(&mut self, _header: &CloudHeader, _error: &Error) {}
}

/// Observer that writes the transforms of every step to the log. Failures are already logged by the aligner
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl AlignmentObserver for LoggingObserver {
    fn on_initialized(&mut self, header: &CloudHeader) {
        info!("Initialized alignment with scan '{}'", header.frame_id);
    }

    fn on_step(&mut self, step: &AlignmentStep) {
        info!(
            "Step {} ('{}'): pairwise transform\n{}global transform\n{}",
            step.sequence, step.header.frame_id, step.pairwise, step.global
        );
    }
}

/// A scan after filtering, downsampling and normal estimation
#[derive(Debug, Clone)]
struct PreparedScan {
    /// Range-filtered scan
    filtered: PointCloud,
    /// Downsampled scan with normals, used for registration
    features: PointCloud,
    /// Points dropped by normal estimation
    rejected: usize,
}

/// Drives the registration pipeline across a sequence of scans.
///
/// Scans must be delivered one at a time. A scan that fails to prepare or register is dropped: the previous
/// scan and the global transform stay as they were, and the next scan is registered against the last good one.
pub struct SequentialAligner {
    config: AlignmentConfig,
    previous: Option<PreparedScan>,
    global: RigidTransform,
    steps: usize,
    stop_signal: StopSignal,
    observers: Vec<Box<dyn AlignmentObserver + Send>>,
}

impl SequentialAligner {
    /// Creates a new aligner. Fails if `config` is invalid
    pub fn new(config: AlignmentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            previous: None,
            global: RigidTransform::identity(),
            steps: 0,
            stop_signal: StopSignal::new(),
            observers: vec![],
        })
    }

    pub fn with_observer<O: AlignmentObserver + Send + 'static>(mut self, observer: O) -> Self {
        self.add_observer(observer);
        self
    }

    pub fn add_observer<O: AlignmentObserver + Send + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    pub fn state(&self) -> AlignmentState {
        if self.previous.is_some() {
            AlignmentState::Ready
        } else {
            AlignmentState::Uninitialized
        }
    }

    /// Transform from the frame of the latest registered scan into the frame of the first scan
    pub fn global_transform(&self) -> &RigidTransform {
        &self.global
    }

    /// Number of successful registration steps
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The prepared (filtered, downsampled, with normals) scan the next scan will be registered against
    pub fn previous_cloud(&self) -> Option<&PointCloud> {
        self.previous.as_ref().map(|p| &p.features)
    }

    /// Handle to cancel a running registration from another thread. A cancelled scan is dropped like any
    /// other failure; call [StopSignal::reset] to resume
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// Returns to the uninitialized state with an identity global transform
    pub fn reset(&mut self) {
        self.previous = None;
        self.global = RigidTransform::identity();
        self.steps = 0;
    }

    /// Processes the next scan of the sequence.
    ///
    /// Fails with the error of the first stage that failed. In that case the scan is dropped and the state of
    /// the aligner is unchanged.
    pub fn push(&mut self, cloud: &PointCloud) -> Result<PushOutcome> {
        if let Some(limit) = self.config.step_limit {
            if self.steps >= limit {
                debug!(
                    "Step limit of {} reached, ignoring scan '{}'",
                    limit,
                    cloud.header().frame_id
                );
                return Ok(PushOutcome::Ignored);
            }
        }

        let started = Instant::now();
        let outcome = self.process(cloud, started);
        match &outcome {
            Ok(PushOutcome::Initialized) => {
                for observer in self.observers.iter_mut() {
                    observer.on_initialized(cloud.header());
                }
            }
            Ok(PushOutcome::Aligned(step)) => {
                for observer in self.observers.iter_mut() {
                    observer.on_step(step);
                }
            }
            Ok(PushOutcome::Ignored) => {}
            Err(why) => {
                warn!(
                    "Dropping scan '{}' after {:?}: {}",
                    cloud.header().frame_id,
                    started.elapsed(),
                    why
                );
                for observer in self.observers.iter_mut() {
                    observer.on_failure(cloud.header(), why);
                }
            }
        }
        outcome
    }

    fn process(&mut self, cloud: &PointCloud, started: Instant) -> Result<PushOutcome> {
        let current = self.prepare(cloud)?;
        let previous = match self.previous.take() {
            Some(previous) => previous,
            None => {
                self.previous = Some(current);
                return Ok(PushOutcome::Initialized);
            }
        };

        let result = match self.register(&previous, &current) {
            Ok(result) => result,
            Err(why) => {
                self.previous = Some(previous);
                return Err(why);
            }
        };
        let pairwise = result.transform;
        let global = (self.global * pairwise).renormalized();
        let current_in_previous = current.filtered.transformed(&pairwise);
        let current_rejected = current.rejected;

        self.global = global;
        self.steps += 1;
        self.previous = Some(current);

        let step = AlignmentStep {
            sequence: self.steps,
            header: cloud.header().clone(),
            pairwise,
            global,
            aligned: result.aligned_source,
            current_in_previous,
            iterations: result.iterations,
            converged: result.converged,
            fitness: result.fitness,
            rmse: result.rmse,
            rejected_previous: previous.rejected,
            rejected_current: current_rejected,
            elapsed: started.elapsed(),
        };
        info!(
            "Aligned scan '{}' in {:?} ({} iterations, fitness {:.3}, rmse {:.4})",
            step.header.frame_id, step.elapsed, step.iterations, step.fitness, step.rmse
        );
        Ok(PushOutcome::Aligned(step))
    }

    /// Registers the previous scan (source) onto the current one (target). The reported target→source
    /// transform is the pairwise current→previous transform
    fn register(&self, previous: &PreparedScan, current: &PreparedScan) -> Result<RegistrationResult> {
        IterativeClosestPoint::new(self.config.registration, &self.config.representation)
            .with_stop_signal(self.stop_signal.clone())
            .align(&previous.features, &current.features)
    }

    fn prepare(&self, cloud: &PointCloud) -> Result<PreparedScan> {
        let mounted = match &self.config.sensor_mount {
            Some(mount) => cloud.transformed(mount),
            None => cloud.clone(),
        };
        let filtered = match &self.config.range_filter {
            Some(filter) => filter.apply(&mounted)?,
            None => mounted,
        };
        let downsampled = match self.config.leaf_size {
            Some(leaf_size) => voxelgrid_filter(&filtered, leaf_size)?,
            None => filtered.clone(),
        };
        let estimate = NormalEstimation::new(self.config.k_neighbors)
            .with_viewpoint(self.config.viewpoint)
            .compute(&downsampled)?;
        if estimate.cloud.is_empty() {
            return Err(Error::invalid(format!(
                "No point of scan '{}' survived preprocessing",
                cloud.header().frame_id
            )));
        }
        debug!(
            "Prepared scan '{}': {} points, {} after filtering, {} after downsampling, {} with normals",
            cloud.header().frame_id,
            cloud.len(),
            filtered.len(),
            downsampled.len(),
            estimate.cloud.len()
        );
        Ok(PreparedScan {
            filtered,
            features: estimate.cloud,
            rejected: estimate.rejected.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::RegistrationConfig;
    use std::sync::{Arc, Mutex};
    use sweep_core::{containers::Point, nalgebra::Vector3};

    fn scene() -> PointCloud {
        let mut points = vec![];
        for i in 0..6 {
            for j in 0..5 {
                for k in 0..3 {
                    points.push(Point::new(
                        f64::from(i) * 1.5 - 4.0,
                        f64::from(j) * 1.5 - 3.0,
                        f64::from(k) * 1.5 - 0.5,
                    ));
                }
            }
        }
        points
            .into_iter()
            .collect::<PointCloud>()
            .with_header(CloudHeader::new("scene", Some(0.0)))
    }

    fn unfiltered(k_neighbors: usize) -> AlignmentConfig {
        AlignmentConfig::default()
            .with_range_filter(None)
            .with_leaf_size(None)
            .with_k_neighbors(k_neighbors)
    }

    fn scene_with_invalid_points(count: usize) -> PointCloud {
        let mut points = scene().points().to_vec();
        points.extend((0..count).map(|_| Point::new(f64::NAN, 0.0, 1.0)));
        PointCloud::new(scene().header().clone(), points)
    }

    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl AlignmentObserver for Recorder {
        fn on_initialized(&mut self, header: &CloudHeader) {
            self.events.lock().unwrap().push(format!("init {}", header.frame_id));
        }
        fn on_step(&mut self, step: &AlignmentStep) {
            self.events.lock().unwrap().push(format!("step {}", step.sequence));
        }
        fn on_failure(&mut self, header: &CloudHeader, _error: &Error) {
            self.events.lock().unwrap().push(format!("fail {}", header.frame_id));
        }
    }

    #[test]
    fn test_first_scan_initializes() {
        let mut aligner = SequentialAligner::new(AlignmentConfig::default()).unwrap();
        assert_eq!(aligner.state(), AlignmentState::Uninitialized);
        assert_eq!(aligner.push(&scene()).unwrap(), PushOutcome::Initialized);
        assert_eq!(aligner.state(), AlignmentState::Ready);
        assert_eq!(aligner.steps(), 0);
        assert!(aligner.previous_cloud().unwrap().has_surfaces());
        assert_eq!(aligner.global_transform(), &RigidTransform::identity());
    }

    #[test]
    fn test_failed_scan_keeps_state() {
        let events = Arc::new(Mutex::new(vec![]));
        let mut aligner = SequentialAligner::new(AlignmentConfig::default())
            .unwrap()
            .with_observer(Recorder {
                events: events.clone(),
            });
        aligner.push(&scene()).unwrap();
        let previous = aligner.previous_cloud().unwrap().clone();

        let far = scene()
            .transformed(&RigidTransform::from_translation(Vector3::new(50.0, 0.0, 0.0)))
            .with_header(CloudHeader::new("far", None));
        assert!(matches!(
            aligner.push(&far),
            Err(Error::RegistrationDiverged { .. })
        ));
        assert_eq!(aligner.state(), AlignmentState::Ready);
        assert_eq!(aligner.previous_cloud(), Some(&previous));
        assert_eq!(aligner.global_transform(), &RigidTransform::identity());
        assert_eq!(aligner.steps(), 0);

        assert!(matches!(aligner.push(&scene()), Ok(PushOutcome::Aligned(_))));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["init scene", "fail far", "step 1"]
        );
    }

    #[test]
    fn test_step_reports_rejected_points() {
        let mut aligner = SequentialAligner::new(unfiltered(30)).unwrap();
        aligner.push(&scene_with_invalid_points(1)).unwrap();
        assert_eq!(aligner.previous_cloud().unwrap().len(), scene().len());

        let step = match aligner.push(&scene_with_invalid_points(2)).unwrap() {
            PushOutcome::Aligned(step) => step,
            other => panic!("Expected an aligned step, got {:?}", other),
        };
        assert_eq!(step.rejected_previous, 1);
        assert_eq!(step.rejected_current, 2);
        assert!(step.converged);

        let step = match aligner.push(&scene()).unwrap() {
            PushOutcome::Aligned(step) => step,
            other => panic!("Expected an aligned step, got {:?}", other),
        };
        assert_eq!(step.rejected_previous, 2);
        assert_eq!(step.rejected_current, 0);
    }

    #[test]
    fn test_ill_conditioned_scan_is_dropped() {
        let config = unfiltered(3).with_registration(RegistrationConfig {
            max_correspondence_distance: 1.0,
            ..RegistrationConfig::default()
        });
        let mut aligner = SequentialAligner::new(config).unwrap();
        aligner.push(&scene()).unwrap();
        let previous = aligner.previous_cloud().unwrap().clone();

        // runs next to a single row of the scene, so rotation about that row is unconstrained
        let line: PointCloud = (0..16)
            .map(|i| Point::new(f64::from(i) * 0.5 - 4.0, 0.2, 1.0))
            .collect();
        assert!(matches!(
            aligner.push(&line),
            Err(Error::IllConditioned { iteration: 1, .. })
        ));
        assert_eq!(aligner.previous_cloud(), Some(&previous));
        assert_eq!(aligner.global_transform(), &RigidTransform::identity());
        assert_eq!(aligner.steps(), 0);

        assert!(matches!(aligner.push(&scene()), Ok(PushOutcome::Aligned(_))));
        assert_eq!(aligner.steps(), 1);
    }

    #[test]
    fn test_step_limit_ignores_later_scans() {
        let config = AlignmentConfig::default().with_step_limit(Some(1));
        let mut aligner = SequentialAligner::new(config).unwrap();
        aligner.push(&scene()).unwrap();
        assert!(matches!(aligner.push(&scene()), Ok(PushOutcome::Aligned(_))));
        assert_eq!(aligner.push(&scene()).unwrap(), PushOutcome::Ignored);
        assert_eq!(aligner.steps(), 1);
    }

    #[test]
    fn test_cancelled_registration_is_dropped() {
        let mut aligner = SequentialAligner::new(AlignmentConfig::default()).unwrap();
        aligner.push(&scene()).unwrap();
        let stop = aligner.stop_signal();
        stop.stop();
        assert_eq!(
            aligner.push(&scene()),
            Err(Error::Cancelled { iterations: 0 })
        );
        stop.reset();
        assert!(matches!(aligner.push(&scene()), Ok(PushOutcome::Aligned(_))));
    }

    #[test]
    fn test_reset() {
        let mut aligner = SequentialAligner::new(AlignmentConfig::default()).unwrap();
        aligner.push(&scene()).unwrap();
        aligner.push(&scene()).unwrap();
        aligner.reset();
        assert_eq!(aligner.state(), AlignmentState::Uninitialized);
        assert_eq!(aligner.steps(), 0);
        assert_eq!(aligner.push(&scene()).unwrap(), PushOutcome::Initialized);
    }

    #[test]
    fn test_sensor_mount_is_applied_first() {
        // lifting the scan by 10 pushes it out of the default height band
        let mount = RigidTransform::from_translation(Vector3::new(0.0, 0.0, 10.0));
        let config = AlignmentConfig::default().with_sensor_mount(Some(mount));
        let mut aligner = SequentialAligner::new(config).unwrap();
        assert!(matches!(
            aligner.push(&scene()),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(aligner.state(), AlignmentState::Uninitialized);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AlignmentConfig::default().with_k_neighbors(1);
        assert!(matches!(
            SequentialAligner::new(config),
            Err(Error::InvalidParameter(_))
        ));
    }
}
