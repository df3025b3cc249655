use sweep_core::{
    math::RigidTransform,
    nalgebra::{Matrix3, Matrix3x6, Matrix6, Rotation3, RowVector6, Vector3, Vector6},
};

use super::correspondence::Correspondence;
use super::ErrorMetric;
use crate::error::{Error, Result};

/// Smallest accepted ratio between the smallest and largest eigenvalue of the normal matrix
pub(crate) const CONDITION_THRESHOLD: f64 = 1e-12;

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_STEP: f64 = 1e-12;

/// Rigid motion `p -> R (p - c) + c + t` that rotates about a fixed pivot `c`, the centroid of the
/// correspondences
#[derive(Debug, Clone, Copy)]
struct PivotMotion {
    pivot: Vector3<f64>,
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

impl PivotMotion {
    fn identity(pivot: Vector3<f64>) -> Self {
        Self {
            pivot,
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Position of `p` relative to the pivot after rotation
    fn lever(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * (p - self.pivot)
    }

    fn apply(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.lever(p) + self.pivot + self.translation
    }

    /// Left-perturbs the rotation by the axis-angle part of `step` and adds its translation part
    fn stepped(&self, step: &Vector6<f64>) -> Self {
        let omega = Vector3::new(step[0], step[1], step[2]);
        let delta = Vector3::new(step[3], step[4], step[5]);
        Self {
            pivot: self.pivot,
            rotation: Rotation3::new(omega) * self.rotation,
            translation: self.translation + delta,
        }
    }

    fn to_transform(self) -> RigidTransform {
        let translation = self.pivot + self.translation - self.rotation * self.pivot;
        RigidTransform::from_rotation_translation(&self.rotation, &translation)
    }
}

/// Normal equations of one linearization
struct NormalEquations {
    hessian: Matrix6<f64>,
    gradient: Vector6<f64>,
}

/// Nonlinear least-squares fit of a rigid increment to a set of correspondences
pub(crate) struct IncrementEstimator {
    metric: ErrorMetric,
    max_inner_iterations: usize,
}

impl IncrementEstimator {
    pub fn new(metric: ErrorMetric, max_inner_iterations: usize) -> Self {
        Self {
            metric,
            max_inner_iterations,
        }
    }

    /// Estimates the rigid transform that moves the source points of `correspondences` onto their targets,
    /// using Levenberg-Marquardt. `iteration` is only used for error reporting.
    ///
    /// Fails with [Error::IllConditioned] if the geometry of the correspondences leaves some degree of freedom
    /// unconstrained.
    pub fn estimate(
        &self,
        correspondences: &[Correspondence],
        iteration: usize,
    ) -> Result<RigidTransform> {
        let pivot = correspondences
            .iter()
            .fold(Vector3::zeros(), |acc: Vector3<f64>, c| acc + c.source)
            / correspondences.len().max(1) as f64;

        let mut motion = PivotMotion::identity(pivot);
        let mut cost = self.cost(correspondences, &motion);
        let mut damping = INITIAL_DAMPING;

        for inner in 0..self.max_inner_iterations {
            if cost == 0.0 {
                break;
            }
            let equations = self.linearize(correspondences, &motion);
            if inner == 0 {
                check_conditioning(&equations.hessian, iteration)?;
            }

            let mut damped = equations.hessian;
            for i in 0..6 {
                damped[(i, i)] += damping * equations.hessian[(i, i)];
            }
            let step = damped
                .cholesky()
                .map(|cholesky| cholesky.solve(&-equations.gradient))
                .ok_or(Error::IllConditioned {
                    iteration,
                    ratio: 0.0,
                })?;

            let candidate = motion.stepped(&step);
            let candidate_cost = self.cost(correspondences, &candidate);
            if candidate_cost < cost {
                motion = candidate;
                cost = candidate_cost;
                damping /= 10.0;
            } else {
                damping *= 10.0;
            }

            if step.norm() < MIN_STEP {
                break;
            }
        }

        Ok(motion.to_transform())
    }

    fn residuals<'a>(
        &'a self,
        correspondences: &'a [Correspondence],
        motion: &'a PivotMotion,
    ) -> impl Iterator<Item = f64> + 'a {
        correspondences.iter().map(move |c| {
            let difference = motion.apply(&c.source) - c.target;
            match (self.metric, c.target_normal) {
                (ErrorMetric::PointToPlane, Some(normal)) => difference.dot(&normal).powi(2),
                _ => difference.norm_squared(),
            }
        })
    }

    /// Sum of squared residuals
    fn cost(&self, correspondences: &[Correspondence], motion: &PivotMotion) -> f64 {
        self.residuals(correspondences, motion).sum()
    }

    fn linearize(&self, correspondences: &[Correspondence], motion: &PivotMotion) -> NormalEquations {
        let mut hessian = Matrix6::zeros();
        let mut gradient = Vector6::zeros();
        for c in correspondences {
            let lever = motion.lever(&c.source);
            let difference = motion.apply(&c.source) - c.target;
            match (self.metric, c.target_normal) {
                (ErrorMetric::PointToPlane, Some(normal)) => {
                    let rotational = lever.cross(&normal);
                    let jacobian = RowVector6::new(
                        rotational.x,
                        rotational.y,
                        rotational.z,
                        normal.x,
                        normal.y,
                        normal.z,
                    );
                    let residual = difference.dot(&normal);
                    hessian += jacobian.transpose() * jacobian;
                    gradient += jacobian.transpose() * residual;
                }
                _ => {
                    let mut jacobian = Matrix3x6::zeros();
                    jacobian
                        .fixed_view_mut::<3, 3>(0, 0)
                        .copy_from(&(-lever.cross_matrix()));
                    jacobian
                        .fixed_view_mut::<3, 3>(0, 3)
                        .copy_from(&Matrix3::identity());
                    hessian += jacobian.transpose() * jacobian;
                    gradient += jacobian.transpose() * difference;
                }
            }
        }
        NormalEquations { hessian, gradient }
    }
}

fn check_conditioning(hessian: &Matrix6<f64>, iteration: usize) -> Result<()> {
    let eigenvalues = hessian.symmetric_eigenvalues();
    let largest = eigenvalues.max();
    let smallest = eigenvalues.min();
    let ratio = if largest > 0.0 { smallest / largest } else { 0.0 };
    if ratio.is_nan() || ratio < CONDITION_THRESHOLD {
        return Err(Error::IllConditioned { iteration, ratio });
    }
    Ok(())
}
