use std::convert::TryFrom;
use std::fmt;
use std::ops::Mul;

use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Vector3};

/// Tolerance used by [RigidTransform::from_matrix] when checking that a matrix is a rigid transform
pub const RIGIDITY_TOLERANCE: f64 = 1e-6;

/// A rigid transform in 3D, stored as a 4x4 homogeneous matrix `[R | t; 0 0 0 1]` with `R` in SO(3).
///
/// Transforms compose through matrix multiplication: `a.compose(&b)` (or `a * b`) first applies `b` and then `a`.
/// ```
/// # use sweep_core::math::RigidTransform;
/// # use sweep_core::nalgebra::{Point3, Vector3};
/// let shift = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));
/// let turn = RigidTransform::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
/// let p = (turn * shift).transform_point(&Point3::new(0.0, 0.0, 0.0));
/// assert!((p - Point3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Matrix4<f64>", into = "Matrix4<f64>"))]
pub struct RigidTransform {
    matrix: Matrix4<f64>,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            matrix: Matrix4::new_translation(&translation),
        }
    }

    pub fn from_rotation_translation(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Self {
        let mut matrix = rotation.to_homogeneous();
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        Self { matrix }
    }

    /// Creates a pure rotation from roll, pitch and yaw angles (radians)
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            matrix: Rotation3::from_euler_angles(roll, pitch, yaw).to_homogeneous(),
        }
    }

    /// Wraps the given matrix if it is a rigid transform, i.e. its upper-left 3x3 block is orthonormal with
    /// determinant +1 and its last row is `[0 0 0 1]`, all within [RIGIDITY_TOLERANCE]. Returns `None` otherwise
    /// ```
    /// # use sweep_core::math::RigidTransform;
    /// # use sweep_core::nalgebra::Matrix4;
    /// assert!(RigidTransform::from_matrix(Matrix4::identity()).is_some());
    /// assert!(RigidTransform::from_matrix(Matrix4::identity() * 2.0).is_none());
    /// ```
    pub fn from_matrix(matrix: Matrix4<f64>) -> Option<Self> {
        let candidate = Self { matrix };
        if candidate.is_rigid(RIGIDITY_TOLERANCE) {
            Some(candidate)
        } else {
            None
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Returns `self * other`, the transform that applies `other` first and `self` second
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Closed-form inverse `[Rᵀ | -Rᵀt]`
    pub fn inverse(&self) -> RigidTransform {
        let rotation_t = self.rotation().transpose();
        let translation = -(rotation_t * self.translation());
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation_t);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        RigidTransform { matrix }
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation() * point.coords + self.translation())
    }

    /// Applies only the rotational part, as needed for directions such as surface normals
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation() * vector
    }

    /// Rotation angle in radians, in `[0, pi]`
    pub fn rotation_angle(&self) -> f64 {
        // atan2 instead of acos of the trace, which loses all precision for tiny angles
        let r = self.rotation();
        let cos_angle = (r.trace() - 1.0) * 0.5;
        let sin_angle = Vector3::new(
            r[(2, 1)] - r[(1, 2)],
            r[(0, 2)] - r[(2, 0)],
            r[(1, 0)] - r[(0, 1)],
        )
        .norm()
            * 0.5;
        sin_angle.atan2(cos_angle)
    }

    pub fn translation_norm(&self) -> f64 {
        self.translation().norm()
    }

    /// Size of this transform as rotation angle plus translation norm. Used as convergence measure
    pub fn magnitude(&self) -> f64 {
        self.rotation_angle() + self.translation_norm()
    }

    pub fn is_rigid(&self, tolerance: f64) -> bool {
        let rotation = self.rotation();
        let orthonormal = (rotation.transpose() * rotation - Matrix3::identity())
            .iter()
            .all(|v| v.abs() <= tolerance);
        let last_row = self.matrix.fixed_view::<1, 4>(3, 0);
        let homogeneous = last_row[0].abs() <= tolerance
            && last_row[1].abs() <= tolerance
            && last_row[2].abs() <= tolerance
            && (last_row[3] - 1.0).abs() <= tolerance;
        orthonormal && homogeneous && (rotation.determinant() - 1.0).abs() <= tolerance
    }

    /// Projects the rotation block back onto SO(3). Long chains of compositions slowly accumulate rounding
    /// errors that break orthonormality; this removes them
    pub fn renormalized(&self) -> RigidTransform {
        let svd = self.rotation().svd(true, true);
        let (mut u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => return *self,
        };
        if (u * v_t).determinant() < 0.0 {
            u.column_mut(2).neg_mut();
        }
        let rotation = Rotation3::from_matrix_unchecked(u * v_t);
        RigidTransform::from_rotation_translation(&rotation, &self.translation())
    }

    /// Returns true if all matrix entries of `self` and `other` differ by at most `tolerance`
    pub fn approx_eq(&self, other: &RigidTransform, tolerance: f64) -> bool {
        (self.matrix - other.matrix)
            .iter()
            .all(|v| v.abs() <= tolerance)
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> RigidTransform {
        self.compose(&rhs)
    }
}

impl From<RigidTransform> for Matrix4<f64> {
    fn from(transform: RigidTransform) -> Self {
        transform.matrix
    }
}

impl TryFrom<Matrix4<f64>> for RigidTransform {
    type Error = String;

    fn try_from(matrix: Matrix4<f64>) -> Result<Self, Self::Error> {
        RigidTransform::from_matrix(matrix)
            .ok_or_else(|| "matrix is not a rigid transform".to_string())
    }
}

impl fmt::Display for RigidTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..4 {
            let values = (0..4)
                .map(|col| format!("{:>12.6}", self.matrix[(row, col)]))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "{}", values)?;
        }
        Ok(())
    }
}
