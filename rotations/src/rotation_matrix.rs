use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

use crate::euler_angles::EulerAngles;

/// Right-handed rotation matrix. Multiplying a vector re-expresses it from
/// the rotated frame into the base frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationMatrix(Matrix3<f64>);

impl RotationMatrix {
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self(matrix)
    }

    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Rotation by `angle` radians about the base frame x axis.
    pub fn about_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self(Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c))
    }

    /// Rotation by `angle` radians about the base frame y axis.
    pub fn about_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self(Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c))
    }

    /// Rotation by `angle` radians about the base frame z axis.
    pub fn about_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self(Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }

    /// Decomposes the rotation into body-fixed (intrinsic) X-Y-Z Euler
    /// angles, i.e. the angles such that `self == Rx(x) * Ry(y) * Rz(z)`.
    ///
    /// The middle angle is recovered through `asin`, so the decomposition is
    /// singular when that angle reaches ±90°; callers get the principal
    /// branch and no gimbal-lock protection.
    pub fn body_fixed_xyz(&self) -> EulerAngles {
        let r = &self.0;
        let y = r[(0, 2)].clamp(-1.0, 1.0).asin();
        let x = (-r[(1, 2)]).atan2(r[(2, 2)]);
        let z = (-r[(0, 1)]).atan2(r[(0, 0)]);
        EulerAngles::new(x, y, z)
    }
}

impl Default for RotationMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<&EulerAngles> for RotationMatrix {
    fn from(angles: &EulerAngles) -> Self {
        RotationMatrix::about_x(angles.x)
            * RotationMatrix::about_y(angles.y)
            * RotationMatrix::about_z(angles.z)
    }
}

impl Mul<RotationMatrix> for RotationMatrix {
    type Output = RotationMatrix;
    #[inline]
    fn mul(self, rhs: RotationMatrix) -> RotationMatrix {
        RotationMatrix(self.0 * rhs.0)
    }
}

impl Mul<Vector3<f64>> for RotationMatrix {
    type Output = Vector3<f64>;
    #[inline]
    fn mul(self, v: Vector3<f64>) -> Vector3<f64> {
        self.0 * v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_axis_rotations() {
        let r = RotationMatrix::about_z(PI / 2.0);
        let v = r * Vector3::new(1.0, 0.0, 0.0);
        assert_abs_diff_eq!(v.x, 0.0, epsilon = TOL);
        assert_abs_diff_eq!(v.y, 1.0, epsilon = TOL);
        assert_abs_diff_eq!(v.z, 0.0, epsilon = TOL);

        let r = RotationMatrix::about_x(PI / 2.0);
        let v = r * Vector3::new(0.0, 1.0, 0.0);
        assert_abs_diff_eq!(v.z, 1.0, epsilon = TOL);
    }

    #[test]
    fn test_transpose_is_inverse() {
        let r = RotationMatrix::about_x(0.3) * RotationMatrix::about_y(-0.7);
        let i = r.transpose() * r;
        assert_abs_diff_eq!(*i.matrix(), Matrix3::identity(), epsilon = TOL);
    }

    #[test]
    fn test_body_fixed_xyz_round_trip() {
        let angles = EulerAngles::new(0.4, -0.9, 1.2);
        let r = RotationMatrix::from(&angles);
        let back = r.body_fixed_xyz();
        assert_abs_diff_eq!(back.x, angles.x, epsilon = TOL);
        assert_abs_diff_eq!(back.y, angles.y, epsilon = TOL);
        assert_abs_diff_eq!(back.z, angles.z, epsilon = TOL);
    }

    #[test]
    fn test_identity_decomposes_to_zero() {
        let angles = RotationMatrix::identity().body_fixed_xyz();
        assert_abs_diff_eq!(angles.x, 0.0, epsilon = TOL);
        assert_abs_diff_eq!(angles.y, 0.0, epsilon = TOL);
        assert_abs_diff_eq!(angles.z, 0.0, epsilon = TOL);
    }
}
