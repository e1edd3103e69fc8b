use nalgebra::Vector3;
use rotations::RotationMatrix;
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Rigid transform from a child frame to its parent: `rotation` re-expresses
/// child-frame vectors in the parent frame, `translation` locates the child
/// origin in the parent frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub rotation: RotationMatrix,
    pub translation: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn new(rotation: RotationMatrix, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(RotationMatrix::identity(), Vector3::zeros())
    }

    pub fn from_rotation(rotation: RotationMatrix) -> Self {
        Self::new(rotation, Vector3::zeros())
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(RotationMatrix::identity(), translation)
    }

    pub fn inv(&self) -> Transform {
        let rotation = self.rotation.transpose();
        let translation = -(rotation * self.translation);
        Transform::new(rotation, translation)
    }

    /// Maps a point from the child frame to the parent frame.
    pub fn transform_point(&self, point: Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }
}

impl Mul<Transform> for Transform {
    type Output = Transform;
    /// Frame composition: `X_AC = X_AB * X_BC`.
    fn mul(self, rhs: Transform) -> Transform {
        Transform::new(
            self.rotation * rhs.rotation,
            self.translation + self.rotation * rhs.translation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_compose_then_invert() {
        let x_ab = Transform::new(RotationMatrix::about_z(0.4), Vector3::new(1.0, -2.0, 0.5));
        let x_bc = Transform::new(RotationMatrix::about_x(-1.1), Vector3::new(0.0, 3.0, 1.0));
        let x_ac = x_ab * x_bc;

        let p_c = Vector3::new(0.2, -0.7, 1.3);
        let direct = x_ac.transform_point(p_c);
        let stepped = x_ab.transform_point(x_bc.transform_point(p_c));
        assert_abs_diff_eq!(direct, stepped, epsilon = TOL);

        let round_trip = x_ac.inv().transform_point(direct);
        assert_abs_diff_eq!(round_trip, p_c, epsilon = TOL);
    }

    #[test]
    fn test_quarter_turn_point() {
        let x = Transform::new(RotationMatrix::about_z(PI / 2.0), Vector3::new(1.0, 0.0, 0.0));
        let p = x.transform_point(Vector3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(p, Vector3::new(1.0, 1.0, 0.0), epsilon = TOL);
    }
}
