use nalgebra::Vector3;
use rotations::RotationMatrix;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Spatial velocity of a frame: angular and linear components expressed in a
/// common frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialVelocity {
    pub angular: Vector3<f64>,
    pub linear: Vector3<f64>,
}

impl Default for SpatialVelocity {
    fn default() -> Self {
        Self::zero()
    }
}

impl SpatialVelocity {
    pub fn new(angular: Vector3<f64>, linear: Vector3<f64>) -> Self {
        Self { angular, linear }
    }

    pub fn zero() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    /// Velocity of a frame rigidly attached at `offset` from this frame's
    /// origin (offset expressed in the same frame as the components):
    /// angular part unchanged, linear part picks up w × r.
    pub fn shifted(&self, offset: Vector3<f64>) -> SpatialVelocity {
        SpatialVelocity::new(self.angular, self.linear + self.angular.cross(&offset))
    }

    /// Re-expresses both components in another frame.
    pub fn rotated_by(&self, rotation: &RotationMatrix) -> SpatialVelocity {
        SpatialVelocity::new(*rotation * self.angular, *rotation * self.linear)
    }
}

impl Add<SpatialVelocity> for SpatialVelocity {
    type Output = SpatialVelocity;
    #[inline]
    fn add(self, rhs: SpatialVelocity) -> SpatialVelocity {
        SpatialVelocity::new(self.angular + rhs.angular, self.linear + rhs.linear)
    }
}

impl Sub<SpatialVelocity> for SpatialVelocity {
    type Output = SpatialVelocity;
    #[inline]
    fn sub(self, rhs: SpatialVelocity) -> SpatialVelocity {
        SpatialVelocity::new(self.angular - rhs.angular, self.linear - rhs.linear)
    }
}

/// Spatial force on a body: a moment and a linear force about some reporting
/// point, expressed in a common frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialForce {
    pub moment: Vector3<f64>,
    pub force: Vector3<f64>,
}

impl Default for SpatialForce {
    fn default() -> Self {
        Self::zero()
    }
}

impl SpatialForce {
    pub fn new(moment: Vector3<f64>, force: Vector3<f64>) -> Self {
        Self { moment, force }
    }

    pub fn zero() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    /// Equivalent spatial force about a new reporting point, where `offset`
    /// is the vector from the new point to the current one: the moment picks
    /// up the lever arm r × f, the force is unchanged.
    pub fn shifted(&self, offset: Vector3<f64>) -> SpatialForce {
        SpatialForce::new(self.moment + offset.cross(&self.force), self.force)
    }
}

impl Add<SpatialForce> for SpatialForce {
    type Output = SpatialForce;
    #[inline]
    fn add(self, rhs: SpatialForce) -> SpatialForce {
        SpatialForce::new(self.moment + rhs.moment, self.force + rhs.force)
    }
}

impl Sub<SpatialForce> for SpatialForce {
    type Output = SpatialForce;
    #[inline]
    fn sub(self, rhs: SpatialForce) -> SpatialForce {
        SpatialForce::new(self.moment - rhs.moment, self.force - rhs.force)
    }
}

impl AddAssign<SpatialForce> for SpatialForce {
    #[inline]
    fn add_assign(&mut self, rhs: SpatialForce) {
        self.moment += rhs.moment;
        self.force += rhs.force;
    }
}

impl SubAssign<SpatialForce> for SpatialForce {
    #[inline]
    fn sub_assign(&mut self, rhs: SpatialForce) {
        self.moment -= rhs.moment;
        self.force -= rhs.force;
    }
}

impl Neg for SpatialForce {
    type Output = SpatialForce;
    #[inline]
    fn neg(self) -> SpatialForce {
        SpatialForce::new(-self.moment, -self.force)
    }
}

impl Mul<f64> for SpatialForce {
    type Output = SpatialForce;
    #[inline]
    fn mul(self, rhs: f64) -> SpatialForce {
        SpatialForce::new(self.moment * rhs, self.force * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_velocity_shift() {
        // pure spin about z, point one unit out on x moves in +y
        let v = SpatialVelocity::new(Vector3::new(0.0, 0.0, 2.0), Vector3::zeros());
        let at_station = v.shifted(Vector3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(at_station.angular, v.angular, epsilon = TOL);
        assert_abs_diff_eq!(at_station.linear, Vector3::new(0.0, 2.0, 0.0), epsilon = TOL);
    }

    #[test]
    fn test_force_shift_adds_lever_arm() {
        let f = SpatialForce::new(Vector3::zeros(), Vector3::new(0.0, 3.0, 0.0));
        let at_origin = f.shifted(Vector3::new(1.0, 0.0, 0.0));
        assert_abs_diff_eq!(at_origin.moment, Vector3::new(0.0, 0.0, 3.0), epsilon = TOL);
        assert_abs_diff_eq!(at_origin.force, f.force, epsilon = TOL);
    }

    #[test]
    fn test_opposite_forces_cancel_after_shift() {
        // a force at P and its negation at the same P must cancel exactly
        // once both are reported about any common point
        let f = SpatialForce::new(Vector3::new(0.1, -0.2, 0.3), Vector3::new(1.0, 2.0, -0.5));
        let r = Vector3::new(-0.4, 0.8, 1.5);
        let total = f.shifted(r) + (-f).shifted(r);
        assert_abs_diff_eq!(total.moment, Vector3::zeros(), epsilon = TOL);
        assert_abs_diff_eq!(total.force, Vector3::zeros(), epsilon = TOL);
    }
}
