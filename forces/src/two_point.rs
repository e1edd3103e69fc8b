//! Elements acting along the instantaneous line between a station fixed on
//! each of two bodies. None of them guard against coincident stations; a
//! zero-length separation is the caller's problem.

use crate::{matter::MatterModel, ForceErrors, ForceModel};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use spatial_algebra::SpatialForce;
use staged_state::State;

/// Linear spring between two body stations: tension k·(distance − rest
/// length) along the line, applied equal-and-opposite at both stations.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TwoPointLinearSpring {
    body1: usize,
    station1: Vector3<f64>,
    body2: usize,
    station2: Vector3<f64>,
    stiffness: f64,
    rest_length: f64,
}

impl TwoPointLinearSpring {
    pub fn new(
        body1: usize,
        station1: Vector3<f64>,
        body2: usize,
        station2: Vector3<f64>,
        stiffness: f64,
        rest_length: f64,
    ) -> Self {
        Self {
            body1,
            station1,
            body2,
            station2,
            stiffness,
            rest_length,
        }
    }
}

impl ForceModel for TwoPointLinearSpring {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        _mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let x_gb1 = matter.body_transform(state, self.body1);
        let x_gb2 = matter.body_transform(state, self.body2);

        let s1_g = x_gb1.rotation * self.station1;
        let s2_g = x_gb2.rotation * self.station2;

        let p1_g = x_gb1.translation + s1_g;
        let p2_g = x_gb2.translation + s2_g;

        let r_g = p2_g - p1_g;
        let d = r_g.norm();
        let stretch = d - self.rest_length;

        // force on body 1, toward body 2 when stretched
        let f1_g = r_g * (self.stiffness * stretch / d);
        body_forces[self.body1] += SpatialForce::new(s1_g.cross(&f1_g), f1_g);
        body_forces[self.body2] -= SpatialForce::new(s2_g.cross(&f1_g), f1_g);
        Ok(())
    }

    fn calc_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        let x_gb1 = matter.body_transform(state, self.body1);
        let x_gb2 = matter.body_transform(state, self.body2);

        let p1_g = x_gb1.transform_point(self.station1);
        let p2_g = x_gb2.transform_point(self.station2);

        let stretch = (p2_g - p1_g).norm() - self.rest_length;
        Ok(0.5 * self.stiffness * stretch * stretch)
    }
}

/// Linear damper between two body stations: resists the rate of change of
/// the station separation. Non-conservative, so no potential energy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TwoPointLinearDamper {
    body1: usize,
    station1: Vector3<f64>,
    body2: usize,
    station2: Vector3<f64>,
    damping: f64,
}

impl TwoPointLinearDamper {
    pub fn new(
        body1: usize,
        station1: Vector3<f64>,
        body2: usize,
        station2: Vector3<f64>,
        damping: f64,
    ) -> Result<Self, ForceErrors> {
        if damping < 0.0 {
            return Err(ForceErrors::NegativeDamping(damping));
        }
        Ok(Self {
            body1,
            station1,
            body2,
            station2,
            damping,
        })
    }
}

impl ForceModel for TwoPointLinearDamper {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        _mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let x_gb1 = matter.body_transform(state, self.body1);
        let x_gb2 = matter.body_transform(state, self.body2);

        let s1_g = x_gb1.rotation * self.station1;
        let s2_g = x_gb2.rotation * self.station2;

        let p1_g = x_gb1.translation + s1_g;
        let p2_g = x_gb2.translation + s2_g;

        let v1_g = matter.station_velocity(state, self.body1, self.station1);
        let v2_g = matter.station_velocity(state, self.body2, self.station2);
        let v_rel = v2_g - v1_g;

        let d = (p2_g - p1_g).normalize();
        let frc = self.damping * v_rel.dot(&d);

        let f1_g = d * frc;
        body_forces[self.body1] += SpatialForce::new(s1_g.cross(&f1_g), f1_g);
        body_forces[self.body2] -= SpatialForce::new(s2_g.cross(&f1_g), f1_g);
        Ok(())
    }

    fn calc_potential_energy(
        &self,
        _matter: &dyn MatterModel,
        _state: &State,
    ) -> Result<f64, ForceErrors> {
        Ok(0.0)
    }
}

/// Constant-magnitude force along the line between two body stations; a
/// positive magnitude pulls the bodies together.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TwoPointConstantForce {
    body1: usize,
    station1: Vector3<f64>,
    body2: usize,
    station2: Vector3<f64>,
    force: f64,
}

impl TwoPointConstantForce {
    pub fn new(
        body1: usize,
        station1: Vector3<f64>,
        body2: usize,
        station2: Vector3<f64>,
        force: f64,
    ) -> Self {
        Self {
            body1,
            station1,
            body2,
            station2,
            force,
        }
    }
}

impl ForceModel for TwoPointConstantForce {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        _mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let x_gb1 = matter.body_transform(state, self.body1);
        let x_gb2 = matter.body_transform(state, self.body2);

        let s1_g = x_gb1.rotation * self.station1;
        let s2_g = x_gb2.rotation * self.station2;

        let p1_g = x_gb1.translation + s1_g;
        let p2_g = x_gb2.translation + s2_g;

        let d = (p2_g - p1_g).normalize();

        // on body 1, toward body 2 for positive magnitude
        let f1_g = d * self.force;
        body_forces[self.body1] += SpatialForce::new(s1_g.cross(&f1_g), f1_g);
        body_forces[self.body2] -= SpatialForce::new(s2_g.cross(&f1_g), f1_g);
        Ok(())
    }

    fn calc_potential_energy(
        &self,
        _matter: &dyn MatterModel,
        _state: &State,
    ) -> Result<f64, ForceErrors> {
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::{MassProperties, PrescribedMatter};
    use approx::assert_abs_diff_eq;
    use rotations::RotationMatrix;
    use spatial_algebra::SpatialVelocity;
    use transforms::Transform;

    const TOL: f64 = 1e-12;

    fn two_body_fixture(x2: Transform, v2: SpatialVelocity) -> (PrescribedMatter, State) {
        let mut matter = PrescribedMatter::new();
        matter.add_body(
            Transform::identity(),
            SpatialVelocity::zero(),
            MassProperties::new(1.0, Vector3::zeros()).unwrap(),
            &[],
        );
        matter.add_body(
            x2,
            v2,
            MassProperties::new(1.0, Vector3::zeros()).unwrap(),
            &[],
        );
        (matter, State::new())
    }

    fn accumulate(
        matter: &PrescribedMatter,
        state: &State,
        element: &dyn ForceModel,
    ) -> Vec<SpatialForce> {
        let mut body_forces = vec![SpatialForce::zero(); matter.num_bodies()];
        let mut particle_forces = Vec::new();
        let mut mobility_forces = DVector::zeros(0);
        element
            .calc_force(
                matter,
                state,
                &mut body_forces,
                &mut particle_forces,
                &mut mobility_forces,
            )
            .unwrap();
        body_forces
    }

    #[test]
    fn test_spring_sample_energy_and_force() {
        // bodies 3 apart, rest length 2, k = 10 -> PE = 5, tension 10
        let (matter, state) = two_body_fixture(
            Transform::from_translation(Vector3::new(3.0, 0.0, 0.0)),
            SpatialVelocity::zero(),
        );
        let spring = TwoPointLinearSpring::new(
            1,
            Vector3::zeros(),
            2,
            Vector3::zeros(),
            10.0,
            2.0,
        );

        let pe = spring.calc_potential_energy(&matter, &state).unwrap();
        assert_abs_diff_eq!(pe, 5.0, epsilon = TOL);

        let body_forces = accumulate(&matter, &state, &spring);
        assert_abs_diff_eq!(body_forces[1].force, Vector3::new(10.0, 0.0, 0.0), epsilon = TOL);
        assert_abs_diff_eq!(body_forces[2].force, Vector3::new(-10.0, 0.0, 0.0), epsilon = TOL);
        assert_abs_diff_eq!(body_forces[1].moment, Vector3::zeros(), epsilon = TOL);
    }

    #[test]
    fn test_spring_pair_is_equal_and_opposite() {
        // rotated bodies with offset stations: net force and net moment about
        // the ground origin must vanish
        let (matter, state) = two_body_fixture(
            Transform::new(RotationMatrix::about_z(0.7), Vector3::new(1.0, 2.0, -0.5)),
            SpatialVelocity::zero(),
        );
        let spring = TwoPointLinearSpring::new(
            1,
            Vector3::new(0.1, -0.2, 0.3),
            2,
            Vector3::new(-0.4, 0.1, 0.2),
            35.0,
            0.5,
        );

        let body_forces = accumulate(&matter, &state, &spring);
        let total_force = body_forces[1].force + body_forces[2].force;
        assert_abs_diff_eq!(total_force, Vector3::zeros(), epsilon = TOL);

        let p1 = matter.body_transform(&state, 1).translation;
        let p2 = matter.body_transform(&state, 2).translation;
        let total_moment = body_forces[1].moment
            + p1.cross(&body_forces[1].force)
            + body_forces[2].moment
            + p2.cross(&body_forces[2].force);
        assert_abs_diff_eq!(total_moment, Vector3::zeros(), epsilon = 1e-10);
    }

    #[test]
    fn test_damper_zero_relative_velocity_zero_force() {
        // both stations move with the same velocity
        let (matter, state) = two_body_fixture(
            Transform::from_translation(Vector3::new(2.0, 0.0, 0.0)),
            SpatialVelocity::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 0.0)),
        );
        let mut matter = matter;
        matter.body_mut(1).velocity =
            SpatialVelocity::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 0.0));

        let damper =
            TwoPointLinearDamper::new(1, Vector3::zeros(), 2, Vector3::zeros(), 4.0).unwrap();
        let body_forces = accumulate(&matter, &state, &damper);
        assert_abs_diff_eq!(body_forces[1].force, Vector3::zeros(), epsilon = TOL);
        assert_abs_diff_eq!(body_forces[2].force, Vector3::zeros(), epsilon = TOL);
    }

    #[test]
    fn test_damper_resists_separation() {
        let (matter, state) = two_body_fixture(
            Transform::from_translation(Vector3::new(2.0, 0.0, 0.0)),
            SpatialVelocity::new(Vector3::zeros(), Vector3::new(3.0, 0.0, 0.0)),
        );
        let damper =
            TwoPointLinearDamper::new(1, Vector3::zeros(), 2, Vector3::zeros(), 0.5).unwrap();
        let body_forces = accumulate(&matter, &state, &damper);
        // separation at 3 m/s, c = 0.5: body 1 pulled toward body 2
        assert_abs_diff_eq!(body_forces[1].force, Vector3::new(1.5, 0.0, 0.0), epsilon = TOL);
        assert_abs_diff_eq!(body_forces[2].force, Vector3::new(-1.5, 0.0, 0.0), epsilon = TOL);
    }

    #[test]
    fn test_damper_rejects_negative_coefficient() {
        assert!(TwoPointLinearDamper::new(1, Vector3::zeros(), 2, Vector3::zeros(), -1.0).is_err());
        assert!(TwoPointLinearDamper::new(1, Vector3::zeros(), 2, Vector3::zeros(), 0.0).is_ok());
    }

    #[test]
    fn test_constant_force_pulls_together() {
        let (matter, state) = two_body_fixture(
            Transform::from_translation(Vector3::new(0.0, 4.0, 0.0)),
            SpatialVelocity::zero(),
        );
        let element = TwoPointConstantForce::new(1, Vector3::zeros(), 2, Vector3::zeros(), 7.0);
        let body_forces = accumulate(&matter, &state, &element);
        assert_abs_diff_eq!(body_forces[1].force, Vector3::new(0.0, 7.0, 0.0), epsilon = TOL);
        assert_abs_diff_eq!(body_forces[2].force, Vector3::new(0.0, -7.0, 0.0), epsilon = TOL);
        assert_abs_diff_eq!(element.calc_potential_energy(&matter, &state).unwrap(), 0.0);
    }
}
