use crate::{matter::MatterModel, ForceErrors, ForceModel};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use spatial_algebra::SpatialForce;
use staged_state::State;

/// Uniform gravity field: m·g at every body's center of mass (the ground
/// body is skipped) and at every free particle.
///
/// Potential energy is −m·(g·p + zero_height), zero on the surface where
/// g·p = −zero_height and decreasing in the direction of g.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct UniformGravity {
    gravity: Vector3<f64>,
    zero_height: f64,
}

impl UniformGravity {
    pub fn new(gravity: Vector3<f64>, zero_height: f64) -> Self {
        Self {
            gravity,
            zero_height,
        }
    }

    pub fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity;
    }

    pub fn zero_height(&self) -> f64 {
        self.zero_height
    }

    pub fn set_zero_height(&mut self, zero_height: f64) {
        self.zero_height = zero_height;
    }
}

impl ForceModel for UniformGravity {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        particle_forces: &mut [Vector3<f64>],
        _mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        for particle in 0..matter.num_particles() {
            particle_forces[particle] += self.gravity * matter.particle_mass(state, particle);
        }

        // no gravity on the ground body
        for body in 1..matter.num_bodies() {
            let mprops = matter.body_mass_properties(state, body);
            let x_gb = matter.body_transform(state, body);
            let com_g = x_gb.rotation * mprops.center_of_mass();
            let frc_g = self.gravity * mprops.mass();
            body_forces[body] += SpatialForce::new(com_g.cross(&frc_g), frc_g);
        }
        Ok(())
    }

    fn calc_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        let mut pe = 0.0;

        for particle in 0..matter.num_particles() {
            let position = matter.particle_position(state, particle);
            pe -= matter.particle_mass(state, particle)
                * (self.gravity.dot(&position) + self.zero_height);
        }

        for body in 1..matter.num_bodies() {
            let mprops = matter.body_mass_properties(state, body);
            let x_gb = matter.body_transform(state, body);
            let com_g = x_gb.transform_point(mprops.center_of_mass());
            pe -= mprops.mass() * (self.gravity.dot(&com_g) + self.zero_height);
        }
        Ok(pe)
    }
}
