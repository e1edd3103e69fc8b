//! Elements acting on a single generalized coordinate/speed of one body's
//! joint. The coordinate is addressed through the matter model's mobility
//! indexing, which assumes the coordinate and its speed share one slot.

use crate::{matter::MatterModel, ForceErrors, ForceModel};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use spatial_algebra::SpatialForce;
use staged_state::State;

/// Spring on one generalized coordinate: force = −k·(q − target).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MobilityLinearSpring {
    body: usize,
    coordinate: usize,
    stiffness: f64,
    target: f64,
}

impl MobilityLinearSpring {
    pub fn new(body: usize, coordinate: usize, stiffness: f64, target: f64) -> Self {
        Self {
            body,
            coordinate,
            stiffness,
            target,
        }
    }
}

impl ForceModel for MobilityLinearSpring {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        _body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let index = matter.mobility_index(self.body, self.coordinate);
        let q = state.q()[index];
        mobility_forces[index] -= self.stiffness * (q - self.target);
        Ok(())
    }

    fn calc_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        let index = matter.mobility_index(self.body, self.coordinate);
        let displacement = state.q()[index] - self.target;
        Ok(0.5 * self.stiffness * displacement * displacement)
    }
}

/// Damper on one generalized speed: force = −c·u.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MobilityLinearDamper {
    body: usize,
    coordinate: usize,
    damping: f64,
}

impl MobilityLinearDamper {
    pub fn new(body: usize, coordinate: usize, damping: f64) -> Result<Self, ForceErrors> {
        if damping < 0.0 {
            return Err(ForceErrors::NegativeDamping(damping));
        }
        Ok(Self {
            body,
            coordinate,
            damping,
        })
    }
}

impl ForceModel for MobilityLinearDamper {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        _body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let index = matter.mobility_index(self.body, self.coordinate);
        mobility_forces[index] -= self.damping * state.u()[index];
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

/// Fixed generalized force on one mobility.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MobilityConstantForce {
    body: usize,
    coordinate: usize,
    force: f64,
}

impl MobilityConstantForce {
    pub fn new(body: usize, coordinate: usize, force: f64) -> Self {
        Self {
            body,
            coordinate,
            force,
        }
    }
}

impl ForceModel for MobilityConstantForce {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        _state: &State,
        _body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let index = matter.mobility_index(self.body, self.coordinate);
        mobility_forces[index] += self.force;
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
