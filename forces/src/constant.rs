use crate::{matter::MatterModel, ForceErrors, ForceModel};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use spatial_algebra::SpatialForce;
use staged_state::State;

/// Fixed ground-frame force applied at a station on one body. The station
/// offset generates the usual moment about the body origin.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConstantForce {
    body: usize,
    station: Vector3<f64>,
    force: Vector3<f64>,
}

impl ConstantForce {
    pub fn new(body: usize, station: Vector3<f64>, force: Vector3<f64>) -> Self {
        Self {
            body,
            station,
            force,
        }
    }
}

impl ForceModel for ConstantForce {
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        _mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let x_gb = matter.body_transform(state, self.body);
        let station_g = x_gb.rotation * self.station;
        body_forces[self.body] += SpatialForce::new(station_g.cross(&self.force), self.force);
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

/// Fixed ground-frame torque on one body.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConstantTorque {
    body: usize,
    torque: Vector3<f64>,
}

impl ConstantTorque {
    pub fn new(body: usize, torque: Vector3<f64>) -> Self {
        Self { body, torque }
    }
}

impl ForceModel for ConstantTorque {
    fn calc_force(
        &self,
        _matter: &dyn MatterModel,
        _state: &State,
        body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        _mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        body_forces[self.body] += SpatialForce::new(self.torque, Vector3::zeros());
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
