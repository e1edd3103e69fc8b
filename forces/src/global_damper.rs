use crate::{matter::MatterModel, ForceErrors, ForceModel};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use spatial_algebra::SpatialForce;
use staged_state::State;

/// Uniform damping on every mobility: generalized force = −c·u.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GlobalDamper {
    damping: f64,
}

impl GlobalDamper {
    pub fn new(damping: f64) -> Result<Self, ForceErrors> {
        if damping < 0.0 {
            return Err(ForceErrors::NegativeDamping(damping));
        }
        Ok(Self { damping })
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn set_damping(&mut self, damping: f64) -> Result<(), ForceErrors> {
        if damping < 0.0 {
            return Err(ForceErrors::NegativeDamping(damping));
        }
        self.damping = damping;
        Ok(())
    }
}

impl ForceModel for GlobalDamper {
    fn calc_force(
        &self,
        _matter: &dyn MatterModel,
        state: &State,
        _body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        *mobility_forces -= state.u() * self.damping;
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
    use crate::matter::PrescribedMatter;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_damps_every_mobility() {
        let matter = PrescribedMatter::new();
        let mut state = State::new();
        state.set_u(dvector![1.0, -2.0, 0.5]);

        let damper = GlobalDamper::new(0.5).unwrap();
        let mut body_forces = Vec::new();
        let mut particle_forces = Vec::new();
        let mut mobility_forces = DVector::zeros(3);
        damper
            .calc_force(
                &matter,
                &state,
                &mut body_forces,
                &mut particle_forces,
                &mut mobility_forces,
            )
            .unwrap();
        assert_abs_diff_eq!(mobility_forces[0], -0.5, epsilon = TOL);
        assert_abs_diff_eq!(mobility_forces[1], 1.0, epsilon = TOL);
        assert_abs_diff_eq!(mobility_forces[2], -0.25, epsilon = TOL);
    }

    #[test]
    fn test_rejects_negative_damping() {
        assert!(GlobalDamper::new(-1e-9).is_err());
        assert!(GlobalDamper::new(0.0).is_ok());
    }
}
