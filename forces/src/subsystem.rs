use crate::{matter::MatterModel, Force, ForceErrors, ForceModel};
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use spatial_algebra::SpatialForce;
use staged_state::{Stage, State};

/// Stable index assigned to a force element when its owning subsystem adopts
/// it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForceIndex(pub usize);

/// Owns the force elements for the lifetime of the model and drives their
/// stage realization and evaluation. Elements are immutable once adopted
/// (apart from their own declared state slots), so several independent
/// states can be evaluated against one subsystem.
#[derive(Debug, Default)]
pub struct ForceSubsystem {
    elements: Vec<Force>,
}

impl ForceSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a force element and assigns its index. Required
    /// exactly once per element, before any realization.
    pub fn adopt(&mut self, force: impl Into<Force>) -> ForceIndex {
        self.elements.push(force.into());
        ForceIndex(self.elements.len() - 1)
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, index: ForceIndex) -> Option<&Force> {
        self.elements.get(index.0)
    }

    pub fn element_mut(&mut self, index: ForceIndex) -> Option<&mut Force> {
        self.elements.get_mut(index.0)
    }

    /// Lets every element reserve its state slots. Run once per state, after
    /// all elements are adopted.
    pub fn realize_topology(&mut self, state: &mut State) -> Result<(), ForceErrors> {
        for element in &mut self.elements {
            element.realize_topology(state)?;
        }
        Ok(())
    }

    /// Rebuilds Model-stage allocations (e.g. thermostat chains). Idempotent
    /// while the Model stage is unchanged; run again after any Model-stage
    /// parameter changes.
    pub fn realize_model(&self, state: &mut State) -> Result<(), ForceErrors> {
        for element in &self.elements {
            element.realize_model(state)?;
        }
        Ok(())
    }

    /// Runs the per-stage computation hooks for every element, up to and
    /// including `stage`.
    pub fn realize(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        stage: Stage,
    ) -> Result<(), ForceErrors> {
        if stage >= Stage::Position {
            for element in &self.elements {
                element.realize_position(matter, state)?;
            }
        }
        if stage >= Stage::Velocity {
            for element in &self.elements {
                element.realize_velocity(matter, state)?;
            }
        }
        if stage >= Stage::Dynamics {
            for element in &self.elements {
                element.realize_dynamics(matter, state)?;
            }
        }
        Ok(())
    }

    /// Accumulates every element's contribution. Elements only add, so the
    /// totals do not depend on adoption order.
    pub fn calc_forces(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        particle_forces: &mut [Vector3<f64>],
        mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        for element in &self.elements {
            element.calc_force(matter, state, body_forces, particle_forces, mobility_forces)?;
        }
        Ok(())
    }

    /// Total potential energy over all elements.
    pub fn calc_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        let mut pe = 0.0;
        for element in &self.elements {
            pe += element.calc_potential_energy(matter, state)?;
        }
        Ok(pe)
    }
}
