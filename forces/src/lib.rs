//! Pluggable force elements for a multibody dynamics simulation.
//!
//! Each element reads the kinematic state through a [`matter::MatterModel`]
//! and a [`staged_state::State`] and accumulates its contribution into shared
//! body/particle/mobility force accumulators; conservative elements also
//! report a potential energy. Elements never call each other and only add
//! into the accumulators, so the result is independent of evaluation order.

pub mod bushing;
pub mod constant;
pub mod global_damper;
pub mod matter;
pub mod mobility;
pub mod subsystem;
pub mod thermostat;
pub mod two_point;
pub mod uniform_gravity;

use bushing::LinearBushing;
use constant::{ConstantForce, ConstantTorque};
use global_damper::GlobalDamper;
use matter::{MatterErrors, MatterModel};
use mobility::{MobilityConstantForce, MobilityLinearDamper, MobilityLinearSpring};
use nalgebra::{DVector, Vector3};
use spatial_algebra::SpatialForce;
use staged_state::State;
use std::fmt::Debug;
use thermostat::Thermostat;
use thiserror::Error;
use two_point::{TwoPointConstantForce, TwoPointLinearDamper, TwoPointLinearSpring};
use uniform_gravity::UniformGravity;

#[derive(Debug, Error)]
pub enum ForceErrors {
    #[error("damping coefficient cannot be negative, got {0}")]
    NegativeDamping(f64),
    #[error("boltzmann constant must be positive, got {0}")]
    NonPositiveBoltzmannConstant(f64),
    #[error("bath temperature must be positive, got {0}")]
    NonPositiveBathTemperature(f64),
    #[error("relaxation time must be positive, got {0}")]
    NonPositiveRelaxationTime(f64),
    #[error("thermostat must have at least one chain")]
    ZeroChainCount,
    #[error("chain state has {got} values but {chains} chains require {expected}")]
    ChainStateSizeMismatch {
        chains: usize,
        expected: usize,
        got: usize,
    },
    #[error("force element used before its topology was realized")]
    TopologyNotRealized,
    #[error("model stage has not been realized for this force element")]
    ModelNotRealized,
    #[error("{0}")]
    Matter(#[from] MatterErrors),
}

/// The force element contract. Implemented by every built-in element and by
/// external code plugging custom force laws in through [`Force::Custom`].
///
/// `calc_force` must only add into the accumulators it is handed, and
/// `calc_potential_energy` must be callable on its own, lazily completing
/// whatever minimum work it needs. The realize hooks run once per stage
/// transition, driven by the owning subsystem; the defaults do nothing.
pub trait ForceModel: Debug {
    /// Reserves this element's discrete variables and cache entries. Runs
    /// exactly once, before any other operation.
    fn realize_topology(&mut self, _state: &mut State) -> Result<(), ForceErrors> {
        Ok(())
    }

    /// Reserves variable-size continuous state once Model-stage parameters
    /// are fixed. Re-run by the subsystem whenever the Model stage was
    /// invalidated; must be a no-op while its allocations are still valid.
    fn realize_model(&self, _state: &mut State) -> Result<(), ForceErrors> {
        Ok(())
    }

    fn realize_position(
        &self,
        _matter: &dyn MatterModel,
        _state: &State,
    ) -> Result<(), ForceErrors> {
        Ok(())
    }

    fn realize_velocity(
        &self,
        _matter: &dyn MatterModel,
        _state: &State,
    ) -> Result<(), ForceErrors> {
        Ok(())
    }

    fn realize_dynamics(
        &self,
        _matter: &dyn MatterModel,
        _state: &State,
    ) -> Result<(), ForceErrors> {
        Ok(())
    }

    /// Adds this element's contribution into the shared accumulators: one
    /// spatial force per body about the body origin in the ground frame, one
    /// 3-vector per free particle, one generalized force per mobility.
    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        particle_forces: &mut [Vector3<f64>],
        mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors>;

    /// Potential energy stored in this element; zero for non-conservative
    /// elements.
    fn calc_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors>;
}

/// A force element: one of the built-in variants, or an external
/// implementation of [`ForceModel`] plugged in unchanged.
#[derive(Debug)]
pub enum Force {
    TwoPointLinearSpring(TwoPointLinearSpring),
    TwoPointLinearDamper(TwoPointLinearDamper),
    TwoPointConstantForce(TwoPointConstantForce),
    MobilityLinearSpring(MobilityLinearSpring),
    MobilityLinearDamper(MobilityLinearDamper),
    MobilityConstantForce(MobilityConstantForce),
    LinearBushing(LinearBushing),
    ConstantForce(ConstantForce),
    ConstantTorque(ConstantTorque),
    GlobalDamper(GlobalDamper),
    Thermostat(Thermostat),
    UniformGravity(UniformGravity),
    Custom(Box<dyn ForceModel>),
}

impl ForceModel for Force {
    fn realize_topology(&mut self, state: &mut State) -> Result<(), ForceErrors> {
        match self {
            Force::TwoPointLinearSpring(f) => f.realize_topology(state),
            Force::TwoPointLinearDamper(f) => f.realize_topology(state),
            Force::TwoPointConstantForce(f) => f.realize_topology(state),
            Force::MobilityLinearSpring(f) => f.realize_topology(state),
            Force::MobilityLinearDamper(f) => f.realize_topology(state),
            Force::MobilityConstantForce(f) => f.realize_topology(state),
            Force::LinearBushing(f) => f.realize_topology(state),
            Force::ConstantForce(f) => f.realize_topology(state),
            Force::ConstantTorque(f) => f.realize_topology(state),
            Force::GlobalDamper(f) => f.realize_topology(state),
            Force::Thermostat(f) => f.realize_topology(state),
            Force::UniformGravity(f) => f.realize_topology(state),
            Force::Custom(f) => f.realize_topology(state),
        }
    }

    fn realize_model(&self, state: &mut State) -> Result<(), ForceErrors> {
        match self {
            Force::TwoPointLinearSpring(f) => f.realize_model(state),
            Force::TwoPointLinearDamper(f) => f.realize_model(state),
            Force::TwoPointConstantForce(f) => f.realize_model(state),
            Force::MobilityLinearSpring(f) => f.realize_model(state),
            Force::MobilityLinearDamper(f) => f.realize_model(state),
            Force::MobilityConstantForce(f) => f.realize_model(state),
            Force::LinearBushing(f) => f.realize_model(state),
            Force::ConstantForce(f) => f.realize_model(state),
            Force::ConstantTorque(f) => f.realize_model(state),
            Force::GlobalDamper(f) => f.realize_model(state),
            Force::Thermostat(f) => f.realize_model(state),
            Force::UniformGravity(f) => f.realize_model(state),
            Force::Custom(f) => f.realize_model(state),
        }
    }

    fn realize_position(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<(), ForceErrors> {
        match self {
            Force::TwoPointLinearSpring(f) => f.realize_position(matter, state),
            Force::TwoPointLinearDamper(f) => f.realize_position(matter, state),
            Force::TwoPointConstantForce(f) => f.realize_position(matter, state),
            Force::MobilityLinearSpring(f) => f.realize_position(matter, state),
            Force::MobilityLinearDamper(f) => f.realize_position(matter, state),
            Force::MobilityConstantForce(f) => f.realize_position(matter, state),
            Force::LinearBushing(f) => f.realize_position(matter, state),
            Force::ConstantForce(f) => f.realize_position(matter, state),
            Force::ConstantTorque(f) => f.realize_position(matter, state),
            Force::GlobalDamper(f) => f.realize_position(matter, state),
            Force::Thermostat(f) => f.realize_position(matter, state),
            Force::UniformGravity(f) => f.realize_position(matter, state),
            Force::Custom(f) => f.realize_position(matter, state),
        }
    }

    fn realize_velocity(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<(), ForceErrors> {
        match self {
            Force::TwoPointLinearSpring(f) => f.realize_velocity(matter, state),
            Force::TwoPointLinearDamper(f) => f.realize_velocity(matter, state),
            Force::TwoPointConstantForce(f) => f.realize_velocity(matter, state),
            Force::MobilityLinearSpring(f) => f.realize_velocity(matter, state),
            Force::MobilityLinearDamper(f) => f.realize_velocity(matter, state),
            Force::MobilityConstantForce(f) => f.realize_velocity(matter, state),
            Force::LinearBushing(f) => f.realize_velocity(matter, state),
            Force::ConstantForce(f) => f.realize_velocity(matter, state),
            Force::ConstantTorque(f) => f.realize_velocity(matter, state),
            Force::GlobalDamper(f) => f.realize_velocity(matter, state),
            Force::Thermostat(f) => f.realize_velocity(matter, state),
            Force::UniformGravity(f) => f.realize_velocity(matter, state),
            Force::Custom(f) => f.realize_velocity(matter, state),
        }
    }

    fn realize_dynamics(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<(), ForceErrors> {
        match self {
            Force::TwoPointLinearSpring(f) => f.realize_dynamics(matter, state),
            Force::TwoPointLinearDamper(f) => f.realize_dynamics(matter, state),
            Force::TwoPointConstantForce(f) => f.realize_dynamics(matter, state),
            Force::MobilityLinearSpring(f) => f.realize_dynamics(matter, state),
            Force::MobilityLinearDamper(f) => f.realize_dynamics(matter, state),
            Force::MobilityConstantForce(f) => f.realize_dynamics(matter, state),
            Force::LinearBushing(f) => f.realize_dynamics(matter, state),
            Force::ConstantForce(f) => f.realize_dynamics(matter, state),
            Force::ConstantTorque(f) => f.realize_dynamics(matter, state),
            Force::GlobalDamper(f) => f.realize_dynamics(matter, state),
            Force::Thermostat(f) => f.realize_dynamics(matter, state),
            Force::UniformGravity(f) => f.realize_dynamics(matter, state),
            Force::Custom(f) => f.realize_dynamics(matter, state),
        }
    }

    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        particle_forces: &mut [Vector3<f64>],
        mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        match self {
            Force::TwoPointLinearSpring(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::TwoPointLinearDamper(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::TwoPointConstantForce(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::MobilityLinearSpring(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::MobilityLinearDamper(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::MobilityConstantForce(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::LinearBushing(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::ConstantForce(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::ConstantTorque(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::GlobalDamper(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::Thermostat(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::UniformGravity(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
            Force::Custom(f) => {
                f.calc_force(matter, state, body_forces, particle_forces, mobility_forces)
            }
        }
    }

    fn calc_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        match self {
            Force::TwoPointLinearSpring(f) => f.calc_potential_energy(matter, state),
            Force::TwoPointLinearDamper(f) => f.calc_potential_energy(matter, state),
            Force::TwoPointConstantForce(f) => f.calc_potential_energy(matter, state),
            Force::MobilityLinearSpring(f) => f.calc_potential_energy(matter, state),
            Force::MobilityLinearDamper(f) => f.calc_potential_energy(matter, state),
            Force::MobilityConstantForce(f) => f.calc_potential_energy(matter, state),
            Force::LinearBushing(f) => f.calc_potential_energy(matter, state),
            Force::ConstantForce(f) => f.calc_potential_energy(matter, state),
            Force::ConstantTorque(f) => f.calc_potential_energy(matter, state),
            Force::GlobalDamper(f) => f.calc_potential_energy(matter, state),
            Force::Thermostat(f) => f.calc_potential_energy(matter, state),
            Force::UniformGravity(f) => f.calc_potential_energy(matter, state),
            Force::Custom(f) => f.calc_potential_energy(matter, state),
        }
    }
}

impl From<TwoPointLinearSpring> for Force {
    fn from(value: TwoPointLinearSpring) -> Self {
        Force::TwoPointLinearSpring(value)
    }
}
impl From<TwoPointLinearDamper> for Force {
    fn from(value: TwoPointLinearDamper) -> Self {
        Force::TwoPointLinearDamper(value)
    }
}
impl From<TwoPointConstantForce> for Force {
    fn from(value: TwoPointConstantForce) -> Self {
        Force::TwoPointConstantForce(value)
    }
}
impl From<MobilityLinearSpring> for Force {
    fn from(value: MobilityLinearSpring) -> Self {
        Force::MobilityLinearSpring(value)
    }
}
impl From<MobilityLinearDamper> for Force {
    fn from(value: MobilityLinearDamper) -> Self {
        Force::MobilityLinearDamper(value)
    }
}
impl From<MobilityConstantForce> for Force {
    fn from(value: MobilityConstantForce) -> Self {
        Force::MobilityConstantForce(value)
    }
}
impl From<LinearBushing> for Force {
    fn from(value: LinearBushing) -> Self {
        Force::LinearBushing(value)
    }
}
impl From<ConstantForce> for Force {
    fn from(value: ConstantForce) -> Self {
        Force::ConstantForce(value)
    }
}
impl From<ConstantTorque> for Force {
    fn from(value: ConstantTorque) -> Self {
        Force::ConstantTorque(value)
    }
}
impl From<GlobalDamper> for Force {
    fn from(value: GlobalDamper) -> Self {
        Force::GlobalDamper(value)
    }
}
impl From<Thermostat> for Force {
    fn from(value: Thermostat) -> Self {
        Force::Thermostat(value)
    }
}
impl From<UniformGravity> for Force {
    fn from(value: UniformGravity) -> Self {
        Force::UniformGravity(value)
    }
}
impl From<Box<dyn ForceModel>> for Force {
    fn from(value: Box<dyn ForceModel>) -> Self {
        Force::Custom(value)
    }
}
