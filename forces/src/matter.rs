use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use spatial_algebra::SpatialVelocity;
use staged_state::State;
use thiserror::Error;
use transforms::Transform;

#[derive(Debug, Error)]
pub enum MatterErrors {
    #[error("mass cannot be less than or equal to zero")]
    MassLessThanOrEqualToZero,
}

/// The mass and center of mass of one body, in the body frame.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MassProperties {
    mass: f64,
    center_of_mass: Vector3<f64>,
}

impl MassProperties {
    pub fn new(mass: f64, center_of_mass: Vector3<f64>) -> Result<Self, MatterErrors> {
        if mass <= f64::EPSILON {
            return Err(MatterErrors::MassLessThanOrEqualToZero);
        }
        Ok(Self {
            mass,
            center_of_mass,
        })
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn center_of_mass(&self) -> Vector3<f64> {
        self.center_of_mass
    }
}

/// What the force elements consume from the kinematics engine. Body 0 is the
/// ground/reference body by convention.
///
/// Kinematic quantities are functions of the passed state; topology-level
/// counts and the mobility layout are fixed after setup.
pub trait MatterModel {
    fn num_bodies(&self) -> usize;

    fn num_particles(&self) -> usize {
        0
    }

    /// Number of acceleration-level constraint equations. Constraint
    /// redundancy is not accounted for.
    fn num_acceleration_constraints(&self) -> usize {
        0
    }

    /// Pose of the body frame in the ground frame.
    fn body_transform(&self, state: &State, body: usize) -> Transform;

    /// Spatial velocity of the body frame, expressed in the ground frame.
    fn body_velocity(&self, state: &State, body: usize) -> SpatialVelocity;

    fn body_mass_properties(&self, state: &State, body: usize) -> MassProperties;

    /// Ground-frame velocity of a station fixed on a body, given in the body
    /// frame.
    fn station_velocity(&self, state: &State, body: usize, station: Vector3<f64>) -> Vector3<f64> {
        let x_gb = self.body_transform(state, body);
        let v_gb = self.body_velocity(state, body);
        v_gb.shifted(x_gb.rotation * station).linear
    }

    fn particle_mass(&self, state: &State, particle: usize) -> f64;

    fn particle_position(&self, state: &State, particle: usize) -> Vector3<f64>;

    /// Flat index into q/u and the mobility-force accumulator for one
    /// coordinate of one body's joint.
    fn mobility_index(&self, body: usize, coordinate: usize) -> usize;

    /// Mass matrix times an arbitrary speed-dimension vector.
    fn mass_matrix_mul(&self, state: &State, u: &DVector<f64>) -> DVector<f64>;
}

/// A matter model whose body kinematics are assigned directly rather than
/// computed from q, with a diagonal mass matrix over the mobilities. Handy
/// for tests and for evaluating force laws against externally produced
/// poses.
///
/// Because poses and velocities bypass the state, callers that mutate them
/// must invalidate the Position (or Velocity) stage themselves before
/// re-evaluating cached elements.
#[derive(Debug)]
pub struct PrescribedMatter {
    bodies: Vec<PrescribedBody>,
    particles: Vec<PrescribedParticle>,
    speed_masses: Vec<f64>,
    acceleration_constraints: usize,
}

impl Default for PrescribedMatter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct PrescribedBody {
    pub transform: Transform,
    pub velocity: SpatialVelocity,
    pub mass_properties: MassProperties,
    mobility_start: usize,
    num_mobilities: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct PrescribedParticle {
    pub mass: f64,
    pub position: Vector3<f64>,
}

impl PrescribedMatter {
    /// Starts with the ground body at index 0; its mass properties are a
    /// placeholder that no element consults.
    pub fn new() -> Self {
        Self {
            bodies: vec![PrescribedBody {
                transform: Transform::identity(),
                velocity: SpatialVelocity::zero(),
                mass_properties: MassProperties {
                    mass: 1.0,
                    center_of_mass: Vector3::zeros(),
                },
                mobility_start: 0,
                num_mobilities: 0,
            }],
            particles: Vec::new(),
            speed_masses: Vec::new(),
            acceleration_constraints: 0,
        }
    }

    /// Adds a body with one diagonal mass-matrix entry per mobility and
    /// returns its index.
    pub fn add_body(
        &mut self,
        transform: Transform,
        velocity: SpatialVelocity,
        mass_properties: MassProperties,
        mobility_masses: &[f64],
    ) -> usize {
        let mobility_start = self.speed_masses.len();
        self.speed_masses.extend_from_slice(mobility_masses);
        self.bodies.push(PrescribedBody {
            transform,
            velocity,
            mass_properties,
            mobility_start,
            num_mobilities: mobility_masses.len(),
        });
        self.bodies.len() - 1
    }

    pub fn add_particle(&mut self, mass: f64, position: Vector3<f64>) -> usize {
        self.particles.push(PrescribedParticle { mass, position });
        self.particles.len() - 1
    }

    pub fn body_mut(&mut self, body: usize) -> &mut PrescribedBody {
        &mut self.bodies[body]
    }

    pub fn particle_mut(&mut self, particle: usize) -> &mut PrescribedParticle {
        &mut self.particles[particle]
    }

    pub fn set_acceleration_constraints(&mut self, count: usize) {
        self.acceleration_constraints = count;
    }

    pub fn num_speeds(&self) -> usize {
        self.speed_masses.len()
    }
}

impl MatterModel for PrescribedMatter {
    fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    fn num_particles(&self) -> usize {
        self.particles.len()
    }

    fn num_acceleration_constraints(&self) -> usize {
        self.acceleration_constraints
    }

    fn body_transform(&self, _state: &State, body: usize) -> Transform {
        self.bodies[body].transform
    }

    fn body_velocity(&self, _state: &State, body: usize) -> SpatialVelocity {
        self.bodies[body].velocity
    }

    fn body_mass_properties(&self, _state: &State, body: usize) -> MassProperties {
        self.bodies[body].mass_properties
    }

    fn particle_mass(&self, _state: &State, particle: usize) -> f64 {
        self.particles[particle].mass
    }

    fn particle_position(&self, _state: &State, particle: usize) -> Vector3<f64> {
        self.particles[particle].position
    }

    fn mobility_index(&self, body: usize, coordinate: usize) -> usize {
        let b = &self.bodies[body];
        if coordinate >= b.num_mobilities {
            panic!(
                "body {} has {} mobilities, coordinate {} does not exist",
                body, b.num_mobilities, coordinate
            );
        }
        b.mobility_start + coordinate
    }

    fn mass_matrix_mul(&self, _state: &State, u: &DVector<f64>) -> DVector<f64> {
        if u.len() != self.speed_masses.len() {
            panic!(
                "speed vector has {} entries but the model has {} mobilities",
                u.len(),
                self.speed_masses.len()
            );
        }
        DVector::from_iterator(
            u.len(),
            u.iter().zip(&self.speed_masses).map(|(ui, mi)| ui * mi),
        )
    }
}
