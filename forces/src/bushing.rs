//! Six-axis spring-damper connecting a frame F fixed on body A to a frame M
//! fixed on body B. The six generalized coordinates are the body-fixed X-Y-Z
//! Euler angles of the relative rotation R_FM followed by the components of
//! the relative translation p_FM, and the stiffness/damping matrices are
//! diagonal in that basis.

use crate::{matter::MatterModel, ForceErrors, ForceModel};
use nalgebra::{DVector, Vector3, Vector6};
use rotations::EulerAngles;
use serde::{Deserialize, Serialize};
use spatial_algebra::{SpatialForce, SpatialVelocity};
use staged_state::{CacheHandle, Stage, State};
use transforms::Transform;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PositionCache {
    /// Frame F in ground.
    pub x_gf: Transform,
    /// Frame M in ground.
    pub x_gm: Transform,
    /// M measured from F.
    pub x_fm: Transform,
    /// Ground-frame offsets of F from A's origin, M from B's origin, and M
    /// from F's origin.
    pub p_af_g: Vector3<f64>,
    pub p_bm_g: Vector3<f64>,
    pub p_fm_g: Vector3<f64>,
    /// The six generalized coordinates: three Euler angles, three
    /// translations.
    pub q: Vector6<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VelocityCache {
    pub v_gf: SpatialVelocity,
    pub v_gm: SpatialVelocity,
    /// Velocity of M in F, derivative taken in F, expressed in F.
    pub v_fm: SpatialVelocity,
    pub qdot: Vector6<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ForceCache {
    /// Generalized force on the six coordinates (acts on body B).
    pub f: Vector6<f64>,
    /// Spatial force on body B at M's origin, in ground.
    pub f_gm: SpatialForce,
    /// Spatial force on body A at F's origin, in ground.
    pub f_gf: SpatialForce,
    /// The same pair shifted to the body origins.
    pub f_gb: SpatialForce,
    pub f_ga: SpatialForce,
}

#[derive(Clone, Copy, Debug)]
struct BushingSlots {
    position: CacheHandle<PositionCache>,
    velocity: CacheHandle<VelocityCache>,
    force: CacheHandle<ForceCache>,
    energy: CacheHandle<f64>,
}

/// A compliant 6-DOF connector (bushing) between two body-fixed frames.
///
/// Coincident frames (q = 0) produce exactly zero force and energy; zero
/// stiffness or damping on any axis is legal. The Euler decomposition is
/// singular when the middle angle reaches ±90°, which is outside the
/// intended small-ish rotation regime and not guarded.
#[derive(Debug)]
pub struct LinearBushing {
    body_a: usize,
    frame_a: Transform,
    body_b: usize,
    frame_b: Transform,
    stiffness: Vector6<f64>,
    damping: Vector6<f64>,
    slots: Option<BushingSlots>,
}

impl LinearBushing {
    /// Connects frame F on body A (at offset `frame_a`) to frame M on body B
    /// (at offset `frame_b`). Per-axis damping must be non-negative.
    pub fn new(
        body_a: usize,
        frame_a: Transform,
        body_b: usize,
        frame_b: Transform,
        stiffness: Vector6<f64>,
        damping: Vector6<f64>,
    ) -> Result<Self, ForceErrors> {
        for i in 0..6 {
            if damping[i] < 0.0 {
                return Err(ForceErrors::NegativeDamping(damping[i]));
            }
        }
        Ok(Self {
            body_a,
            frame_a,
            body_b,
            frame_b,
            stiffness,
            damping,
            slots: None,
        })
    }

    /// Both frames at the body origins.
    pub fn between_body_frames(
        body_a: usize,
        body_b: usize,
        stiffness: Vector6<f64>,
        damping: Vector6<f64>,
    ) -> Result<Self, ForceErrors> {
        Self::new(
            body_a,
            Transform::identity(),
            body_b,
            Transform::identity(),
            stiffness,
            damping,
        )
    }

    fn slots(&self) -> Result<&BushingSlots, ForceErrors> {
        self.slots.as_ref().ok_or(ForceErrors::TopologyNotRealized)
    }

    fn ensure_position_cache(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<PositionCache, ForceErrors> {
        let slots = self.slots()?;
        if let Some(pc) = state.cache(&slots.position) {
            return Ok(*pc);
        }

        let x_ga = matter.body_transform(state, self.body_a);
        let x_gb = matter.body_transform(state, self.body_b);
        let x_gf = x_ga * self.frame_a;
        let x_gm = x_gb * self.frame_b;
        let x_fm = x_gf.inv() * x_gm;

        // constant local offsets, re-expressed in ground
        let p_af_g = x_ga.rotation * self.frame_a.translation;
        let p_bm_g = x_gb.rotation * self.frame_b.translation;
        let p_fm_g = x_gf.rotation * x_fm.translation;

        let angles = x_fm.rotation.body_fixed_xyz();
        let mut q = Vector6::zeros();
        q[0] = angles.x;
        q[1] = angles.y;
        q[2] = angles.z;
        q.fixed_rows_mut::<3>(3).copy_from(&x_fm.translation);

        let pc = PositionCache {
            x_gf,
            x_gm,
            x_fm,
            p_af_g,
            p_bm_g,
            p_fm_g,
            q,
        };
        state.set_cache(&slots.position, pc);
        Ok(pc)
    }

    fn ensure_velocity_cache(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<VelocityCache, ForceErrors> {
        let slots = self.slots()?;
        if let Some(vc) = state.cache(&slots.velocity) {
            return Ok(*vc);
        }

        let pc = self.ensure_position_cache(matter, state)?;

        let v_ga = matter.body_velocity(state, self.body_a);
        let v_gb = matter.body_velocity(state, self.body_b);
        let v_gf = v_ga.shifted(pc.p_af_g);
        let v_gm = v_gb.shifted(pc.p_bm_g);

        // velocity of M in F with the derivative still taken in ground;
        // subtracting w_GF x p_FM moves the derivative into F, then both
        // components are re-expressed in F
        let v_fm_g = v_gm - v_gf;
        let r_fg = pc.x_gf.rotation.transpose();
        let v_fm = SpatialVelocity::new(
            v_fm_g.angular,
            v_fm_g.linear - v_gf.angular.cross(&pc.p_fm_g),
        )
        .rotated_by(&r_fg);

        // angular velocity must be expressed in M for the kinematic map
        let w_fm_m = pc.x_fm.rotation.transpose() * v_fm.angular;
        let n = EulerAngles::new(pc.q[0], pc.q[1], pc.q[2]).rate_map();

        let mut qdot = Vector6::zeros();
        qdot.fixed_rows_mut::<3>(0).copy_from(&(n * w_fm_m));
        qdot.fixed_rows_mut::<3>(3).copy_from(&v_fm.linear);

        let vc = VelocityCache {
            v_gf,
            v_gm,
            v_fm,
            qdot,
        };
        state.set_cache(&slots.velocity, vc);
        Ok(vc)
    }

    /// Computes the force cache; potential energy falls out of the stiffness
    /// term for free, so it is cached here as well.
    fn ensure_force_cache(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<ForceCache, ForceErrors> {
        let slots = self.slots()?;
        if let Some(fc) = state.cache(&slots.force) {
            return Ok(*fc);
        }

        let pc = self.ensure_position_cache(matter, state)?;

        let mut fk = Vector6::zeros();
        let mut pe2 = 0.0;
        for i in 0..6 {
            fk[i] = self.stiffness[i] * pc.q[i];
            pe2 += fk[i] * pc.q[i];
        }
        state.set_cache(&slots.energy, pe2 / 2.0);

        let vc = self.ensure_velocity_cache(matter, state)?;
        let fv = self.damping.component_mul(&vc.qdot);

        // generalized force on body B
        let f = -(fk + fv);
        let f_rot = f.fixed_rows::<3>(0).into_owned();
        let f_trans = f.fixed_rows::<3>(3).into_owned();

        // The kinematic map N takes the M-frame angular velocity to qdot, so
        // its transpose takes the q-space generalized force back to a real
        // moment, expressed in M.
        let n = EulerAngles::new(pc.q[0], pc.q[1], pc.q[2]).rate_map();
        let m_b_m = n.transpose() * f_rot;
        let m_b_g = pc.x_gm.rotation * m_b_m;

        // The translational components act at M's origin but are expressed
        // in F; rotate to ground. The reaction on A acts at F's origin along
        // the same line of action, so no moment correction is needed there.
        let f_m_g = pc.x_gf.rotation * f_trans;

        let f_gm = SpatialForce::new(m_b_g, f_m_g);
        let f_gf = -f_gm;
        let f_gb = f_gm.shifted(pc.p_bm_g);
        let f_ga = f_gf.shifted(pc.p_af_g);

        let fc = ForceCache {
            f,
            f_gm,
            f_gf,
            f_gb,
            f_ga,
        };
        state.set_cache(&slots.force, fc);
        Ok(fc)
    }

    /// Only runs the position-stage work; used when energy is requested
    /// without the force having been computed.
    fn ensure_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        let slots = self.slots()?;
        if let Some(pe) = state.cache(&slots.energy) {
            return Ok(*pe);
        }

        let pc = self.ensure_position_cache(matter, state)?;
        let mut pe2 = 0.0;
        for i in 0..6 {
            pe2 += self.stiffness[i] * pc.q[i] * pc.q[i];
        }
        let pe = pe2 / 2.0;
        state.set_cache(&slots.energy, pe);
        Ok(pe)
    }

    /// The six generalized coordinates (Euler angles, then translation).
    pub fn q(&self, matter: &dyn MatterModel, state: &State) -> Result<Vector6<f64>, ForceErrors> {
        Ok(self.ensure_position_cache(matter, state)?.q)
    }

    pub fn qdot(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<Vector6<f64>, ForceErrors> {
        Ok(self.ensure_velocity_cache(matter, state)?.qdot)
    }

    /// Pose of M measured from F.
    pub fn x_fm(&self, matter: &dyn MatterModel, state: &State) -> Result<Transform, ForceErrors> {
        Ok(self.ensure_position_cache(matter, state)?.x_fm)
    }

    /// Velocity of M in F, expressed in F.
    pub fn v_fm(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<SpatialVelocity, ForceErrors> {
        Ok(self.ensure_velocity_cache(matter, state)?.v_fm)
    }

    /// Generalized force on the six coordinates.
    pub fn generalized_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<Vector6<f64>, ForceErrors> {
        Ok(self.ensure_force_cache(matter, state)?.f)
    }

    /// Spatial force applied to body B at M's origin, in ground.
    pub fn force_on_m(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<SpatialForce, ForceErrors> {
        Ok(self.ensure_force_cache(matter, state)?.f_gm)
    }

    /// Spatial force applied to body A at F's origin, in ground.
    pub fn force_on_f(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<SpatialForce, ForceErrors> {
        Ok(self.ensure_force_cache(matter, state)?.f_gf)
    }

    pub fn potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        self.ensure_potential_energy(matter, state)
    }
}

impl ForceModel for LinearBushing {
    fn realize_topology(&mut self, state: &mut State) -> Result<(), ForceErrors> {
        self.slots = Some(BushingSlots {
            position: state.allocate_cache(Stage::Position),
            velocity: state.allocate_cache(Stage::Velocity),
            force: state.allocate_cache(Stage::Velocity),
            energy: state.allocate_cache(Stage::Position),
        });
        Ok(())
    }

    fn realize_position(&self, matter: &dyn MatterModel, state: &State) -> Result<(), ForceErrors> {
        self.ensure_position_cache(matter, state)?;
        Ok(())
    }

    fn realize_velocity(&self, matter: &dyn MatterModel, state: &State) -> Result<(), ForceErrors> {
        self.ensure_velocity_cache(matter, state)?;
        Ok(())
    }

    fn realize_dynamics(&self, matter: &dyn MatterModel, state: &State) -> Result<(), ForceErrors> {
        self.ensure_force_cache(matter, state)?;
        Ok(())
    }

    fn calc_force(
        &self,
        matter: &dyn MatterModel,
        state: &State,
        body_forces: &mut [SpatialForce],
        _particle_forces: &mut [Vector3<f64>],
        _mobility_forces: &mut DVector<f64>,
    ) -> Result<(), ForceErrors> {
        let fc = self.ensure_force_cache(matter, state)?;
        body_forces[self.body_b] += fc.f_gb;
        body_forces[self.body_a] += fc.f_ga;
        Ok(())
    }

    fn calc_potential_energy(
        &self,
        matter: &dyn MatterModel,
        state: &State,
    ) -> Result<f64, ForceErrors> {
        self.ensure_potential_energy(matter, state)
    }
}
