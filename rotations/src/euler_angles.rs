use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Body-fixed (intrinsic) X-Y-Z Euler angles: rotate about x, then the
/// rotated y, then the twice-rotated z.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EulerAngles {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The 3×3 kinematic map N(q) taking the angular velocity of the rotated
    /// frame, expressed in the rotated frame, to the Euler angle rates:
    /// `qdot = N * w_body`.
    ///
    /// Its transpose maps generalized forces conjugate to the angle rates
    /// back to a real moment expressed in the rotated frame.
    ///
    /// Singular where cos(y) = 0; callers are responsible for staying away
    /// from the ±90° middle angle.
    pub fn rate_map(&self) -> Matrix3<f64> {
        let (sy, cy) = self.y.sin_cos();
        let (sz, cz) = self.z.sin_cos();
        Matrix3::new(
            cz / cy,
            -sz / cy,
            0.0,
            sz,
            cz,
            0.0,
            -cz * sy / cy,
            sz * sy / cy,
            1.0,
        )
    }
}
