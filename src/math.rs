//! Linear algebra primitives using glam, plus the bone basis/roll kernels.
//!
//! A bone is described by a direction (the second basis column, "up" in bone
//! space) and a roll about that direction. `vec_roll_to_basis` builds the full
//! 3x3 frame from that pair and `Mat3Roll::to_vec_roll` takes it apart again.
//! The single-precision thresholds below are load-bearing for compatibility
//! with existing assets; do not tighten them.

use std::f32::consts::FRAC_PI_2;

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::error::{ImportError, Result};

/// `1 + v.y` above this takes the general closed form
pub const THETA_THRESHOLD_NEGY_CLOSE: f32 = 1.0e-5;

/// `1 + v.y` above this (with a sideways component) takes the near -Y form
pub const THETA_THRESHOLD_NEGY: f32 = 1.0e-9;

/// Squared length below which a direction cannot be normalized
pub const DEGENERATE_LENGTH_SQ: f32 = 1.0e-12;

/// Build an orthonormal basis whose second column is `vec` (normalized),
/// rotated by `roll` radians about that column.
pub fn vec_roll_to_basis(vec: Vec3, roll: f32) -> Result<Mat3> {
    if !vec.is_finite() || vec.length_squared() < DEGENERATE_LENGTH_SQ {
        return Err(ImportError::validation(format!(
            "degenerate bone direction {}",
            vec
        )));
    }
    let nor = vec.normalize();
    let (x, y, z) = (nor.x, nor.y, nor.z);
    let theta = 1.0 + y;

    let basis = if theta > THETA_THRESHOLD_NEGY_CLOSE
        || ((x != 0.0 || z != 0.0) && theta > THETA_THRESHOLD_NEGY)
    {
        let (m00, m22, m02) = if theta > THETA_THRESHOLD_NEGY_CLOSE {
            (1.0 - x * x / theta, 1.0 - z * z / theta, -x * z / theta)
        } else {
            // Too close to -Y for the general form; use the 2D rotation that
            // avoids dividing by theta.
            let d = x * x + z * z;
            let m00 = (x + z) * (x - z) / -d;
            (m00, -m00, 2.0 * x * z / d)
        };
        Mat3::from_cols(
            Vec3::new(m00, -x, m02),
            Vec3::new(x, y, z),
            Vec3::new(m02, -z, m22),
        )
    } else {
        // Exactly -Y: half turn about Z
        Mat3::from_diagonal(Vec3::new(-1.0, -1.0, 1.0))
    };

    Ok(Mat3::from_axis_angle(nor, roll) * basis)
}

/// Extension trait for recovering bone direction and roll from a basis.
pub trait Mat3Roll {
    /// Split into `(second column, roll)` such that
    /// `vec_roll_to_basis(vec, roll)` reproduces the basis.
    fn to_vec_roll(&self) -> Result<(Vec3, f32)>;
}

impl Mat3Roll for Mat3 {
    fn to_vec_roll(&self) -> Result<(Vec3, f32)> {
        let vec = self.y_axis;
        let zero_roll = vec_roll_to_basis(vec, 0.0)?;
        let roll_mat = zero_roll.inverse() * *self;
        let roll = roll_mat.z_axis.x.atan2(roll_mat.z_axis.z);
        Ok((vec, roll))
    }
}

/// Engine-to-target coordinate correction: a quarter turn about the vertical
/// (engine Z) axis, applied on the right of engine-space matrices.
pub fn axis_correction() -> Mat4 {
    Mat4::from_rotation_z(-FRAC_PI_2)
}

/// Compose an engine-space matrix from rotation rows and a position.
///
/// The engine stores row vectors, so each stored row is a basis column here.
pub fn engine_matrix(rows: &[[f32; 3]; 3], position: [f32; 3]) -> Mat4 {
    Mat4::from_cols(
        Vec3::from(rows[0]).extend(0.0),
        Vec3::from(rows[1]).extend(0.0),
        Vec3::from(rows[2]).extend(0.0),
        Vec3::from(position).extend(1.0),
    )
}

/// Convert a stored row-major, row-vector 4x4 into a column-vector `Mat4`.
pub fn engine_matrix44(values: &[f32; 16]) -> Mat4 {
    // Reading row-major data as column-major is exactly the transpose.
    Mat4::from_cols_array(values)
}

/// Wrap an angle into (-PI, PI]
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
