//! Translation/rotation/scale transforms.
//!
//! Scene nodes store their local transform as a matrix; [`Transform`] is the
//! decomposed form used when building one from separate components.
//!
//! # Example
//!
//! ```
//! use ember_scene::Transform;
//! use glam::Vec3;
//!
//! let local = Transform::new()
//!     .with_position(Vec3::new(1.0, 0.0, 0.0))
//!     .with_scale(Vec3::splat(2.0))
//!     .local_matrix();
//!
//! let p = local.transform_point3(Vec3::new(0.0, 1.0, 0.0));
//! assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
//! ```

use glam::{Mat4, Quat, Vec3};

/// A transform representing position, rotation, and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// `T * R * S`: scale first, then rotate, then translate.
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl From<Transform> for Mat4 {
    fn from(transform: Transform) -> Self {
        transform.local_matrix()
    }
}

/// Largest axis scale of `matrix`, measured as the length of its basis
/// vectors. Used to scale bounding-sphere radii into world space.
pub fn max_axis_scale(matrix: &Mat4) -> f32 {
    matrix
        .x_axis
        .truncate()
        .length()
        .max(matrix.y_axis.truncate().length())
        .max(matrix.z_axis.truncate().length())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_default_is_identity() {
        assert_eq!(Transform::new().local_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_trs_order() {
        let transform = Transform::new()
            .with_position(Vec3::new(0.0, 0.0, 5.0))
            .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))
            .with_scale(Vec3::splat(2.0));
        let expected = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))
            * Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))
            * Mat4::from_scale(Vec3::splat(2.0));
        assert!(Mat4::from(transform).abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_max_axis_scale_non_uniform() {
        let m = Mat4::from_scale(Vec3::new(1.0, 3.0, 2.0));
        assert!((max_axis_scale(&m) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_max_axis_scale_ignores_rotation_and_translation() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(0.5),
            Quat::from_rotation_z(1.0),
            Vec3::new(10.0, 0.0, 0.0),
        );
        assert!((max_axis_scale(&m) - 0.5).abs() < 1e-5);
    }
}
