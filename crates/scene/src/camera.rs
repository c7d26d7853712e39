//! Free-flying camera.
//!
//! The camera is described by a position and pitch/yaw angles. Movement input
//! sets a local-space velocity which [`Camera::update`] rotates into world
//! space. Mouse drags change the angles.

use ember_core::CameraSettings;
use glam::{Mat4, Quat, Vec3};

/// Radians of rotation per pixel of mouse drag, inverted.
const MOUSE_SENSITIVITY: f32 = 1.0 / 200.0;

/// Directional movement keys currently held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

/// A first-person camera.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Local-space velocity: -Z forward, +X right
    pub velocity: Vec3,
    /// Rotation around X in radians
    pub pitch: f32,
    /// Rotation around Y in radians
    pub yaw: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// World units per second at full velocity
    pub move_speed: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_settings(&CameraSettings::default())
    }
}

impl Camera {
    /// Create a camera at the origin looking down -Z.
    pub fn from_settings(settings: &CameraSettings) -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            pitch: 0.0,
            yaw: 0.0,
            fov_degrees: settings.fov_degrees,
            near: settings.near,
            far: settings.far,
            move_speed: settings.move_speed,
        }
    }

    /// Replace the velocity with the one implied by the held keys.
    pub fn set_move_input(&mut self, input: MoveInput) {
        let mut velocity = Vec3::ZERO;
        if input.forward {
            velocity.z -= 1.0;
        }
        if input.backward {
            velocity.z += 1.0;
        }
        if input.left {
            velocity.x -= 1.0;
        }
        if input.right {
            velocity.x += 1.0;
        }
        self.velocity = velocity;
    }

    /// Apply a mouse drag of `(dx, dy)` pixels.
    pub fn rotate_by_mouse(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * MOUSE_SENSITIVITY;
        self.pitch -= dy * MOUSE_SENSITIVITY;
    }

    /// Advance the position by `dt` seconds of the current velocity.
    pub fn update(&mut self, dt: f32) {
        let translation = self.rotation_matrix().transform_vector3(self.velocity);
        self.position += translation * dt * self.move_speed;
    }

    /// Yaw applied after pitch.
    pub fn rotation(&self) -> Quat {
        Quat::from_axis_angle(Vec3::Y, self.yaw) * Quat::from_axis_angle(Vec3::X, self.pitch)
    }

    pub fn rotation_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation())
    }

    /// Inverse of the camera's world transform.
    pub fn view_matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        (translation * self.rotation_matrix()).inverse()
    }

    /// Right-handed perspective with depth in 0..1 and Y flipped for Vulkan.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        perspective(self.fov_degrees, aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Direction the camera is looking in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }
}

/// Perspective projection in the engine's clip-space convention.
pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_degrees.to_radians(), aspect, near, far);
    // Flip Y for Vulkan coordinate system
    proj.y_axis.y *= -1.0;
    proj
}
