//! Scene lighting.

use glam::{Vec3, Vec4};

/// The sun: one directional light plus the ambient term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SunLight {
    /// Direction towards the sun (normalized on use)
    pub direction: Vec3,
    pub color: Vec3,
    /// Intensity multiplier
    pub power: f32,
    pub ambient: Vec3,
}

impl Default for SunLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, 1.0, 0.5),
            color: Vec3::ONE,
            power: 1.0,
            ambient: Vec3::splat(0.1),
        }
    }
}

impl SunLight {
    /// Unit vector pointing at the sun. Falls back to straight up for a zero
    /// direction.
    pub fn toward_sun(&self) -> Vec3 {
        self.direction.try_normalize().unwrap_or(Vec3::Y)
    }

    /// Direction packed with the power in `w`, as the shaders expect.
    pub fn direction_and_power(&self) -> Vec4 {
        self.toward_sun().extend(self.power)
    }

    pub fn color_rgba(&self) -> Vec4 {
        self.color.extend(1.0)
    }

    pub fn ambient_rgba(&self) -> Vec4 {
        self.ambient.extend(1.0)
    }
}
