//! View-frustum planes and sphere culling.
//!
//! Planes are extracted from a combined view-projection matrix in the
//! engine's clip-space convention (depth 0..1). Each plane is normalized so
//! that `normal.dot(p) + distance` is the signed distance of `p` in world
//! units, positive on the inside.
//!
//! # Example
//!
//! ```
//! use ember_scene::camera::perspective;
//! use ember_scene::{Bounds, Frustum};
//! use glam::{Mat4, Vec3};
//!
//! let frustum = Frustum::from_view_projection(&perspective(70.0, 1.0, 0.1, 100.0));
//! let bounds = Bounds { origin: Vec3::ZERO, extents: Vec3::splat(0.5), sphere_radius: 1.0 };
//!
//! let ahead = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
//! let behind = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
//! assert!(frustum.is_visible(&bounds, &ahead));
//! assert!(!frustum.is_visible(&bounds, &behind));
//! ```

use glam::{Mat4, Vec3, Vec4};

use crate::render_object::Bounds;
use crate::transform::max_axis_scale;

/// A plane `normal.dot(p) + distance = 0` with a unit-length normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Plane from raw `(a, b, c, d)` coefficients, normalized.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let length = normal.length();
        if length <= f32::EPSILON {
            return Self {
                normal: Vec3::ZERO,
                distance: coefficients.w,
            };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Index of each plane in [`Frustum::planes`].
pub const LEFT: usize = 0;
pub const RIGHT: usize = 1;
pub const BOTTOM: usize = 2;
pub const TOP: usize = 3;
pub const NEAR: usize = 4;
pub const FAR: usize = 5;

/// The six clip planes of a camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts left, right, bottom, top, near and far planes from `view_proj`.
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let mut planes = [Plane {
            normal: Vec3::ZERO,
            distance: 0.0,
        }; 6];
        planes[LEFT] = Plane::from_coefficients(r3 + r0);
        planes[RIGHT] = Plane::from_coefficients(r3 - r0);
        planes[BOTTOM] = Plane::from_coefficients(r3 + r1);
        planes[TOP] = Plane::from_coefficients(r3 - r1);
        // Depth is 0..1, so the near plane is z >= 0 rather than z >= -w.
        planes[NEAR] = Plane::from_coefficients(r2);
        planes[FAR] = Plane::from_coefficients(r3 - r2);

        Self { planes }
    }

    /// Conservative sphere test: `false` only if the sphere lies entirely
    /// outside at least one plane.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Tests `bounds` placed in the world by `transform`. The radius is scaled
    /// by the transform's largest axis scale.
    pub fn is_visible(&self, bounds: &Bounds, transform: &Mat4) -> bool {
        let center = transform.transform_point3(bounds.origin);
        let radius = bounds.sphere_radius * max_axis_scale(transform);
        self.intersects_sphere(center, radius)
    }
}
