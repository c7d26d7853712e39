//! Cascaded shadow map splits and light matrices.
//!
//! The camera frustum is cut into depth slices. Each slice gets an
//! orthographic light-space projection that tightly fits its eight corners,
//! widened along the light direction so casters outside the slice still land
//! in the shadow map.
//!
//! # Example
//!
//! ```
//! use ember_scene::cascade::split_distances;
//!
//! let splits = split_distances(0.1, 100.0, 4, 0.5);
//! assert_eq!(splits.len(), 4);
//! assert_eq!(*splits.last().unwrap(), 100.0);
//! ```

use ember_core::MAX_CASCADES;
use glam::{Mat4, Vec3, Vec4};

/// Per-cascade parameters that do not change from frame to frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeParams {
    /// Number of cascades to compute, at most [`MAX_CASCADES`].
    pub count: u32,
    /// Blend between logarithmic (1.0) and uniform (0.0) splits.
    pub lambda: f32,
    /// Factor applied to the light-space depth range.
    pub z_multiplier: f32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            count: MAX_CASCADES,
            lambda: 0.5,
            z_multiplier: 10.0,
        }
    }
}

/// Camera state the cascades are fitted to.
#[derive(Clone, Copy, Debug)]
pub struct CascadeView {
    pub view: Mat4,
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

/// Light matrices and far split distances, one entry per cascade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeData {
    pub light_matrices: [Mat4; MAX_CASCADES as usize],
    pub split_distances: [f32; MAX_CASCADES as usize],
    pub count: u32,
}

impl Default for CascadeData {
    fn default() -> Self {
        Self {
            light_matrices: [Mat4::IDENTITY; MAX_CASCADES as usize],
            split_distances: [0.0; MAX_CASCADES as usize],
            count: 0,
        }
    }
}

impl CascadeData {
    /// Split distances packed into a vector for the scene uniform.
    pub fn splits_vec4(&self) -> Vec4 {
        Vec4::from_array(self.split_distances)
    }
}

/// Far split distance of each cascade.
///
/// Cascade `i` (1-based) ends at
/// `λ·n·(f/n)^(i/C) + (1−λ)·(n + (f−n)·i/C)`; the last one ends at `far`.
pub fn split_distances(near: f32, far: f32, count: u32, lambda: f32) -> Vec<f32> {
    (1..=count)
        .map(|i| {
            if i == count {
                return far;
            }
            let p = i as f32 / count as f32;
            let log = near * (far / near).powf(p);
            let uniform = near + (far - near) * p;
            lambda * log + (1.0 - lambda) * uniform
        })
        .collect()
}

/// World-space corners of the camera frustum between `near` and `far`.
///
/// The first four corners lie on the near plane.
pub fn frustum_corners(view: &CascadeView, near: f32, far: f32) -> [Vec3; 8] {
    let proj = Mat4::perspective_rh(view.fov_degrees.to_radians(), view.aspect, near, far);
    let inv = (proj * view.view).inverse();

    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for z in [0.0, 1.0] {
        for y in [-1.0, 1.0] {
            for x in [-1.0, 1.0] {
                corners[i] = inv.project_point3(Vec3::new(x, y, z));
                i += 1;
            }
        }
    }
    corners
}

/// Orthographic light view-projection enclosing `corners`, looking along
/// `-toward_sun`.
pub fn light_matrix(corners: &[Vec3; 8], toward_sun: Vec3, z_multiplier: f32) -> Mat4 {
    let centroid = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let toward_sun = toward_sun.try_normalize().unwrap_or(Vec3::Y);
    let up = if toward_sun.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let light_view = Mat4::look_at_rh(centroid + toward_sun, centroid, up);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let p = light_view.transform_point3(*corner);
        min = min.min(p);
        max = max.max(p);
    }

    // Pull the depth range out in both directions along the light.
    if min.z < 0.0 {
        min.z *= z_multiplier;
    } else {
        min.z /= z_multiplier;
    }
    if max.z < 0.0 {
        max.z /= z_multiplier;
    } else {
        max.z *= z_multiplier;
    }

    // View space looks down -Z, so the nearest point has the largest z.
    let light_proj = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max.z, -min.z);
    light_proj * light_view
}

/// Computes every cascade for this frame.
pub fn compute_cascades(view: &CascadeView, toward_sun: Vec3, params: &CascadeParams) -> CascadeData {
    let count = params.count.clamp(1, MAX_CASCADES);
    if count != params.count {
        tracing::debug!("Cascade count {} clamped to {}", params.count, count);
    }
    let splits = split_distances(view.near, view.far, count, params.lambda);

    let mut data = CascadeData {
        count,
        ..Default::default()
    };
    let mut slice_near = view.near;
    for (i, &slice_far) in splits.iter().enumerate() {
        let corners = frustum_corners(view, slice_near, slice_far);
        data.light_matrices[i] = light_matrix(&corners, toward_sun, params.z_multiplier);
        data.split_distances[i] = slice_far;
        slice_near = slice_far;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_view() -> CascadeView {
        CascadeView {
            view: Mat4::IDENTITY,
            fov_degrees: 70.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }

    #[test]
    fn test_splits_strictly_increasing_and_end_at_far() {
        let splits = split_distances(0.1, 100.0, 4, 0.5);
        assert_eq!(splits.len(), 4);
        assert!(splits[0] > 0.1);
        for pair in splits.windows(2) {
            assert!(pair[0] < pair[1], "{:?}", splits);
        }
        assert_eq!(splits[3], 100.0);
    }

    #[test]
    fn test_split_blend_values() {
        let splits = split_distances(1.0, 16.0, 2, 0.5);
        // log: 1 * 16^0.5 = 4, uniform: 1 + 15 * 0.5 = 8.5
        assert!((splits[0] - 6.25).abs() < 1e-5);
        assert_eq!(splits[1], 16.0);
    }

    #[test]
    fn test_pure_uniform_splits() {
        let splits = split_distances(1.0, 5.0, 4, 0.0);
        assert_eq!(splits, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_single_cascade_covers_whole_range() {
        assert_eq!(split_distances(0.1, 50.0, 1, 0.5), vec![50.0]);
    }

    #[test]
    fn test_frustum_corners_depths() {
        let corners = frustum_corners(&test_view(), 1.0, 10.0);
        for corner in &corners[..4] {
            assert!((corner.z + 1.0).abs() < 1e-3);
        }
        for corner in &corners[4..] {
            assert!((corner.z + 10.0).abs() < 1e-2);
        }
    }

    #[test]
    fn test_light_matrix_contains_all_corners() {
        let corners = frustum_corners(&test_view(), 0.1, 20.0);
        let matrix = light_matrix(&corners, Vec3::new(0.3, 1.0, 0.2), 10.0);
        for corner in corners {
            let clip = matrix * corner.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() <= 1.0 + 1e-3, "{:?}", ndc);
            assert!(ndc.y.abs() <= 1.0 + 1e-3, "{:?}", ndc);
            assert!((-1e-3..=1.0 + 1e-3).contains(&ndc.z), "{:?}", ndc);
        }
    }

    #[test]
    fn test_light_straight_down_is_valid() {
        let corners = frustum_corners(&test_view(), 0.1, 5.0);
        let matrix = light_matrix(&corners, Vec3::Y, 10.0);
        assert!(!matrix.is_nan());
    }

    #[test]
    fn test_compute_cascades_fills_active_entries() {
        let data = compute_cascades(&test_view(), Vec3::new(0.0, 1.0, 0.5), &CascadeParams::default());
        assert_eq!(data.count, 4);
        assert_eq!(data.split_distances[3], 100.0);
        for matrix in data.light_matrices {
            assert_ne!(matrix, Mat4::IDENTITY);
        }
    }

    #[test]
    fn test_compute_cascades_clamps_count() {
        let params = CascadeParams {
            count: 9,
            ..Default::default()
        };
        let data = compute_cascades(&test_view(), Vec3::Y, &params);
        assert_eq!(data.count, MAX_CASCADES);
    }
}
