//! Per-frame draw entries.
//!
//! Scene traversal turns every mesh surface reachable from the root into a
//! [`RenderObject`]. The renderer then culls and orders them with
//! [`draw_order`] so that main-color objects come first and objects sharing a
//! pipeline are adjacent.
//!
//! The scene crate does not know about GPU resources. Meshes and materials are
//! reached through the [`MeshAsset`] and [`SurfaceMaterial`] traits, which the
//! renderer implements for its own types.

use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::frustum::Frustum;

/// Pass category a material is drawn in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialPass {
    MainColor,
    Transparent,
    Other,
}

/// Local-space bounding volume of a mesh or surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    /// Center of the box and sphere
    pub origin: Vec3,
    /// Half size of the axis-aligned box
    pub extents: Vec3,
    pub sphere_radius: f32,
}

impl Bounds {
    /// Box and enclosing sphere of a set of points. Empty input yields a
    /// zero-size volume at the origin.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));

        let extents = (max - min) * 0.5;
        Self {
            origin: (min + max) * 0.5,
            extents,
            sphere_radius: extents.length(),
        }
    }
}

/// What the draw-list sort and bind logic needs from a material.
pub trait SurfaceMaterial {
    fn pass(&self) -> MaterialPass;
    /// Identity of the pipeline the material is drawn with.
    fn pipeline_id(&self) -> u64;
}

impl<T: SurfaceMaterial + ?Sized> SurfaceMaterial for Rc<T> {
    fn pass(&self) -> MaterialPass {
        (**self).pass()
    }

    fn pipeline_id(&self) -> u64 {
        (**self).pipeline_id()
    }
}

/// A contiguous index range of a mesh drawn with one material.
#[derive(Clone, Debug)]
pub struct GeoSurface<Mat> {
    pub start_index: u32,
    pub count: u32,
    pub bounds: Bounds,
    pub material: Mat,
}

/// A mesh that scene nodes can reference.
pub trait MeshAsset {
    type Material: SurfaceMaterial + Clone;

    fn surfaces(&self) -> &[GeoSurface<Self::Material>];
}

/// One draw call's worth of data, rebuilt every frame.
pub struct RenderObject<M: MeshAsset> {
    pub index_count: u32,
    pub first_index: u32,
    pub mesh: Rc<M>,
    pub material: M::Material,
    pub bounds: Bounds,
    pub transform: Mat4,
}

impl<M: MeshAsset> Clone for RenderObject<M> {
    fn clone(&self) -> Self {
        Self {
            index_count: self.index_count,
            first_index: self.first_index,
            mesh: Rc::clone(&self.mesh),
            material: self.material.clone(),
            bounds: self.bounds,
            transform: self.transform,
        }
    }
}

impl<M: MeshAsset> RenderObject<M> {
    /// Sort key: main-color first, then grouped by pipeline.
    #[inline]
    pub fn sort_key(&self) -> (bool, u64) {
        (
            self.material.pass() != MaterialPass::MainColor,
            self.material.pipeline_id(),
        )
    }
}

/// Render objects collected by one scene traversal.
pub struct DrawContext<M: MeshAsset> {
    pub objects: Vec<RenderObject<M>>,
}

impl<M: MeshAsset> Default for DrawContext<M> {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
        }
    }
}

impl<M: MeshAsset> DrawContext<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Indices of the objects that pass the frustum test, ordered for submission.
///
/// The sort is stable, so objects with equal keys keep traversal order.
pub fn draw_order<M: MeshAsset>(objects: &[RenderObject<M>], frustum: &Frustum) -> Vec<usize> {
    let mut order: Vec<usize> = objects
        .iter()
        .enumerate()
        .filter(|(_, object)| frustum.is_visible(&object.bounds, &object.transform))
        .map(|(i, _)| i)
        .collect();
    sort_for_submission(objects, &mut order);
    order
}

/// Stable sort of `order` (indices into `objects`) by pass, then pipeline.
pub fn sort_for_submission<M: MeshAsset>(objects: &[RenderObject<M>], order: &mut [usize]) {
    order.sort_by_key(|&i| objects[i].sort_key());
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    #[derive(Clone, Debug)]
    pub struct TestMaterial {
        pub pass: MaterialPass,
        pub pipeline: u64,
    }

    impl SurfaceMaterial for TestMaterial {
        fn pass(&self) -> MaterialPass {
            self.pass
        }

        fn pipeline_id(&self) -> u64 {
            self.pipeline
        }
    }

    pub struct TestMesh {
        pub surfaces: Vec<GeoSurface<TestMaterial>>,
    }

    impl MeshAsset for TestMesh {
        type Material = TestMaterial;

        fn surfaces(&self) -> &[GeoSurface<TestMaterial>] {
            &self.surfaces
        }
    }

    pub fn unit_bounds() -> Bounds {
        Bounds {
            origin: Vec3::ZERO,
            extents: Vec3::splat(0.5),
            sphere_radius: 1.0,
        }
    }

    pub fn object(pass: MaterialPass, pipeline: u64, first_index: u32) -> RenderObject<TestMesh> {
        let material = TestMaterial { pass, pipeline };
        let mesh = Rc::new(TestMesh {
            surfaces: Vec::new(),
        });
        RenderObject {
            index_count: 3,
            first_index,
            mesh,
            material,
            bounds: unit_bounds(),
            transform: Mat4::IDENTITY,
        }
    }
}
