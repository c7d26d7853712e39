//! Scene traversal, culling and ordering through the public API.

use std::rc::Rc;

use ember_scene::camera::perspective;
use ember_scene::{
    Bounds, DrawContext, Frustum, GeoSurface, MaterialPass, MeshAsset, Node, SurfaceMaterial,
    Transform, draw_order,
};
use glam::{Mat4, Quat, Vec3};

#[derive(Clone)]
struct Material {
    pass: MaterialPass,
    pipeline: u64,
}

impl SurfaceMaterial for Material {
    fn pass(&self) -> MaterialPass {
        self.pass
    }

    fn pipeline_id(&self) -> u64 {
        self.pipeline
    }
}

struct Mesh {
    surfaces: Vec<GeoSurface<Material>>,
}

impl MeshAsset for Mesh {
    type Material = Material;

    fn surfaces(&self) -> &[GeoSurface<Material>] {
        &self.surfaces
    }
}

fn mesh(pass: MaterialPass, pipeline: u64) -> Rc<Mesh> {
    Rc::new(Mesh {
        surfaces: vec![GeoSurface {
            start_index: 0,
            count: 36,
            bounds: Bounds::from_points([Vec3::splat(-0.5), Vec3::splat(0.5)]),
            material: Material { pass, pipeline },
        }],
    })
}

#[test]
fn test_three_level_world_transform() {
    let t0 = Transform::new()
        .with_position(Vec3::new(1.0, 0.0, 0.0))
        .local_matrix();
    let t1 = Transform::new()
        .with_rotation(Quat::from_rotation_y(0.5))
        .local_matrix();
    let t2 = Transform::new()
        .with_position(Vec3::new(0.0, 2.0, 0.0))
        .with_scale(Vec3::splat(3.0))
        .local_matrix();

    let root = Node::new_ref(t0, None);
    let middle = Node::new_ref(t1, None);
    let leaf = Node::new_ref(t2, Some(mesh(MaterialPass::MainColor, 1)));
    Node::add_child(&middle, leaf);
    Node::add_child(&root, middle);

    let mut ctx = DrawContext::new();
    root.borrow_mut().draw(&Mat4::IDENTITY, &mut ctx);

    assert_eq!(ctx.len(), 1);
    assert!(ctx.objects[0].transform.abs_diff_eq(t0 * t1 * t2, 1e-5));
}

#[test]
fn test_cull_then_sort() {
    let root = Node::new_ref(Mat4::IDENTITY, None);
    let place = |z: f32, x: f32| Mat4::from_translation(Vec3::new(x, 0.0, z));

    // A and C are opaque, B is transparent, D sits behind the camera.
    let a = Node::new_ref(place(-5.0, -1.0), Some(mesh(MaterialPass::MainColor, 10)));
    let b = Node::new_ref(place(-5.0, 0.0), Some(mesh(MaterialPass::Transparent, 20)));
    let c = Node::new_ref(place(-5.0, 1.0), Some(mesh(MaterialPass::MainColor, 10)));
    let d = Node::new_ref(place(5.0, 0.0), Some(mesh(MaterialPass::MainColor, 10)));
    for node in [a, b, c, d] {
        Node::add_child(&root, node);
    }

    let mut ctx = DrawContext::new();
    root.borrow_mut().draw(&Mat4::IDENTITY, &mut ctx);
    assert_eq!(ctx.len(), 4);

    let frustum = Frustum::from_view_projection(&perspective(70.0, 1.0, 0.1, 100.0));
    let order = draw_order(&ctx.objects, &frustum);
    assert_eq!(order, vec![0, 2, 1]);
}
