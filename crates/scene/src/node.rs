//! Scene graph nodes.
//!
//! Nodes own their children and hold a weak link back to their parent, so a
//! tree can be shared between the loader and the renderer without cycles.
//! World transforms are recomputed on every traversal from the parent's world
//! transform and the node's local one.
//!
//! # Example
//!
//! ```ignore
//! let root = Node::new_ref(Mat4::IDENTITY, None);
//! let child = Node::new_ref(Mat4::from_translation(Vec3::X), Some(mesh));
//! Node::add_child(&root, child);
//!
//! let mut ctx = DrawContext::new();
//! root.borrow_mut().draw(&Mat4::IDENTITY, &mut ctx);
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::Mat4;

use crate::render_object::{DrawContext, MeshAsset, RenderObject};

/// Shared handle to a node.
pub type NodeRef<M> = Rc<RefCell<Node<M>>>;

/// A node in the scene hierarchy, optionally carrying a mesh.
pub struct Node<M: MeshAsset> {
    pub local_transform: Mat4,
    pub world_transform: Mat4,
    pub children: Vec<NodeRef<M>>,
    pub parent: Weak<RefCell<Node<M>>>,
    pub mesh: Option<Rc<M>>,
}

impl<M: MeshAsset> Node<M> {
    pub fn new(local_transform: Mat4, mesh: Option<Rc<M>>) -> Self {
        Self {
            local_transform,
            world_transform: local_transform,
            children: Vec::new(),
            parent: Weak::new(),
            mesh,
        }
    }

    pub fn new_ref(local_transform: Mat4, mesh: Option<Rc<M>>) -> NodeRef<M> {
        Rc::new(RefCell::new(Self::new(local_transform, mesh)))
    }

    /// Appends `child` to `parent` and points the child back at it.
    pub fn add_child(parent: &NodeRef<M>, child: NodeRef<M>) {
        child.borrow_mut().parent = Rc::downgrade(parent);
        parent.borrow_mut().children.push(child);
    }

    pub fn parent(&self) -> Option<NodeRef<M>> {
        self.parent.upgrade()
    }

    /// `true` if the node has no live parent.
    pub fn is_root(&self) -> bool {
        self.parent.upgrade().is_none()
    }

    /// Recomputes world transforms of this subtree.
    pub fn refresh_transform(&mut self, parent_world: &Mat4) {
        self.world_transform = *parent_world * self.local_transform;
        for child in &self.children {
            child.borrow_mut().refresh_transform(&self.world_transform);
        }
    }

    /// Depth-first, pre-order traversal that appends one [`RenderObject`] per
    /// mesh surface to `ctx`.
    ///
    /// # Arguments
    ///
    /// * `parent_world` - World transform of the parent, identity for roots
    /// * `ctx` - Draw context receiving the render objects
    pub fn draw(&mut self, parent_world: &Mat4, ctx: &mut DrawContext<M>) {
        self.world_transform = *parent_world * self.local_transform;

        if let Some(mesh) = &self.mesh {
            for surface in mesh.surfaces() {
                ctx.objects.push(RenderObject {
                    index_count: surface.count,
                    first_index: surface.start_index,
                    mesh: Rc::clone(mesh),
                    material: surface.material.clone(),
                    bounds: surface.bounds,
                    transform: self.world_transform,
                });
            }
        }

        for child in &self.children {
            child.borrow_mut().draw(&self.world_transform, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_object::test_support::*;
    use crate::render_object::{GeoSurface, MaterialPass};
    use glam::Vec3;

    fn mesh_with_surfaces(count: u32) -> Rc<TestMesh> {
        let surfaces = (0..count)
            .map(|i| GeoSurface {
                start_index: i * 3,
                count: 3,
                bounds: unit_bounds(),
                material: TestMaterial {
                    pass: MaterialPass::MainColor,
                    pipeline: 1,
                },
            })
            .collect();
        Rc::new(TestMesh { surfaces })
    }

    #[test]
    fn test_add_child_sets_parent() {
        let root: NodeRef<TestMesh> = Node::new_ref(Mat4::IDENTITY, None);
        let child = Node::new_ref(Mat4::IDENTITY, None);
        Node::add_child(&root, Rc::clone(&child));

        assert!(root.borrow().is_root());
        assert!(!child.borrow().is_root());
        let parent = child.borrow().parent().unwrap();
        assert!(Rc::ptr_eq(&parent, &root));
    }

    #[test]
    fn test_parent_dropped_makes_root() {
        let child: NodeRef<TestMesh> = Node::new_ref(Mat4::IDENTITY, None);
        {
            let root = Node::new_ref(Mat4::IDENTITY, None);
            Node::add_child(&root, Rc::clone(&child));
        }
        assert!(child.borrow().is_root());
    }

    #[test]
    fn test_draw_emits_one_object_per_surface() {
        let root = Node::new_ref(Mat4::IDENTITY, Some(mesh_with_surfaces(3)));
        let mut ctx = DrawContext::new();
        root.borrow_mut().draw(&Mat4::IDENTITY, &mut ctx);

        assert_eq!(ctx.len(), 3);
        let firsts: Vec<u32> = ctx.objects.iter().map(|o| o.first_index).collect();
        assert_eq!(firsts, vec![0, 3, 6]);
    }

    #[test]
    fn test_draw_is_pre_order() {
        let root = Node::new_ref(Mat4::IDENTITY, Some(mesh_with_surfaces(1)));
        let a = Node::new_ref(Mat4::from_translation(Vec3::X), Some(mesh_with_surfaces(1)));
        let a_child = Node::new_ref(Mat4::from_translation(Vec3::Y), Some(mesh_with_surfaces(1)));
        let b = Node::new_ref(Mat4::from_translation(Vec3::Z), Some(mesh_with_surfaces(1)));
        Node::add_child(&a, a_child);
        Node::add_child(&root, a);
        Node::add_child(&root, b);

        let mut ctx = DrawContext::new();
        root.borrow_mut().draw(&Mat4::IDENTITY, &mut ctx);

        let positions: Vec<Vec3> = ctx
            .objects
            .iter()
            .map(|o| o.transform.w_axis.truncate())
            .collect();
        assert_eq!(
            positions,
            vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::Z
            ]
        );
    }

    #[test]
    fn test_nodes_without_mesh_emit_nothing() {
        let root: NodeRef<TestMesh> = Node::new_ref(Mat4::IDENTITY, None);
        Node::add_child(&root, Node::new_ref(Mat4::IDENTITY, None));
        let mut ctx = DrawContext::new();
        root.borrow_mut().draw(&Mat4::IDENTITY, &mut ctx);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_refresh_transform_composes() {
        let root: NodeRef<TestMesh> = Node::new_ref(Mat4::from_translation(Vec3::X), None);
        let child = Node::new_ref(Mat4::from_scale(Vec3::splat(2.0)), None);
        Node::add_child(&root, Rc::clone(&child));

        root.borrow_mut().refresh_transform(&Mat4::IDENTITY);
        let expected = Mat4::from_translation(Vec3::X) * Mat4::from_scale(Vec3::splat(2.0));
        assert_eq!(child.borrow().world_transform, expected);
    }
}
