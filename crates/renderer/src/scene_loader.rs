//! Turns an imported glTF scene into GPU resources.
//!
//! Images become mipmapped textures registered in the bindless array,
//! materials become [`MaterialInstance`]s, meshes are uploaded, and the node
//! list is rebuilt as a scene graph hanging under a single top node.
//!
//! A failed upload hands its bindless slots back before returning, so the
//! caller can keep drawing whatever scene it already had.

use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use ember_resources::LoadedScene;
use ember_resources::gltf_loader::{AddressMode, Filter, MipmapMode, SamplerInfo};
use ember_rhi::device::Device;
use ember_rhi::image::AllocatedImage;
use ember_rhi::immediate::ImmediateSubmit;
use ember_rhi::sampler::{Sampler, SamplerDesc};
use ember_scene::{GeoSurface, MeshAsset, Node, NodeRef};
use glam::{Mat4, UVec4, Vec4};
use tracing::{info, warn};

use crate::bindless::{BindlessTextures, NORMAL_SLOT, WHITE_SLOT};
use crate::defaults::DefaultResources;
use crate::error::RendererResult;
use crate::gpu_types::MaterialConstants;
use crate::material::{
    MaterialInstance, MaterialResources, MaterialSystem, MaterialTextures, TextureBinding,
    template_name,
};
use crate::mesh::MeshAssetGpu;
use crate::upload::{upload_image, upload_mesh};

pub fn vk_filter(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn vk_mipmap_mode(mode: MipmapMode) -> vk::SamplerMipmapMode {
    match mode {
        MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn vk_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}

/// Sampler description for an imported sampler. The U wrap mode is used for
/// both axes.
pub fn sampler_desc(info: &SamplerInfo) -> SamplerDesc {
    let mut desc = SamplerDesc::new(vk_filter(info.mag_filter), vk_address_mode(info.address_u));
    desc.min_filter = vk_filter(info.min_filter);
    desc.mipmap_mode = vk_mipmap_mode(info.mipmap_mode);
    desc
}

/// Format of each image: sRGB when some material samples it as base color,
/// linear otherwise.
pub fn image_formats(scene: &LoadedScene) -> Vec<vk::Format> {
    let mut formats = vec![vk::Format::R8G8B8A8_UNORM; scene.images.len()];
    for material in &scene.materials {
        let Some(texture) = material
            .base_color_texture
            .and_then(|t| scene.textures.get(t))
        else {
            continue;
        };
        if let Some(format) = formats.get_mut(texture.image) {
            *format = vk::Format::R8G8B8A8_SRGB;
        }
    }
    formats
}

/// GPU side of a loaded scene. Dropping it releases every resource, so it
/// must outlive any frame still drawing it.
pub struct GpuScene {
    pub name: String,
    /// Top node; the file's root nodes are its children.
    pub root: NodeRef<MeshAssetGpu>,
    pub meshes: Vec<Rc<MeshAssetGpu>>,
    pub materials: Vec<Rc<MaterialInstance>>,
    /// Bindless slot of each glTF texture.
    pub texture_slots: Vec<u32>,
    samplers: Vec<Sampler>,
    images: Vec<AllocatedImage>,
    // Declared after `materials` so the sets outlive the instances using them.
    material_resources: MaterialResources,
}

impl GpuScene {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    /// Descriptor sets and constants buffers of this scene's materials.
    pub fn material_resources(&self) -> &MaterialResources {
        &self.material_resources
    }

    /// Returns this scene's bindless slots for reuse.
    pub fn release_slots(&self, bindless: &mut BindlessTextures) {
        for &slot in &self.texture_slots {
            bindless.release(slot);
        }
    }
}

/// Everything the upload needs from the engine.
pub struct SceneUploadContext<'a> {
    pub device: &'a Arc<Device>,
    pub immediate: &'a ImmediateSubmit,
    pub bindless: &'a mut BindlessTextures,
    pub materials: &'a MaterialSystem,
    pub defaults: &'a DefaultResources,
}

/// Uploads `scene` and builds its node hierarchy.
///
/// Meshes without indices are skipped with a warning; nodes referring to
/// them keep their transform and children but draw nothing.
///
/// # Errors
///
/// GPU failures are returned after releasing every bindless slot the upload
/// had taken. Asset problems were already resolved by the importer.
pub fn upload_scene(mut ctx: SceneUploadContext<'_>, scene: &LoadedScene) -> RendererResult<GpuScene> {
    let mut texture_slots = Vec::with_capacity(scene.textures.len());
    let result = upload_scene_parts(&mut ctx, scene, &mut texture_slots);
    if result.is_err() {
        for &slot in &texture_slots {
            ctx.bindless.release(slot);
        }
    }
    result
}

fn upload_scene_parts(
    ctx: &mut SceneUploadContext<'_>,
    scene: &LoadedScene,
    texture_slots: &mut Vec<u32>,
) -> RendererResult<GpuScene> {
    let device = ctx.device;

    let samplers = scene
        .samplers
        .iter()
        .map(|info| Sampler::new(device.clone(), &sampler_desc(info)))
        .collect::<Result<Vec<_>, _>>()?;

    let formats = image_formats(scene);
    let mut images = Vec::with_capacity(scene.images.len());
    for (i, image) in scene.images.iter().enumerate() {
        if image.substituted {
            warn!("Image {} of '{}' uses the error texture", i, scene.name);
        }
        let name = image.name.clone().unwrap_or_else(|| format!("{}_image{}", scene.name, i));
        images.push(upload_image(device, ctx.immediate, &image.data, formats[i], true, &name)?);
    }

    let mut bindings = Vec::with_capacity(scene.textures.len());
    for texture in &scene.textures {
        let view = images
            .get(texture.image)
            .map(|img| img.view())
            .unwrap_or_else(|| ctx.defaults.checkerboard.view());
        let sampler = texture
            .sampler
            .and_then(|s| samplers.get(s))
            .map(|s| s.handle())
            .unwrap_or_else(|| ctx.defaults.linear.handle());
        texture_slots.push(ctx.bindless.register(view, sampler)?);
        bindings.push(TextureBinding { view, sampler });
    }

    let mut material_resources = MaterialResources::new(device.clone())?;
    let mut materials = Vec::with_capacity(scene.materials.len());
    for (i, data) in scene.materials.iter().enumerate() {
        let slot = |t: Option<usize>, fallback: u32| {
            t.and_then(|t| texture_slots.get(t).copied()).unwrap_or(fallback)
        };
        let binding = |t: Option<usize>| t.and_then(|t| bindings.get(t).copied());

        let constants = MaterialConstants {
            color_factors: data.base_color_factor,
            metal_rough_factors: Vec4::new(data.metallic_factor, data.roughness_factor, 0.0, 0.0),
            texture_ids: UVec4::new(
                slot(data.base_color_texture, WHITE_SLOT),
                slot(data.normal_texture, NORMAL_SLOT),
                slot(data.metal_rough_texture, WHITE_SLOT),
                0,
            ),
            ..Default::default()
        };
        let textures = MaterialTextures {
            albedo: binding(data.base_color_texture),
            normal: binding(data.normal_texture),
            metal_rough: binding(data.metal_rough_texture),
        };
        let name = data.name.clone().unwrap_or_else(|| format!("{}_material{}", scene.name, i));
        materials.push(ctx.materials.build_instance(
            &name,
            template_name(data.pass),
            &constants,
            &textures,
            ctx.defaults,
            &mut material_resources,
        )?);
    }

    // One entry per glTF mesh so node indices stay valid.
    let mut meshes = Vec::with_capacity(scene.meshes.len());
    for mesh in &scene.meshes {
        if !mesh.is_drawable() {
            warn!("Mesh '{}' has no indexed geometry, skipping", mesh.name);
            meshes.push(None);
            continue;
        }
        let buffers = upload_mesh(device, ctx.immediate, &mesh.indices, &mesh.vertices, &mesh.name)?;
        let surfaces = mesh
            .surfaces
            .iter()
            .filter_map(|surface| {
                let material = materials.get(surface.material).or_else(|| materials.first())?;
                Some(GeoSurface {
                    start_index: surface.start_index,
                    count: surface.count,
                    bounds: mesh.bounds,
                    material: Rc::clone(material),
                })
            })
            .collect();
        meshes.push(Some(Rc::new(MeshAssetGpu {
            name: mesh.name.clone(),
            surfaces,
            buffers,
        })));
    }

    let root = build_hierarchy(scene, &meshes);
    let meshes: Vec<_> = meshes.into_iter().flatten().collect();

    info!(
        "Scene '{}' on GPU: {} meshes, {} materials, {} textures",
        scene.name,
        meshes.len(),
        materials.len(),
        texture_slots.len()
    );

    Ok(GpuScene {
        name: scene.name.clone(),
        root,
        meshes,
        materials,
        texture_slots: std::mem::take(texture_slots),
        samplers,
        images,
        material_resources,
    })
}

/// Recreates the node list as a graph under a new identity top node.
fn build_hierarchy<M: MeshAsset>(scene: &LoadedScene, meshes: &[Option<Rc<M>>]) -> NodeRef<M> {
    let nodes: Vec<NodeRef<M>> = scene
        .nodes
        .iter()
        .map(|data| {
            let mesh = data.mesh.and_then(|m| meshes.get(m)).cloned().flatten();
            Node::new_ref(data.local_transform, mesh)
        })
        .collect();

    for (data, node) in scene.nodes.iter().zip(&nodes) {
        for &child in &data.children {
            if let Some(child) = nodes.get(child) {
                Node::add_child(node, Rc::clone(child));
            }
        }
    }

    let top = Node::new_ref(Mat4::IDENTITY, None);
    for &root in &scene.roots {
        if let Some(node) = nodes.get(root) {
            Node::add_child(&top, Rc::clone(node));
        }
    }
    top.borrow_mut().refresh_transform(&Mat4::IDENTITY);
    top
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_resources::gltf_loader::{LoadedImage, TextureRef};
    use ember_resources::{ImageData, MaterialData, NodeData};
    use ember_scene::{Bounds, DrawContext, MaterialPass, SurfaceMaterial};
    use glam::Vec3;

    #[derive(Clone)]
    struct Flat;

    impl SurfaceMaterial for Flat {
        fn pass(&self) -> MaterialPass {
            MaterialPass::MainColor
        }

        fn pipeline_id(&self) -> u64 {
            1
        }
    }

    struct Stub {
        surfaces: Vec<GeoSurface<Flat>>,
    }

    impl MeshAsset for Stub {
        type Material = Flat;

        fn surfaces(&self) -> &[GeoSurface<Flat>] {
            &self.surfaces
        }
    }

    fn stub_mesh() -> Rc<Stub> {
        Rc::new(Stub {
            surfaces: vec![GeoSurface {
                start_index: 0,
                count: 3,
                bounds: Bounds::from_points([Vec3::ZERO, Vec3::ONE].into_iter()),
                material: Flat,
            }],
        })
    }

    fn node(mesh: Option<usize>, children: Vec<usize>) -> NodeData {
        NodeData {
            name: None,
            local_transform: Mat4::IDENTITY,
            children,
            mesh,
        }
    }

    #[test]
    fn test_sampler_mapping() {
        let info = SamplerInfo {
            mag_filter: Filter::Linear,
            min_filter: Filter::Nearest,
            mipmap_mode: MipmapMode::Nearest,
            address_u: AddressMode::MirroredRepeat,
            address_v: AddressMode::Repeat,
        };
        let desc = sampler_desc(&info);
        assert_eq!(desc.mag_filter, vk::Filter::LINEAR);
        assert_eq!(desc.min_filter, vk::Filter::NEAREST);
        assert_eq!(desc.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert_eq!(desc.address_mode, vk::SamplerAddressMode::MIRRORED_REPEAT);
    }

    #[test]
    fn test_default_sampler_info_maps_to_nearest_repeat() {
        let desc = sampler_desc(&SamplerInfo::default());
        assert_eq!(desc.mag_filter, vk::Filter::NEAREST);
        assert_eq!(desc.address_mode, vk::SamplerAddressMode::REPEAT);
        assert_eq!(desc.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(vk_address_mode(AddressMode::ClampToEdge), vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }

    #[test]
    fn test_base_color_images_are_srgb() {
        let image = LoadedImage {
            name: None,
            data: ImageData::solid(0xFFFF_FFFF),
            substituted: false,
        };
        let scene = LoadedScene {
            images: vec![image.clone(), image],
            textures: vec![
                TextureRef {
                    image: 0,
                    sampler: None,
                },
                TextureRef {
                    image: 1,
                    sampler: None,
                },
            ],
            materials: vec![MaterialData {
                base_color_texture: Some(1),
                normal_texture: Some(0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(
            image_formats(&scene),
            vec![vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_SRGB]
        );
    }

    #[test]
    fn test_dangling_texture_reference_is_ignored() {
        let scene = LoadedScene {
            materials: vec![MaterialData {
                base_color_texture: Some(5),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(image_formats(&scene).is_empty());
    }

    #[test]
    fn test_skipped_mesh_keeps_node_indices() {
        // Node 0 points at a mesh that was not uploaded, node 1 at mesh 1.
        let scene = LoadedScene {
            nodes: vec![node(Some(0), vec![1]), node(Some(1), vec![])],
            roots: vec![0],
            ..Default::default()
        };
        let meshes = vec![None, Some(stub_mesh())];

        let top = build_hierarchy(&scene, &meshes);
        let first = Rc::clone(&top.borrow().children[0]);
        assert!(first.borrow().mesh.is_none());
        assert_eq!(first.borrow().children.len(), 1);

        let mut ctx = DrawContext::new();
        top.borrow_mut().draw(&Mat4::IDENTITY, &mut ctx);
        assert_eq!(ctx.objects.len(), 1);
    }

    #[test]
    fn test_out_of_range_references_are_dropped() {
        let scene = LoadedScene {
            nodes: vec![node(Some(7), vec![3])],
            roots: vec![0, 5],
            ..Default::default()
        };
        let top = build_hierarchy::<Stub>(&scene, &[]);
        assert_eq!(top.borrow().children.len(), 1);
        let only = Rc::clone(&top.borrow().children[0]);
        assert!(only.borrow().mesh.is_none());
        assert!(only.borrow().children.is_empty());
    }
}
