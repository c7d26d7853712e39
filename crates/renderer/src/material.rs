//! Material templates and instances.
//!
//! # Overview
//!
//! A [`MaterialTemplate`] is a compiled pipeline plus its layout for one pass
//! category, registered under a name ("Opaque", "Transparent"). Every
//! template's layout uses the same three descriptor sets:
//!
//! | Set | Contents |
//! |-----|----------|
//! | 0 | per-frame scene data and shadow map |
//! | 1 | bindless texture array |
//! | 2 | per-material constants and textures |
//!
//! plus the [`GpuDrawPushConstants`] range.
//!
//! A [`MaterialInstance`] references a template and a descriptor set for
//! set 2. Instances share their template through `Rc`, so a template that is
//! replaced in the cache stays alive until its last instance is gone.
//!
//! The descriptor set and constants buffer of an instance live in the
//! [`MaterialResources`] it was built into. A loaded scene owns one, so
//! unloading the scene releases all of its materials at once.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::deletion_queue::DeletionQueue;
use ember_rhi::descriptor::{
    DescriptorAllocatorGrowable, DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter,
    PoolSizeRatio,
};
use ember_rhi::device::Device;
use ember_rhi::pipeline::{
    BlendMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout, push_constant_range,
};
use ember_rhi::shader::Shader;
use ember_scene::{MaterialPass, SurfaceMaterial};
use tracing::{debug, info, warn};

use crate::defaults::DefaultResources;
use crate::error::{RendererError, RendererResult};
use crate::gpu_types::{GpuDrawPushConstants, MaterialConstants};

/// Template used when a requested one is missing.
pub const DEFAULT_TEMPLATE: &str = "Opaque";
/// Template for blended surfaces.
pub const TRANSPARENT_TEMPLATE: &str = "Transparent";

/// Initial set capacity of a material descriptor allocator.
const MATERIAL_DESCRIPTOR_SETS: u32 = 64;

const MATERIAL_POOL_RATIOS: [PoolSizeRatio; 2] = [
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3.0),
];

/// Template a material of `pass` is drawn with.
pub fn template_name(pass: MaterialPass) -> &'static str {
    match pass {
        MaterialPass::Transparent => TRANSPARENT_TEMPLATE,
        MaterialPass::MainColor | MaterialPass::Other => DEFAULT_TEMPLATE,
    }
}

/// Blending and depth write for a pass category. Transparent surfaces blend
/// additively and leave the depth buffer untouched.
pub fn pass_blend_state(pass: MaterialPass) -> (BlendMode, bool) {
    match pass {
        MaterialPass::Transparent => (BlendMode::Additive, false),
        MaterialPass::MainColor | MaterialPass::Other => (BlendMode::Opaque, true),
    }
}

/// Name-keyed registry of templates.
#[derive(Debug)]
pub struct TemplateCache<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for TemplateCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> TemplateCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `template` under `name` and returns the entry it replaced.
    pub fn register(&mut self, name: impl Into<String>, template: T) -> Option<T> {
        self.entries.insert(name.into(), template)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    /// The template named `name`, or the [`DEFAULT_TEMPLATE`] if absent.
    pub fn get_or_default(&self, name: &str) -> Option<&T> {
        self.entries.get(name).or_else(|| {
            warn!("Material template '{}' not found, using '{}'", name, DEFAULT_TEMPLATE);
            self.entries.get(DEFAULT_TEMPLATE)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every template.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A pipeline, its layout and the pass it draws in.
pub struct MaterialTemplate {
    pub pipeline: Pipeline,
    pub layout: PipelineLayout,
    pub pass: MaterialPass,
}

/// Shaders and attachment formats a template is compiled for.
pub struct TemplateConfig<'a> {
    pub vertex: &'a Shader,
    pub fragment: &'a Shader,
    pub pass: MaterialPass,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

/// Image view and sampler for one material texture slot.
#[derive(Clone, Copy, Debug)]
pub struct TextureBinding {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// Textures of a material. Empty slots use the engine defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialTextures {
    pub albedo: Option<TextureBinding>,
    pub normal: Option<TextureBinding>,
    pub metal_rough: Option<TextureBinding>,
}

/// A material ready to draw: template plus its set 2 descriptor set.
pub struct MaterialInstance {
    pub name: String,
    pub template: Rc<MaterialTemplate>,
    pub set: vk::DescriptorSet,
    pub pass: MaterialPass,
    pub constants: MaterialConstants,
}

impl SurfaceMaterial for MaterialInstance {
    fn pass(&self) -> MaterialPass {
        self.pass
    }

    fn pipeline_id(&self) -> u64 {
        self.template.pipeline.handle().as_raw()
    }
}

/// Descriptor sets and constants buffers of a group of instances that are
/// released together.
///
/// Dropping it frees the buffers and destroys the pools, so it must outlive
/// every frame still drawing its instances.
pub struct MaterialResources {
    buffers: DeletionQueue,
    descriptors: DescriptorAllocatorGrowable,
}

impl MaterialResources {
    pub fn new(device: Arc<Device>) -> RendererResult<Self> {
        let descriptors =
            DescriptorAllocatorGrowable::new(device, MATERIAL_DESCRIPTOR_SETS, &MATERIAL_POOL_RATIOS)?;
        Ok(Self {
            buffers: DeletionQueue::new(),
            descriptors,
        })
    }

    /// Constants buffers held.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn pool_count(&self) -> usize {
        self.descriptors.pool_count()
    }
}

/// Owns the material set layout and the templates.
pub struct MaterialSystem {
    templates: TemplateCache<Rc<MaterialTemplate>>,
    material_layout: DescriptorSetLayout,
    scene_layout: vk::DescriptorSetLayout,
    bindless_layout: vk::DescriptorSetLayout,
    device: Arc<Device>,
}

impl MaterialSystem {
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `scene_layout` - Layout of set 0, owned by the caller
    /// * `bindless_layout` - Layout of set 1, owned by the caller
    pub fn new(
        device: Arc<Device>,
        scene_layout: vk::DescriptorSetLayout,
        bindless_layout: vk::DescriptorSetLayout,
    ) -> RendererResult<Self> {
        let material_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .add_binding(3, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(
                device.clone(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;
        Ok(Self {
            templates: TemplateCache::new(),
            material_layout,
            scene_layout,
            bindless_layout,
            device,
        })
    }

    /// Compiles a pipeline for `config` and stores it under `name`.
    ///
    /// Returns the template it replaced, if any. Instances built from the old
    /// template keep it alive.
    ///
    /// # Errors
    ///
    /// Returns an error if layout or pipeline creation fails.
    pub fn register_template(
        &mut self,
        name: &str,
        config: &TemplateConfig<'_>,
    ) -> RendererResult<Option<Rc<MaterialTemplate>>> {
        let set_layouts = [
            self.scene_layout,
            self.bindless_layout,
            self.material_layout.handle(),
        ];
        let push_ranges = [push_constant_range(
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            GpuDrawPushConstants::SIZE,
        )];
        let layout = PipelineLayout::new(self.device.clone(), &set_layouts, &push_ranges)?;

        let (blend, depth_write) = pass_blend_state(config.pass);
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(config.vertex)
            .fragment_shader(config.fragment)
            .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .depth_test(depth_write, vk::CompareOp::GREATER_OR_EQUAL)
            .blend_mode(blend)
            .color_attachment_format(config.color_format)
            .depth_attachment_format(config.depth_format)
            .build(self.device.clone(), &layout)?;

        info!("Registered material template '{}' ({:?})", name, config.pass);
        let template = Rc::new(MaterialTemplate {
            pipeline,
            layout,
            pass: config.pass,
        });
        Ok(self.templates.register(name, template))
    }

    pub fn get_template(&self, name: &str) -> Option<&Rc<MaterialTemplate>> {
        self.templates.get(name)
    }

    /// Allocates a constants buffer and a descriptor set for one material.
    ///
    /// # Arguments
    ///
    /// * `name` - Debug name of the material
    /// * `template` - Template name; missing ones fall back to [`DEFAULT_TEMPLATE`]
    /// * `constants` - Factors and bindless texture ids
    /// * `textures` - Per-material textures, defaults fill empty slots
    /// * `defaults` - Engine fallback textures
    /// * `resources` - Receives the constants buffer and the descriptor set
    ///
    /// # Errors
    ///
    /// [`RendererError::TemplateNotFound`] if neither `template` nor the
    /// default is registered; otherwise buffer or descriptor failures.
    pub fn build_instance(
        &self,
        name: &str,
        template: &str,
        constants: &MaterialConstants,
        textures: &MaterialTextures,
        defaults: &DefaultResources,
        resources: &mut MaterialResources,
    ) -> RendererResult<Rc<MaterialInstance>> {
        let template = self
            .templates
            .get_or_default(template)
            .cloned()
            .ok_or_else(|| RendererError::TemplateNotFound(template.to_string()))?;

        let buffer = Buffer::new(
            self.device.clone(),
            BufferUsage::Uniform,
            MaterialConstants::SIZE as vk::DeviceSize,
            name,
        )?;
        buffer.write_pod(0, constants)?;

        let set = resources.descriptors.allocate(self.material_layout.handle())?;

        let albedo = textures.albedo.unwrap_or(TextureBinding {
            view: defaults.white.view(),
            sampler: defaults.linear.handle(),
        });
        let normal = textures.normal.unwrap_or(TextureBinding {
            view: defaults.normal.view(),
            sampler: defaults.linear.handle(),
        });
        let metal_rough = textures.metal_rough.unwrap_or(TextureBinding {
            view: defaults.white.view(),
            sampler: defaults.linear.handle(),
        });

        let mut writer = DescriptorWriter::new();
        writer.write_buffer(
            0,
            buffer.handle(),
            MaterialConstants::SIZE as vk::DeviceSize,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        for (binding, texture) in [(1, albedo), (2, normal), (3, metal_rough)] {
            writer.write_image(
                binding,
                texture.view,
                texture.sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            );
        }
        writer.update_set(&self.device, set);

        resources.buffers.push_drop(buffer);
        debug!("Built material '{}' on template {:?}", name, template.pass);

        Ok(Rc::new(MaterialInstance {
            name: name.to_string(),
            pass: template.pass,
            template,
            set,
            constants: *constants,
        }))
    }

    #[inline]
    pub fn material_layout(&self) -> vk::DescriptorSetLayout {
        self.material_layout.handle()
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Drops every template reference held by the cache.
    pub fn clear_templates(&mut self) {
        self.templates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut cache = TemplateCache::new();
        assert!(cache.register("Opaque", 1).is_none());
        assert_eq!(cache.get("Opaque"), Some(&1));
        assert_eq!(cache.get("Missing"), None);
    }

    #[test]
    fn test_reregister_returns_previous() {
        let mut cache = TemplateCache::new();
        cache.register("Opaque", 1);
        assert_eq!(cache.register("Opaque", 2), Some(1));
        assert_eq!(cache.get("Opaque"), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_falls_back_to_default() {
        let mut cache = TemplateCache::new();
        cache.register(DEFAULT_TEMPLATE, "opaque");
        cache.register(TRANSPARENT_TEMPLATE, "transparent");
        assert_eq!(cache.get_or_default("Water"), Some(&"opaque"));
        assert_eq!(cache.get_or_default(TRANSPARENT_TEMPLATE), Some(&"transparent"));
    }

    #[test]
    fn test_no_default_is_none() {
        let cache: TemplateCache<u32> = TemplateCache::new();
        assert!(cache.get_or_default("Anything").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replaced_template_outlives_cache_entry() {
        let mut cache = TemplateCache::new();
        let first = Rc::new(10);
        cache.register("Opaque", Rc::clone(&first));
        let instance_ref = cache.get("Opaque").cloned().unwrap();
        let old = cache.register("Opaque", Rc::new(20)).unwrap();
        drop(old);
        assert_eq!(*instance_ref, 10);
        assert_eq!(Rc::strong_count(&first), 2);
    }

    #[test]
    fn test_template_names_per_pass() {
        assert_eq!(template_name(MaterialPass::MainColor), DEFAULT_TEMPLATE);
        assert_eq!(template_name(MaterialPass::Transparent), TRANSPARENT_TEMPLATE);
        assert_eq!(template_name(MaterialPass::Other), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_transparent_does_not_write_depth() {
        assert_eq!(
            pass_blend_state(MaterialPass::Transparent),
            (BlendMode::Additive, false)
        );
        assert_eq!(pass_blend_state(MaterialPass::MainColor), (BlendMode::Opaque, true));
    }
}
