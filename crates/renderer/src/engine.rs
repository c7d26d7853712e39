//! The engine context.
//!
//! # Overview
//!
//! [`Engine`] owns every GPU object of the renderer and drives the frame
//! loop. A frame runs these steps in order:
//!
//! 1. Wait for the frame slot's fence, flush its deletion queue and reset its
//!    descriptor pools
//! 2. Acquire a swapchain image; a stale swapchain marks a resize and skips
//!    the rest of the frame
//! 3. Record the shadow, background, geometry and postprocess passes, then
//!    blit the draw image to the swapchain image
//! 4. Submit and present; a stale swapchain on present also marks a resize
//!
//! Resizes are handled at the start of the next [`Engine::draw`] call by
//! waiting for the device to go idle and recreating the swapchain and every
//! window-sized image.
//!
//! # Example
//!
//! ```no_run
//! use ember_core::EngineConfig;
//! use ember_platform::Window;
//! use ember_renderer::Engine;
//!
//! # fn example(window: &Window, config: &EngineConfig) -> ember_renderer::RendererResult<()> {
//! let mut engine = Engine::new(window, config)?;
//! engine.update(1.0 / 60.0);
//! engine.draw()?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use ember_core::{EngineConfig, ShadowMode};
use ember_platform::{Surface, Window};
use ember_resources::{Vertex, load_gltf};
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::command::CommandBuffer;
use ember_rhi::descriptor::{
    DescriptorAllocatorGrowable, DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter,
    PoolSizeRatio,
};
use ember_rhi::device::Device;
use ember_rhi::image::{AllocatedImage, ImageDesc, copy_image_to_image, transition_image};
use ember_rhi::immediate::ImmediateSubmit;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::select_physical_device;
use ember_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use ember_rhi::shader::{Shader, ShaderStage};
use ember_rhi::swapchain::Swapchain;
use ember_scene::camera::perspective;
use ember_scene::{
    Camera, CascadeData, CascadeParams, CascadeView, DrawContext, Frustum, MaterialPass,
    SunLight, compute_cascades, draw_order,
};
use glam::{Mat4, Vec4};
use tracing::{debug, error, info};

use crate::bindless::{BindlessTextures, NORMAL_SLOT, WHITE_SLOT};
use crate::compute::BackgroundEffects;
use crate::defaults::DefaultResources;
use crate::error::{RendererError, RendererResult};
use crate::frame_manager::FrameManager;
use crate::gpu_types::{GpuDrawPushConstants, GpuSceneData};
use crate::material::{
    DEFAULT_TEMPLATE, MaterialSystem, TRANSPARENT_TEMPLATE, TemplateConfig,
};
use crate::mesh::{GpuMeshBuffers, MeshAssetGpu};
use crate::postprocess::PostprocessChain;
use crate::scene_loader::{GpuScene, SceneUploadContext, upload_scene};
use crate::shadow::{ShadowConfig, ShadowPass};
use crate::stats::EngineStats;
use crate::upload::upload_mesh;

pub const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Sets in the first pool of the long-lived allocator.
const GLOBAL_DESCRIPTOR_SETS: u32 = 10;

const GLOBAL_POOL_RATIOS: [PoolSizeRatio; 3] = [
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3.0),
];

/// Extent rendered this frame: the overlap of swapchain and draw image.
pub fn draw_extent(swapchain: vk::Extent2D, draw_image: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: swapchain.width.min(draw_image.width),
        height: swapchain.height.min(draw_image.height),
    }
}

/// Reverse-Z projection for the main pass: the near plane maps to depth 1
/// and the far plane to 0.
pub fn reverse_z_projection(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    perspective(fov_degrees, aspect, far, near)
}

fn color_target_desc(extent: vk::Extent2D) -> ImageDesc {
    ImageDesc::new(
        extent_3d(extent),
        DRAW_FORMAT,
        vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::COLOR_ATTACHMENT,
    )
}

fn depth_target_desc(extent: vk::Extent2D) -> ImageDesc {
    ImageDesc::new(
        extent_3d(extent),
        DEPTH_FORMAT,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

fn extent_3d(extent: vk::Extent2D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: 1,
    }
}

/// Window-sized offscreen images, recreated on resize.
struct RenderTargets {
    draw: AllocatedImage,
    depth: AllocatedImage,
    postprocess: AllocatedImage,
}

impl RenderTargets {
    fn new(device: &Arc<Device>, extent: vk::Extent2D) -> RendererResult<Self> {
        let draw = AllocatedImage::new(device.clone(), &color_target_desc(extent), "draw image")?;
        let depth = AllocatedImage::new(device.clone(), &depth_target_desc(extent), "depth image")?;
        let postprocess =
            AllocatedImage::new(device.clone(), &color_target_desc(extent), "postprocess image")?;
        debug!("Render targets created at {}x{}", extent.width, extent.height);
        Ok(Self {
            draw,
            depth,
            postprocess,
        })
    }

    fn extent(&self) -> vk::Extent2D {
        self.draw.extent_2d()
    }
}

fn load_shader(device: &Arc<Device>, dir: &Path, file: &str, stage: ShaderStage) -> RendererResult<Shader> {
    let path = dir.join(file);
    if !path.is_file() {
        return Err(RendererError::ShaderNotFound(path.display().to_string()));
    }
    Ok(Shader::from_spirv_file(device.clone(), &path, stage)?)
}

/// Every device-owned object besides the swapchain. Fields drop in
/// declaration order.
struct GpuResources {
    scene: Option<GpuScene>,
    frames: FrameManager,
    postprocess: PostprocessChain,
    background: BackgroundEffects,
    shadow: ShadowPass,
    materials: MaterialSystem,
    bindless: BindlessTextures,
    defaults: DefaultResources,
    // Owns the pools of the draw image and postprocess sets.
    _global_descriptors: DescriptorAllocatorGrowable,
    draw_image_set: vk::DescriptorSet,
    _draw_image_layout: DescriptorSetLayout,
    scene_layout: DescriptorSetLayout,
    _postprocess_layout: DescriptorSetLayout,
    targets: RenderTargets,
    immediate: ImmediateSubmit,
}

impl GpuResources {
    /// Points the compute and postprocess sets at the current targets.
    fn bind_targets(&self, device: &Device) {
        let mut writer = DescriptorWriter::new();
        writer.write_image(
            0,
            self.targets.draw.view(),
            vk::Sampler::null(),
            vk::ImageLayout::GENERAL,
            vk::DescriptorType::STORAGE_IMAGE,
        );
        writer.update_set(device, self.draw_image_set);
        self.postprocess
            .bind_images(self.targets.draw.view(), self.targets.postprocess.view());
    }
}

/// The renderer: device, swapchain, passes, loaded scene and camera.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Flush the frame deletion queues, then the main deletion queue
/// 3. Drop scene, passes, material templates and render targets
/// 4. Destroy the swapchain, then the surface
/// 5. Destroy the device, then the instance
///
/// `ManuallyDrop` keeps this order explicit in [`Drop`].
pub struct Engine {
    gpu: ManuallyDrop<GpuResources>,
    swapchain: ManuallyDrop<Swapchain>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,

    camera: Camera,
    sun: SunLight,
    cascade_params: CascadeParams,
    draw_context: DrawContext<MeshAssetGpu>,
    stats: EngineStats,

    window_extent: vk::Extent2D,
    resize_requested: bool,
}

impl Engine {
    /// Creates the engine for `window`.
    ///
    /// Loads `config.scene` when set; a scene that fails to load is logged
    /// and the engine starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created or a required
    /// shader is missing from `config.shader_dir`.
    pub fn new(window: &Window, config: &EngineConfig) -> RendererResult<Self> {
        let window_extent = vk::Extent2D {
            width: window.width(),
            height: window.height(),
        };
        info!(
            "Initializing engine ({}x{})",
            window_extent.width, window_extent.height
        );

        let app_name = CString::new(config.window.title.as_str())
            .unwrap_or_else(|_| c"ember".to_owned());
        let extensions = window.required_extensions()?;
        let instance = Instance::new(&app_name, &extensions, config.validation)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!("Using GPU: {}", physical.device_name());
        let device = Device::new(&instance, &physical)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            window_extent.width,
            window_extent.height,
        )?;

        let gpu = Self::create_resources(&device, config, window_extent)?;

        let mut engine = Self {
            gpu: ManuallyDrop::new(gpu),
            swapchain: ManuallyDrop::new(swapchain),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
            camera: Camera::from_settings(&config.camera),
            sun: SunLight::default(),
            cascade_params: CascadeParams {
                count: config.shadow.cascade_count,
                lambda: config.shadow.split_lambda,
                z_multiplier: config.shadow.z_multiplier,
            },
            draw_context: DrawContext::new(),
            stats: EngineStats::default(),
            window_extent,
            resize_requested: false,
        };

        if let Some(path) = &config.scene {
            if let Err(e) = engine.load_scene(path) {
                error!("Failed to load scene {}: {}", path.display(), e);
            }
        }

        info!("Engine initialized");
        Ok(engine)
    }

    fn create_resources(
        device: &Arc<Device>,
        config: &EngineConfig,
        extent: vk::Extent2D,
    ) -> RendererResult<GpuResources> {
        let immediate = ImmediateSubmit::new(device.clone())?;
        let targets = RenderTargets::new(device, extent)?;

        let draw_image_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(
                device.clone(),
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;
        let scene_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER)
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(
                device.clone(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;
        let postprocess_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .add_binding(1, vk::DescriptorType::STORAGE_IMAGE)
            .build(
                device.clone(),
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;

        let mut global_descriptors =
            DescriptorAllocatorGrowable::new(device.clone(), GLOBAL_DESCRIPTOR_SETS, &GLOBAL_POOL_RATIOS)?;
        let draw_image_set = global_descriptors.allocate(draw_image_layout.handle())?;

        let defaults = DefaultResources::new(device, &immediate)?;
        let mut bindless = BindlessTextures::new(device.clone())?;
        bindless.write(WHITE_SLOT, defaults.white.view(), defaults.nearest.handle());
        bindless.write(NORMAL_SLOT, defaults.normal.view(), defaults.nearest.handle());

        let shader_dir = config.shader_dir.as_path();
        let mesh_vert = load_shader(device, shader_dir, "mesh.vert.spv", ShaderStage::Vertex)?;
        let mesh_frag = load_shader(device, shader_dir, "mesh.frag.spv", ShaderStage::Fragment)?;
        let shadow_vert = load_shader(device, shader_dir, "shadow.vert.spv", ShaderStage::Vertex)?;

        let mut materials =
            MaterialSystem::new(device.clone(), scene_layout.handle(), bindless.layout())?;
        for (name, pass) in [
            (DEFAULT_TEMPLATE, MaterialPass::MainColor),
            (TRANSPARENT_TEMPLATE, MaterialPass::Transparent),
        ] {
            materials.register_template(
                name,
                &TemplateConfig {
                    vertex: &mesh_vert,
                    fragment: &mesh_frag,
                    pass,
                    color_format: DRAW_FORMAT,
                    depth_format: DEPTH_FORMAT,
                },
            )?;
        }

        let shadow = ShadowPass::new(
            device.clone(),
            &shadow_vert,
            scene_layout.handle(),
            ShadowConfig {
                mode: config.shadow.mode,
                cascade_count: config.shadow.cascade_count,
                resolution: config.shadow.resolution,
            },
        )?;

        let background = BackgroundEffects::new(
            device,
            shader_dir,
            draw_image_layout.handle(),
            Vec4::from_array(config.background_top),
            Vec4::from_array(config.background_bottom),
        )?;
        let postprocess = PostprocessChain::new(
            device,
            shader_dir,
            &config.postprocess,
            postprocess_layout.handle(),
            &mut global_descriptors,
        )?;

        let frames = FrameManager::new(device.clone())?;

        let gpu = GpuResources {
            scene: None,
            frames,
            postprocess,
            background,
            shadow,
            materials,
            bindless,
            defaults,
            _global_descriptors: global_descriptors,
            draw_image_set,
            _draw_image_layout: draw_image_layout,
            scene_layout,
            _postprocess_layout: postprocess_layout,
            targets,
            immediate,
        };
        gpu.bind_targets(device);
        Ok(gpu)
    }

    #[inline]
    fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Marks the window as resized. Zero extents (minimized) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to zero dimensions");
            return;
        }
        if width != self.window_extent.width || height != self.window_extent.height {
            debug!(
                "Resize requested: {}x{} -> {}x{}",
                self.window_extent.width, self.window_extent.height, width, height
            );
            self.window_extent = vk::Extent2D { width, height };
            self.resize_requested = true;
        }
    }

    #[inline]
    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Waits for the device, then recreates the swapchain and the
    /// window-sized images and rebinds them.
    fn recreate_targets(&mut self) -> RendererResult<()> {
        self.device().wait_idle()?;

        let extent = self.window_extent;
        self.swapchain
            .recreate(&self.instance, self.surface.handle(), extent.width, extent.height)?;

        let targets = RenderTargets::new(self.device(), extent)?;
        self.gpu.targets = targets;
        self.gpu.bind_targets(&self.device);

        self.resize_requested = false;
        info!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Advances the camera by `delta_secs` and records the frame time.
    pub fn update(&mut self, delta_secs: f32) {
        self.camera.update(delta_secs);
        self.stats.set_frametime(delta_secs);
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    #[inline]
    pub fn sun_mut(&mut self) -> &mut SunLight {
        &mut self.sun
    }

    #[inline]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.gpu.frames.frame_number()
    }

    pub fn set_shadow_mode(&mut self, mode: ShadowMode) {
        self.gpu.shadow.set_mode(mode);
    }

    pub fn shadow_mode(&self) -> ShadowMode {
        self.gpu.shadow.config().mode
    }

    /// Selects background effect `index`, wrapping around.
    pub fn select_background(&mut self, index: usize) {
        self.gpu.background.select(index);
    }

    pub fn scene(&self) -> Option<&GpuScene> {
        self.gpu.scene.as_ref()
    }

    fn aspect_ratio(&self) -> f32 {
        let extent = self.swapchain.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Uploads a mesh into one device-local buffer.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty mesh or if the upload fails.
    pub fn upload_mesh(&self, indices: &[u32], vertices: &[Vertex]) -> RendererResult<GpuMeshBuffers> {
        Ok(upload_mesh(self.device(), &self.gpu.immediate, indices, vertices, "mesh")?)
    }

    /// Loads a glTF file and replaces the current scene with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the upload fails. The
    /// previous scene is kept in that case.
    pub fn load_scene(&mut self, path: &Path) -> RendererResult<()> {
        let loaded = load_gltf(path)?;

        let gpu = &mut *self.gpu;
        let device: &Arc<Device> = &self.device;
        let scene = upload_scene(
            SceneUploadContext {
                device,
                immediate: &gpu.immediate,
                bindless: &mut gpu.bindless,
                materials: &gpu.materials,
                defaults: &gpu.defaults,
            },
            &loaded,
        )?;

        // In-flight frames may still draw the old scene.
        if let Err(e) = device.wait_idle() {
            scene.release_slots(&mut gpu.bindless);
            return Err(e.into());
        }
        self.draw_context.clear();
        if let Some(old) = gpu.scene.replace(scene) {
            debug!(
                "Unloading scene '{}' ({} material buffers)",
                old.name,
                old.material_resources().buffer_count()
            );
            old.release_slots(&mut gpu.bindless);
        }
        Ok(())
    }

    /// Rebuilds the render object list from the scene graph.
    fn update_scene(&mut self) {
        let started = Instant::now();
        self.draw_context.clear();
        if let Some(scene) = &self.gpu.scene {
            scene
                .root
                .borrow_mut()
                .draw(&Mat4::IDENTITY, &mut self.draw_context);
        }
        self.stats.finish_scene_update(started);
    }

    /// Renders and presents one frame.
    ///
    /// # Errors
    ///
    /// Returns an error on any fatal Vulkan failure. A stale swapchain is not
    /// an error; it is recreated on the next call.
    pub fn draw(&mut self) -> RendererResult<()> {
        if self.resize_requested {
            self.recreate_targets()?;
        }

        self.update_scene();

        self.gpu.frames.wait_for_frame()?;
        let Some(image_index) = self.gpu.frames.acquire_next_image(&self.swapchain)? else {
            self.resize_requested = true;
            return Ok(());
        };
        self.gpu.frames.begin_frame()?;

        let scene_set = self.prepare_scene_set()?;
        self.record_frame(image_index, scene_set)?;

        let gpu = &*self.gpu;
        gpu.frames.submit()?;
        let queue = self.device().graphics_queue();
        if gpu.frames.present(&self.swapchain, queue, image_index)? {
            debug!("Swapchain stale on present");
            self.resize_requested = true;
        }

        self.gpu.frames.next_frame();
        Ok(())
    }

    /// Writes this frame's scene uniform and allocates its set from the
    /// frame allocator.
    fn prepare_scene_set(&mut self) -> RendererResult<vk::DescriptorSet> {
        let aspect = self.aspect_ratio();
        let camera = &self.camera;
        let view = camera.view_matrix();
        let proj = reverse_z_projection(camera.fov_degrees, aspect, camera.near, camera.far);

        let shadow = *self.gpu.shadow.config();
        let active = shadow.active_cascades();
        let cascades = if active == 0 {
            CascadeData::default()
        } else {
            let cascade_view = CascadeView {
                view,
                fov_degrees: camera.fov_degrees,
                aspect,
                near: camera.near,
                far: camera.far,
            };
            let params = CascadeParams {
                count: active,
                ..self.cascade_params
            };
            compute_cascades(&cascade_view, self.sun.toward_sun(), &params)
        };
        let data = GpuSceneData::new(view, proj, &self.sun, &cascades, shadow.mode.shader_value(), active);

        let buffer = Buffer::new(
            self.device().clone(),
            BufferUsage::Uniform,
            GpuSceneData::SIZE as vk::DeviceSize,
            "scene data",
        )?;
        buffer.write_pod(0, &data)?;

        let gpu = &mut *self.gpu;
        let frame = gpu.frames.current_mut();
        let set = frame.descriptors.allocate(gpu.scene_layout.handle())?;

        let mut writer = DescriptorWriter::new();
        writer.write_buffer(
            0,
            buffer.handle(),
            GpuSceneData::SIZE as vk::DeviceSize,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        writer.write_image(
            1,
            gpu.shadow.map_view(),
            gpu.defaults.shadow.handle(),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        );
        writer.update_set(&self.device, set);

        frame.deletion_queue.push_drop(buffer);
        Ok(set)
    }

    fn record_frame(&mut self, image_index: u32, scene_set: vk::DescriptorSet) -> RendererResult<()> {
        let gpu = &*self.gpu;
        let device = &**self.device;
        let cmd = &gpu.frames.current().cmd;
        let targets = &gpu.targets;
        let extent = draw_extent(self.swapchain.extent(), targets.extent());

        gpu.shadow.record(cmd, scene_set, &self.draw_context.objects)?;

        transition_image(
            device,
            cmd.handle(),
            targets.draw.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );
        gpu.background.record(cmd, gpu.draw_image_set, extent);

        transition_image(
            device,
            cmd.handle(),
            targets.draw.handle(),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        transition_image(
            device,
            cmd.handle(),
            targets.depth.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        let draw_started = Instant::now();
        self.stats.reset_counters();
        let stats = Self::draw_geometry(
            gpu,
            cmd,
            scene_set,
            extent,
            &self.draw_context,
            &Frustum::from_view_projection(&self.camera.view_projection_matrix(self.aspect_ratio())),
        );
        self.stats.drawcall_count = stats.drawcall_count;
        self.stats.triangle_count = stats.triangle_count;
        self.stats.finish_mesh_draw(draw_started);

        transition_image(
            device,
            cmd.handle(),
            targets.draw.handle(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::GENERAL,
        );
        if !gpu.postprocess.is_empty() {
            transition_image(
                device,
                cmd.handle(),
                targets.postprocess.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
            );
            gpu.postprocess
                .record(cmd, &targets.draw, &targets.postprocess, extent);
        }

        let swapchain_image = self.swapchain.image(image_index);
        transition_image(
            device,
            cmd.handle(),
            targets.draw.handle(),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        transition_image(
            device,
            cmd.handle(),
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        copy_image_to_image(
            device,
            cmd.handle(),
            targets.draw.handle(),
            swapchain_image,
            extent,
            self.swapchain.extent(),
        );
        transition_image(
            device,
            cmd.handle(),
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        Ok(())
    }

    /// Draws the visible objects in submission order, rebinding only what
    /// changes between consecutive objects.
    fn draw_geometry(
        gpu: &GpuResources,
        cmd: &CommandBuffer,
        scene_set: vk::DescriptorSet,
        extent: vk::Extent2D,
        context: &DrawContext<MeshAssetGpu>,
        frustum: &Frustum,
    ) -> EngineStats {
        let mut stats = EngineStats::default();
        let order = draw_order(&context.objects, frustum);

        let bundle = RenderingConfig::new(extent)
            .with_color(ColorAttachment::new(gpu.targets.draw.view()))
            .with_depth(DepthAttachment::new(gpu.targets.depth.view()))
            .build();
        cmd.begin_rendering(&bundle.info());

        let mut last_pipeline = vk::Pipeline::null();
        let mut last_material = vk::DescriptorSet::null();
        let mut last_index_buffer = vk::Buffer::null();

        for index in order {
            let object = &context.objects[index];
            let material = &object.material;
            let layout = material.template.layout.handle();

            if material.set != last_material {
                last_material = material.set;
                let pipeline = material.template.pipeline.handle();
                if pipeline != last_pipeline {
                    last_pipeline = pipeline;
                    cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
                    cmd.bind_descriptor_sets(
                        vk::PipelineBindPoint::GRAPHICS,
                        layout,
                        0,
                        &[scene_set, gpu.bindless.set()],
                    );
                    cmd.set_viewport(extent);
                    cmd.set_scissor(extent);
                }
                cmd.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, layout, 2, &[material.set]);
            }

            let buffers = &object.mesh.buffers;
            if buffers.buffer.handle() != last_index_buffer {
                last_index_buffer = buffers.buffer.handle();
                cmd.bind_index_buffer(last_index_buffer, buffers.index_offset);
            }

            let push = GpuDrawPushConstants::new(object.transform, buffers.vertex_address);
            cmd.push_constants(
                layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                &push,
            );
            cmd.draw_indexed(object.index_count, object.first_index);
            stats.record_draw(object.index_count);
        }

        cmd.end_rendering();
        stats
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.device().wait_idle() {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }

        self.draw_context.clear();
        self.gpu.frames.flush_all();
        if let Some(scene) = self.gpu.scene.take() {
            scene.release_slots(&mut self.gpu.bindless);
        }
        self.gpu.materials.clear_templates();

        // SAFETY: The device is idle, and each field is dropped exactly once
        // after everything created from it.
        unsafe {
            ManuallyDrop::drop(&mut self.gpu);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }
        info!("Engine destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn ndc_depth(proj: &Mat4, distance: f32) -> f32 {
        let clip = *proj * Vec4::new(0.0, 0.0, -distance, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_draw_extent_is_overlap() {
        assert_eq!(draw_extent(extent(800, 600), extent(1920, 1080)), extent(800, 600));
        assert_eq!(draw_extent(extent(2560, 600), extent(1920, 1080)), extent(1920, 600));
    }

    #[test]
    fn test_reverse_z_maps_near_to_one() {
        let proj = reverse_z_projection(70.0, 16.0 / 9.0, 0.1, 1000.0);
        assert!((ndc_depth(&proj, 0.1) - 1.0).abs() < 1e-4);
        assert!(ndc_depth(&proj, 1000.0).abs() < 1e-4);
        assert!(ndc_depth(&proj, 1.0) > ndc_depth(&proj, 10.0));
    }

    #[test]
    fn test_reverse_z_keeps_y_flip() {
        let proj = reverse_z_projection(90.0, 1.0, 0.1, 100.0);
        let clip = proj * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_target_descs() {
        let color = color_target_desc(extent(640, 480));
        assert_eq!(color.format, DRAW_FORMAT);
        assert!(color.usage.contains(vk::ImageUsageFlags::STORAGE));
        assert!(color.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert_eq!(color.extent.depth, 1);

        let depth = depth_target_desc(extent(640, 480));
        assert_eq!(depth.format, DEPTH_FORMAT);
        assert_eq!(depth.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
    }
}
