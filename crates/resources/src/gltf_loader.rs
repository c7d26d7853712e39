//! glTF import to CPU-side scene data.
//!
//! # Overview
//!
//! [`load_gltf`] reads a `.gltf` or `.glb` file and returns a [`LoadedScene`]:
//! decoded images, sampler settings, materials, meshes with their surfaces and
//! bounds, and the node hierarchy. Nothing here touches the GPU; the renderer
//! turns a `LoadedScene` into buffers, textures and material instances.
//!
//! Problems with individual assets do not abort the load. An image that
//! cannot be decoded is replaced by the error checkerboard, a file without
//! materials gets one default material, and primitives without indices are
//! skipped. Only an unreadable or malformed file is an error.
//!
//! # Example
//!
//! ```no_run
//! use ember_resources::gltf_loader::load_gltf;
//!
//! let scene = load_gltf("assets/structure.glb")?;
//! println!("{} meshes, {} roots", scene.meshes.len(), scene.roots.len());
//! # Ok::<(), ember_resources::ResourceError>(())
//! ```

use std::path::{Path, PathBuf};

use ember_scene::{Bounds, MaterialPass, Transform};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use tracing::{debug, info, warn};

use crate::defaults::ImageData;
use crate::error::{ResourceError, ResourceResult};
use crate::vertex::Vertex;

/// Texel filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

/// Filter between mip levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MipmapMode {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

/// Sampler settings of one glTF sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerInfo {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
}

/// A decoded image. `substituted` is set when decoding failed and `data`
/// holds the error checkerboard instead.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub name: Option<String>,
    pub data: ImageData,
    pub substituted: bool,
}

/// A glTF texture: an image paired with an optional sampler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRef {
    pub image: usize,
    pub sampler: Option<usize>,
}

/// Material parameters. Texture fields index [`LoadedScene::textures`].
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData {
    pub name: Option<String>,
    pub pass: MaterialPass,
    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub base_color_texture: Option<usize>,
    pub metal_rough_texture: Option<usize>,
    pub normal_texture: Option<usize>,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: None,
            pass: MaterialPass::MainColor,
            base_color_factor: Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            base_color_texture: None,
            metal_rough_texture: None,
            normal_texture: None,
        }
    }
}

/// Index range of a mesh drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceData {
    pub start_index: u32,
    pub count: u32,
    /// Index into [`LoadedScene::materials`].
    pub material: usize,
}

/// Vertices and indices of every primitive of one glTF mesh.
#[derive(Clone, Debug)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    /// Indices already offset to address `vertices`.
    pub indices: Vec<u32>,
    pub surfaces: Vec<SurfaceData>,
    pub bounds: Bounds,
}

impl MeshData {
    /// `true` if some primitive contributed indexed triangles. Meshes made
    /// only of non-indexed primitives end up empty.
    pub fn is_drawable(&self) -> bool {
        !self.indices.is_empty() && !self.vertices.is_empty() && !self.surfaces.is_empty()
    }
}

/// A node's local transform, children and mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeData {
    pub name: Option<String>,
    pub local_transform: Mat4,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
}

/// Everything read from one glTF file.
#[derive(Clone, Debug, Default)]
pub struct LoadedScene {
    pub name: String,
    pub samplers: Vec<SamplerInfo>,
    pub images: Vec<LoadedImage>,
    pub textures: Vec<TextureRef>,
    pub materials: Vec<MaterialData>,
    pub meshes: Vec<MeshData>,
    pub nodes: Vec<NodeData>,
    /// Nodes that are nobody's child.
    pub roots: Vec<usize>,
}

impl LoadedScene {
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.indices.len() / 3).sum()
    }
}

/// Loads a glTF file from disk.
///
/// # Errors
///
/// Returns an error if the file does not exist, cannot be parsed, or one of
/// its buffers cannot be read.
pub fn load_gltf(path: impl AsRef<Path>) -> ResourceResult<LoadedScene> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }
    info!("Loading glTF: {}", path.display());

    let gltf_error = |source| ResourceError::Gltf {
        path: path.to_path_buf(),
        source,
    };
    let gltf::Gltf { document, blob } = gltf::Gltf::open(path).map_err(gltf_error)?;
    let base = path.parent();
    let buffers = gltf::import_buffers(&document, base, blob).map_err(gltf_error)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let samplers = document.samplers().map(|s| sampler_info(&s)).collect();
    let images = document
        .images()
        .map(|image| load_image(&image, base, &buffers))
        .collect();
    let textures = document
        .textures()
        .map(|t| TextureRef {
            image: t.source().index(),
            sampler: t.sampler().index(),
        })
        .collect();

    let mut materials: Vec<MaterialData> = document.materials().map(|m| material_data(&m)).collect();
    if materials.is_empty() {
        debug!("{} has no materials, using the default", name);
        materials.push(MaterialData::default());
    }

    let meshes = document
        .meshes()
        .map(|mesh| mesh_data(&name, &mesh, &buffers))
        .collect::<ResourceResult<Vec<_>>>()?;

    let nodes: Vec<NodeData> = document.nodes().map(|n| node_data(&n)).collect();
    let roots = find_roots(&nodes);

    let scene = LoadedScene {
        name,
        samplers,
        images,
        textures,
        materials,
        meshes,
        nodes,
        roots,
    };
    info!(
        "Loaded {}: {} meshes, {} vertices, {} triangles, {} materials, {} images",
        scene.name,
        scene.meshes.len(),
        scene.vertex_count(),
        scene.triangle_count(),
        scene.materials.len(),
        scene.images.len()
    );
    Ok(scene)
}

/// Maps a glTF sampler. Missing filters default to nearest.
pub fn sampler_info(sampler: &gltf::texture::Sampler) -> SamplerInfo {
    use gltf::texture::{MagFilter, MinFilter};

    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Linear) => Filter::Linear,
        Some(MagFilter::Nearest) | None => Filter::Nearest,
    };
    let min = sampler.min_filter().unwrap_or(MinFilter::Nearest);
    let (min_filter, mipmap_mode) = match min {
        MinFilter::Nearest => (Filter::Nearest, MipmapMode::Linear),
        MinFilter::Linear => (Filter::Linear, MipmapMode::Linear),
        MinFilter::NearestMipmapNearest => (Filter::Nearest, MipmapMode::Nearest),
        MinFilter::LinearMipmapNearest => (Filter::Linear, MipmapMode::Nearest),
        MinFilter::NearestMipmapLinear => (Filter::Nearest, MipmapMode::Linear),
        MinFilter::LinearMipmapLinear => (Filter::Linear, MipmapMode::Linear),
    };

    SamplerInfo {
        mag_filter,
        min_filter,
        mipmap_mode,
        address_u: address_mode(sampler.wrap_s()),
        address_v: address_mode(sampler.wrap_t()),
    }
}

fn address_mode(mode: gltf::texture::WrappingMode) -> AddressMode {
    use gltf::texture::WrappingMode;

    match mode {
        WrappingMode::ClampToEdge => AddressMode::ClampToEdge,
        WrappingMode::MirroredRepeat => AddressMode::MirroredRepeat,
        WrappingMode::Repeat => AddressMode::Repeat,
    }
}

fn load_image(
    image: &gltf::Image,
    base: Option<&Path>,
    buffers: &[gltf::buffer::Data],
) -> LoadedImage {
    let name = image.name().map(str::to_owned);
    match decode_image(image.source(), base, buffers) {
        Ok(data) => LoadedImage {
            name,
            data,
            substituted: false,
        },
        Err(err) => {
            warn!(
                "Image {} ({}) failed to load, using checkerboard: {}",
                image.index(),
                name.as_deref().unwrap_or("unnamed"),
                err
            );
            LoadedImage {
                name,
                data: ImageData::checkerboard(),
                substituted: true,
            }
        }
    }
}

fn decode_image(
    source: gltf::image::Source,
    base: Option<&Path>,
    buffers: &[gltf::buffer::Data],
) -> ResourceResult<ImageData> {
    let embedded = matches!(&source, gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:"));
    if embedded {
        let data = gltf::image::Data::from_source(source, base, buffers)
            .map_err(ResourceError::EmbeddedImage)?;
        return rgba8_from_gltf(data.format, data.width, data.height, &data.pixels);
    }

    let decoded = match source {
        gltf::image::Source::View { view, .. } => {
            let buffer = &buffers[view.buffer().index()].0;
            let start = view.offset();
            let end = start + view.length();
            let bytes = buffer.get(start..end).ok_or_else(|| {
                ResourceError::UnsupportedImageSource(format!(
                    "buffer view {} out of range",
                    view.index()
                ))
            })?;
            image::load_from_memory(bytes)?
        }
        gltf::image::Source::Uri { uri, .. } => {
            let path: PathBuf = base.map(|b| b.join(uri)).unwrap_or_else(|| PathBuf::from(uri));
            image::open(&path)?
        }
    };

    let rgba = decoded.to_rgba8();
    Ok(ImageData {
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    })
}

/// Expands pixels decoded by `gltf` to RGBA8. Gray images replicate the gray
/// value, 16-bit channels keep their high byte and float channels are
/// clamped to `[0, 1]`.
fn rgba8_from_gltf(
    format: gltf::image::Format,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> ResourceResult<ImageData> {
    use gltf::image::Format;

    let (channels, channel_bytes) = match format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => (4, 1),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        Format::R32G32B32FLOAT => (3, 4),
        Format::R32G32B32A32FLOAT => (4, 4),
    };
    let texel_bytes = channels * channel_bytes;
    let texels = width as usize * height as usize;
    if pixels.len() < texels * texel_bytes {
        return Err(ResourceError::UnsupportedImageSource(format!(
            "{:?} image of {}x{} holds only {} bytes",
            format,
            width,
            height,
            pixels.len()
        )));
    }

    let channel = |bytes: &[u8]| -> u8 {
        match bytes {
            [v] => *v,
            [lo, hi] => (u16::from_ne_bytes([*lo, *hi]) >> 8) as u8,
            [a, b, c, d] => (f32::from_ne_bytes([*a, *b, *c, *d]).clamp(0.0, 1.0) * 255.0).round() as u8,
            _ => 0,
        }
    };

    let mut out = Vec::with_capacity(texels * 4);
    for texel in pixels.chunks_exact(texel_bytes).take(texels) {
        let mut v = [0u8; 4];
        for (dst, src) in v.iter_mut().zip(texel.chunks_exact(channel_bytes)) {
            *dst = channel(src);
        }
        let rgba = match channels {
            1 => [v[0], v[0], v[0], 255],
            2 => [v[0], v[0], v[0], v[1]],
            3 => [v[0], v[1], v[2], 255],
            _ => v,
        };
        out.extend_from_slice(&rgba);
    }

    Ok(ImageData {
        width,
        height,
        pixels: out,
    })
}

fn material_data(material: &gltf::Material) -> MaterialData {
    let pbr = material.pbr_metallic_roughness();
    let pass = match material.alpha_mode() {
        gltf::material::AlphaMode::Blend => MaterialPass::Transparent,
        gltf::material::AlphaMode::Opaque | gltf::material::AlphaMode::Mask => {
            MaterialPass::MainColor
        }
    };

    MaterialData {
        name: material.name().map(str::to_owned),
        pass,
        base_color_factor: Vec4::from_array(pbr.base_color_factor()),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        base_color_texture: pbr.base_color_texture().map(|t| t.texture().index()),
        metal_rough_texture: pbr.metallic_roughness_texture().map(|t| t.texture().index()),
        normal_texture: material.normal_texture().map(|t| t.texture().index()),
    }
}

fn mesh_data(
    scene_name: &str,
    mesh: &gltf::Mesh,
    buffers: &[gltf::buffer::Data],
) -> ResourceResult<MeshData> {
    let name = match mesh.name() {
        Some(n) if !n.is_empty() => format!("{}_{}", scene_name, n),
        _ => format!("{}_{}", scene_name, mesh.index()),
    };

    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut surfaces = Vec::new();

    for primitive in mesh.primitives() {
        let reader = primitive.reader(|buffer| Some(buffers[buffer.index()].0.as_slice()));

        let Some(primitive_indices) = reader.read_indices() else {
            debug!("Skipping non-indexed primitive in {}", name);
            continue;
        };
        let Some(positions) = reader.read_positions() else {
            return Err(ResourceError::NoPositionData(name));
        };

        let initial_vertex = vertices.len();
        let start_index = indices.len() as u32;
        indices.extend(
            primitive_indices
                .into_u32()
                .map(|i| i + initial_vertex as u32),
        );

        vertices.extend(positions.map(|p| Vertex::new(Vec3::from_array(p))));
        let primitive_vertices = &mut vertices[initial_vertex..];

        if let Some(normals) = reader.read_normals() {
            for (vertex, n) in primitive_vertices.iter_mut().zip(normals) {
                vertex.normal = Vec3::from_array(n);
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            for (vertex, uv) in primitive_vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.set_uv(Vec2::from_array(uv));
            }
        }
        if let Some(colors) = reader.read_colors(0) {
            for (vertex, c) in primitive_vertices.iter_mut().zip(colors.into_rgba_f32()) {
                vertex.color = Vec4::from_array(c);
            }
        }

        surfaces.push(SurfaceData {
            start_index,
            count: indices.len() as u32 - start_index,
            material: primitive.material().index().unwrap_or(0),
        });
    }

    let bounds = Bounds::from_points(vertices.iter().map(|v| v.position));
    Ok(MeshData {
        name,
        vertices,
        indices,
        surfaces,
        bounds,
    })
}

fn node_data(node: &gltf::Node) -> NodeData {
    let local_transform = match node.transform() {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => Transform::new()
            .with_position(Vec3::from_array(translation))
            .with_rotation(Quat::from_array(rotation))
            .with_scale(Vec3::from_array(scale))
            .local_matrix(),
    };

    NodeData {
        name: node.name().map(str::to_owned),
        local_transform,
        children: node.children().map(|c| c.index()).collect(),
        mesh: node.mesh().map(|m| m.index()),
    }
}

/// Indices of nodes that no other node lists as a child, in file order.
pub fn find_roots(nodes: &[NodeData]) -> Vec<usize> {
    let mut has_parent = vec![false; nodes.len()];
    for node in nodes {
        for &child in &node.children {
            if let Some(flag) = has_parent.get_mut(child) {
                *flag = true;
            }
        }
    }
    has_parent
        .iter()
        .enumerate()
        .filter(|(_, has_parent)| !**has_parent)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(children: Vec<usize>) -> NodeData {
        NodeData {
            name: None,
            local_transform: Mat4::IDENTITY,
            children,
            mesh: None,
        }
    }

    #[test]
    fn test_find_roots() {
        let nodes = vec![node(vec![2]), node(vec![]), node(vec![3]), node(vec![])];
        assert_eq!(find_roots(&nodes), vec![0, 1]);
    }

    #[test]
    fn test_find_roots_ignores_bad_child_index() {
        let nodes = vec![node(vec![7])];
        assert_eq!(find_roots(&nodes), vec![0]);
    }

    #[test]
    fn test_default_material_is_opaque_white() {
        let material = MaterialData::default();
        assert_eq!(material.pass, MaterialPass::MainColor);
        assert_eq!(material.base_color_factor, Vec4::ONE);
        assert!(material.base_color_texture.is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = load_gltf("does/not/exist.gltf");
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }

    #[test]
    fn test_sampler_defaults() {
        let info = SamplerInfo::default();
        assert_eq!(info.mag_filter, Filter::Nearest);
        assert_eq!(info.address_u, AddressMode::Repeat);
    }

    #[test]
    fn test_rgba8_passthrough() {
        let pixels = [1, 2, 3, 4, 5, 6, 7, 8];
        let image = rgba8_from_gltf(gltf::image::Format::R8G8B8A8, 2, 1, &pixels).unwrap();
        assert_eq!(image.width, 2);
        assert_eq!(image.pixels, pixels.to_vec());
    }

    #[test]
    fn test_gray_and_rgb_expand_to_rgba() {
        let gray = rgba8_from_gltf(gltf::image::Format::R8G8, 1, 1, &[40, 200]).unwrap();
        assert_eq!(gray.pixels, vec![40, 40, 40, 200]);

        let rgb = rgba8_from_gltf(gltf::image::Format::R8G8B8, 1, 1, &[9, 8, 7]).unwrap();
        assert_eq!(rgb.pixels, vec![9, 8, 7, 255]);
    }

    #[test]
    fn test_wide_channels_are_narrowed() {
        let wide: Vec<u8> = [0xABCDu16, 0x0100, 0xFFFF]
            .iter()
            .flat_map(|c| c.to_ne_bytes())
            .collect();
        let image = rgba8_from_gltf(gltf::image::Format::R16G16B16, 1, 1, &wide).unwrap();
        assert_eq!(image.pixels, vec![0xAB, 0x01, 0xFF, 255]);

        let float: Vec<u8> = [0.5f32, -1.0, 2.0, 1.0]
            .iter()
            .flat_map(|c| c.to_ne_bytes())
            .collect();
        let image = rgba8_from_gltf(gltf::image::Format::R32G32B32A32FLOAT, 1, 1, &float).unwrap();
        assert_eq!(image.pixels, vec![128, 0, 255, 255]);
    }

    #[test]
    fn test_short_pixel_buffer_is_error() {
        let result = rgba8_from_gltf(gltf::image::Format::R8G8B8A8, 2, 2, &[0; 8]);
        assert!(matches!(result, Err(ResourceError::UnsupportedImageSource(_))));
    }

    #[test]
    fn test_mesh_without_indices_is_not_drawable() {
        let mut mesh = MeshData {
            name: "points".to_string(),
            vertices: vec![Vertex::new(Vec3::ZERO)],
            indices: Vec::new(),
            surfaces: Vec::new(),
            bounds: Bounds::from_points([Vec3::ZERO]),
        };
        assert!(!mesh.is_drawable());

        mesh.indices = vec![0, 0, 0];
        mesh.surfaces.push(SurfaceData {
            start_index: 0,
            count: 3,
            material: 0,
        });
        assert!(mesh.is_drawable());
    }
}
