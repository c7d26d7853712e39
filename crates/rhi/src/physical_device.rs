//! Physical device selection.
//!
//! The engine records, submits and presents from a single graphics queue, so a
//! device qualifies only if one queue family supports both graphics and
//! presentation to the window surface. It must also expose Vulkan 1.3 with
//! dynamic rendering, synchronization2, buffer device addresses and the
//! descriptor-indexing features the bindless texture array relies on.

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// A selected GPU and the queue family the engine will use on it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Family used for graphics, compute dispatch and present.
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field("graphics_family", &self.graphics_family)
            .finish()
    }
}

/// Picks the highest-scoring GPU that meets the engine's requirements.
///
/// # Errors
/// Returns [`RhiError::NoSuitableGpu`] if no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;
    for device in devices {
        let Some(candidate) = check_device(instance, device, surface, surface_loader) else {
            continue;
        };
        let score = score_device(
            candidate.properties.device_type,
            candidate.device_local_memory(),
        );
        debug!("GPU '{}' score {}", candidate.device_name(), score);
        if best.as_ref().is_none_or(|(_, s)| score > *s) {
            best = Some((candidate, score));
        }
    }

    let Some((selected, _)) = best else {
        warn!("No GPU supports the required Vulkan 1.3 feature set");
        return Err(RhiError::NoSuitableGpu);
    };

    info!(
        "Selected GPU '{}' (queue family {})",
        selected.device_name(),
        selected.graphics_family
    );
    Ok(selected)
}

fn check_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .unwrap_or(c"Unknown")
        .to_owned();

    if !supports_api_1_3(properties.api_version) {
        debug!("GPU {:?} skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    if !supports_required_features(instance, device) {
        debug!("GPU {:?} skipped: missing required features", name);
        return None;
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let candidates: Vec<(vk::QueueFlags, bool)> = families
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let present = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i as u32, surface)
                    .unwrap_or(false)
            };
            let flags = if family.queue_count == 0 {
                vk::QueueFlags::empty()
            } else {
                family.queue_flags
            };
            (flags, present)
        })
        .collect();

    let Some(graphics_family) = pick_graphics_family(&candidates) else {
        debug!("GPU {:?} skipped: no graphics+present queue family", name);
        return None;
    };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        graphics_family,
    })
}

fn supports_required_features(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut features12)
        .push_next(&mut features13);
    unsafe { instance.get_physical_device_features2(device, &mut features) };

    let required = [
        features12.buffer_device_address,
        features12.descriptor_indexing,
        features12.runtime_descriptor_array,
        features12.descriptor_binding_partially_bound,
        features12.descriptor_binding_variable_descriptor_count,
        features12.descriptor_binding_sampled_image_update_after_bind,
        features12.shader_sampled_image_array_non_uniform_indexing,
        features13.dynamic_rendering,
        features13.synchronization2,
    ];
    required.iter().all(|&f| f == vk::TRUE)
}

fn supports_api_1_3(version: u32) -> bool {
    let major = vk::api_version_major(version);
    let minor = vk::api_version_minor(version);
    major > 1 || (major == 1 && minor >= 3)
}

/// First family that can both draw and present.
fn pick_graphics_family(families: &[(vk::QueueFlags, bool)]) -> Option<u32> {
    families
        .iter()
        .position(|(flags, present)| {
            *present && flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .map(|i| i as u32)
}

fn score_device(device_type: vk::PhysicalDeviceType, device_local_bytes: u64) -> u32 {
    let base = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    let vram_mb = (device_local_bytes / (1024 * 1024)).min(16_000) as u32;
    base + vram_mb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_gate() {
        assert!(supports_api_1_3(vk::make_api_version(0, 1, 3, 0)));
        assert!(supports_api_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_api_1_3(vk::make_api_version(0, 1, 2, 198)));
    }

    #[test]
    fn test_pick_graphics_family_requires_present() {
        let families = [
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            (vk::QueueFlags::TRANSFER, true),
            (
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                true,
            ),
        ];
        assert_eq!(pick_graphics_family(&families), Some(2));
    }

    #[test]
    fn test_pick_graphics_family_none() {
        let families = [(vk::QueueFlags::COMPUTE, true), (vk::QueueFlags::empty(), true)];
        assert_eq!(pick_graphics_family(&families), None);
    }

    #[test]
    fn test_discrete_beats_integrated() {
        let discrete = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, 2 << 30);
        let integrated = score_device(vk::PhysicalDeviceType::INTEGRATED_GPU, 16 << 30);
        assert!(discrete > integrated);
    }

    #[test]
    fn test_vram_contribution_is_capped() {
        let a = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, 64 << 30);
        let b = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, 128 << 30);
        assert_eq!(a, b);
    }
}
