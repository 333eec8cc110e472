//! Physical device (GPU) selection.
//!
//! The selection process:
//! 1. Enumerate all available GPUs and log each of them
//! 2. Check each GPU for Vulkan 1.3, the required device extensions,
//!    dynamic rendering, synchronization2, and a graphics + present queue
//! 3. Score the remaining GPUs (discrete GPUs first) and pick the best
//!
//! Failure to find any device is fatal for the renderer: there is no degraded
//! mode without a device.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::instance::first_missing;

/// Device extensions every selected GPU must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 2] =
    [ash::khr::swapchain::NAME, ash::khr::push_descriptor::NAME];

/// Queue family indices for different queue types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
    /// Compute family, dedicated when the device has one.
    pub compute_family: Option<u32>,
    /// Transfer family, dedicated when the device has one.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics and present families are both known.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(4);
        for family in [
            self.graphics_family,
            self.present_family,
            self.compute_family,
            self.transfer_family,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Optional core features enabled when the device supports them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptionalFeatures {
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    pub fill_mode_non_solid: bool,
    pub geometry_shader: bool,
}

impl OptionalFeatures {
    /// Read the optional features out of the supported feature set.
    pub fn from_supported(supported: &vk::PhysicalDeviceFeatures) -> Self {
        Self {
            sampler_anisotropy: supported.sampler_anisotropy == vk::TRUE,
            sample_rate_shading: supported.sample_rate_shading == vk::TRUE,
            fill_mode_non_solid: supported.fill_mode_non_solid == vk::TRUE,
            geometry_shader: supported.geometry_shader == vk::TRUE,
        }
    }

    /// The feature struct to pass at device creation.
    pub fn to_vk(self) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(self.sampler_anisotropy)
            .sample_rate_shading(self.sample_rate_shading)
            .fill_mode_non_solid(self.fill_mode_non_solid)
            .geometry_shader(self.geometry_shader)
    }
}

/// Information about the selected physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, pipeline cache UUID).
    pub properties: vk::PhysicalDeviceProperties,
    /// Optional features that will be enabled.
    pub features: OptionalFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        device_name(&self.properties)
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
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
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("features", &self.features)
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> &str {
    properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown Device")
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

/// Selects the most suitable physical device for rendering.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    // SAFETY: the instance is alive for the duration of the call.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut suitable_devices: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();
    for device in devices {
        if let Some(info) = check_device_suitability(instance, device, surface, surface_loader) {
            let score = rate_device(&info);
            debug!("GPU '{}' score: {}", info.device_name(), score);
            suitable_devices.push((info, score));
        }
    }

    // Highest score wins; ties keep enumeration order
    let Some((selected, score)) = suitable_devices
        .into_iter()
        .rev()
        .max_by_key(|(_, score)| *score)
    else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}, {:?}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score,
        selected.queue_families
    );

    Ok(selected)
}

/// Returns `Some(PhysicalDeviceInfo)` if the device meets all requirements.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    // SAFETY: device was enumerated from this instance.
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = device_name(&properties);

    info!(
        "GPU '{}' ({}), Vulkan {}.{}.{}",
        name,
        device_type_name(properties.device_type),
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    );

    if !meets_api_version(properties.api_version) {
        debug!("GPU '{}' skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    let extensions = unsafe { instance.enumerate_device_extension_properties(device) }.ok()?;
    if let Some(missing) = first_missing(&REQUIRED_DEVICE_EXTENSIONS, &extensions) {
        debug!("GPU '{}' skipped: missing extension {:?}", name, missing);
        return None;
    }

    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
    // SAFETY: the feature chain lives on this stack frame.
    unsafe { instance.get_physical_device_features2(device, &mut features2) };
    let supported = features2.features;
    if features13.dynamic_rendering == vk::FALSE || features13.synchronization2 == vk::FALSE {
        debug!("GPU '{}' skipped: dynamic rendering or synchronization2 unsupported", name);
        return None;
    }

    // SAFETY: device was enumerated from this instance.
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = pick_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });
    if !queue_families.is_complete() {
        debug!("GPU '{}' skipped: no graphics + present queue", name);
        return None;
    }

    // SAFETY: device was enumerated from this instance.
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features: OptionalFeatures::from_supported(&supported),
        memory_properties,
        queue_families,
    })
}

fn meets_api_version(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Choose queue families from the device's family list.
///
/// Graphics prefers a family that can also present; compute and transfer
/// prefer dedicated families and otherwise share the graphics family.
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(i, family)| (i as u32, family.queue_flags))
    };

    let present: Vec<u32> = usable().map(|(i, _)| i).filter(|&i| supports_present(i)).collect();

    let graphics_family = usable()
        .filter(|(_, flags)| flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i)
        .min_by_key(|i| !present.contains(i));

    let present_family = graphics_family
        .filter(|g| present.contains(g))
        .or_else(|| present.first().copied());

    let compute_family = usable()
        .find(|(_, flags)| {
            flags.contains(vk::QueueFlags::COMPUTE) && !flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(i, _)| i)
        .or(graphics_family);

    let transfer_family = usable()
        .find(|(_, flags)| {
            flags.contains(vk::QueueFlags::TRANSFER)
                && !flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .map(|(i, _)| i)
        .or(graphics_family);

    QueueFamilyIndices {
        graphics_family,
        present_family,
        compute_family,
        transfer_family,
    }
}

/// Rates a physical device based on its capabilities.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.queue_families.compute_family != info.queue_families.graphics_family {
        score += 100;
    }
    if info.queue_families.transfer_family != info.queue_families.graphics_family {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_complete() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            ..Default::default()
        };
        assert!(indices.is_complete());
        assert!(!QueueFamilyIndices::default().is_complete());
    }

    #[test]
    fn test_unique_families_with_duplicates() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            compute_family: Some(0),
            transfer_family: Some(1),
        };
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_pick_prefers_dedicated_compute_and_transfer() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |i| i == 0);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.compute_family, Some(1));
        assert_eq!(indices.transfer_family, Some(2));
    }

    #[test]
    fn test_pick_prefers_graphics_family_that_presents() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = pick_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
        // No dedicated queues: both fall back to graphics
        assert_eq!(indices.compute_family, Some(1));
        assert_eq!(indices.transfer_family, Some(1));
    }

    #[test]
    fn test_pick_separate_present_family() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let indices = pick_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_pick_without_present_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(!pick_queue_families(&families, |_| false).is_complete());
    }

    #[test]
    fn test_pick_skips_empty_families() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(pick_queue_families(&families, |_| true).graphics_family, Some(1));
    }

    #[test]
    fn test_optional_features_follow_support() {
        let supported = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .geometry_shader(true);
        let features = OptionalFeatures::from_supported(&supported);
        assert!(features.sampler_anisotropy);
        assert!(features.geometry_shader);
        assert!(!features.fill_mode_non_solid);

        let enabled = features.to_vk();
        assert_eq!(enabled.sampler_anisotropy, vk::TRUE);
        assert_eq!(enabled.sample_rate_shading, vk::FALSE);
    }

    #[test]
    fn test_meets_api_version() {
        assert!(meets_api_version(vk::API_VERSION_1_3));
        assert!(!meets_api_version(vk::API_VERSION_1_2));
        assert!(meets_api_version(vk::make_api_version(0, 2, 0, 0)));
    }
}
