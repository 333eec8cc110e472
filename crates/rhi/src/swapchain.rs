//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and
//! presentation, and classifies the results of the latter two into the
//! outcomes the frame loop understands.
//!
//! # Overview
//!
//! - Surface format: B8G8R8A8_SRGB, then B8G8R8A8_UNORM, then the first one
//!   the surface reports
//! - Present mode: the configured preference when available, FIFO otherwise
//! - Image usage: color attachment and transfer destination (the UI pass
//!   blits the composited image in), transfer source when supported
//! - Image count: `min + 1` clamped to the maximum on first creation, and
//!   then fixed for every recreation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::instance::Instance;
//! use renderer_rhi::swapchain::{AcquireResult, Swapchain, SwapchainDesc};
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR, semaphore: vk::Semaphore) -> renderer_rhi::RhiResult<()> {
//! let swapchain = Swapchain::new(instance, device, surface, &SwapchainDesc::new(1280, 720))?;
//! match swapchain.acquire_next_image(semaphore)? {
//!     AcquireResult::Acquired { image_index, .. } => { /* record and submit */ }
//!     AcquireResult::OutOfDate => { /* recreate and skip this frame */ }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: the surface and physical device come from the same instance
        // as the loader.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Creation parameters for a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Requested framebuffer width, used when the surface leaves it open
    pub width: u32,
    /// Requested framebuffer height
    pub height: u32,
    /// Preferred present mode, FIFO when unavailable
    pub present_mode: vk::PresentModeKHR,
}

impl SwapchainDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }

    pub fn with_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.present_mode = present_mode;
        self
    }
}

/// Outcome of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image was acquired; `suboptimal` asks for recreation after present.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed; recreate and skip this frame.
    OutOfDate,
}

/// Outcome of presenting a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    /// Out of date or suboptimal; the frame still counts.
    NeedsRecreate,
}

/// Maps a raw acquire result to the frame loop's outcomes.
///
/// # Errors
///
/// Everything other than success, suboptimal, or out-of-date is fatal.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireResult> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireResult::Acquired {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
        Err(e) => {
            error!("Failed to acquire swapchain image: {:?}", e);
            Err(RhiError::VulkanError(e))
        }
    }
}

/// Maps a raw present result to the frame loop's outcomes.
///
/// # Errors
///
/// Everything other than success, suboptimal, or out-of-date is fatal.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentResult> {
    match result {
        Ok(false) => Ok(PresentResult::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::NeedsRecreate),
        Err(e) => {
            error!("Failed to present swapchain image: {:?}", e);
            Err(RhiError::VulkanError(e))
        }
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain handle and the views of its images. The image count
/// chosen at first creation is kept across [`recreate`](Self::recreate).
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    usage: vk::ImageUsageFlags,
    desc: SwapchainDesc,
}

impl Swapchain {
    /// Creates a new swapchain.
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, the surface offers no formats,
    /// the required image usage is unsupported, or creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        desc: &SwapchainDesc,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let mut swapchain = Self {
            device,
            swapchain_loader,
            surface_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            usage: vk::ImageUsageFlags::empty(),
            desc: *desc,
        };
        swapchain.create(None)?;
        Ok(swapchain)
    }

    /// Builds a swapchain (retiring the current one) and its image views.
    ///
    /// `required_count` pins the image count on recreation.
    fn create(&mut self, required_count: Option<u32>) -> RhiResult<()> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, self.desc.present_mode);
        let extent = choose_extent(&support.capabilities, self.desc.width, self.desc.height);
        let usage = choose_image_usage(support.capabilities.supported_usage_flags)?;
        let image_count = required_count
            .map(|count| clamp_image_count(&support.capabilities, count))
            .unwrap_or_else(|| determine_image_count(&support.capabilities));

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let queue_families = self.device.queue_families();
        let graphics_family = queue_families.graphics_family.unwrap_or_default();
        let present_family = queue_families.present_family.unwrap_or(graphics_family);
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // SAFETY: old_swapchain is either null or idle (callers wait for the device).
        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        self.destroy_image_views();
        if old_swapchain != vk::SwapchainKHR::null() {
            // SAFETY: retired by the creation above and no longer in use.
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        // SAFETY: the swapchain was just created.
        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        if let Some(expected) = required_count {
            check_image_count(expected, images.len() as u32)?;
        }

        self.image_views = create_image_views(&self.device, &images, surface_format.format)?;
        self.images = images;
        self.format = surface_format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.usage = usage;

        info!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Recreates the swapchain for a new framebuffer size.
    ///
    /// Drains the device first, then builds the replacement from the old
    /// handle. The image count stays what it was.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the driver hands back a
    /// different number of images, or any creation error.
    pub fn recreate(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.device.wait_idle()?;

        info!("Recreating swapchain for new size: {}x{}", width, height);

        self.desc.width = width;
        self.desc.height = height;
        let established = self.image_count();
        self.create(Some(established))
    }

    /// Acquires the next swapchain image, signaling `semaphore`.
    ///
    /// # Errors
    ///
    /// Fatal for anything but success, suboptimal, or out-of-date.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireResult> {
        // SAFETY: the semaphore is unsignaled and owned by the current frame slot.
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Presents `image_index` once `wait_semaphore` is signaled.
    ///
    /// # Errors
    ///
    /// Fatal for anything but success, suboptimal, or out-of-date.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentResult> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: the image was acquired from this swapchain this frame.
        classify_present(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.format.color_space
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Usage flags the images were created with.
    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    fn destroy_image_views(&mut self) {
        for image_view in self.image_views.drain(..) {
            // SAFETY: callers drain the device before recreation and drop.
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            // SAFETY: the renderer waits for the device before dropping the swapchain.
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }

            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

/// Chooses the surface format in ranked order: B8G8R8A8_SRGB, B8G8R8A8_UNORM
/// (both SRGB_NONLINEAR), then the first reported format.
///
/// `formats` must not be empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    const RANKED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

    for (rank, wanted) in RANKED.iter().enumerate() {
        if let Some(&format) = formats
            .iter()
            .find(|f| f.format == *wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        {
            if rank > 0 {
                warn!("Using fallback surface format: {:?}", format.format);
            }
            return format;
        }
    }

    warn!("Using first available surface format: {:?}", formats[0].format);
    formats[0]
}

/// Picks `preferred` when the surface supports it, FIFO otherwise.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        return preferred;
    }
    // FIFO is guaranteed to be available
    debug!("Present mode {:?} unavailable, using FIFO", preferred);
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent.
///
/// When the surface fixes its extent that extent is used; otherwise the
/// requested size is clamped to the surface limits.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    clamp_image_count(capabilities, capabilities.min_image_count + 1)
}

fn clamp_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, count: u32) -> u32 {
    let count = count.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// The image count is fixed once established.
///
/// # Errors
///
/// Returns [`RhiError::SwapchainError`] when the counts differ.
pub fn check_image_count(established: u32, actual: u32) -> RhiResult<()> {
    if established != actual {
        error!(
            "Swapchain image count changed from {} to {} on recreation",
            established, actual
        );
        return Err(RhiError::SwapchainError(format!(
            "swapchain image count changed from {established} to {actual}"
        )));
    }
    Ok(())
}

/// Usage flags for swapchain images.
///
/// # Errors
///
/// Color attachment and transfer destination are required.
pub fn choose_image_usage(supported: vk::ImageUsageFlags) -> RhiResult<vk::ImageUsageFlags> {
    let required = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST;
    if !supported.contains(required) {
        return Err(RhiError::SwapchainError(format!(
            "surface does not support image usage {:?} (supported: {:?})",
            required, supported
        )));
    }
    Ok(required | (supported & vk::ImageUsageFlags::TRANSFER_SRC))
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        // SAFETY: image belongs to a live swapchain on this device.
        let image_view = unsafe {
            device.handle().create_image_view(&create_info, None).map_err(|e| {
                RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e))
            })
        };
        match image_view {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    // SAFETY: created above and not yet used.
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(e);
            }
        }
    }

    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_ranked() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            choose_surface_format(&formats[..2]).format,
            vk::Format::B8G8R8A8_UNORM
        );
        assert_eq!(
            choose_surface_format(&formats[..1]).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&capabilities, 800, 600),
            vk::Extent2D {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        assert_eq!(choose_extent(&capabilities, 3000, 3000).width, 2000);
        assert_eq!(choose_extent(&capabilities, 50, 50).height, 100);
        assert_eq!(
            choose_extent(&capabilities, 800, 600),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 3);
    }

    #[test]
    fn test_pinned_count_respects_surface_minimum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(clamp_image_count(&capabilities, 2), 3);
        assert_eq!(clamp_image_count(&capabilities, 4), 4);
    }

    #[test]
    fn test_check_image_count() {
        assert!(check_image_count(3, 3).is_ok());
        assert!(matches!(
            check_image_count(3, 4),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_choose_image_usage() {
        let all = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::STORAGE;
        let usage = choose_image_usage(all).unwrap();
        assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(!usage.contains(vk::ImageUsageFlags::STORAGE));

        assert!(choose_image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT).is_err());
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((1, false))).unwrap(),
            AcquireResult::Acquired {
                image_index: 1,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireResult::OutOfDate
        );
        assert!(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentResult::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentResult::NeedsRecreate);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentResult::NeedsRecreate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            formats: vec![],
            ..adequate.clone()
        };
        assert!(!no_formats.is_adequate());
    }
}
