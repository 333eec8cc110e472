//! Presentable images plus the depth attachment sized with them.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use renderer_core::PresentModePreference;
use renderer_platform::FramebufferSource;
use renderer_rhi::RhiResult;
use renderer_rhi::device::Device;
use renderer_rhi::image::{ImageDesc, ImageViewSampler, SamplerDesc, create_image_view_sampler};
use renderer_rhi::instance::Instance;
use renderer_rhi::swapchain::{Swapchain, SwapchainDesc};

use crate::passes::SwapchainTarget;

/// Blocks while `source` reports a zero-area framebuffer.
///
/// Returns the first non-zero size, or `None` when the source cannot wait and
/// the size is still zero.
pub fn wait_for_framebuffer(source: &mut dyn FramebufferSource) -> Option<vk::Extent2D> {
    let mut waits = 0u32;
    loop {
        let (width, height) = source.framebuffer_size();
        if width > 0 && height > 0 {
            if waits > 0 {
                debug!("Framebuffer restored to {}x{} after {} wait(s)", width, height, waits);
            }
            return Some(vk::Extent2D { width, height });
        }
        if !source.wait_events() {
            debug!("Framebuffer is 0x0, deferring swapchain recreation");
            return None;
        }
        waits += 1;
    }
}

/// Whether a window resize to `width`×`height` invalidates a swapchain of
/// `current` extent. A zero-area size always does; recreation then waits for
/// the window to come back.
pub fn resize_needed(current: vk::Extent2D, width: u32, height: u32) -> bool {
    width == 0 || height == 0 || current != vk::Extent2D { width, height }
}

/// Shared depth attachment at `extent`; sampled by the lighting pass.
pub fn depth_image_desc(extent: vk::Extent2D, format: vk::Format) -> ImageDesc {
    ImageDesc::new_2d(
        "depth",
        extent,
        format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
    )
}

pub fn present_mode_for(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Swapchain and the depth buffer recreated alongside it.
pub struct SwapchainState {
    // Dropped before the swapchain
    depth: ImageViewSampler,
    swapchain: Swapchain,
    device: Arc<Device>,
    depth_format: vk::Format,
}

impl SwapchainState {
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        desc: &SwapchainDesc,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(instance, device.clone(), surface, desc)?;
        let depth = create_depth(&device, swapchain.extent(), depth_format)?;
        info!(
            "Swapchain state ready: {} images, depth {:?}",
            swapchain.image_count(),
            depth_format
        );
        Ok(Self {
            depth,
            swapchain,
            device,
            depth_format,
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn depth(&self) -> &ImageViewSampler {
        &self.depth
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn target(&self, image_index: u32) -> SwapchainTarget {
        let index = image_index as usize;
        SwapchainTarget {
            image: self.swapchain.image(index),
            view: self.swapchain.image_view(index),
            extent: self.swapchain.extent(),
            format: self.swapchain.format(),
        }
    }

    pub fn targets(&self) -> Vec<SwapchainTarget> {
        (0..self.swapchain.image_count()).map(|i| self.target(i)).collect()
    }

    /// Recreates the swapchain at `extent`, then the depth buffer at the
    /// extent the surface accepted. The previous depth image is released.
    ///
    /// # Errors
    ///
    /// Swapchain errors, including a changed image count, are fatal.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.swapchain.recreate(extent.width, extent.height)?;
        self.depth = create_depth(&self.device, self.swapchain.extent(), self.depth_format)?;
        Ok(())
    }
}

fn create_depth(device: &Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<ImageViewSampler> {
    create_image_view_sampler(
        device.clone(),
        &depth_image_desc(extent, format),
        &SamplerDesc::nearest_clamp(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        sizes: Vec<(u32, u32)>,
        waits: usize,
    }

    impl FramebufferSource for Scripted {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.sizes[self.waits.min(self.sizes.len() - 1)]
        }

        fn wait_events(&mut self) -> bool {
            self.waits += 1;
            true
        }
    }

    struct NonBlocking;

    impl FramebufferSource for NonBlocking {
        fn framebuffer_size(&self) -> (u32, u32) {
            (0, 0)
        }

        fn wait_events(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn test_nonzero_returns_immediately() {
        let mut source = Scripted {
            sizes: vec![(800, 600)],
            waits: 0,
        };
        assert_eq!(
            wait_for_framebuffer(&mut source),
            Some(vk::Extent2D { width: 800, height: 600 })
        );
        assert_eq!(source.waits, 0);
    }

    #[test]
    fn test_waits_through_zero_area() {
        let mut source = Scripted {
            sizes: vec![(0, 0), (1920, 0), (1920, 1080)],
            waits: 0,
        };
        assert_eq!(
            wait_for_framebuffer(&mut source),
            Some(vk::Extent2D { width: 1920, height: 1080 })
        );
        assert_eq!(source.waits, 2);
    }

    #[test]
    fn test_non_blocking_source_defers() {
        assert_eq!(wait_for_framebuffer(&mut NonBlocking), None);
    }

    #[test]
    fn test_resize_needed_only_on_change() {
        let current = vk::Extent2D { width: 1280, height: 720 };
        assert!(!resize_needed(current, 1280, 720));
        assert!(resize_needed(current, 1920, 1080));
        assert!(resize_needed(current, 0, 0));
        assert!(resize_needed(vk::Extent2D { width: 0, height: 0 }, 0, 0));
    }

    #[test]
    fn test_depth_is_sampled() {
        let desc = depth_image_desc(vk::Extent2D { width: 4, height: 4 }, vk::Format::D32_SFLOAT);
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert_eq!(desc.aspect(), vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_present_mode_mapping() {
        assert_eq!(present_mode_for(PresentModePreference::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(
            present_mode_for(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
    }
}
