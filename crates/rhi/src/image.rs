//! GPU images with their memory, view, and optional sampler.
//!
//! [`ImageViewSampler`] is the unit of ownership for every render target and
//! texture: the image, its allocation, its view, and (when requested) its
//! sampler are created together and released together by [`destroy`] or by
//! `Drop`. There is no way to release one part alone.
//!
//! [`destroy`]: ImageViewSampler::destroy
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::image::{ImageDesc, ImageViewSampler, SamplerDesc};
//!
//! # fn example(device: Arc<Device>) -> renderer_rhi::RhiResult<()> {
//! let desc = ImageDesc::new_2d(
//!     "gbuffer_normal",
//!     vk::Extent2D { width: 1280, height: 720 },
//!     vk::Format::R16G16B16A16_SFLOAT,
//!     vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
//! );
//! let mut target = ImageViewSampler::new(device, &desc, Some(&SamplerDesc::nearest_clamp()))?;
//! target.destroy();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::format::aspect_flags;

/// Parameters of a 2D image and its view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc {
    /// Debug name, also used as the allocation name
    pub name: String,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub tiling: vk::ImageTiling,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
}

impl ImageDesc {
    /// Single-sampled, single-mip, optimally tiled 2D image.
    pub fn new_2d(
        name: impl Into<String>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            extent,
            format,
            usage,
            tiling: vk::ImageTiling::OPTIMAL,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    /// Aspect of the view, derived from the format.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_flags(self.format)
    }

    /// Subresource range covering every mip of the single layer.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect())
            .level_count(self.mip_levels)
            .layer_count(1)
    }

    /// Range seen through the view. Sampled depth-stencil images expose
    /// only the depth aspect.
    pub fn view_range(&self) -> vk::ImageSubresourceRange {
        let range = self.subresource_range();
        if self.usage.contains(vk::ImageUsageFlags::SAMPLED)
            && range.aspect_mask.contains(vk::ImageAspectFlags::DEPTH)
        {
            range.aspect_mask(vk::ImageAspectFlags::DEPTH)
        } else {
            range
        }
    }

    fn validate(&self) -> RhiResult<()> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(RhiError::InvalidImage(format!(
                "{}: extent must be non-zero, got {}x{}",
                self.name, self.extent.width, self.extent.height
            )));
        }
        if self.usage.is_empty() {
            return Err(RhiError::InvalidImage(format!("{}: no usage flags", self.name)));
        }
        Ok(())
    }
}

/// Sampler parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    /// Maximum anisotropy, ignored when the device feature is off
    pub max_anisotropy: Option<f32>,
}

impl SamplerDesc {
    /// Nearest filtering, clamp to edge. Used for render-target reads.
    pub fn nearest_clamp() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            max_anisotropy: None,
        }
    }

    /// Linear filtering, clamp to edge. Used when a host UI embeds a target.
    pub fn linear_clamp() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            ..Self::nearest_clamp()
        }
    }
}

/// Owned image + memory + view + optional sampler.
pub struct ImageViewSampler {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    sampler: vk::Sampler,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl ImageViewSampler {
    /// Creates the image, binds GPU-only memory, and creates the view and,
    /// if `sampler` is given, a sampler.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero extent or empty usage, or if any Vulkan or
    /// allocator call fails. Parts created before the failure are released.
    pub fn new(device: Arc<Device>, desc: &ImageDesc, sampler: Option<&SamplerDesc>) -> RhiResult<Self> {
        desc.validate()?;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: create info is fully initialized above.
        let image = unsafe { device.handle().create_image(&image_info, None)? };

        // Partially built bundle; Drop releases whatever exists on early return.
        let mut bundle = Self {
            device,
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            allocation: None,
            desc: desc.clone(),
        };

        // SAFETY: image was created on this device.
        let requirements = unsafe { bundle.device.handle().get_image_memory_requirements(image) };
        let allocation = bundle.device.allocator().lock().unwrap().allocate(&AllocationCreateDesc {
            name: &desc.name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: desc.tiling == vk::ImageTiling::LINEAR,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        // SAFETY: the allocation satisfies the image's requirements.
        let bound = unsafe {
            bundle
                .device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        bundle.allocation = Some(allocation);
        bound?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(desc.view_range());
        // SAFETY: image has memory bound.
        bundle.view = unsafe { bundle.device.handle().create_image_view(&view_info, None)? };

        if let Some(sampler_desc) = sampler {
            bundle.sampler = create_sampler(&bundle.device, sampler_desc)?;
        }

        debug!(
            "Created image '{}': {}x{} {:?}",
            desc.name, desc.extent.width, desc.extent.height, desc.format
        );

        Ok(bundle)
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// The sampler, null when none was requested.
    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    /// Whether [`destroy`](Self::destroy) has already run.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.image == vk::Image::null()
    }

    /// Descriptor info for sampling this image in `layout`.
    pub fn descriptor_info(&self, layout: vk::ImageLayout) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler)
            .image_view(self.view)
            .image_layout(layout)
    }

    /// Releases sampler, view, image, and memory together. Idempotent.
    ///
    /// The caller must ensure the GPU no longer uses the image.
    pub fn destroy(&mut self) {
        if self.is_destroyed() {
            return;
        }

        let device = self.device.handle();
        // SAFETY: handles were created on this device and are unused by the GPU.
        unsafe {
            if self.sampler != vk::Sampler::null() {
                device.destroy_sampler(self.sampler, None);
            }
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            device.destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().unwrap().free(allocation)
        {
            warn!("Failed to free memory of image '{}': {:?}", self.desc.name, e);
        }

        self.sampler = vk::Sampler::null();
        self.view = vk::ImageView::null();
        self.image = vk::Image::null();

        debug!("Destroyed image '{}'", self.desc.name);
    }
}

impl Drop for ImageViewSampler {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Image + memory + view, no sampler. Used for attachments only written or blitted.
pub fn create_image_and_view(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<ImageViewSampler> {
    ImageViewSampler::new(device, desc, None)
}

/// Image + memory + view + sampler. Used for targets later passes sample.
pub fn create_image_view_sampler(
    device: Arc<Device>,
    desc: &ImageDesc,
    sampler: &SamplerDesc,
) -> RhiResult<ImageViewSampler> {
    ImageViewSampler::new(device, desc, Some(sampler))
}

fn create_sampler(device: &Device, desc: &SamplerDesc) -> RhiResult<vk::Sampler> {
    let anisotropy = desc
        .max_anisotropy
        .filter(|_| device.features().sampler_anisotropy);

    let info = vk::SamplerCreateInfo::default()
        .mag_filter(desc.mag_filter)
        .min_filter(desc.min_filter)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(desc.address_mode)
        .address_mode_v(desc.address_mode)
        .address_mode_w(desc.address_mode)
        .anisotropy_enable(anisotropy.is_some())
        .max_anisotropy(anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        .max_lod(vk::LOD_CLAMP_NONE);

    // SAFETY: create info is fully initialized.
    Ok(unsafe { device.handle().create_sampler(&info, None)? })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_desc_defaults() {
        let desc = ImageDesc::new_2d(
            "color",
            extent(64, 32),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(desc.aspect(), vk::ImageAspectFlags::COLOR);
        assert_eq!(desc.subresource_range().layer_count, 1);
    }

    #[test]
    fn test_depth_desc_aspect() {
        let desc = ImageDesc::new_2d(
            "depth",
            extent(64, 32),
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        assert_eq!(desc.aspect(), vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_sampled_depth_stencil_view_is_depth_only() {
        let desc = ImageDesc::new_2d(
            "depth",
            extent(64, 32),
            vk::Format::D24_UNORM_S8_UINT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        );
        assert_eq!(
            desc.subresource_range().aspect_mask,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(desc.view_range().aspect_mask, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_zero_extent_rejected() {
        let desc = ImageDesc::new_2d(
            "empty",
            extent(0, 720),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert!(matches!(desc.validate(), Err(RhiError::InvalidImage(_))));
    }

    #[test]
    fn test_empty_usage_rejected() {
        let desc = ImageDesc::new_2d(
            "unused",
            extent(4, 4),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::empty(),
        );
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_sampler_presets() {
        let nearest = SamplerDesc::nearest_clamp();
        assert_eq!(nearest.mag_filter, vk::Filter::NEAREST);
        assert_eq!(nearest.address_mode, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(SamplerDesc::linear_clamp().min_filter, vk::Filter::LINEAR);
    }

    #[test]
    fn test_image_view_sampler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ImageViewSampler>();
    }
}
