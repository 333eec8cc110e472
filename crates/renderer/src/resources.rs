//! Slot-map arena of GPU textures.
//!
//! The renderer owns every [`ImageViewSampler`] a draw item may sample; other
//! components only hold [`TextureHandle`]s. A handle becomes invalid when its
//! texture is removed, and lookups through a stale handle fail instead of
//! reaching a destroyed image.

use std::sync::Arc;

use ash::vk;
use slotmap::SlotMap;
use tracing::debug;

use renderer_rhi::command::ImageTransition;
use renderer_rhi::device::Device;
use renderer_rhi::image::{ImageDesc, ImageViewSampler, SamplerDesc, create_image_view_sampler};

use crate::error::{RenderError, RenderResult};

slotmap::new_key_type! {
    /// Opaque reference to a texture in a [`ResourceArena`].
    pub struct TextureHandle;
}

/// Layout change a new texture needs before its first sampling.
pub const SAMPLED_TEXTURE_TRANSITION: ImageTransition = ImageTransition {
    old_layout: vk::ImageLayout::UNDEFINED,
    new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
    src_access: vk::AccessFlags2::NONE,
    dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
    dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
};

/// Generational arena; the only place textures are destroyed.
pub struct ResourceArena<T> {
    slots: SlotMap<TextureHandle, T>,
}

/// Arena of sampled textures.
pub type TextureArena = ResourceArena<ImageViewSampler>;

impl<T> ResourceArena<T> {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, resource: T) -> TextureHandle {
        self.slots.insert(resource)
    }

    /// # Errors
    ///
    /// [`RenderError::UnknownTexture`] for a removed or foreign handle.
    pub fn get(&self, handle: TextureHandle) -> RenderResult<&T> {
        self.slots
            .get(handle)
            .ok_or_else(|| RenderError::UnknownTexture(format!("{handle:?}")))
    }

    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.slots.contains_key(handle)
    }

    /// Removes and drops the resource. Returns whether it existed.
    pub fn remove(&mut self, handle: TextureHandle) -> bool {
        self.slots.remove(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every resource.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl<T> Default for ResourceArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureArena {
    /// Creates a sampled texture and returns its handle.
    pub fn create_texture(
        &mut self,
        device: Arc<Device>,
        desc: &ImageDesc,
        sampler: &SamplerDesc,
    ) -> RenderResult<TextureHandle> {
        let texture = create_image_view_sampler(device, desc, sampler)?;
        let handle = self.insert(texture);
        debug!("Texture '{}' registered as {:?}", desc.name, handle);
        Ok(handle)
    }

    /// Descriptor info for sampling `handle` in the layout
    /// [`SAMPLED_TEXTURE_TRANSITION`] leaves it in.
    pub fn descriptor_info(&self, handle: TextureHandle) -> RenderResult<vk::DescriptorImageInfo> {
        Ok(self
            .get(handle)?
            .descriptor_info(SAMPLED_TEXTURE_TRANSITION.new_layout))
    }
}
