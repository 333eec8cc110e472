//! Registry of the images passes exchange within a frame.
//!
//! A pass publishes the attachments it owns after building them and retires
//! them before they are destroyed. Consumers look them up by
//! [`AttachmentId`]. The registry also tracks the layout each image was left
//! in so the graph can plan the barrier before the next reader.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

use renderer_rhi::command::{CommandBuffer, ImageTransition};
use renderer_rhi::device::Device;
use renderer_rhi::image::{ImageDesc, ImageViewSampler, SamplerDesc, create_image_view_sampler};

use crate::error::{RenderError, RenderResult};

/// Well-known attachments of the deferred pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentId {
    Position,
    Normal,
    BaseColor,
    Emissive,
    MetallicRoughnessOcclusion,
    Depth,
    /// Output of the lighting pass, also exposed to UI consumers
    LitColor,
}

impl AttachmentId {
    /// G-buffer attachments in descriptor binding order.
    pub const GBUFFER: [AttachmentId; 6] = [
        AttachmentId::Position,
        AttachmentId::Normal,
        AttachmentId::BaseColor,
        AttachmentId::Emissive,
        AttachmentId::MetallicRoughnessOcclusion,
        AttachmentId::Depth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AttachmentId::Position => "gbuffer.position",
            AttachmentId::Normal => "gbuffer.normal",
            AttachmentId::BaseColor => "gbuffer.base_color",
            AttachmentId::Emissive => "gbuffer.emissive",
            AttachmentId::MetallicRoughnessOcclusion => "gbuffer.mro",
            AttachmentId::Depth => "depth",
            AttachmentId::LitColor => "lit_color",
        }
    }
}

/// Non-owning view of a published image.
#[derive(Clone, Copy, Debug)]
pub struct AttachmentRef {
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// Null when the image has no sampler
    pub sampler: vk::Sampler,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub range: vk::ImageSubresourceRange,
}

impl AttachmentRef {
    pub fn of(image: &ImageViewSampler) -> Self {
        Self {
            image: image.image(),
            view: image.view(),
            sampler: image.sampler(),
            extent: image.extent(),
            format: image.format(),
            range: image.desc().subresource_range(),
        }
    }

    pub fn descriptor_info(&self, layout: vk::ImageLayout) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: layout,
        }
    }
}

/// An image a pass owns for as long as its framebuffer lives.
pub trait RenderTarget {
    fn attachment(&self) -> AttachmentRef;
}

impl RenderTarget for ImageViewSampler {
    fn attachment(&self) -> AttachmentRef {
        AttachmentRef::of(self)
    }
}

/// Source of the size-dependent images passes build on resize.
pub trait TargetAllocator {
    /// # Errors
    ///
    /// Image, memory, view or sampler creation failures.
    fn allocate(&self, desc: &ImageDesc, sampler: &SamplerDesc) -> RenderResult<Box<dyn RenderTarget>>;
}

impl TargetAllocator for Arc<Device> {
    fn allocate(&self, desc: &ImageDesc, sampler: &SamplerDesc) -> RenderResult<Box<dyn RenderTarget>> {
        Ok(Box::new(create_image_view_sampler(self.clone(), desc, sampler)?))
    }
}

/// A layout change the graph must record before a pass runs.
#[derive(Clone, Copy, Debug)]
pub struct PlannedTransition {
    pub id: AttachmentId,
    pub attachment: AttachmentRef,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl PlannedTransition {
    pub fn barrier(&self) -> vk::ImageMemoryBarrier2<'static> {
        ImageTransition::new(self.old_layout, self.new_layout)
            .barrier(self.attachment.image, self.attachment.range)
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    attachment: AttachmentRef,
    layout: vk::ImageLayout,
}

/// Published attachments and their current layouts.
#[derive(Debug, Default)]
pub struct Attachments {
    entries: HashMap<AttachmentId, Entry>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `attachment` under `id` in `UNDEFINED` layout, replacing any
    /// previous entry.
    pub fn publish(&mut self, id: AttachmentId, attachment: AttachmentRef) {
        self.entries.insert(
            id,
            Entry {
                attachment,
                layout: vk::ImageLayout::UNDEFINED,
            },
        );
    }

    /// Removes `id` ahead of destroying its image. Returns whether it was
    /// published.
    pub fn retire(&mut self, id: AttachmentId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// # Errors
    ///
    /// [`RenderError::MissingAttachment`] when `id` is not published.
    pub fn get(&self, id: AttachmentId) -> RenderResult<AttachmentRef> {
        self.entries
            .get(&id)
            .map(|entry| entry.attachment)
            .ok_or(RenderError::MissingAttachment(id.name()))
    }

    pub fn contains(&self, id: AttachmentId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn layout(&self, id: AttachmentId) -> Option<vk::ImageLayout> {
        self.entries.get(&id).map(|entry| entry.layout)
    }

    /// Records the layout a pass left `id` in. Unknown ids are ignored.
    pub fn set_layout(&mut self, id: AttachmentId, layout: vk::ImageLayout) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.layout = layout;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transitions needed to bring every input into its required layout.
    /// Inputs already in place produce nothing.
    ///
    /// # Errors
    ///
    /// [`RenderError::MissingAttachment`] for an unpublished input.
    pub fn plan_transitions(
        &self,
        inputs: &[(AttachmentId, vk::ImageLayout)],
    ) -> RenderResult<Vec<PlannedTransition>> {
        let mut planned = Vec::new();
        for &(id, new_layout) in inputs {
            let entry = self
                .entries
                .get(&id)
                .ok_or(RenderError::MissingAttachment(id.name()))?;
            if entry.layout != new_layout {
                planned.push(PlannedTransition {
                    id,
                    attachment: entry.attachment,
                    old_layout: entry.layout,
                    new_layout,
                });
            }
        }
        Ok(planned)
    }

    /// Current layout of every published attachment.
    pub fn layouts(&self) -> Vec<(AttachmentId, vk::ImageLayout)> {
        self.entries.iter().map(|(id, entry)| (*id, entry.layout)).collect()
    }

    /// Puts back layouts taken with [`layouts`](Self::layouts), for when
    /// recorded barriers are discarded unsubmitted.
    pub fn restore_layouts(&mut self, layouts: &[(AttachmentId, vk::ImageLayout)]) {
        for &(id, layout) in layouts {
            self.set_layout(id, layout);
        }
    }

    /// Marks planned transitions as done.
    pub fn apply(&mut self, transitions: &[PlannedTransition]) {
        for transition in transitions {
            self.set_layout(transition.id, transition.new_layout);
        }
    }

    /// Records one barrier batch moving `targets` from their tracked layouts
    /// and tracks the result. Returns the number of barriers recorded.
    ///
    /// # Errors
    ///
    /// [`RenderError::MissingAttachment`] for an unpublished target.
    pub fn transition(
        &mut self,
        cmd: &CommandBuffer,
        targets: &[(AttachmentId, vk::ImageLayout)],
    ) -> RenderResult<usize> {
        let planned = self.plan_transitions(targets)?;
        if !planned.is_empty() {
            let barriers: Vec<_> = planned.iter().map(PlannedTransition::barrier).collect();
            cmd.image_barriers(&barriers);
            self.apply(&planned);
        }
        Ok(planned.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(width: u32, height: u32) -> AttachmentRef {
        AttachmentRef {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            extent: vk::Extent2D { width, height },
            format: vk::Format::R8G8B8A8_UNORM,
            range: vk::ImageSubresourceRange::default(),
        }
    }

    #[test]
    fn test_missing_attachment_named() {
        let attachments = Attachments::new();
        match attachments.get(AttachmentId::Normal) {
            Err(RenderError::MissingAttachment(name)) => assert_eq!(name, "gbuffer.normal"),
            other => panic!("expected MissingAttachment, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_skips_inputs_in_place() {
        let mut attachments = Attachments::new();
        attachments.publish(AttachmentId::Position, fake(4, 4));
        attachments.publish(AttachmentId::Normal, fake(4, 4));
        attachments.set_layout(AttachmentId::Position, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        attachments.set_layout(AttachmentId::Normal, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let inputs = [
            (AttachmentId::Position, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (AttachmentId::Normal, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ];
        let planned = attachments.plan_transitions(&inputs).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].id, AttachmentId::Normal);
        assert_eq!(planned[0].old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        attachments.apply(&planned);
        assert!(attachments.plan_transitions(&inputs).unwrap().is_empty());
    }

    #[test]
    fn test_republish_resets_layout() {
        let mut attachments = Attachments::new();
        attachments.publish(AttachmentId::LitColor, fake(1280, 720));
        attachments.set_layout(AttachmentId::LitColor, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

        assert!(attachments.retire(AttachmentId::LitColor));
        assert!(!attachments.retire(AttachmentId::LitColor));
        attachments.publish(AttachmentId::LitColor, fake(1920, 1080));

        assert_eq!(attachments.layout(AttachmentId::LitColor), Some(vk::ImageLayout::UNDEFINED));
        assert_eq!(attachments.get(AttachmentId::LitColor).unwrap().extent.width, 1920);
    }

    #[test]
    fn test_barrier_from_tracked_layout() {
        let mut attachments = Attachments::new();
        attachments.publish(AttachmentId::Depth, fake(4, 4));
        attachments.set_layout(AttachmentId::Depth, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let planned = attachments
            .plan_transitions(&[(AttachmentId::Depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)])
            .unwrap();
        let barrier = planned[0].barrier();
        // Waits for last frame's sampling before depth writes
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barrier.old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_restore_layouts_undoes_discarded_transitions() {
        let mut attachments = Attachments::new();
        attachments.publish(AttachmentId::Position, fake(4, 4));
        attachments.publish(AttachmentId::LitColor, fake(4, 4));
        attachments.set_layout(AttachmentId::Position, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let before = attachments.layouts();

        let planned = attachments
            .plan_transitions(&[
                (AttachmentId::Position, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                (AttachmentId::LitColor, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            ])
            .unwrap();
        attachments.apply(&planned);
        assert_eq!(
            attachments.layout(AttachmentId::LitColor),
            Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        );

        attachments.restore_layouts(&before);
        assert_eq!(
            attachments.layout(AttachmentId::Position),
            Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        );
        assert_eq!(attachments.layout(AttachmentId::LitColor), Some(vk::ImageLayout::UNDEFINED));
    }

    #[test]
    fn test_gbuffer_binding_order() {
        assert_eq!(AttachmentId::GBUFFER[0], AttachmentId::Position);
        assert_eq!(AttachmentId::GBUFFER[5], AttachmentId::Depth);
    }
}
