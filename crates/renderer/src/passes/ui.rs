//! UI overlay pass.
//!
//! Blits the lit color target into the acquired swapchain image, then opens a
//! load-op rendering scope on that image and hands it to the injected UI
//! construct callback. The image leaves the pass in `PRESENT_SRC_KHR`.

use ash::vk;
use tracing::{debug, trace};

use renderer_rhi::command::{CommandBuffer, ImageTransition};
use renderer_rhi::rendering::{Attachment, Framebuffer};

use crate::error::{RenderError, RenderResult};
use crate::render_data::FrameSlot;

use super::{
    AttachmentId, AttachmentRef, Attachments, FrameContext, PassKind, PassLifecycle, PassSetup,
    ResizeContext, SwapchainTarget,
};

/// What a UI construct callback records against.
pub struct UiFrame<'a> {
    /// Inside a rendering scope on the swapchain image
    pub cmd: &'a CommandBuffer,
    pub slot: FrameSlot,
    pub image_index: u32,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    /// Lit color target in `SHADER_READ_ONLY_OPTIMAL`, for viewport widgets
    pub color_target: AttachmentRef,
}

/// Per-frame UI recording, injected by the host application.
pub type UiConstruct = Box<dyn FnMut(&mut UiFrame<'_>)>;

/// One load-op framebuffer per swapchain image.
pub(crate) fn overlay_framebuffers(targets: &[SwapchainTarget]) -> Vec<Framebuffer> {
    targets
        .iter()
        .map(|target| Framebuffer::new(target.extent).with_color(Attachment::color(target.view)))
        .collect()
}

/// Final pass: composite to the swapchain and draw the UI.
pub struct UiPass {
    pub(super) lifecycle: PassLifecycle,
    swapchain_format: vk::Format,
    framebuffers: Vec<Framebuffer>,
    construct: Option<UiConstruct>,
}

impl UiPass {
    /// The lit target, read by the blit.
    pub const INPUTS: &'static [(AttachmentId, vk::ImageLayout)] =
        &[(AttachmentId::LitColor, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)];

    pub fn new() -> Self {
        Self {
            lifecycle: PassLifecycle::new(PassKind::UiOverlay),
            swapchain_format: vk::Format::UNDEFINED,
            framebuffers: Vec::new(),
            construct: None,
        }
    }

    #[inline]
    pub fn lifecycle(&self) -> &PassLifecycle {
        &self.lifecycle
    }

    /// Installs or clears the per-frame UI callback.
    pub fn set_construct(&mut self, construct: Option<UiConstruct>) {
        self.construct = construct;
    }

    pub fn has_construct(&self) -> bool {
        self.construct.is_some()
    }

    /// Number of per-image framebuffer records.
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn configure(&mut self, setup: &PassSetup<'_>) -> RenderResult<()> {
        self.lifecycle.check_configure()?;
        self.swapchain_format = setup.swapchain_format;
        self.lifecycle.configured()
    }

    pub fn build_framebuffer(
        &mut self,
        ctx: &ResizeContext<'_>,
        _attachments: &mut Attachments,
    ) -> RenderResult<()> {
        self.lifecycle.check_build()?;
        self.framebuffers = overlay_framebuffers(ctx.targets);
        if let Some(target) = ctx.targets.first() {
            self.swapchain_format = target.format;
        }
        self.lifecycle.framebuffer_built()?;
        debug!("UI overlay bound to {} swapchain image(s)", self.framebuffers.len());
        Ok(())
    }

    /// Composites into `frame.target` and runs the UI callback.
    ///
    /// # Errors
    ///
    /// Invalid state, an image index without a framebuffer record, or a
    /// missing lit target.
    pub fn record(&mut self, frame: &FrameContext<'_>, attachments: &mut Attachments) -> RenderResult<()> {
        self.lifecycle.check_record()?;
        let framebuffer = self
            .framebuffers
            .get(frame.image_index as usize)
            .ok_or(RenderError::MissingAttachment("swapchain image"))?;
        let lit = attachments.get(AttachmentId::LitColor)?;

        let cmd = frame.cmd;
        let swapchain_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(1)
            .layer_count(1);

        // Ordered after the acquire semaphore wait, which covers the blit stage
        let acquire = ImageTransition {
            src_stage: vk::PipelineStageFlags2::BLIT,
            ..ImageTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        };
        cmd.image_barriers(&[acquire.barrier(frame.target.image, swapchain_range)]);
        cmd.blit_color(
            lit.image,
            lit.extent,
            frame.target.image,
            frame.target.extent,
            vk::Filter::LINEAR,
        );
        cmd.transition_image(
            frame.target.image,
            swapchain_range,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        attachments.transition(cmd, &[(AttachmentId::LitColor, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)])?;

        let rendering = framebuffer.rendering_info();
        cmd.begin_rendering(&rendering.info());
        cmd.set_viewport_and_scissor(framebuffer.extent());
        if let Some(construct) = self.construct.as_mut() {
            let mut ui = UiFrame {
                cmd,
                slot: frame.slot,
                image_index: frame.image_index,
                extent: frame.target.extent,
                format: self.swapchain_format,
                color_target: lit,
            };
            construct(&mut ui);
        } else {
            trace!("No UI construct installed");
        }
        cmd.end_rendering();

        cmd.transition_image(
            frame.target.image,
            swapchain_range,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        self.lifecycle.recorded()
    }

    pub fn destroy_resizable(&mut self, _attachments: &mut Attachments) -> RenderResult<()> {
        self.framebuffers.clear();
        self.lifecycle.resized()
    }

    pub fn destroy(&mut self, _attachments: &mut Attachments) {
        self.framebuffers.clear();
        self.construct = None;
        self.lifecycle.destroyed();
    }
}

impl Default for UiPass {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(width: u32, height: u32) -> SwapchainTarget {
        SwapchainTarget {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            extent: vk::Extent2D { width, height },
            format: vk::Format::B8G8R8A8_SRGB,
        }
    }

    #[test]
    fn test_one_framebuffer_per_image() {
        let targets = [target(1280, 720); 3];
        let framebuffers = overlay_framebuffers(&targets);
        assert_eq!(framebuffers.len(), 3);
        for framebuffer in &framebuffers {
            assert_eq!(framebuffer.extent(), vk::Extent2D { width: 1280, height: 720 });
            assert_eq!(framebuffer.colors().len(), 1);
            assert_eq!(framebuffer.colors()[0].load_op, vk::AttachmentLoadOp::LOAD);
            assert!(framebuffer.depth().is_none());
        }
    }

    #[test]
    fn test_construct_install_and_clear() {
        let mut pass = UiPass::new();
        assert!(!pass.has_construct());
        pass.set_construct(Some(Box::new(|_ui: &mut UiFrame<'_>| {})));
        assert!(pass.has_construct());
        pass.set_construct(None);
        assert!(!pass.has_construct());
    }

    #[test]
    fn test_blit_reads_lit_target() {
        assert_eq!(
            UiPass::INPUTS,
            &[(AttachmentId::LitColor, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)]
        );
    }
}
