//! Lighting composite pass.
//!
//! Samples the G-buffer with nearest filtering and shades a full-screen
//! triangle into a single `R8G8B8A8_UNORM` target. The target is also the
//! image the UI pass blits to the swapchain and the one embedding UIs sample.

use std::slice;

use ash::vk;
use tracing::{debug, info};

use renderer_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout, image_write};
use renderer_rhi::image::{ImageDesc, SamplerDesc};
use renderer_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use renderer_rhi::rendering::{Attachment, Framebuffer};
use renderer_rhi::shader::ShaderStage;

use crate::error::RenderResult;
use crate::render_data::LightingParams;

use super::{
    AttachmentId, AttachmentRef, Attachments, FrameContext, PassKind, PassLifecycle, PassSetup,
    RenderTarget, ResizeContext,
};

/// Format of the lit color target.
pub const LIT_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Description of the lit color target at `extent`.
pub fn lit_color_desc(extent: vk::Extent2D) -> ImageDesc {
    ImageDesc::new_2d(
        AttachmentId::LitColor.name(),
        extent,
        LIT_COLOR_FORMAT,
        vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_SRC,
    )
}

struct LightingPipeline {
    pipeline: Pipeline,
    layout: PipelineLayout,
    _set_layout: DescriptorSetLayout,
}

/// Deferred lighting pass.
pub struct LightingPass {
    pub(super) lifecycle: PassLifecycle,
    pipeline: Option<LightingPipeline>,
    target: Option<Box<dyn RenderTarget>>,
    framebuffer: Option<Framebuffer>,
}

impl LightingPass {
    /// G-buffer attachments, sampled in the fragment shader.
    pub const INPUTS: &'static [(AttachmentId, vk::ImageLayout)] = &[
        (AttachmentId::Position, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        (AttachmentId::Normal, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        (AttachmentId::BaseColor, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        (AttachmentId::Emissive, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        (
            AttachmentId::MetallicRoughnessOcclusion,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        (AttachmentId::Depth, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
    ];

    pub fn new() -> Self {
        Self {
            lifecycle: PassLifecycle::new(PassKind::LightingComposite),
            pipeline: None,
            target: None,
            framebuffer: None,
        }
    }

    #[inline]
    pub fn lifecycle(&self) -> &PassLifecycle {
        &self.lifecycle
    }

    /// The lit color target, once built.
    pub fn target(&self) -> Option<AttachmentRef> {
        self.target.as_ref().map(|target| target.attachment())
    }

    pub fn configure(&mut self, setup: &PassSetup<'_>) -> RenderResult<()> {
        self.lifecycle.check_configure()?;

        let bindings: Vec<_> = (0..AttachmentId::GBUFFER.len() as u32)
            .map(|binding| {
                DescriptorBindingBuilder::combined_image_sampler(binding, vk::ShaderStageFlags::FRAGMENT)
            })
            .collect();
        let set_layout = DescriptorSetLayout::new_push(setup.device.clone(), &bindings)?;

        let push_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: LightingParams::SIZE,
        };
        let layout = PipelineLayout::new(setup.device.clone(), &[set_layout.handle()], &[push_range])?;

        let vert = setup.load_shader("fullscreen.vert", ShaderStage::Vertex)?;
        let frag = setup.load_shader("lighting.frag", ShaderStage::Fragment)?;

        // Full-screen triangle generated from the vertex index, no vertex input
        let pipeline = GraphicsPipelineBuilder::new("lighting")
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .cull_mode(CullMode::None)
            .depth_write_enable(false)
            .color_attachment_formats(&[LIT_COLOR_FORMAT])
            .build(setup.device.clone(), &layout, setup.pipeline_cache)?;

        self.pipeline = Some(LightingPipeline {
            pipeline,
            layout,
            _set_layout: set_layout,
        });
        self.lifecycle.configured()?;
        info!("Lighting pass configured");
        Ok(())
    }

    pub fn build_framebuffer(
        &mut self,
        ctx: &ResizeContext<'_>,
        attachments: &mut Attachments,
    ) -> RenderResult<()> {
        self.lifecycle.check_build()?;

        let target = ctx
            .allocator
            .allocate(&lit_color_desc(ctx.extent), &SamplerDesc::linear_clamp())?;
        let attachment = target.attachment();
        attachments.publish(AttachmentId::LitColor, attachment);

        self.framebuffer = Some(
            Framebuffer::new(ctx.extent)
                .with_color(Attachment::color(attachment.view).clear_color([0.0, 0.0, 0.0, 1.0])),
        );
        self.target = Some(target);
        self.lifecycle.framebuffer_built()?;
        debug!("Lighting target built at {}x{}", ctx.extent.width, ctx.extent.height);
        Ok(())
    }

    /// Shades the G-buffer into the lit target.
    ///
    /// # Errors
    ///
    /// Invalid state or a G-buffer attachment that is not published.
    pub fn record(&mut self, frame: &FrameContext<'_>, attachments: &mut Attachments) -> RenderResult<()> {
        self.lifecycle.check_record()?;
        let (Some(pipeline), Some(framebuffer)) = (&self.pipeline, &self.framebuffer) else {
            return Err(self.lifecycle.reject("record"));
        };

        let mut image_infos = [vk::DescriptorImageInfo::default(); 6];
        for (info, (id, layout)) in image_infos.iter_mut().zip(Self::INPUTS) {
            *info = attachments.get(*id)?.descriptor_info(*layout);
        }

        let cmd = frame.cmd;
        attachments.transition(cmd, &[(AttachmentId::LitColor, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)])?;

        let rendering = framebuffer.rendering_info();
        cmd.begin_rendering(&rendering.info());
        cmd.set_viewport_and_scissor(framebuffer.extent());
        cmd.bind_graphics_pipeline(pipeline.pipeline.handle());

        let writes: Vec<_> = image_infos
            .iter()
            .enumerate()
            .map(|(binding, info)| image_write(binding as u32, slice::from_ref(info)))
            .collect();
        cmd.push_descriptor_set(pipeline.layout.handle(), 0, &writes);
        cmd.push_constants(
            pipeline.layout.handle(),
            vk::ShaderStageFlags::FRAGMENT,
            0,
            &frame.data.lighting,
        );
        cmd.draw(3, 1, 0, 0);
        cmd.end_rendering();
        self.lifecycle.recorded()
    }

    pub fn destroy_resizable(&mut self, attachments: &mut Attachments) -> RenderResult<()> {
        self.release_target(attachments);
        self.lifecycle.resized()
    }

    pub fn destroy(&mut self, attachments: &mut Attachments) {
        self.release_target(attachments);
        self.pipeline = None;
        self.lifecycle.destroyed();
    }

    fn release_target(&mut self, attachments: &mut Attachments) {
        attachments.retire(AttachmentId::LitColor);
        self.framebuffer = None;
        self.target = None;
    }
}

impl Default for LightingPass {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_cover_gbuffer_in_binding_order() {
        let ids: Vec<_> = LightingPass::INPUTS.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, AttachmentId::GBUFFER.to_vec());
        assert!(
            LightingPass::INPUTS
                .iter()
                .all(|(_, layout)| *layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        );
    }

    #[test]
    fn test_lit_color_desc() {
        let desc = lit_color_desc(vk::Extent2D { width: 800, height: 600 });
        assert_eq!(desc.format, vk::Format::R8G8B8A8_UNORM);
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }
}
