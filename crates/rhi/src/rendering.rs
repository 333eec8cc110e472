//! Attachment sets for dynamic rendering.
//!
//! A [`Framebuffer`] is the set of image views a pass renders into, fixed at
//! a given extent. It replaces `VkFramebuffer` + `VkRenderPass`: beginning a
//! pass builds a [`RenderingInfoBundle`] from it and calls
//! `vkCmdBeginRendering`.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use renderer_rhi::command::CommandBuffer;
//! use renderer_rhi::rendering::{Attachment, Framebuffer};
//!
//! # fn example(color: vk::ImageView, depth: vk::ImageView, cmd: &CommandBuffer) {
//! let framebuffer = Framebuffer::new(vk::Extent2D { width: 800, height: 600 })
//!     .with_color(Attachment::color(color).clear_color([0.0; 4]))
//!     .with_depth(Attachment::depth(depth).clear_depth(1.0));
//!
//! let bundle = framebuffer.rendering_info();
//! cmd.begin_rendering(&bundle.info());
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// One attachment of a [`Framebuffer`].
#[derive(Clone, Copy)]
pub struct Attachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: vk::ClearValue,
}

impl Attachment {
    /// Color attachment that loads its previous contents and stores.
    pub fn color(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearValue::default(),
        }
    }

    /// Depth attachment that loads its previous contents and stores.
    pub fn depth(image_view: vk::ImageView) -> Self {
        Self {
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Self::color(image_view)
        }
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_value = vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        };
        self
    }

    pub fn clear_depth(mut self, depth: f32) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_value = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
        };
        self
    }

    /// Contents are not needed after the pass.
    pub fn dont_store(mut self) -> Self {
        self.store_op = vk::AttachmentStoreOp::DONT_CARE;
        self
    }

    fn to_vk(self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(self.clear_value)
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("image_view", &self.image_view)
            .field("layout", &self.layout)
            .field("load_op", &self.load_op)
            .field("store_op", &self.store_op)
            .finish_non_exhaustive()
    }
}

/// Attachment set of one pass at one extent.
#[derive(Clone, Debug)]
pub struct Framebuffer {
    extent: vk::Extent2D,
    colors: Vec<Attachment>,
    depth: Option<Attachment>,
}

impl Framebuffer {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            colors: Vec::new(),
            depth: None,
        }
    }

    pub fn with_color(mut self, attachment: Attachment) -> Self {
        self.colors.push(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: Attachment) -> Self {
        self.depth = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn colors(&self) -> &[Attachment] {
        &self.colors
    }

    #[inline]
    pub fn depth(&self) -> Option<&Attachment> {
        self.depth.as_ref()
    }

    pub fn rendering_info(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            colors: self.colors.iter().map(|a| a.to_vk()).collect(),
            depth: self.depth.map(Attachment::to_vk),
            render_area: vk::Rect2D::default().extent(self.extent),
        }
    }
}

/// Owns the attachment infos a `vk::RenderingInfo` points into.
pub struct RenderingInfoBundle {
    colors: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    /// Rendering info borrowing this bundle.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.colors);

        match &self.depth {
            Some(depth) => info.depth_attachment(depth),
            None => info,
        }
    }
}
