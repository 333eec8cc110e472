//! Render passes of the deferred pipeline.
//!
//! Every pass goes through the same lifecycle:
//!
//! ```text
//! Uninitialized --configure--> Configured --build_framebuffer--> FramebufferReady
//!                                   ^                                  |
//!                                   |                                record
//!                         destroy_resizable (resize)                   v
//!                                   +---------------------------- Recorded
//! ```
//!
//! `configure` builds layouts and pipelines, `build_framebuffer` the
//! size-dependent images. A resize drops a pass back to `Configured`,
//! destroying only what depends on the extent.

mod attachments;
mod geometry;
mod graph;
mod lighting;
mod ui;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ash::vk;

use renderer_rhi::command::CommandBuffer;
use renderer_rhi::device::Device;
use renderer_rhi::pipeline_cache::PipelineCache;
use renderer_rhi::shader::{Shader, ShaderStage};

use crate::error::{RenderError, RenderResult};
use crate::render_data::{FrameSlot, RenderData};
use crate::resources::TextureArena;

pub use attachments::{
    AttachmentId, AttachmentRef, Attachments, PlannedTransition, RenderTarget, TargetAllocator,
};
pub use geometry::{
    GBUFFER_COLOR_FORMATS, GeometryPass, MeshBatch, gbuffer_image_descs, mesh_batches,
    resolve_bone_bindings,
};
pub use graph::PassGraph;
pub use lighting::{LIT_COLOR_FORMAT, LightingPass, lit_color_desc};
pub use ui::{UiConstruct, UiFrame, UiPass};

/// Which stage a pass implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    GeometryBuffer,
    LightingComposite,
    UiOverlay,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassKind::GeometryBuffer => "geometry buffer pass",
            PassKind::LightingComposite => "lighting composite pass",
            PassKind::UiOverlay => "UI overlay pass",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Uninitialized,
    /// Layouts and pipelines built
    Configured,
    /// Size-dependent attachments built
    FramebufferReady,
    /// Commands recorded at least once since the last resize
    Recorded,
}

/// State machine shared by every pass.
#[derive(Clone, Copy, Debug)]
pub struct PassLifecycle {
    kind: PassKind,
    state: PassState,
}

impl PassLifecycle {
    pub fn new(kind: PassKind) -> Self {
        Self {
            kind,
            state: PassState::Uninitialized,
        }
    }

    #[inline]
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    #[inline]
    pub fn state(&self) -> PassState {
        self.state
    }

    fn reject(&self, operation: &'static str) -> RenderError {
        RenderError::InvalidPassState {
            pass: self.kind,
            state: self.state,
            operation,
        }
    }

    /// Checks that `configure` may run.
    pub fn check_configure(&self) -> RenderResult<()> {
        match self.state {
            PassState::Uninitialized => Ok(()),
            _ => Err(self.reject("configure")),
        }
    }

    pub fn configured(&mut self) -> RenderResult<()> {
        self.check_configure()?;
        self.state = PassState::Configured;
        Ok(())
    }

    /// Checks that `build_framebuffer` may run.
    pub fn check_build(&self) -> RenderResult<()> {
        match self.state {
            PassState::Configured => Ok(()),
            _ => Err(self.reject("build framebuffer")),
        }
    }

    pub fn framebuffer_built(&mut self) -> RenderResult<()> {
        self.check_build()?;
        self.state = PassState::FramebufferReady;
        Ok(())
    }

    /// Checks that `record` may run. Recording repeats every frame.
    pub fn check_record(&self) -> RenderResult<()> {
        match self.state {
            PassState::FramebufferReady | PassState::Recorded => Ok(()),
            _ => Err(self.reject("record")),
        }
    }

    pub fn recorded(&mut self) -> RenderResult<()> {
        self.check_record()?;
        self.state = PassState::Recorded;
        Ok(())
    }

    /// Whether size-dependent objects exist.
    pub fn has_framebuffer(&self) -> bool {
        matches!(self.state, PassState::FramebufferReady | PassState::Recorded)
    }

    /// Back to `Configured` after the size-dependent objects are gone.
    /// A no-op on a configured pass.
    pub fn resized(&mut self) -> RenderResult<()> {
        match self.state {
            PassState::Configured | PassState::FramebufferReady | PassState::Recorded => {
                self.state = PassState::Configured;
                Ok(())
            }
            PassState::Uninitialized => Err(self.reject("resize")),
        }
    }

    pub fn destroyed(&mut self) {
        self.state = PassState::Uninitialized;
    }
}

/// What passes need to build layouts and pipelines.
pub struct PassSetup<'a> {
    pub device: &'a Arc<Device>,
    pub pipeline_cache: &'a PipelineCache,
    /// Directory holding the compiled `*.spv` modules
    pub shader_dir: &'a Path,
    pub swapchain_format: vk::Format,
    pub depth_format: vk::Format,
}

impl PassSetup<'_> {
    /// Loads `<shader_dir>/<name>.spv`.
    pub fn load_shader(&self, name: &str, stage: ShaderStage) -> RenderResult<Shader> {
        let path = self.shader_dir.join(format!("{name}.spv"));
        Ok(Shader::from_spirv_file(self.device.clone(), &path, stage)?)
    }
}

/// One presentable image of the swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

/// What passes need to (re)build their size-dependent objects.
pub struct ResizeContext<'a> {
    pub allocator: &'a dyn TargetAllocator,
    pub extent: vk::Extent2D,
    /// Every swapchain image, in swapchain order
    pub targets: &'a [SwapchainTarget],
}

/// Everything a pass records against in one frame.
pub struct FrameContext<'a> {
    pub cmd: &'a CommandBuffer,
    pub slot: FrameSlot,
    pub image_index: u32,
    pub target: SwapchainTarget,
    pub data: &'a RenderData,
    pub textures: &'a TextureArena,
}

/// A stage of the pipeline.
pub enum RenderPass {
    GeometryBuffer(GeometryPass),
    LightingComposite(LightingPass),
    UiOverlay(UiPass),
}

impl RenderPass {
    pub fn kind(&self) -> PassKind {
        self.lifecycle().kind()
    }

    pub fn state(&self) -> PassState {
        self.lifecycle().state()
    }

    fn lifecycle(&self) -> &PassLifecycle {
        match self {
            RenderPass::GeometryBuffer(pass) => pass.lifecycle(),
            RenderPass::LightingComposite(pass) => pass.lifecycle(),
            RenderPass::UiOverlay(pass) => pass.lifecycle(),
        }
    }

    #[cfg(test)]
    pub(crate) fn lifecycle_mut(&mut self) -> &mut PassLifecycle {
        match self {
            RenderPass::GeometryBuffer(pass) => &mut pass.lifecycle,
            RenderPass::LightingComposite(pass) => &mut pass.lifecycle,
            RenderPass::UiOverlay(pass) => &mut pass.lifecycle,
        }
    }

    /// Attachments the pass reads and the layout it reads them in.
    pub fn inputs(&self) -> &'static [(AttachmentId, vk::ImageLayout)] {
        match self {
            RenderPass::GeometryBuffer(_) => &[],
            RenderPass::LightingComposite(_) => LightingPass::INPUTS,
            RenderPass::UiOverlay(_) => UiPass::INPUTS,
        }
    }

    pub fn configure(&mut self, setup: &PassSetup<'_>) -> RenderResult<()> {
        match self {
            RenderPass::GeometryBuffer(pass) => pass.configure(setup),
            RenderPass::LightingComposite(pass) => pass.configure(setup),
            RenderPass::UiOverlay(pass) => pass.configure(setup),
        }
    }

    pub fn build_framebuffer(
        &mut self,
        ctx: &ResizeContext<'_>,
        attachments: &mut Attachments,
    ) -> RenderResult<()> {
        match self {
            RenderPass::GeometryBuffer(pass) => pass.build_framebuffer(ctx, attachments),
            RenderPass::LightingComposite(pass) => pass.build_framebuffer(ctx, attachments),
            RenderPass::UiOverlay(pass) => pass.build_framebuffer(ctx, attachments),
        }
    }

    pub fn record(
        &mut self,
        frame: &FrameContext<'_>,
        attachments: &mut Attachments,
    ) -> RenderResult<()> {
        match self {
            RenderPass::GeometryBuffer(pass) => pass.record(frame, attachments),
            RenderPass::LightingComposite(pass) => pass.record(frame, attachments),
            RenderPass::UiOverlay(pass) => pass.record(frame, attachments),
        }
    }

    /// Destroys size-dependent objects only.
    pub fn destroy_resizable(&mut self, attachments: &mut Attachments) -> RenderResult<()> {
        match self {
            RenderPass::GeometryBuffer(pass) => pass.destroy_resizable(attachments),
            RenderPass::LightingComposite(pass) => pass.destroy_resizable(attachments),
            RenderPass::UiOverlay(pass) => pass.destroy_resizable(attachments),
        }
    }

    /// Destroys everything, back to `Uninitialized`.
    pub fn destroy(&mut self, attachments: &mut Attachments) {
        match self {
            RenderPass::GeometryBuffer(pass) => pass.destroy(attachments),
            RenderPass::LightingComposite(pass) => pass.destroy(attachments),
            RenderPass::UiOverlay(pass) => pass.destroy(attachments),
        }
    }
}
