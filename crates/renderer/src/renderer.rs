//! Main renderer orchestration.
//!
//! [`Renderer`] owns the device context, the swapchain state, the frame
//! slots and the pass graph, and drives one frame per [`render_frame`] call:
//!
//! ```text
//! [recreate if pending] -> acquire -> assemble render data -> validate
//!   -> record passes -> submit -> present -> [recreate if out of date]
//! ```
//!
//! A frame that fails validation or recording after acquire is aborted: its
//! slot's fence is still signaled and the swapchain is recreated to release
//! the unpresented image, so the next call starts from a clean state.
//!
//! [`render_frame`]: Renderer::render_frame

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use renderer_core::RendererConfig;
use renderer_platform::{FramebufferSource, Surface, Window, required_surface_extensions};
use renderer_rhi::RhiError;
use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::device::Device;
use renderer_rhi::format::find_depth_format;
use renderer_rhi::image::{ImageDesc, SamplerDesc};
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::pipeline_cache::PipelineCache;
use renderer_rhi::swapchain::SwapchainDesc;

use crate::error::RenderResult;
use crate::frame_manager::{AcquiredFrame, FrameCycle, FrameManager, FrameStatus, PresentStatus};
use crate::passes::{
    AttachmentId, AttachmentRef, FrameContext, PassGraph, PassKind, PassSetup, PassState,
    ResizeContext, UiFrame,
};
use crate::render_data::{RenderData, RenderDataSource};
use crate::resources::{SAMPLED_TEXTURE_TRANSITION, TextureArena, TextureHandle};
use crate::swapchain_state::{SwapchainState, present_mode_for, resize_needed, wait_for_framebuffer};

/// Deferred renderer for one window.
///
/// # Resource Destruction Order
///
/// Fields drop in declaration order, which is the required Vulkan order:
/// 1. Passes, textures and per-frame resources
/// 2. Command pools and the pipeline cache
/// 3. Depth buffer and swapchain
/// 4. Surface
/// 5. Device (last `Arc`), then its allocator
/// 6. Instance and debug messenger
///
/// [`Drop`] waits for the device and saves the pipeline cache first.
pub struct Renderer {
    graph: PassGraph,
    textures: TextureArena,
    frames: FrameManager,
    transient_pool: CommandPool,
    frame_pool: CommandPool,
    pipeline_cache: PipelineCache,
    swapchain: SwapchainState,
    surface: Surface,
    device: Arc<Device>,
    instance: Instance,

    pipeline_cache_path: Option<PathBuf>,
    /// Set by [`resize`](Self::resize) or a deferred recreation
    needs_recreate: bool,
}

impl Renderer {
    /// Creates the device context, swapchain, frame slots and passes for
    /// `window`.
    ///
    /// # Errors
    ///
    /// Any initialization failure is returned; none is recoverable.
    pub fn new(window: &Window, config: &RendererConfig) -> RenderResult<Self> {
        let (width, height) = window.framebuffer_size();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let extensions = required_surface_extensions(window.raw_display_handle()?)?;
        let instance = Instance::new(config.gpu.enable_validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let depth_format = find_depth_format(&device)?;
        let desc = SwapchainDesc::new(width, height)
            .with_present_mode(present_mode_for(config.gpu.present_mode));
        let swapchain =
            SwapchainState::new(&instance, device.clone(), surface.handle(), &desc, depth_format)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let frame_pool = CommandPool::new(device.clone(), graphics_family)?;
        let transient_pool = CommandPool::new_transient(device.clone(), graphics_family)?;

        let pipeline_cache_path = config.gpu.pipeline_cache_path.clone();
        let pipeline_cache = PipelineCache::load(device.clone(), pipeline_cache_path.as_deref())?;

        let frames = FrameManager::new(device.clone(), &frame_pool)?;

        let mut graph = PassGraph::deferred();
        graph.configure_all(&PassSetup {
            device: &device,
            pipeline_cache: &pipeline_cache,
            shader_dir: &config.gpu.shader_dir,
            swapchain_format: swapchain.swapchain().format(),
            depth_format,
        })?;
        graph
            .attachments_mut()
            .publish(AttachmentId::Depth, AttachmentRef::of(swapchain.depth()));
        graph.resize(&ResizeContext {
            allocator: &device,
            extent: swapchain.extent(),
            targets: &swapchain.targets(),
        })?;

        info!("Renderer initialized");

        Ok(Self {
            graph,
            textures: TextureArena::new(),
            frames,
            transient_pool,
            frame_pool,
            pipeline_cache,
            swapchain,
            surface,
            device,
            instance,
            pipeline_cache_path,
            needs_recreate: false,
        })
    }

    /// Renders one frame from `source`.
    ///
    /// Returns [`FrameStatus::Skip`] when no frame was produced: the
    /// swapchain was out of date, or the window is minimized and recreation
    /// is deferred.
    ///
    /// # Errors
    ///
    /// Invalid render data, such as an unknown texture or a stale bone
    /// buffer, fails only the current frame; the next call renders normally.
    /// Any other failure is fatal.
    pub fn render_frame(
        &mut self,
        window: &mut dyn FramebufferSource,
        source: &mut dyn RenderDataSource,
    ) -> RenderResult<FrameStatus> {
        if self.needs_recreate {
            debug!("Resize requested, recreating swapchain before acquire");
            if !self.recreate_swapchain(window)? {
                return Ok(FrameStatus::Skip);
            }
        }

        let status = self.frames.acquire_frame(self.swapchain.swapchain())?;
        let FrameStatus::Ready(frame) = status else {
            self.recreate_swapchain(window)?;
            return Ok(FrameStatus::Skip);
        };

        let data = source.assemble(frame.slot);
        if let Err(e) = self.record_frame(frame, &data) {
            warn!("Frame on slot {} aborted: {}", frame.slot, e);
            self.frames.abort_frame()?;
            self.needs_recreate = true;
            return Err(e);
        }

        self.frames.submit_frame()?;
        let presented = self.frames.present_frame(self.swapchain.swapchain())?;

        if presented == PresentStatus::NeedsRecreate || self.needs_recreate {
            self.recreate_swapchain(window)?;
        }
        Ok(status)
    }

    fn record_frame(&mut self, frame: AcquiredFrame, data: &RenderData) -> RenderResult<()> {
        data.validate(frame.slot, &self.textures)?;

        let cmd = self.frames.begin_recording()?;
        let ctx = FrameContext {
            cmd,
            slot: frame.slot,
            image_index: frame.image_index,
            target: self.swapchain.target(frame.image_index),
            data,
            textures: &self.textures,
        };
        self.graph.record(&ctx)
    }

    /// Recreates the swapchain and every size-dependent pass object.
    ///
    /// Waits while `window` reports a 0×0 framebuffer. Returns `false` when
    /// the window cannot wait; recreation is then retried on the next frame.
    ///
    /// # Errors
    ///
    /// Swapchain recreation failures, including a changed image count.
    pub fn recreate_swapchain(&mut self, window: &mut dyn FramebufferSource) -> RenderResult<bool> {
        let Some(extent) = wait_for_framebuffer(window) else {
            self.needs_recreate = true;
            return Ok(false);
        };

        self.device.wait_idle()?;
        self.swapchain.recreate(extent)?;

        self.graph
            .attachments_mut()
            .publish(AttachmentId::Depth, AttachmentRef::of(self.swapchain.depth()));
        self.graph.resize(&ResizeContext {
            allocator: &self.device,
            extent: self.swapchain.extent(),
            targets: &self.swapchain.targets(),
        })?;

        self.needs_recreate = false;
        info!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(true)
    }

    /// Notes a new window size; the swapchain is recreated before the next
    /// acquire unless it already has that size. A 0×0 size defers frames
    /// until the window is restored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if !resize_needed(self.swapchain.extent(), width, height) {
            trace!("Resize to current size {}x{} ignored", width, height);
            return;
        }
        if width == 0 || height == 0 {
            debug!("Window minimized, frames deferred until restored");
        } else {
            debug!("Resize to {}x{} requested", width, height);
        }
        self.needs_recreate = true;
    }

    /// Installs the per-frame UI recording callback.
    pub fn set_ui_construct<F>(&mut self, construct: F)
    where
        F: FnMut(&mut UiFrame<'_>) + 'static,
    {
        self.graph.set_ui_construct(Some(Box::new(construct)));
    }

    pub fn clear_ui_construct(&mut self) {
        self.graph.set_ui_construct(None);
    }

    /// The lit color image, view and sampler, for embedding in a UI.
    pub fn color_target(&self) -> Option<AttachmentRef> {
        self.graph.color_target()
    }

    /// Creates a sampled texture draw items can reference.
    ///
    /// The texture is moved into `SHADER_READ_ONLY_OPTIMAL` before this
    /// returns, the layout draws sample it in.
    pub fn create_texture(&mut self, desc: &ImageDesc, sampler: &SamplerDesc) -> RenderResult<TextureHandle> {
        let handle = self.textures.create_texture(self.device.clone(), desc, sampler)?;
        let texture = self.textures.get(handle)?;
        let barrier = SAMPLED_TEXTURE_TRANSITION.barrier(texture.image(), texture.desc().subresource_range());

        if let Err(e) = self.immediate_submit(|cmd| cmd.image_barriers(&[barrier])) {
            self.textures.remove(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Destroys a texture. The GPU must no longer use it.
    pub fn destroy_texture(&mut self, handle: TextureHandle) -> RenderResult<bool> {
        self.device.wait_idle()?;
        Ok(self.textures.remove(handle))
    }

    pub fn textures(&self) -> &TextureArena {
        &self.textures
    }

    /// Records `record` into a transient command buffer and waits for it.
    pub fn immediate_submit<F>(&self, record: F) -> RenderResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        Ok(self
            .transient_pool
            .execute_one_time(self.device.graphics_queue(), record)?)
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn frame_cycle(&self) -> &FrameCycle {
        self.frames.cycle()
    }

    pub fn pass_states(&self) -> Vec<(PassKind, PassState)> {
        self.graph.states()
    }

    /// Returns the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns the swapchain format.
    pub fn format(&self) -> vk::Format {
        self.swapchain.swapchain().format()
    }

    /// Writes the pipeline cache to the configured path, if any.
    pub fn save_pipeline_cache(&self) -> RenderResult<()> {
        if let Some(path) = &self.pipeline_cache_path {
            self.pipeline_cache.save(path)?;
            info!("Pipeline cache saved to {}", path.display());
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        if let Err(e) = self.save_pipeline_cache() {
            warn!("Failed to save pipeline cache: {}", e);
        }
        if let Err(e) = self.frame_pool.reset() {
            warn!("Failed to reset frame command pool: {:?}", e);
        }

        self.graph.destroy();
        self.textures.clear();

        // Remaining fields drop in declaration order
        info!("Renderer destroyed");
    }
}
