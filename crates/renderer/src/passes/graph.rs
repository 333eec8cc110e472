//! Ordered pass list and the barriers between its stages.

use tracing::{debug, info};

use crate::error::RenderResult;

use super::{
    AttachmentId, AttachmentRef, Attachments, FrameContext, GeometryPass, LightingPass, PassKind, PassSetup,
    PassState, RenderPass, ResizeContext, UiConstruct, UiPass,
};

/// The pipeline's passes in execution order plus the attachments they share.
pub struct PassGraph {
    passes: Vec<RenderPass>,
    attachments: Attachments,
}

impl PassGraph {
    pub fn new(passes: Vec<RenderPass>) -> Self {
        Self {
            passes,
            attachments: Attachments::new(),
        }
    }

    /// Geometry buffer → lighting composite → UI overlay.
    pub fn deferred() -> Self {
        Self::new(vec![
            RenderPass::GeometryBuffer(GeometryPass::new()),
            RenderPass::LightingComposite(LightingPass::new()),
            RenderPass::UiOverlay(UiPass::new()),
        ])
    }

    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    /// Kind and state of every pass, in order.
    pub fn states(&self) -> Vec<(PassKind, PassState)> {
        self.passes.iter().map(|pass| (pass.kind(), pass.state())).collect()
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    /// For images owned outside the graph, such as the shared depth buffer.
    pub fn attachments_mut(&mut self) -> &mut Attachments {
        &mut self.attachments
    }

    /// Builds layouts and pipelines of every pass.
    pub fn configure_all(&mut self, setup: &PassSetup<'_>) -> RenderResult<()> {
        for pass in &mut self.passes {
            pass.configure(setup)?;
        }
        info!("Configured {} render pass(es)", self.passes.len());
        Ok(())
    }

    /// Rebuilds size-dependent objects of every pass, in pipeline order.
    /// Pipelines and layouts survive.
    pub fn resize(&mut self, ctx: &ResizeContext<'_>) -> RenderResult<()> {
        for pass in &mut self.passes {
            pass.destroy_resizable(&mut self.attachments)?;
            pass.build_framebuffer(ctx, &mut self.attachments)?;
        }
        debug!("Render passes resized to {}x{}", ctx.extent.width, ctx.extent.height);
        Ok(())
    }

    /// Records every pass, transitioning each pass's inputs first.
    ///
    /// On failure the tracked layouts are put back as they were, since the
    /// partly recorded command buffer is never submitted.
    pub fn record(&mut self, frame: &FrameContext<'_>) -> RenderResult<()> {
        let layouts = self.attachments.layouts();
        let result = self.record_passes(frame);
        if result.is_err() {
            self.attachments.restore_layouts(&layouts);
        }
        result
    }

    fn record_passes(&mut self, frame: &FrameContext<'_>) -> RenderResult<()> {
        for pass in &mut self.passes {
            self.attachments.transition(frame.cmd, pass.inputs())?;
            pass.record(frame, &mut self.attachments)?;
        }
        Ok(())
    }

    /// Installs or clears the UI callback on the overlay pass, if present.
    pub fn set_ui_construct(&mut self, construct: Option<UiConstruct>) {
        for pass in &mut self.passes {
            if let RenderPass::UiOverlay(ui) = pass {
                ui.set_construct(construct);
                return;
            }
        }
    }

    /// The lit color target, once the lighting pass has built it.
    pub fn color_target(&self) -> Option<AttachmentRef> {
        self.passes.iter().find_map(|pass| match pass {
            RenderPass::LightingComposite(lighting) => lighting.target(),
            _ => None,
        })
    }

    /// Destroys every pass in reverse order.
    pub fn destroy(&mut self) {
        for pass in self.passes.iter_mut().rev() {
            pass.destroy(&mut self.attachments);
        }
        self.attachments.retire(AttachmentId::Depth);
    }
}

impl Default for PassGraph {
    fn default() -> Self {
        Self::deferred()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{RenderTarget, SwapchainTarget, TargetAllocator, UiFrame};
    use crate::swapchain_state::wait_for_framebuffer;
    use ash::vk;
    use renderer_platform::FramebufferSource;
    use renderer_rhi::command::ImageTransition;
    use renderer_rhi::image::{ImageDesc, SamplerDesc};
    use std::cell::Cell;
    use std::rc::Rc;

    const SWAPCHAIN_IMAGES: usize = 3;

    fn fake_attachment(extent: vk::Extent2D, format: vk::Format) -> AttachmentRef {
        AttachmentRef {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            extent,
            format,
            range: vk::ImageSubresourceRange::default(),
        }
    }

    /// Host-side image that counts how many are alive.
    struct CountedTarget {
        attachment: AttachmentRef,
        live: Rc<Cell<usize>>,
    }

    impl RenderTarget for CountedTarget {
        fn attachment(&self) -> AttachmentRef {
            self.attachment
        }
    }

    impl Drop for CountedTarget {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    #[derive(Default)]
    struct CountingAllocator {
        live: Rc<Cell<usize>>,
        created: Cell<usize>,
    }

    impl TargetAllocator for CountingAllocator {
        fn allocate(&self, desc: &ImageDesc, _sampler: &SamplerDesc) -> RenderResult<Box<dyn RenderTarget>> {
            self.live.set(self.live.get() + 1);
            self.created.set(self.created.get() + 1);
            Ok(Box::new(CountedTarget {
                attachment: fake_attachment(desc.extent, desc.format),
                live: self.live.clone(),
            }))
        }
    }

    /// Replays one framebuffer size per event wait; cannot wait past the end.
    struct ScriptedWindow {
        sizes: Vec<(u32, u32)>,
        cursor: usize,
    }

    impl ScriptedWindow {
        fn new(sizes: &[(u32, u32)]) -> Self {
            Self {
                sizes: sizes.to_vec(),
                cursor: 0,
            }
        }
    }

    impl FramebufferSource for ScriptedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.sizes[self.cursor]
        }

        fn wait_events(&mut self) -> bool {
            if self.cursor + 1 < self.sizes.len() {
                self.cursor += 1;
                true
            } else {
                false
            }
        }
    }

    fn configured_graph() -> PassGraph {
        let mut graph = PassGraph::deferred();
        for pass in &mut graph.passes {
            pass.lifecycle_mut().configured().unwrap();
        }
        graph
    }

    /// Republishes depth and resizes the graph, as swapchain recreation does.
    fn recreate(graph: &mut PassGraph, allocator: &CountingAllocator, extent: vk::Extent2D) {
        graph
            .attachments_mut()
            .publish(AttachmentId::Depth, fake_attachment(extent, vk::Format::D32_SFLOAT));
        let targets = vec![
            SwapchainTarget {
                image: vk::Image::null(),
                view: vk::ImageView::null(),
                extent,
                format: vk::Format::B8G8R8A8_SRGB,
            };
            SWAPCHAIN_IMAGES
        ];
        graph
            .resize(&ResizeContext {
                allocator,
                extent,
                targets: &targets,
            })
            .unwrap();
    }

    fn assert_built_at(graph: &PassGraph, extent: vk::Extent2D) {
        assert!(
            graph
                .states()
                .iter()
                .all(|(_, state)| *state == PassState::FramebufferReady)
        );
        for id in AttachmentId::GBUFFER.into_iter().chain([AttachmentId::LitColor]) {
            assert_eq!(graph.attachments().get(id).unwrap().extent, extent, "{}", id.name());
            assert_eq!(graph.attachments().layout(id), Some(vk::ImageLayout::UNDEFINED));
        }
        assert_eq!(graph.color_target().map(|target| target.extent), Some(extent));
        let RenderPass::UiOverlay(ui) = &graph.passes()[2] else {
            panic!("third pass must be the overlay");
        };
        assert_eq!(ui.framebuffer_count(), SWAPCHAIN_IMAGES);
    }

    #[test]
    fn test_deferred_order() {
        let graph = PassGraph::deferred();
        let kinds: Vec<_> = graph.states().into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(
            kinds,
            vec![
                PassKind::GeometryBuffer,
                PassKind::LightingComposite,
                PassKind::UiOverlay
            ]
        );
        assert!(
            graph
                .states()
                .iter()
                .all(|(_, state)| *state == PassState::Uninitialized)
        );
    }

    #[test]
    fn test_inputs_reference_earlier_outputs() {
        let graph = PassGraph::deferred();
        let inputs: Vec<_> = graph.passes().iter().map(|pass| pass.inputs()).collect();
        assert!(inputs[0].is_empty());
        assert_eq!(inputs[1].len(), 6);
        assert_eq!(inputs[2][0].0, AttachmentId::LitColor);
    }

    #[test]
    fn test_resize_before_configure_rejected() {
        let mut graph = PassGraph::deferred();
        let mut attachments = Attachments::new();
        let pass = &mut graph.passes[0];
        assert!(pass.destroy_resizable(&mut attachments).is_err());
    }

    #[test]
    fn test_ui_construct_reaches_overlay() {
        let mut graph = PassGraph::deferred();
        graph.set_ui_construct(Some(Box::new(|_ui: &mut UiFrame<'_>| {})));
        let RenderPass::UiOverlay(ui) = &graph.passes()[2] else {
            panic!("third pass must be the overlay");
        };
        assert!(ui.has_construct());
    }

    #[test]
    fn test_no_color_target_before_build() {
        assert!(PassGraph::deferred().color_target().is_none());
    }

    #[test]
    fn test_resize_through_minimize_rebuilds_attachments() {
        let allocator = CountingAllocator::default();
        let mut graph = configured_graph();

        let mut window = ScriptedWindow::new(&[(1280, 720)]);
        let small = wait_for_framebuffer(&mut window).unwrap();
        recreate(&mut graph, &allocator, small);
        assert_built_at(&graph, small);
        assert_eq!(allocator.live.get(), 6);

        // Left by a recorded frame
        graph
            .attachments_mut()
            .set_layout(AttachmentId::LitColor, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        // Minimized inside an event callback: recreation deferred, nothing rebuilt
        let mut window = ScriptedWindow::new(&[(0, 0)]);
        assert_eq!(wait_for_framebuffer(&mut window), None);
        assert_eq!(allocator.created.get(), 6);
        assert_eq!(graph.attachments().get(AttachmentId::Position).unwrap().extent, small);

        let mut window = ScriptedWindow::new(&[(0, 0), (0, 0), (1920, 1080)]);
        let large = wait_for_framebuffer(&mut window).unwrap();
        assert_eq!(large, vk::Extent2D { width: 1920, height: 1080 });
        recreate(&mut graph, &allocator, large);
        assert_built_at(&graph, large);

        // Old targets released, one new set alive
        assert_eq!(allocator.created.get(), 12);
        assert_eq!(allocator.live.get(), 6);
    }

    #[test]
    fn test_destroy_releases_targets() {
        let allocator = CountingAllocator::default();
        let mut graph = configured_graph();
        recreate(&mut graph, &allocator, vk::Extent2D { width: 640, height: 480 });

        graph.destroy();
        assert_eq!(allocator.live.get(), 0);
        assert!(graph.attachments().is_empty());
        assert!(
            graph
                .states()
                .iter()
                .all(|(_, state)| *state == PassState::Uninitialized)
        );
    }

    #[test]
    fn test_barrier_layouts_between_stages() {
        // Lighting reads what geometry left as attachments
        let transition = ImageTransition::new(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(transition.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(transition.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
    }
}
