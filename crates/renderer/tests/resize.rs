//! Resize and minimize behavior that does not need a GPU.
//!
//! Rebuilding the pass graph itself across a resize is covered next to
//! `PassGraph`, where passes can be configured without pipelines.

use ash::vk;

use renderer_platform::FramebufferSource;
use renderer_renderer::passes::{
    AttachmentId, AttachmentRef, Attachments, LightingPass, PassKind, PassLifecycle, UiPass,
    gbuffer_image_descs, lit_color_desc,
};
use renderer_renderer::swapchain_state::{depth_image_desc, resize_needed, wait_for_framebuffer};

const SMALL: vk::Extent2D = vk::Extent2D {
    width: 1280,
    height: 720,
};
const LARGE: vk::Extent2D = vk::Extent2D {
    width: 1920,
    height: 1080,
};

/// Window stand-in that replays a scripted size per event wait.
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

fn attachment(extent: vk::Extent2D) -> AttachmentRef {
    AttachmentRef {
        image: vk::Image::null(),
        view: vk::ImageView::null(),
        sampler: vk::Sampler::null(),
        extent,
        format: vk::Format::R8G8B8A8_UNORM,
        range: vk::ImageSubresourceRange::default(),
    }
}

/// Publishes every attachment a resize would rebuild.
fn rebuild(attachments: &mut Attachments, extent: vk::Extent2D) {
    for id in AttachmentId::GBUFFER {
        attachments.publish(id, attachment(extent));
    }
    attachments.publish(AttachmentId::LitColor, attachment(extent));
}

#[test]
fn test_window_sequence_through_minimize() {
    let mut current = SMALL;

    // Minimize: the resize event asks for recreation, but it is deferred
    assert!(resize_needed(current, 0, 0));
    let mut minimized = ScriptedWindow::new(&[(0, 0)]);
    assert_eq!(wait_for_framebuffer(&mut minimized), None);

    // Restore at a new size: the deferred recreation waits it out
    let mut restoring = ScriptedWindow::new(&[(0, 0), (0, 0), (1920, 1080)]);
    assert!(resize_needed(current, 1920, 1080));
    current = wait_for_framebuffer(&mut restoring).unwrap();
    assert_eq!(current, LARGE);
    assert_eq!(restoring.cursor, 2);

    // Images built for the new extent
    assert!(gbuffer_image_descs(current).iter().all(|desc| desc.extent == LARGE));
    assert_eq!(lit_color_desc(current).extent, LARGE);
    assert_eq!(depth_image_desc(current, vk::Format::D32_SFLOAT).extent, LARGE);

    // A repeated event at the same size is not a resize
    assert!(!resize_needed(current, 1920, 1080));
}

#[test]
fn test_minimize_waits_then_recreates_at_restored_size() {
    let mut window = ScriptedWindow::new(&[(0, 0), (0, 0), (0, 0), (1280, 720)]);
    assert_eq!(wait_for_framebuffer(&mut window), Some(SMALL));
    assert_eq!(window.cursor, 3);
}

#[test]
fn test_minimize_without_restore_defers() {
    let mut window = ScriptedWindow::new(&[(1280, 0)]);
    assert_eq!(wait_for_framebuffer(&mut window), None);
}

#[test]
fn test_stage_barriers_after_rebuild() {
    let mut attachments = Attachments::new();
    rebuild(&mut attachments, LARGE);
    for id in AttachmentId::GBUFFER {
        attachments.set_layout(id, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }
    attachments.set_layout(AttachmentId::Depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let planned = attachments.plan_transitions(LightingPass::INPUTS).unwrap();
    assert_eq!(planned.len(), 6);
    assert!(
        planned
            .iter()
            .all(|t| t.new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    );
    attachments.apply(&planned);
    assert!(
        attachments
            .plan_transitions(LightingPass::INPUTS)
            .unwrap()
            .is_empty()
    );

    attachments.set_layout(AttachmentId::LitColor, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let planned = attachments.plan_transitions(UiPass::INPUTS).unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(planned[0].new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
}

#[test]
fn test_record_before_framebuffer_rejected() {
    let mut lifecycle = PassLifecycle::new(PassKind::GeometryBuffer);
    assert!(lifecycle.recorded().is_err());
    lifecycle.configured().unwrap();
    assert!(lifecycle.recorded().is_err());
    assert!(lifecycle.configured().is_err());
}
