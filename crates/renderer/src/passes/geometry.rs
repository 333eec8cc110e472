//! Geometry buffer pass.
//!
//! Rasterizes every draw item into five color targets plus the shared depth
//! attachment:
//!
//! | target                       | format                |
//! |------------------------------|-----------------------|
//! | position                     | `R16G16B16A16_SFLOAT` |
//! | normal                       | `R16G16B16A16_SFLOAT` |
//! | base color                   | `R8G8B8A8_SRGB`       |
//! | emissive                     | `R8G8B8A8_SRGB`       |
//! | metallic, roughness, occl.   | `R8G8B8A8_UNORM`      |
//!
//! Static and skinned meshes use separate pipelines. Items are drawn in input
//! order; the pipeline only changes where the mesh type of consecutive items
//! changes.

use std::ops::Range;
use std::slice;

use ash::vk;
use tracing::{debug, info};

use renderer_rhi::RhiError;
use renderer_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout, buffer_write, image_write};
use renderer_rhi::image::{ImageDesc, SamplerDesc};
use renderer_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use renderer_rhi::rendering::{Attachment, Framebuffer};
use renderer_rhi::shader::{Shader, ShaderStage};

use crate::error::{RenderError, RenderResult};
use crate::render_data::{
    BoneBinding, DrawItem, FrameSlot, MaterialPco, MeshType, TransformPco, gbuffer_push_constant_ranges,
};
use crate::vertex::{SkinnedVertex, StaticVertex};

use super::{
    AttachmentId, Attachments, FrameContext, PassKind, PassLifecycle, PassSetup, RenderTarget,
    ResizeContext,
};

/// Color target formats, in attachment order.
pub const GBUFFER_COLOR_FORMATS: [vk::Format; 5] = [
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R16G16B16A16_SFLOAT,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::R8G8B8A8_UNORM,
];

const GBUFFER_COLOR_IDS: [AttachmentId; 5] = [
    AttachmentId::Position,
    AttachmentId::Normal,
    AttachmentId::BaseColor,
    AttachmentId::Emissive,
    AttachmentId::MetallicRoughnessOcclusion,
];

/// Layouts the pass renders into.
const OUTPUTS: [(AttachmentId, vk::ImageLayout); 6] = [
    (AttachmentId::Position, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
    (AttachmentId::Normal, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
    (AttachmentId::BaseColor, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
    (AttachmentId::Emissive, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
    (
        AttachmentId::MetallicRoughnessOcclusion,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    ),
    (AttachmentId::Depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
];

/// Binding of the bone uniform buffer in the skinned set layout.
const BONE_BINDING: u32 = 0;
/// First of the five PBR texture bindings.
const FIRST_TEXTURE_BINDING: u32 = 1;

/// Descriptions of the five color targets at `extent`.
pub fn gbuffer_image_descs(extent: vk::Extent2D) -> [ImageDesc; 5] {
    let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
    std::array::from_fn(|i| {
        ImageDesc::new_2d(GBUFFER_COLOR_IDS[i].name(), extent, GBUFFER_COLOR_FORMATS[i], usage)
    })
}

/// A run of consecutive draw items sharing a mesh type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshBatch {
    pub mesh_type: MeshType,
    /// Indices into the draw item list
    pub items: Range<usize>,
}

/// Splits `items` into maximal runs of equal mesh type, keeping input order.
pub fn mesh_batches(items: &[DrawItem]) -> Vec<MeshBatch> {
    let mut batches: Vec<MeshBatch> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match batches.last_mut() {
            Some(batch) if batch.mesh_type == item.mesh_type => batch.items.end = index + 1,
            _ => batches.push(MeshBatch {
                mesh_type: item.mesh_type,
                items: index..index + 1,
            }),
        }
    }
    batches
}

/// Bone buffer each item binds while recording `slot`, `None` for static items.
///
/// # Errors
///
/// [`RenderError::MissingBoneBuffers`] or [`RenderError::StaleBoneBuffer`]
/// for a skinned item without a buffer written for `slot`.
pub fn resolve_bone_bindings(items: &[DrawItem], slot: FrameSlot) -> RenderResult<Vec<Option<BoneBinding>>> {
    items
        .iter()
        .map(|item| match item.mesh_type {
            MeshType::Static => Ok(None),
            MeshType::Skinned => {
                let bones = item
                    .bone_buffers
                    .as_ref()
                    .ok_or(RenderError::MissingBoneBuffers(slot))?;
                bones.for_slot(slot).map(|binding| Some(*binding))
            }
        })
        .collect()
}

struct MeshPipeline {
    pipeline: Pipeline,
    layout: PipelineLayout,
    // Referenced by `layout`
    _set_layout: DescriptorSetLayout,
}

struct GeometryPipelines {
    rigid: MeshPipeline,
    skinned: MeshPipeline,
}

impl GeometryPipelines {
    fn for_mesh(&self, mesh_type: MeshType) -> &MeshPipeline {
        match mesh_type {
            MeshType::Static => &self.rigid,
            MeshType::Skinned => &self.skinned,
        }
    }
}

/// Deferred geometry pass.
pub struct GeometryPass {
    pub(super) lifecycle: PassLifecycle,
    pipelines: Option<GeometryPipelines>,
    targets: Vec<Box<dyn RenderTarget>>,
    framebuffer: Option<Framebuffer>,
}

impl GeometryPass {
    pub fn new() -> Self {
        Self {
            lifecycle: PassLifecycle::new(PassKind::GeometryBuffer),
            pipelines: None,
            targets: Vec::new(),
            framebuffer: None,
        }
    }

    #[inline]
    pub fn lifecycle(&self) -> &PassLifecycle {
        &self.lifecycle
    }

    /// Extent of the current targets, if built.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.framebuffer.as_ref().map(Framebuffer::extent)
    }

    /// Builds the static and skinned pipelines.
    ///
    /// # Errors
    ///
    /// Fails when the device's push-constant budget cannot hold the transform
    /// and material blocks, or when shader loading or pipeline creation fails.
    pub fn configure(&mut self, setup: &PassSetup<'_>) -> RenderResult<()> {
        self.lifecycle.check_configure()?;

        let required = TransformPco::SIZE + MaterialPco::SIZE;
        let available = setup.device.properties().limits.max_push_constants_size;
        if available < required {
            return Err(RhiError::PipelineError(format!(
                "G-buffer push constants need {required} bytes, device allows {available}"
            ))
            .into());
        }

        let rigid_bindings: Vec<_> = (0..5u32)
            .map(|i| {
                DescriptorBindingBuilder::combined_image_sampler(
                    FIRST_TEXTURE_BINDING + i,
                    vk::ShaderStageFlags::FRAGMENT,
                )
            })
            .collect();
        let mut skinned_bindings = vec![DescriptorBindingBuilder::uniform_buffer(
            BONE_BINDING,
            vk::ShaderStageFlags::VERTEX,
        )];
        skinned_bindings.extend_from_slice(&rigid_bindings);

        let rigid_vert = setup.load_shader("gbuffer_static.vert", ShaderStage::Vertex)?;
        let skinned_vert = setup.load_shader("gbuffer_skinned.vert", ShaderStage::Vertex)?;
        let frag = setup.load_shader("gbuffer.frag", ShaderStage::Fragment)?;

        let rigid = build_mesh_pipeline(
            setup,
            "gbuffer_static",
            &rigid_bindings,
            (&rigid_vert, &frag),
            StaticVertex::binding_description(),
            &StaticVertex::attribute_descriptions(),
        )?;
        let skinned = build_mesh_pipeline(
            setup,
            "gbuffer_skinned",
            &skinned_bindings,
            (&skinned_vert, &frag),
            SkinnedVertex::binding_description(),
            &SkinnedVertex::attribute_descriptions(),
        )?;

        self.pipelines = Some(GeometryPipelines { rigid, skinned });
        self.lifecycle.configured()?;
        info!("Geometry pass configured (depth format {:?})", setup.depth_format);
        Ok(())
    }

    /// Creates the color targets at `ctx.extent` and attaches the shared depth.
    ///
    /// # Errors
    ///
    /// [`RenderError::MissingAttachment`] when no depth attachment is
    /// published, or an image creation error.
    pub fn build_framebuffer(
        &mut self,
        ctx: &ResizeContext<'_>,
        attachments: &mut Attachments,
    ) -> RenderResult<()> {
        self.lifecycle.check_build()?;
        let depth = attachments.get(AttachmentId::Depth)?;

        let sampler = SamplerDesc::nearest_clamp();
        let mut targets = Vec::with_capacity(GBUFFER_COLOR_IDS.len());
        for desc in gbuffer_image_descs(ctx.extent) {
            targets.push(ctx.allocator.allocate(&desc, &sampler)?);
        }

        let mut framebuffer = Framebuffer::new(ctx.extent);
        for (id, target) in GBUFFER_COLOR_IDS.into_iter().zip(&targets) {
            let attachment = target.attachment();
            attachments.publish(id, attachment);
            framebuffer = framebuffer.with_color(Attachment::color(attachment.view).clear_color([0.0; 4]));
        }
        framebuffer = framebuffer.with_depth(Attachment::depth(depth.view).clear_depth(1.0));

        self.targets = targets;
        self.framebuffer = Some(framebuffer);
        self.lifecycle.framebuffer_built()?;
        debug!("Geometry pass targets built at {}x{}", ctx.extent.width, ctx.extent.height);
        Ok(())
    }

    /// Records the geometry of `frame.data`.
    ///
    /// # Errors
    ///
    /// Invalid state, a skinned item without a bone buffer for the frame's
    /// slot, or an unknown texture handle.
    pub fn record(&mut self, frame: &FrameContext<'_>, attachments: &mut Attachments) -> RenderResult<()> {
        self.lifecycle.check_record()?;
        let (Some(pipelines), Some(framebuffer)) = (&self.pipelines, &self.framebuffer) else {
            return Err(self.lifecycle.reject("record"));
        };

        let items = &frame.data.draw_items;
        let bones = resolve_bone_bindings(items, frame.slot)?;
        let cmd = frame.cmd;

        attachments.transition(cmd, &OUTPUTS)?;

        let rendering = framebuffer.rendering_info();
        cmd.begin_rendering(&rendering.info());
        cmd.set_viewport_and_scissor(framebuffer.extent());

        for batch in mesh_batches(items) {
            let mesh_pipeline = pipelines.for_mesh(batch.mesh_type);
            let layout = mesh_pipeline.layout.handle();
            cmd.bind_graphics_pipeline(mesh_pipeline.pipeline.handle());

            for index in batch.items {
                let item = &items[index];
                cmd.bind_vertex_buffer(item.vertex_buffer, 0);
                cmd.bind_index_buffer(item.index_buffer, 0, item.index_type);

                let bone_info = bones[index].map(|binding| vk::DescriptorBufferInfo {
                    buffer: binding.buffer,
                    offset: 0,
                    range: binding.range,
                });

                for submesh in &item.submeshes {
                    cmd.push_constants(layout, vk::ShaderStageFlags::VERTEX, 0, &item.transform);
                    cmd.push_constants(
                        layout,
                        vk::ShaderStageFlags::FRAGMENT,
                        TransformPco::SIZE,
                        &submesh.material,
                    );

                    let mut image_infos = [vk::DescriptorImageInfo::default(); 5];
                    for (info, handle) in image_infos.iter_mut().zip(submesh.textures.in_binding_order()) {
                        *info = frame.textures.descriptor_info(handle)?;
                    }

                    let mut writes = Vec::with_capacity(6);
                    if let Some(info) = bone_info.as_ref() {
                        writes.push(buffer_write(BONE_BINDING, slice::from_ref(info)));
                    }
                    for (i, info) in image_infos.iter().enumerate() {
                        writes.push(image_write(FIRST_TEXTURE_BINDING + i as u32, slice::from_ref(info)));
                    }
                    cmd.push_descriptor_set(layout, 0, &writes);

                    cmd.draw_indexed(submesh.index_count, 1, submesh.index_offset, 0, 0);
                }
            }
        }

        cmd.end_rendering();
        self.lifecycle.recorded()
    }

    /// Releases the color targets, keeping the pipelines.
    pub fn destroy_resizable(&mut self, attachments: &mut Attachments) -> RenderResult<()> {
        self.release_targets(attachments);
        self.lifecycle.resized()
    }

    pub fn destroy(&mut self, attachments: &mut Attachments) {
        self.release_targets(attachments);
        self.pipelines = None;
        self.lifecycle.destroyed();
    }

    fn release_targets(&mut self, attachments: &mut Attachments) {
        for id in GBUFFER_COLOR_IDS {
            attachments.retire(id);
        }
        self.framebuffer = None;
        self.targets.clear();
    }
}

fn build_mesh_pipeline(
    setup: &PassSetup<'_>,
    name: &'static str,
    bindings: &[vk::DescriptorSetLayoutBinding],
    (vertex_shader, fragment_shader): (&Shader, &Shader),
    vertex_binding: vk::VertexInputBindingDescription,
    vertex_attributes: &[vk::VertexInputAttributeDescription],
) -> RenderResult<MeshPipeline> {
    let set_layout = DescriptorSetLayout::new_push(setup.device.clone(), bindings)?;
    let layout = PipelineLayout::new(
        setup.device.clone(),
        &[set_layout.handle()],
        &gbuffer_push_constant_ranges(),
    )?;
    let pipeline = GraphicsPipelineBuilder::new(name)
        .vertex_shader(vertex_shader)
        .fragment_shader(fragment_shader)
        .vertex_input(vertex_binding, vertex_attributes)
        .cull_mode(CullMode::Back)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .color_attachment_formats(&GBUFFER_COLOR_FORMATS)
        .depth_attachment_format(setup.depth_format)
        .build(setup.device.clone(), &layout, setup.pipeline_cache)?;
    Ok(MeshPipeline {
        pipeline,
        layout,
        _set_layout: set_layout,
    })
}

impl Default for GeometryPass {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::PassState;
    use crate::render_data::BoneBuffers;
    use renderer_rhi::sync::MAX_FRAMES_IN_FLIGHT;

    fn item(mesh_type: MeshType, tag: f32) -> DrawItem {
        let mut transform = TransformPco::default();
        transform.model.w_axis.x = tag;
        DrawItem {
            vertex_buffer: vk::Buffer::null(),
            index_buffer: vk::Buffer::null(),
            index_type: vk::IndexType::UINT32,
            mesh_type,
            transform,
            submeshes: Vec::new(),
            bone_buffers: match mesh_type {
                MeshType::Static => None,
                MeshType::Skinned => Some(BoneBuffers::per_slot(
                    [(vk::Buffer::null(), 256); MAX_FRAMES_IN_FLIGHT],
                )),
            },
        }
    }

    #[test]
    fn test_batches_group_consecutive_only() {
        use MeshType::*;
        let items: Vec<_> = [Static, Static, Skinned, Static, Skinned, Skinned]
            .into_iter()
            .enumerate()
            .map(|(i, t)| item(t, i as f32))
            .collect();

        let batches = mesh_batches(&items);
        assert_eq!(
            batches,
            vec![
                MeshBatch { mesh_type: Static, items: 0..2 },
                MeshBatch { mesh_type: Skinned, items: 2..3 },
                MeshBatch { mesh_type: Static, items: 3..4 },
                MeshBatch { mesh_type: Skinned, items: 4..6 },
            ]
        );
    }

    #[test]
    fn test_batches_empty() {
        assert!(mesh_batches(&[]).is_empty());
    }

    #[test]
    fn test_static_items_need_no_bones() {
        let items = vec![item(MeshType::Static, 0.0)];
        let bones = resolve_bone_bindings(&items, FrameSlot::new(0)).unwrap();
        assert_eq!(bones, vec![None]);
    }

    #[test]
    fn test_skinned_without_bones_rejected() {
        let mut skinned = item(MeshType::Skinned, 0.0);
        skinned.bone_buffers = None;
        assert!(matches!(
            resolve_bone_bindings(&[skinned], FrameSlot::new(1)),
            Err(RenderError::MissingBoneBuffers(_))
        ));
    }

    #[test]
    fn test_gbuffer_descs() {
        let extent = vk::Extent2D { width: 1280, height: 720 };
        let descs = gbuffer_image_descs(extent);
        assert_eq!(descs[0].format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(descs[2].format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(descs[4].format, vk::Format::R8G8B8A8_UNORM);
        for desc in &descs {
            assert_eq!(desc.extent, extent);
            assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        }
    }

    #[test]
    fn test_outputs_cover_targets_and_depth() {
        let ids: Vec<_> = OUTPUTS.iter().map(|(id, _)| *id).collect();
        assert_eq!(&ids[..5], &GBUFFER_COLOR_IDS[..]);
        assert_eq!(
            OUTPUTS[5],
            (AttachmentId::Depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        );
    }

    #[test]
    fn test_new_pass_is_uninitialized() {
        let pass = GeometryPass::new();
        assert_eq!(pass.lifecycle().state(), PassState::Uninitialized);
        assert!(pass.extent().is_none());
    }
}
