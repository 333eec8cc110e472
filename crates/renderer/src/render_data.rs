//! Per-frame input of the renderer.
//!
//! A [`RenderDataSource`] (the scene side) assembles one [`RenderData`] per
//! frame: an ordered list of [`DrawItem`]s plus the lighting parameters. The
//! renderer only reads it; nothing is retained past the frame.
//!
//! Push-constant blocks are `#[repr(C)]` and `Pod` so they can be pushed as
//! bytes and must match the GLSL declarations in `shaders/`.

use std::fmt;
use std::mem::size_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use renderer_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::error::{RenderError, RenderResult};
use crate::resources::{ResourceArena, TextureHandle};

/// Index of a frame slot, `0..MAX_FRAMES_IN_FLIGHT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameSlot(usize);

impl FrameSlot {
    /// # Panics
    ///
    /// Panics if `index` is not below [`MAX_FRAMES_IN_FLIGHT`].
    pub fn new(index: usize) -> Self {
        assert!(index < MAX_FRAMES_IN_FLIGHT, "frame slot {index} out of range");
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    /// The slot after this one, wrapping at [`MAX_FRAMES_IN_FLIGHT`].
    #[inline]
    pub fn next(self) -> Self {
        Self((self.0 + 1) % MAX_FRAMES_IN_FLIGHT)
    }
}

impl fmt::Display for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which G-buffer pipeline draws an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshType {
    Static,
    Skinned,
}

/// Vertex-stage push constants, offset 0.
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view-projection matrix (64 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TransformPco {
    pub model: Mat4,
    pub view_projection: Mat4,
}

impl TransformPco {
    pub const SIZE: u32 = size_of::<Self>() as u32;
}

/// Fragment-stage push constants, offset [`TransformPco::SIZE`].
///
/// - Offset 0: base color factor (16 bytes)
/// - Offset 16: emissive factor, w unused (16 bytes)
/// - Offset 32: metallic, roughness, occlusion strength, alpha cutoff (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialPco {
    pub base_color_factor: Vec4,
    pub emissive_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub occlusion_strength: f32,
    pub alpha_cutoff: f32,
}

impl MaterialPco {
    pub const SIZE: u32 = size_of::<Self>() as u32;
}

impl Default for MaterialPco {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            emissive_factor: Vec4::ZERO,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            occlusion_strength: 1.0,
            alpha_cutoff: 0.5,
        }
    }
}

/// Push-constant ranges shared by both G-buffer pipelines.
pub fn gbuffer_push_constant_ranges() -> [vk::PushConstantRange; 2] {
    [
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: TransformPco::SIZE,
        },
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: TransformPco::SIZE,
            size: MaterialPco::SIZE,
        },
    ]
}

/// Per-frame lighting inputs, pushed to the lighting fragment shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingParams {
    /// World-space camera position, w unused
    pub camera_position: Vec4,
    /// Direction the light travels, normalized, w unused
    pub light_direction: Vec4,
    /// Linear light color in xyz, intensity in w
    pub light_color: Vec4,
    /// Constant ambient term in xyz, w unused
    pub ambient: Vec4,
}

impl LightingParams {
    pub const SIZE: u32 = size_of::<Self>() as u32;

    pub fn new(camera_position: Vec3, light_direction: Vec3, light_color: Vec3, intensity: f32) -> Self {
        Self {
            camera_position: camera_position.extend(1.0),
            light_direction: light_direction.normalize_or_zero().extend(0.0),
            light_color: light_color.extend(intensity),
            ambient: Vec4::new(0.03, 0.03, 0.03, 0.0),
        }
    }
}

impl Default for LightingParams {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0), Vec3::new(-0.3, -1.0, -0.5), Vec3::ONE, 3.0)
    }
}

/// The five PBR textures of a submesh, bound at descriptor bindings 1..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PbrTextures {
    pub base_color: TextureHandle,
    pub metallic_roughness: TextureHandle,
    pub normal: TextureHandle,
    pub occlusion: TextureHandle,
    pub emissive: TextureHandle,
}

impl PbrTextures {
    /// Same texture in every role.
    pub fn uniform(texture: TextureHandle) -> Self {
        Self {
            base_color: texture,
            metallic_roughness: texture,
            normal: texture,
            occlusion: texture,
            emissive: texture,
        }
    }

    /// Handles in binding order.
    pub fn in_binding_order(&self) -> [TextureHandle; 5] {
        [
            self.base_color,
            self.metallic_roughness,
            self.normal,
            self.occlusion,
            self.emissive,
        ]
    }
}

/// Index range and material of one submesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Submesh {
    pub index_count: u32,
    pub index_offset: u32,
    pub material: MaterialPco,
    pub textures: PbrTextures,
}

/// Bone uniform buffer written by the scene for one frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoneBinding {
    pub buffer: vk::Buffer,
    pub range: vk::DeviceSize,
    /// Slot whose frame this buffer was written for
    pub slot: FrameSlot,
}

/// Per-slot bone buffers of a skinned draw item, indexed by slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoneBuffers {
    bindings: Vec<BoneBinding>,
}

impl BoneBuffers {
    /// One buffer per slot, tagged with its index.
    pub fn per_slot(buffers: [(vk::Buffer, vk::DeviceSize); MAX_FRAMES_IN_FLIGHT]) -> Self {
        Self {
            bindings: buffers
                .into_iter()
                .enumerate()
                .map(|(index, (buffer, range))| BoneBinding {
                    buffer,
                    range,
                    slot: FrameSlot::new(index),
                })
                .collect(),
        }
    }

    /// Bindings exactly as the producer tagged them.
    pub fn from_bindings(bindings: Vec<BoneBinding>) -> Self {
        Self { bindings }
    }

    /// The buffer for `slot`.
    ///
    /// # Errors
    ///
    /// [`RenderError::StaleBoneBuffer`] when the entry at `slot` was written
    /// for another slot or is missing.
    pub fn for_slot(&self, slot: FrameSlot) -> RenderResult<&BoneBinding> {
        match self.bindings.get(slot.index()) {
            Some(binding) if binding.slot == slot => Ok(binding),
            Some(binding) => Err(RenderError::StaleBoneBuffer {
                expected: slot,
                found: binding.slot,
            }),
            None => Err(RenderError::MissingBoneBuffers(slot)),
        }
    }
}

/// Everything the G-buffer pass needs to draw one mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawItem {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_type: vk::IndexType,
    pub mesh_type: MeshType,
    pub transform: TransformPco,
    pub submeshes: Vec<Submesh>,
    /// Required for [`MeshType::Skinned`], ignored otherwise
    pub bone_buffers: Option<BoneBuffers>,
}

/// One frame's worth of renderer input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderData {
    pub draw_items: Vec<DrawItem>,
    pub lighting: LightingParams,
}

impl RenderData {
    /// Checks every bone buffer and texture the draw items reference while
    /// recording `slot`, so a frame is rejected before any command is
    /// recorded.
    ///
    /// # Errors
    ///
    /// [`RenderError::MissingBoneBuffers`] or [`RenderError::StaleBoneBuffer`]
    /// for a skinned item, [`RenderError::UnknownTexture`] for a handle
    /// `textures` does not hold.
    pub fn validate<T>(&self, slot: FrameSlot, textures: &ResourceArena<T>) -> RenderResult<()> {
        for item in &self.draw_items {
            if item.mesh_type == MeshType::Skinned {
                item.bone_buffers
                    .as_ref()
                    .ok_or(RenderError::MissingBoneBuffers(slot))?
                    .for_slot(slot)?;
            }
            for submesh in &item.submeshes {
                for handle in submesh.textures.in_binding_order() {
                    textures.get(handle)?;
                }
            }
        }
        Ok(())
    }
}

/// Producer of per-frame render data.
pub trait RenderDataSource {
    fn assemble(&mut self, slot: FrameSlot) -> RenderData;
}

impl<F> RenderDataSource for F
where
    F: FnMut(FrameSlot) -> RenderData,
{
    fn assemble(&mut self, slot: FrameSlot) -> RenderData {
        self(slot)
    }
}
