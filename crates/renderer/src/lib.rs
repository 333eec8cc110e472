//! Deferred rendering core.
//!
//! This crate drives the GPU side of a frame:
//! - Frame slots, fences and semaphores ([`frame_manager`])
//! - Swapchain and depth recreation ([`swapchain_state`])
//! - Geometry buffer, lighting composite and UI overlay passes ([`passes`])
//! - Texture handles ([`resources`])
//!
//! The scene side feeds it through [`RenderDataSource`].

pub mod error;
pub mod frame_manager;
pub mod passes;
pub mod render_data;
pub mod renderer;
pub mod resources;
pub mod swapchain_state;
pub mod vertex;

pub use error::{RenderError, RenderResult};
pub use frame_manager::{AcquiredFrame, FrameCycle, FrameStatus, PresentStatus};
pub use passes::{PassKind, PassState, UiFrame};
pub use render_data::{
    BoneBinding, BoneBuffers, DrawItem, FrameSlot, LightingParams, MaterialPco, MeshType, PbrTextures,
    RenderData, RenderDataSource, Submesh, TransformPco,
};
pub use renderer::Renderer;
pub use resources::{TextureArena, TextureHandle};
pub use vertex::{SkinnedVertex, StaticVertex};

pub use renderer_rhi::sync::MAX_FRAMES_IN_FLIGHT;
