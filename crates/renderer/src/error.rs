//! Renderer error types.

use thiserror::Error;

use renderer_rhi::RhiError;

use crate::passes::{PassKind, PassState};
use crate::render_data::FrameSlot;

/// Renderer-level error type.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failure in the Vulkan layer
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Platform or configuration failure
    #[error(transparent)]
    Core(#[from] renderer_core::Error),

    /// A pass operation was called in a state that does not allow it
    #[error("{pass}: cannot {operation} while {state:?}")]
    InvalidPassState {
        pass: PassKind,
        state: PassState,
        operation: &'static str,
    },

    /// A skinned draw item supplied a bone buffer written for another slot
    #[error("bone buffer for slot {found} used while recording slot {expected}")]
    StaleBoneBuffer { expected: FrameSlot, found: FrameSlot },

    /// A skinned draw item has no bone buffer for the slot
    #[error("skinned draw item has no bone buffer for slot {0}")]
    MissingBoneBuffers(FrameSlot),

    /// A draw item references a texture the arena does not hold
    #[error("unknown texture handle {0}")]
    UnknownTexture(String),

    /// A pass needs an attachment another pass has not produced yet
    #[error("missing attachment: {0}")]
    MissingAttachment(&'static str),

    /// Frame loop call out of order
    #[error("frame cycle: {0}")]
    FrameOrder(String),
}

impl RenderError {
    /// Whether the error came from one frame's render data. The renderer
    /// aborts that frame only and stays usable.
    pub fn is_frame_data(&self) -> bool {
        matches!(
            self,
            RenderError::StaleBoneBuffer { .. }
                | RenderError::MissingBoneBuffers(_)
                | RenderError::UnknownTexture(_)
        )
    }
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
