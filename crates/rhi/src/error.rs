//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required instance or device extension is not supported
    #[error("Required extension not supported: {0}")]
    MissingExtension(String),

    /// A required instance layer is not available
    #[error("Required layer not available: {0}")]
    MissingLayer(String),

    /// None of the ranked candidate formats supports the requested features
    #[error("No supported format among {candidates:?} for {features:?}")]
    NoSupportedFormat {
        candidates: Vec<ash::vk::Format>,
        features: ash::vk::FormatFeatureFlags,
    },

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface query or creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Image parameters rejected before creation
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// IO error while reading or writing persisted GPU state
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
