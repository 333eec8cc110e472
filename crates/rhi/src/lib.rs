//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device, and logical device creation
//! - Swapchain negotiation and recreation
//! - Frame-slot synchronization primitives
//! - Command recording with push descriptors and synchronization2 barriers
//! - Images, samplers, and format negotiation
//! - Pipeline layouts, pipelines, and the persisted pipeline cache

mod error;

pub mod command;
pub mod descriptor;
pub mod device;
pub mod format;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod pipeline_cache;
pub mod rendering;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
