//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the GPU layer.
///
/// Creation failures are fatal to the caller; the recoverable presentation
/// statuses (suboptimal, out-of-date) are reported as
/// [`SurfaceStatus`](crate::swapchain::SurfaceStatus) values instead.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("No memory type satisfies the requested properties: {0}")]
    NoSuitableMemoryType(String),

    #[error("None of the candidate formats {0:?} is supported")]
    UnsupportedFormat(Vec<vk::Format>),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// The recreated swapchain no longer matches the formats pipelines were
    /// built against.
    #[error("Swapchain {what} format changed from {old:?} to {new:?}")]
    FormatMismatch {
        what: &'static str,
        old: vk::Format,
        new: vk::Format,
    },

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A descriptor layout or write did not match the declared bindings.
    #[error("Descriptor error: {0}")]
    DescriptorError(String),

    /// The descriptor pool has no capacity left for another set.
    #[error("Descriptor pool exhausted")]
    PoolExhausted,

    #[error("Buffer error: {0}")]
    BufferError(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
