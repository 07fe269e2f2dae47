//! Vulkan resource layer for the kiln engine.
//!
//! Built on `ash` and `gpu-allocator`. The crate covers:
//! - instance, physical-device selection and the logical [`device::Device`]
//! - the [`swapchain::PresentationSurface`] with its frame slots
//! - [`buffer::GpuBuffer`], images, samplers and textures
//! - the validated descriptor system
//! - render passes, framebuffers, shaders and graphics pipelines

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
