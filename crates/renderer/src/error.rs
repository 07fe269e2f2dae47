//! Error type for scene construction and the frame loop.

use kiln_resources::ResourceError;
use kiln_rhi::RhiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Core(#[from] kiln_core::Error),

    #[error("Render pass '{0}' is already registered")]
    DuplicatePass(String),

    #[error("Render pass '{0}' is not registered")]
    UnknownPass(String),

    /// A system binding carries no descriptor set for set 0.
    #[error("Binding of system #{1} in pass '{0}' has no descriptor sets")]
    EmptyBinding(String, usize),

    /// The pass graph was built without its final swapchain pass.
    #[error("Pass graph '{0}' has no swapchain pass")]
    MissingSwapchainPass(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
