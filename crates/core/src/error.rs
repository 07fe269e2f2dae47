//! Application-level error type.

use thiserror::Error;

/// Errors raised outside the GPU layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or surface hookup failed.
    #[error("Window error: {0}")]
    Window(String),

    /// Graphics API failure reported by a windowing collaborator.
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed or holds invalid values.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the application Error type.
pub type Result<T> = std::result::Result<T, Error>;
