//! Shared foundation for the kiln crates.
//!
//! - [`Error`] / [`Result`]: application-level failures (window, config, I/O)
//! - [`init_logging`]: tracing subscriber bootstrap
//! - [`EngineConfig`]: TOML-backed engine settings
//! - [`FrameClock`]: per-frame delta timing

mod clock;
mod config;
mod error;
mod logging;

pub use clock::FrameClock;
pub use config::{
    AssetConfig, EngineConfig, LogConfig, PresentModePreference, RendererConfig, SceneChoice,
    SceneConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
